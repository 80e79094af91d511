use super::connection::{
    Action, ActionContext, Blocking, ConnectionStrategy, ConnectionStrategyBuilder,
};
use super::{Strategy, StrategyBase};
use crate::coordinator::Coordinator;
use crate::source::{EventKind, SourceEvent};
use async_trait::async_trait;
use conflux_core::{ActivationOptions, Capability, ConfluxError, LogLevel, Result, StrategyConfig};
use futures::future::BoxFuture;
use std::ops::Deref;

/// Mirrors in-flight requests of a source onto a target.
///
/// The caller picks the request-flow event (e.g. `beforePush`) and the action.
#[derive(Debug)]
pub struct RequestStrategy(ConnectionStrategy);

impl RequestStrategy {
    pub fn builder(source: impl Into<String>, target: impl Into<String>) -> RequestStrategyBuilder {
        RequestStrategyBuilder(ConnectionStrategyBuilder::new(source).target(target))
    }
}

impl Deref for RequestStrategy {
    type Target = ConnectionStrategy;

    fn deref(&self) -> &ConnectionStrategy {
        &self.0
    }
}

#[async_trait]
impl Strategy for RequestStrategy {
    fn base(&self) -> &StrategyBase {
        self.0.base()
    }

    async fn activate(&self, coordinator: &Coordinator, options: &ActivationOptions) -> Result<()> {
        self.0.activate(coordinator, options).await
    }

    async fn deactivate(&self) -> Result<()> {
        self.0.deactivate().await
    }
}

/// Builder for [`RequestStrategy`]
pub struct RequestStrategyBuilder(ConnectionStrategyBuilder);

impl RequestStrategyBuilder {
    pub fn on(self, event: EventKind) -> Self {
        Self(self.0.on(event))
    }

    pub fn action(self, action: impl Into<Action>) -> Self {
        Self(self.0.action(action))
    }

    pub fn invoke(self, capability: Capability) -> Self {
        Self(self.0.invoke(capability))
    }

    pub fn custom<F>(self, action: F) -> Self
    where
        F: Fn(ActionContext) -> BoxFuture<'static, Result<()>> + Send + Sync + 'static,
    {
        Self(self.0.custom(action))
    }

    pub fn blocking(self, blocking: impl Into<Blocking>) -> Self {
        Self(self.0.blocking(blocking))
    }

    pub fn blocking_when<F>(self, predicate: F) -> Self
    where
        F: Fn(&SourceEvent) -> bool + Send + Sync + 'static,
    {
        Self(self.0.blocking_when(predicate))
    }

    pub fn filter<F>(self, filter: F) -> Self
    where
        F: Fn(&SourceEvent) -> bool + Send + Sync + 'static,
    {
        Self(self.0.filter(filter))
    }

    pub fn catch<F>(self, catch: F) -> Self
    where
        F: Fn(ConfluxError, SourceEvent) -> BoxFuture<'static, Result<()>> + Send + Sync + 'static,
    {
        Self(self.0.catch(catch))
    }

    pub fn name(self, name: impl Into<String>) -> Self {
        Self(self.0.name(name))
    }

    pub fn log_prefix(self, prefix: impl Into<String>) -> Self {
        Self(self.0.log_prefix(prefix))
    }

    pub fn log_level(self, level: LogLevel) -> Self {
        Self(self.0.log_level(level))
    }

    pub fn config(self, config: StrategyConfig) -> Self {
        Self(self.0.config(config))
    }

    pub fn build(self) -> Result<RequestStrategy> {
        if !self.0.has_target() {
            return Err(ConfluxError::config("RequestStrategy requires a target"));
        }
        if !self.0.has_event() {
            return Err(ConfluxError::config("RequestStrategy requires an event"));
        }
        if !self.0.has_action() {
            return Err(ConfluxError::config("RequestStrategy requires an action"));
        }
        self.0.build().map(RequestStrategy)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_requires_event_and_action() {
        let no_event = RequestStrategy::builder("memory", "remote")
            .invoke(Capability::Push)
            .build()
            .unwrap_err();
        assert!(no_event.is_config());

        let no_action = RequestStrategy::builder("memory", "remote")
            .on(EventKind::BeforePush)
            .build()
            .unwrap_err();
        assert!(no_action.is_config());
    }

    #[test]
    fn test_request_strategy() {
        let strategy = RequestStrategy::builder("memory", "remote")
            .on(EventKind::BeforePush)
            .invoke(Capability::Push)
            .blocking(true)
            .build()
            .unwrap();
        assert_eq!(strategy.name(), "memory:beforePush -> remote:push");
        assert_eq!(strategy.target_name(), Some("remote"));
    }
}
