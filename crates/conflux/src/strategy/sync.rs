use super::connection::{Blocking, ConnectionStrategy, ConnectionStrategyBuilder};
use super::{Strategy, StrategyBase};
use crate::coordinator::Coordinator;
use crate::source::{EventKind, SourceEvent};
use async_trait::async_trait;
use conflux_core::{ActivationOptions, Capability, ConfluxError, LogLevel, Result, StrategyConfig};
use futures::future::BoxFuture;
use std::ops::Deref;

/// Mirrors every transform logged by a source onto a target via `sync`
#[derive(Debug)]
pub struct SyncStrategy(ConnectionStrategy);

impl SyncStrategy {
    pub fn new(source: impl Into<String>, target: impl Into<String>) -> Result<Self> {
        Self::builder(source, target).build()
    }

    pub fn builder(source: impl Into<String>, target: impl Into<String>) -> SyncStrategyBuilder {
        SyncStrategyBuilder(
            ConnectionStrategyBuilder::new(source)
                .on(EventKind::Transform)
                .target(target)
                .invoke(Capability::Sync),
        )
    }
}

impl Deref for SyncStrategy {
    type Target = ConnectionStrategy;

    fn deref(&self) -> &ConnectionStrategy {
        &self.0
    }
}

#[async_trait]
impl Strategy for SyncStrategy {
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

/// Builder for [`SyncStrategy`]; the event and action are fixed
pub struct SyncStrategyBuilder(ConnectionStrategyBuilder);

impl SyncStrategyBuilder {
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

    pub fn build(self) -> Result<SyncStrategy> {
        if !self.0.has_target() {
            return Err(ConfluxError::config("SyncStrategy requires a target"));
        }
        self.0.build().map(SyncStrategy)
    }
}
