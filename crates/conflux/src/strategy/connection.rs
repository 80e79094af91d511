//! Generic event bridge between two sources
//!
//! A [`ConnectionStrategy`] listens for one event on a source and runs an
//! action, typically invoking a capability on a target source with the
//! event's transform or query.
//!
//! | Blocking | Source event settlement | Action failure |
//! |----------|-------------------------|----------------|
//! | yes | waits for the action | fails the source's operation (unless caught) |
//! | no | returns immediately | logged and counted, source unaffected |

use super::{Registrations, Strategy, StrategyBase};
use crate::coordinator::Coordinator;
use crate::source::{EventKind, Source, SourceEvent};
use async_trait::async_trait;
use conflux_core::{
    observe, ActivationOptions, Capability, ConfluxError, ListenerFuture, LogLevel, Result,
    StrategyConfig, TaskPayload,
};
use futures::future::BoxFuture;
use futures::FutureExt;
use parking_lot::Mutex;
use std::fmt;
use std::sync::{Arc, Weak};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

/// Decides whether an event is relayed
pub type FilterFn = Arc<dyn Fn(&SourceEvent) -> bool + Send + Sync>;

/// Handles an action failure; its result replaces the action's outcome
pub type CatchFn =
    Arc<dyn Fn(ConfluxError, SourceEvent) -> BoxFuture<'static, Result<()>> + Send + Sync>;

/// Arbitrary action run for each relayed event
pub type ActionFn = Arc<dyn Fn(ActionContext) -> BoxFuture<'static, Result<()>> + Send + Sync>;

/// Everything a custom action can reach
#[derive(Clone)]
pub struct ActionContext {
    pub source: Arc<Source>,
    pub target: Option<Arc<Source>>,
    pub event: SourceEvent,
}

/// What to do when the event fires
#[derive(Clone)]
pub enum Action {
    /// Run a capability on the target with the event's transform or query
    Invoke(Capability),
    Custom(ActionFn),
}

impl Action {
    pub fn custom<F>(action: F) -> Self
    where
        F: Fn(ActionContext) -> BoxFuture<'static, Result<()>> + Send + Sync + 'static,
    {
        Action::Custom(Arc::new(action))
    }

    fn label(&self) -> String {
        match self {
            Action::Invoke(capability) => capability.to_string(),
            Action::Custom(_) => "custom".to_string(),
        }
    }
}

impl From<Capability> for Action {
    fn from(capability: Capability) -> Self {
        Action::Invoke(capability)
    }
}

impl fmt::Debug for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Action::Invoke(capability) => f.debug_tuple("Invoke").field(capability).finish(),
            Action::Custom(_) => f.write_str("Custom"),
        }
    }
}

/// Whether the source waits for the action
#[derive(Clone, Default)]
pub enum Blocking {
    #[default]
    Never,
    Always,
    /// Decided per event
    When(FilterFn),
}

impl Blocking {
    pub fn applies(&self, event: &SourceEvent) -> bool {
        match self {
            Blocking::Never => false,
            Blocking::Always => true,
            Blocking::When(predicate) => predicate(event),
        }
    }
}

impl From<bool> for Blocking {
    fn from(blocking: bool) -> Self {
        if blocking {
            Blocking::Always
        } else {
            Blocking::Never
        }
    }
}

impl fmt::Debug for Blocking {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Blocking::Never => f.write_str("Never"),
            Blocking::Always => f.write_str("Always"),
            Blocking::When(_) => f.write_str("When"),
        }
    }
}

/// Builder for [`ConnectionStrategy`]
///
/// # Example
///
/// ```ignore
/// let strategy = ConnectionStrategy::builder("memory")
///     .on(EventKind::BeforePush)
///     .target("remote")
///     .invoke(Capability::Push)
///     .blocking(true)
///     .build()?;
/// ```
#[derive(Default)]
pub struct ConnectionStrategyBuilder {
    config: StrategyConfig,
    source: String,
    on: Option<EventKind>,
    target: Option<String>,
    action: Option<Action>,
    filter: Option<FilterFn>,
    catch: Option<CatchFn>,
    blocking: Blocking,
}

impl ConnectionStrategyBuilder {
    pub fn new(source: impl Into<String>) -> Self {
        Self {
            source: source.into(),
            ..Self::default()
        }
    }

    /// Event that triggers the action
    pub fn on(mut self, event: EventKind) -> Self {
        self.on = Some(event);
        self
    }

    pub fn target(mut self, target: impl Into<String>) -> Self {
        self.target = Some(target.into());
        self
    }

    pub fn action(mut self, action: impl Into<Action>) -> Self {
        self.action = Some(action.into());
        self
    }

    /// Invoke `capability` on the target
    pub fn invoke(self, capability: Capability) -> Self {
        self.action(Action::Invoke(capability))
    }

    pub fn custom<F>(self, action: F) -> Self
    where
        F: Fn(ActionContext) -> BoxFuture<'static, Result<()>> + Send + Sync + 'static,
    {
        self.action(Action::custom(action))
    }

    /// Skip events the predicate rejects
    pub fn filter<F>(mut self, filter: F) -> Self
    where
        F: Fn(&SourceEvent) -> bool + Send + Sync + 'static,
    {
        self.filter = Some(Arc::new(filter));
        self
    }

    /// Handle action failures; receives the error and the triggering event
    pub fn catch<F>(mut self, catch: F) -> Self
    where
        F: Fn(ConfluxError, SourceEvent) -> BoxFuture<'static, Result<()>> + Send + Sync + 'static,
    {
        self.catch = Some(Arc::new(catch));
        self
    }

    pub fn blocking(mut self, blocking: impl Into<Blocking>) -> Self {
        self.blocking = blocking.into();
        self
    }

    /// Block only for events the predicate accepts
    pub fn blocking_when<F>(mut self, predicate: F) -> Self
    where
        F: Fn(&SourceEvent) -> bool + Send + Sync + 'static,
    {
        self.blocking = Blocking::When(Arc::new(predicate));
        self
    }

    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.config.name = Some(name.into());
        self
    }

    /// Sources to bind; defaults to the source and target
    pub fn sources<I, S>(mut self, sources: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.config = self.config.with_sources(sources);
        self
    }

    pub fn log_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.config.log_prefix = Some(prefix.into());
        self
    }

    pub fn log_level(mut self, level: LogLevel) -> Self {
        self.config.log_level = Some(level);
        self
    }

    /// Shared strategy options; an unset field keeps the builder's value
    pub fn config(mut self, config: StrategyConfig) -> Self {
        self.config = StrategyConfig {
            name: config.name.or(self.config.name),
            sources: config.sources.or(self.config.sources),
            log_prefix: config.log_prefix.or(self.config.log_prefix),
            log_level: config.log_level.or(self.config.log_level),
        };
        self
    }

    pub(crate) fn has_target(&self) -> bool {
        self.target.as_deref().is_some_and(|t| !t.is_empty())
    }

    pub(crate) fn has_event(&self) -> bool {
        self.on.is_some()
    }

    pub(crate) fn has_action(&self) -> bool {
        self.action.is_some()
    }

    pub fn build(self) -> Result<ConnectionStrategy> {
        if self.source.is_empty() {
            return Err(ConfluxError::config("ConnectionStrategy requires a source"));
        }
        let on = self
            .on
            .ok_or_else(|| ConfluxError::config("ConnectionStrategy requires an event"))?;
        let target = self.target.filter(|t| !t.is_empty());

        if let Some(Action::Invoke(capability)) = &self.action {
            if target.is_none() {
                return Err(ConfluxError::config(format!(
                    "ConnectionStrategy invoking {} requires a target",
                    capability
                )));
            }
            if on.payload() != capability.payload() {
                return Err(ConfluxError::config(format!(
                    "Event '{}' carries a {:?} but {} expects a {:?}",
                    on,
                    on.payload(),
                    capability,
                    capability.payload()
                )));
            }
        }

        let default_name = match (&target, &self.action) {
            (Some(target), Some(action)) => {
                format!("{}:{} -> {}:{}", self.source, on, target, action.label())
            }
            _ => format!("{}:{}", self.source, on),
        };
        let mut config = self.config;
        if config.sources.is_none() {
            let mut sources = vec![self.source.clone()];
            if let Some(target) = &target {
                if target != &self.source {
                    sources.push(target.clone());
                }
            }
            config.sources = Some(sources);
        }

        Ok(ConnectionStrategy {
            base: StrategyBase::new(config, Some(default_name))?,
            source: self.source,
            on,
            target,
            action: self.action,
            filter: self.filter,
            catch: self.catch,
            blocking: self.blocking,
            registrations: Registrations::default(),
            target_ref: Mutex::new(None),
        })
    }
}

/// Relays one event of a source to an action
pub struct ConnectionStrategy {
    base: StrategyBase,
    source: String,
    on: EventKind,
    target: Option<String>,
    action: Option<Action>,
    filter: Option<FilterFn>,
    catch: Option<CatchFn>,
    blocking: Blocking,
    registrations: Registrations,
    target_ref: Mutex<Option<Weak<Source>>>,
}

impl ConnectionStrategy {
    pub fn builder(source: impl Into<String>) -> ConnectionStrategyBuilder {
        ConnectionStrategyBuilder::new(source)
    }

    pub fn source_name(&self) -> &str {
        &self.source
    }

    pub fn event(&self) -> EventKind {
        self.on
    }

    pub fn target_name(&self) -> Option<&str> {
        self.target.as_deref()
    }

    pub fn action(&self) -> Option<&Action> {
        self.action.as_ref()
    }

    pub fn blocking(&self) -> &Blocking {
        &self.blocking
    }

    /// Target bound while active
    pub fn target(&self) -> Option<Arc<Source>> {
        self.target_ref.lock().as_ref().and_then(Weak::upgrade)
    }

    fn wire(&self, coordinator: &Coordinator) -> Result<()> {
        let source = coordinator.source(&self.source)?;
        let target = match &self.target {
            Some(name) => Some(coordinator.source(name)?),
            None => None,
        };
        if let (Some(Action::Invoke(capability)), Some(target)) = (&self.action, &target) {
            if !target.supports(*capability) {
                return Err(ConfluxError::config(format!(
                    "Strategy '{}': target '{}' does not support {}",
                    self.name(),
                    target.name(),
                    capability
                )));
            }
        }

        let listener = Listener {
            strategy: self.name().to_string(),
            relay: match (&self.action, &self.blocking) {
                (None, _) | (_, Blocking::Always) => None,
                _ => Some(spawn_relay(
                    self.name().to_string(),
                    self.base.log_prefix().to_string(),
                )),
            },
            source: Arc::downgrade(&source),
            target: target.as_ref().map(Arc::downgrade),
            action: self.action.clone(),
            filter: self.filter.clone(),
            catch: self.catch.clone(),
            blocking: self.blocking.clone(),
        };
        let handle = source.on(self.on, move |event: &SourceEvent| listener.call(event));
        self.registrations.add(&source, handle);
        *self.target_ref.lock() = target.as_ref().map(Arc::downgrade);
        Ok(())
    }
}

#[async_trait]
impl Strategy for ConnectionStrategy {
    fn base(&self) -> &StrategyBase {
        &self.base
    }

    async fn activate(&self, coordinator: &Coordinator, options: &ActivationOptions) -> Result<()> {
        self.base.begin_activation(coordinator, options)?;
        let result = self.wire(coordinator);
        self.base.end_activation(result)?;

        if self.base.log_level() >= Some(LogLevel::Info) {
            info!(strategy = %self.name(), "{} activated", self.base.log_prefix());
        } else {
            debug!(strategy = %self.name(), "{} activated", self.base.log_prefix());
        }
        Ok(())
    }

    async fn deactivate(&self) -> Result<()> {
        if !self.base.begin_deactivation() {
            return Ok(());
        }
        self.registrations.remove_all();
        *self.target_ref.lock() = None;
        self.base.end_deactivation();
        debug!(strategy = %self.name(), "{} deactivated", self.base.log_prefix());
        Ok(())
    }
}

impl fmt::Debug for ConnectionStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectionStrategy")
            .field("name", &self.name())
            .field("source", &self.source)
            .field("on", &self.on)
            .field("target", &self.target)
            .field("action", &self.action)
            .field("blocking", &self.blocking)
            .finish()
    }
}

/// The single listener a connection registers on its source
struct Listener {
    strategy: String,
    // Absent when there is no action or every event blocks
    relay: Option<mpsc::UnboundedSender<ListenerFuture>>,
    source: Weak<Source>,
    target: Option<Weak<Source>>,
    action: Option<Action>,
    filter: Option<FilterFn>,
    catch: Option<CatchFn>,
    blocking: Blocking,
}

impl Listener {
    fn call(&self, event: &SourceEvent) -> Option<ListenerFuture> {
        if let Some(filter) = &self.filter {
            if !filter(event) {
                return None;
            }
        }
        // Observation-only connections have no action
        let action = self.action.clone()?;
        let source = self.source.upgrade()?;
        let target = self.target.as_ref().and_then(Weak::upgrade);
        let catch = self.catch.clone();
        let event = event.clone();
        let blocking = self.blocking.applies(&event);

        let work = async move {
            match perform(action, source, target, event.clone()).await {
                Err(e) => match catch {
                    Some(catch) => catch(e, event).await,
                    None => Err(e),
                },
                ok => ok,
            }
        }
        .boxed();

        let relay = match &self.relay {
            Some(relay) if !blocking => relay,
            _ => return Some(work),
        };
        if relay.send(work).is_err() {
            warn!(strategy = %self.strategy, "Relay worker stopped, dropping event");
        }
        None
    }
}

/// Runs a listener's non-blocking actions one at a time, in event order.
///
/// The worker exits once the listener, and with it the sender, is dropped.
fn spawn_relay(strategy: String, prefix: String) -> mpsc::UnboundedSender<ListenerFuture> {
    let (tx, mut rx) = mpsc::unbounded_channel::<ListenerFuture>();
    tokio::spawn(async move {
        while let Some(work) = rx.recv().await {
            if let Err(e) = work.await {
                warn!(strategy = %strategy, error = %e, "{} propagation failed", prefix);
                observe::record_isolated_failure(&strategy);
            }
        }
        debug!(strategy = %strategy, "Relay worker stopped");
    });
    tx
}

async fn perform(
    action: Action,
    source: Arc<Source>,
    target: Option<Arc<Source>>,
    event: SourceEvent,
) -> Result<()> {
    match action {
        Action::Invoke(capability) => {
            let target = target.ok_or_else(|| {
                ConfluxError::InvalidState("Target source is no longer available".to_string())
            })?;
            let payload = if let Some(transform) = event.transform() {
                TaskPayload::Transform(transform.clone())
            } else if let Some(query) = event.query() {
                TaskPayload::Query(query.clone())
            } else {
                return Err(ConfluxError::InvalidState(format!(
                    "Event carries nothing to {}",
                    capability
                )));
            };
            target.invoke(capability, payload).await.map(|_| ())
        }
        Action::Custom(action) => {
            action(ActionContext {
                source,
                target,
                event,
            })
            .await
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use conflux_core::{Operation, Record, Transform};

    fn add(id: &str) -> Transform {
        Transform::new(id, vec![Operation::add_record(Record::new("planet", id))])
    }

    #[test]
    fn test_default_names() {
        let observe_only = ConnectionStrategy::builder("memory")
            .on(EventKind::Push)
            .build()
            .unwrap();
        assert_eq!(observe_only.name(), "memory:push");
        assert_eq!(
            observe_only.base().source_names(),
            Some(&["memory".to_string()][..])
        );

        let relay = ConnectionStrategy::builder("memory")
            .on(EventKind::Transform)
            .target("backup")
            .invoke(Capability::Sync)
            .build()
            .unwrap();
        assert_eq!(relay.name(), "memory:transform -> backup:sync");
        assert_eq!(relay.base().log_prefix(), "[memory:transform -> backup:sync]");
    }

    #[test]
    fn test_construction_errors() {
        let missing_event = ConnectionStrategy::builder("memory").build().unwrap_err();
        assert!(missing_event.is_config());

        let missing_target = ConnectionStrategy::builder("memory")
            .on(EventKind::Transform)
            .invoke(Capability::Sync)
            .build()
            .unwrap_err();
        assert!(missing_target.is_config());

        let wrong_payload = ConnectionStrategy::builder("memory")
            .on(EventKind::BeforeQuery)
            .target("remote")
            .invoke(Capability::Push)
            .build()
            .unwrap_err();
        assert!(wrong_payload.is_config());
    }

    #[tokio::test]
    async fn test_activation_checks_target_capability() {
        let coordinator = Coordinator::new();
        coordinator.add_source(Source::memory("memory")).unwrap();
        let readonly = Source::builder("readonly", Arc::new(crate::source::MemoryBackend::new()))
            .with_capabilities(conflux_core::Capabilities::none().with(Capability::Query))
            .build();
        coordinator.add_source(readonly).unwrap();

        let strategy = ConnectionStrategy::builder("memory")
            .on(EventKind::Transform)
            .target("readonly")
            .invoke(Capability::Sync)
            .build()
            .unwrap();
        let err = strategy
            .activate(&coordinator, &ActivationOptions::new())
            .await
            .unwrap_err();
        assert!(err.is_config());
        assert!(!strategy.base().is_active());
    }

    #[tokio::test]
    async fn test_filter_and_deactivate() {
        let coordinator = Coordinator::new();
        let memory = Source::memory("memory");
        let backup = Source::memory("backup");
        coordinator.add_source(memory.clone()).unwrap();
        coordinator.add_source(backup.clone()).unwrap();

        let strategy = ConnectionStrategy::builder("memory")
            .on(EventKind::Transform)
            .target("backup")
            .invoke(Capability::Sync)
            .filter(|event: &SourceEvent| event.transform().is_some_and(|t| t.id != "skip"))
            .blocking(true)
            .build()
            .unwrap();
        strategy
            .activate(&coordinator, &ActivationOptions::new())
            .await
            .unwrap();
        assert_eq!(memory.events().listener_count(EventKind::Transform), 1);
        assert!(strategy.target().is_some());

        memory.push(add("t1")).await.unwrap();
        memory.push(add("skip")).await.unwrap();
        assert!(backup.transform_log().contains("t1"));
        assert!(!backup.transform_log().contains("skip"));

        strategy.deactivate().await.unwrap();
        assert_eq!(memory.events().listener_count(EventKind::Transform), 0);
        assert!(strategy.target().is_none());

        memory.push(add("t2")).await.unwrap();
        assert!(!backup.transform_log().contains("t2"));
    }

    #[tokio::test]
    async fn test_custom_action_receives_context() {
        let coordinator = Coordinator::new();
        let memory = Source::memory("memory");
        coordinator.add_source(memory.clone()).unwrap();

        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        let strategy = ConnectionStrategy::builder("memory")
            .on(EventKind::Push)
            .custom(move |ctx: ActionContext| {
                let sink = Arc::clone(&sink);
                async move {
                    let id = ctx.event.transform().map(|t| t.id.clone()).unwrap_or_default();
                    sink.lock().push(format!("{}:{}", ctx.source.name(), id));
                    Ok(())
                }
                .boxed()
            })
            .blocking(true)
            .build()
            .unwrap();
        strategy
            .activate(&coordinator, &ActivationOptions::new())
            .await
            .unwrap();

        memory.push(add("t1")).await.unwrap();
        assert_eq!(*seen.lock(), vec!["memory:t1"]);
    }
}
