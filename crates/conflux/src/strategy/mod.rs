//! Strategies: rules wiring source events to behavior
//!
//! A strategy is constructed detached, then bound to a coordinator's sources
//! when the coordinator activates. Every strategy walks the same lifecycle:
//!
//! ```text
//! inactive -> activating -> active -> deactivating -> inactive
//! ```
//!
//! [`StrategyBase`] carries the state every strategy shares (name, bound
//! sources, log prefix and level) and enforces the lifecycle transitions.

mod connection;
mod event_logging;
mod log_truncation;
mod request;
mod sync;

pub use connection::{
    Action, ActionContext, ActionFn, Blocking, CatchFn, ConnectionStrategy,
    ConnectionStrategyBuilder, FilterFn,
};
pub use event_logging::{
    EventLoggingStrategy, EventLoggingStrategyBuilder, LogLine, LogSink, MemorySink, TracingSink,
};
pub use log_truncation::LogTruncationStrategy;
pub use request::{RequestStrategy, RequestStrategyBuilder};
pub use sync::{SyncStrategy, SyncStrategyBuilder};

use crate::coordinator::{Coordinator, WeakCoordinator};
use crate::source::Source;
use async_trait::async_trait;
use conflux_core::{ActivationOptions, ConfluxError, ListenerHandle, LogLevel, Result, StrategyConfig};
use parking_lot::Mutex;
use std::sync::{Arc, Weak};

/// A configured rule bound to a coordinator's sources while active
#[async_trait]
pub trait Strategy: Send + Sync {
    fn base(&self) -> &StrategyBase;

    fn name(&self) -> &str {
        self.base().name()
    }

    /// Resolve sources and wire listeners
    async fn activate(&self, coordinator: &Coordinator, options: &ActivationOptions) -> Result<()>;

    /// Remove listeners and release sources. A no-op when inactive.
    async fn deactivate(&self) -> Result<()>;
}

/// Lifecycle of a strategy
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StrategyState {
    Inactive,
    Activating,
    Active,
    Deactivating,
}

struct Binding {
    lifecycle: StrategyState,
    coordinator: Option<WeakCoordinator>,
    sources: Vec<Arc<Source>>,
    log_level: Option<LogLevel>,
}

/// State shared by every strategy
pub struct StrategyBase {
    name: String,
    source_names: Option<Vec<String>>,
    log_prefix: String,
    custom_log_level: Option<LogLevel>,
    binding: Mutex<Binding>,
}

impl StrategyBase {
    /// Build from shared options, falling back to `default_name` when the
    /// config does not name the strategy
    pub fn new(config: StrategyConfig, default_name: Option<String>) -> Result<Self> {
        let name = config
            .name
            .clone()
            .or(default_name)
            .filter(|name| !name.is_empty())
            .ok_or_else(|| ConfluxError::config("Strategy requires a name"))?;
        Ok(Self::named(name, config))
    }

    /// Build with an explicit name; `config.name` is ignored
    pub fn named(name: impl Into<String>, config: StrategyConfig) -> Self {
        let name = name.into();
        let log_prefix = config
            .log_prefix
            .unwrap_or_else(|| format!("[{}]", name));

        Self {
            name,
            source_names: config.sources,
            log_prefix,
            custom_log_level: config.log_level,
            binding: Mutex::new(Binding {
                lifecycle: StrategyState::Inactive,
                coordinator: None,
                sources: Vec::new(),
                log_level: None,
            }),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Configured source names; `None` binds every source
    pub fn source_names(&self) -> Option<&[String]> {
        self.source_names.as_deref()
    }

    pub fn log_prefix(&self) -> &str {
        &self.log_prefix
    }

    /// Level in effect: the strategy's own level, else the one it was
    /// activated with
    pub fn log_level(&self) -> Option<LogLevel> {
        self.custom_log_level.or(self.binding.lock().log_level)
    }

    pub fn state(&self) -> StrategyState {
        self.binding.lock().lifecycle
    }

    pub fn is_active(&self) -> bool {
        self.state() == StrategyState::Active
    }

    /// Sources bound while active
    pub fn sources(&self) -> Vec<Arc<Source>> {
        self.binding.lock().sources.clone()
    }

    pub fn coordinator(&self) -> Option<Coordinator> {
        self.binding
            .lock()
            .coordinator
            .as_ref()
            .and_then(WeakCoordinator::upgrade)
    }

    /// Enter `activating` and resolve the sources to bind
    pub fn begin_activation(
        &self,
        coordinator: &Coordinator,
        options: &ActivationOptions,
    ) -> Result<Vec<Arc<Source>>> {
        let mut binding = self.binding.lock();
        if binding.lifecycle != StrategyState::Inactive {
            return Err(ConfluxError::InvalidState(format!(
                "Strategy '{}' cannot activate while {:?}",
                self.name, binding.lifecycle
            )));
        }

        let sources = match &self.source_names {
            Some(names) => names
                .iter()
                .map(|name| coordinator.source(name))
                .collect::<Result<Vec<_>>>()?,
            None => coordinator.sources(),
        };

        binding.lifecycle = StrategyState::Activating;
        binding.coordinator = Some(coordinator.downgrade());
        binding.sources = sources.clone();
        binding.log_level = options.log_level;
        Ok(sources)
    }

    /// Enter `active` on success; roll back to `inactive` on failure
    pub fn end_activation(&self, result: Result<()>) -> Result<()> {
        let mut binding = self.binding.lock();
        match result {
            Ok(()) => {
                binding.lifecycle = StrategyState::Active;
                Ok(())
            }
            Err(e) => {
                Self::release(&mut binding);
                Err(e)
            }
        }
    }

    /// Enter `deactivating`. Returns `false` if there is nothing to deactivate.
    pub fn begin_deactivation(&self) -> bool {
        let mut binding = self.binding.lock();
        if binding.lifecycle == StrategyState::Inactive {
            return false;
        }
        binding.lifecycle = StrategyState::Deactivating;
        true
    }

    /// Back to `inactive`, releasing the coordinator and sources
    pub fn end_deactivation(&self) {
        Self::release(&mut self.binding.lock());
    }

    fn release(binding: &mut Binding) {
        binding.lifecycle = StrategyState::Inactive;
        binding.coordinator = None;
        binding.sources.clear();
        binding.log_level = None;
    }
}

impl std::fmt::Debug for StrategyBase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StrategyBase")
            .field("name", &self.name)
            .field("source_names", &self.source_names)
            .field("log_prefix", &self.log_prefix)
            .field("state", &self.state())
            .finish()
    }
}

/// Listeners a strategy registered, removed as a group on deactivation
#[derive(Default)]
pub(crate) struct Registrations {
    handles: Mutex<Vec<(Weak<Source>, ListenerHandle)>>,
}

impl Registrations {
    pub(crate) fn add(&self, source: &Arc<Source>, handle: ListenerHandle) {
        self.handles.lock().push((Arc::downgrade(source), handle));
    }

    /// Remove every registration, newest first
    pub(crate) fn remove_all(&self) -> usize {
        let handles: Vec<_> = self.handles.lock().drain(..).collect();
        let count = handles.len();
        for (source, handle) in handles.into_iter().rev() {
            if let Some(source) = source.upgrade() {
                source.off(handle);
            }
        }
        count
    }

    pub(crate) fn len(&self) -> usize {
        self.handles.lock().len()
    }
}

impl std::fmt::Debug for Registrations {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Registrations")
            .field("len", &self.len())
            .finish()
    }
}
