//! Coordinator: owner of sources and strategies
//!
//! Strategies activate one after another in registration order and
//! deactivate in reverse. The source and strategy collections are frozen
//! from the moment `activate` is called until `deactivate` completes.

use crate::source::Source;
use crate::strategy::Strategy;
use conflux_core::{ActivationOptions, ConfluxError, CoordinatorConfig, Result};
use futures::future::{BoxFuture, Shared};
use futures::FutureExt;
use parking_lot::Mutex;
use std::fmt;
use std::sync::{Arc, Weak};
use tracing::{debug, info, warn};

type Activation = Shared<BoxFuture<'static, Result<()>>>;

/// Where the coordinator is in its activation
#[derive(Debug, Clone)]
pub enum ActivationState {
    Inactive,
    Activating,
    Active,
    /// Activation ran and a strategy failed
    Failed(ConfluxError),
}

impl PartialEq for ActivationState {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (ActivationState::Failed(a), ActivationState::Failed(b)) => {
                a.to_string() == b.to_string()
            }
            _ => std::mem::discriminant(self) == std::mem::discriminant(other),
        }
    }
}

#[derive(Default)]
struct Registry {
    sources: Vec<Arc<Source>>,
    strategies: Vec<Arc<dyn Strategy>>,
    activation: Option<Activation>,
}

struct CoordinatorInner {
    config: CoordinatorConfig,
    registry: Mutex<Registry>,
}

/// Owns a named set of sources and strategies.
///
/// Cloning is cheap; clones share the same state.
#[derive(Clone)]
pub struct Coordinator {
    inner: Arc<CoordinatorInner>,
}

/// Non-owning handle held by active strategies
#[derive(Clone)]
pub struct WeakCoordinator(Weak<CoordinatorInner>);

impl WeakCoordinator {
    pub fn upgrade(&self) -> Option<Coordinator> {
        self.0.upgrade().map(|inner| Coordinator { inner })
    }
}

impl fmt::Debug for WeakCoordinator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("WeakCoordinator")
    }
}

impl Coordinator {
    pub fn new() -> Self {
        Self::with_config(CoordinatorConfig::default())
    }

    pub fn with_config(config: CoordinatorConfig) -> Self {
        Self {
            inner: Arc::new(CoordinatorInner {
                config,
                registry: Mutex::new(Registry::default()),
            }),
        }
    }

    pub fn builder() -> CoordinatorBuilder {
        CoordinatorBuilder::new()
    }

    pub fn config(&self) -> &CoordinatorConfig {
        &self.inner.config
    }

    pub fn downgrade(&self) -> WeakCoordinator {
        WeakCoordinator(Arc::downgrade(&self.inner))
    }

    /// Register a source. Fails while active or if the name is taken.
    pub fn add_source(&self, source: Arc<Source>) -> Result<()> {
        let mut registry = self.inner.registry.lock();
        ensure_inactive(&registry, "add source")?;
        if source.name().is_empty() {
            return Err(ConfluxError::config("Source requires a name"));
        }
        if registry.sources.iter().any(|s| s.name() == source.name()) {
            return Err(ConfluxError::config(format!(
                "A source named '{}' has already been added",
                source.name()
            )));
        }
        debug!(source = %source.name(), "Source added");
        registry.sources.push(source);
        Ok(())
    }

    pub fn remove_source(&self, name: &str) -> Result<Arc<Source>> {
        let mut registry = self.inner.registry.lock();
        ensure_inactive(&registry, "remove source")?;
        let position = registry
            .sources
            .iter()
            .position(|s| s.name() == name)
            .ok_or_else(|| {
                ConfluxError::config(format!("Source '{}' has not been added", name))
            })?;
        Ok(registry.sources.remove(position))
    }

    pub fn add_strategy<S: Strategy + 'static>(&self, strategy: S) -> Result<()> {
        self.add_shared_strategy(Arc::new(strategy))
    }

    /// Register a strategy the caller keeps a handle to
    pub fn add_shared_strategy(&self, strategy: Arc<dyn Strategy>) -> Result<()> {
        let mut registry = self.inner.registry.lock();
        ensure_inactive(&registry, "add strategy")?;
        if registry.strategies.iter().any(|s| s.name() == strategy.name()) {
            return Err(ConfluxError::config(format!(
                "A strategy named '{}' has already been added",
                strategy.name()
            )));
        }
        debug!(strategy = %strategy.name(), "Strategy added");
        registry.strategies.push(strategy);
        Ok(())
    }

    pub fn remove_strategy(&self, name: &str) -> Result<Arc<dyn Strategy>> {
        let mut registry = self.inner.registry.lock();
        ensure_inactive(&registry, "remove strategy")?;
        let position = registry
            .strategies
            .iter()
            .position(|s| s.name() == name)
            .ok_or_else(|| {
                ConfluxError::config(format!("Strategy '{}' has not been added", name))
            })?;
        Ok(registry.strategies.remove(position))
    }

    pub fn source(&self, name: &str) -> Result<Arc<Source>> {
        self.inner
            .registry
            .lock()
            .sources
            .iter()
            .find(|s| s.name() == name)
            .cloned()
            .ok_or_else(|| ConfluxError::NotFound(format!("Source '{}'", name)))
    }

    pub fn strategy(&self, name: &str) -> Result<Arc<dyn Strategy>> {
        self.inner
            .registry
            .lock()
            .strategies
            .iter()
            .find(|s| s.name() == name)
            .cloned()
            .ok_or_else(|| ConfluxError::NotFound(format!("Strategy '{}'", name)))
    }

    /// Sources in registration order
    pub fn sources(&self) -> Vec<Arc<Source>> {
        self.inner.registry.lock().sources.clone()
    }

    pub fn strategies(&self) -> Vec<Arc<dyn Strategy>> {
        self.inner.registry.lock().strategies.clone()
    }

    pub fn source_names(&self) -> Vec<String> {
        self.inner
            .registry
            .lock()
            .sources
            .iter()
            .map(|s| s.name().to_string())
            .collect()
    }

    pub fn strategy_names(&self) -> Vec<String> {
        self.inner
            .registry
            .lock()
            .strategies
            .iter()
            .map(|s| s.name().to_string())
            .collect()
    }

    /// True from the first `activate` call until `deactivate` completes
    pub fn is_active(&self) -> bool {
        self.inner.registry.lock().activation.is_some()
    }

    pub fn activation_state(&self) -> ActivationState {
        match &self.inner.registry.lock().activation {
            None => ActivationState::Inactive,
            Some(activation) => match activation.peek() {
                None => ActivationState::Activating,
                Some(Ok(())) => ActivationState::Active,
                Some(Err(e)) => ActivationState::Failed(e.clone()),
            },
        }
    }

    /// Activate every strategy in registration order.
    ///
    /// Calling again before `deactivate` joins the same activation instead of
    /// running it twice. Options left unset fall back to the configured
    /// defaults.
    pub async fn activate(&self, options: ActivationOptions) -> Result<()> {
        let activation = {
            let mut registry = self.inner.registry.lock();
            match registry.activation.clone() {
                Some(activation) => activation,
                None => {
                    let options =
                        options.merged_with(&self.inner.config.default_activation_options);
                    let activation = activate_all(
                        self.downgrade(),
                        registry.strategies.clone(),
                        options,
                    )
                    .boxed()
                    .shared();
                    registry.activation = Some(activation.clone());
                    activation
                }
            }
        };
        activation.await
    }

    /// Deactivate every strategy in reverse registration order.
    ///
    /// Waits for a pending activation first. Every strategy is deactivated
    /// even if one fails; the first failure is returned. A no-op when the
    /// coordinator was never activated.
    pub async fn deactivate(&self) -> Result<()> {
        let (activation, strategies) = {
            let registry = self.inner.registry.lock();
            match &registry.activation {
                Some(activation) => (activation.clone(), registry.strategies.clone()),
                None => return Ok(()),
            }
        };

        if let Err(e) = activation.await {
            warn!(error = %e, "Deactivating after failed activation");
        }

        let mut first_error = None;
        for strategy in strategies.iter().rev() {
            if let Err(e) = strategy.deactivate().await {
                warn!(strategy = %strategy.name(), error = %e, "Strategy failed to deactivate");
                first_error.get_or_insert(e);
            }
        }

        self.inner.registry.lock().activation = None;
        info!(strategies = strategies.len(), "Coordinator deactivated");
        first_error.map_or(Ok(()), Err)
    }
}

impl Default for Coordinator {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for Coordinator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Coordinator")
            .field("sources", &self.source_names())
            .field("strategies", &self.strategy_names())
            .field("state", &self.activation_state())
            .finish()
    }
}

fn ensure_inactive(registry: &Registry, action: &str) -> Result<()> {
    if registry.activation.is_some() {
        return Err(ConfluxError::config(format!(
            "Cannot {} while the coordinator is active",
            action
        )));
    }
    Ok(())
}

async fn activate_all(
    coordinator: WeakCoordinator,
    strategies: Vec<Arc<dyn Strategy>>,
    options: ActivationOptions,
) -> Result<()> {
    let coordinator = coordinator.upgrade().ok_or_else(|| {
        ConfluxError::InvalidState("Coordinator dropped before activation".to_string())
    })?;

    for strategy in &strategies {
        debug!(strategy = %strategy.name(), "Activating strategy");
        strategy.activate(&coordinator, &options).await?;
    }

    info!(
        strategies = strategies.len(),
        log_level = ?options.log_level,
        "Coordinator activated"
    );
    Ok(())
}

/// Builder for [`Coordinator`]
///
/// # Example
///
/// ```ignore
/// let coordinator = Coordinator::builder()
///     .with_source(Source::memory("memory"))
///     .with_source(Source::memory("backup"))
///     .with_strategy(SyncStrategy::new("memory", "backup")?)
///     .build()?;
/// ```
#[derive(Default)]
pub struct CoordinatorBuilder {
    config: CoordinatorConfig,
    sources: Vec<Arc<Source>>,
    strategies: Vec<Arc<dyn Strategy>>,
}

impl CoordinatorBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_config(mut self, config: CoordinatorConfig) -> Self {
        self.config = config;
        self
    }

    pub fn with_source(mut self, source: Arc<Source>) -> Self {
        self.sources.push(source);
        self
    }

    pub fn with_strategy(mut self, strategy: impl Strategy + 'static) -> Self {
        self.strategies.push(Arc::new(strategy));
        self
    }

    pub fn with_shared_strategy(mut self, strategy: Arc<dyn Strategy>) -> Self {
        self.strategies.push(strategy);
        self
    }

    /// Register everything, failing on the first duplicate name
    pub fn build(self) -> Result<Coordinator> {
        let coordinator = Coordinator::with_config(self.config);
        for source in self.sources {
            coordinator.add_source(source)?;
        }
        for strategy in self.strategies {
            coordinator.add_shared_strategy(strategy)?;
        }
        Ok(coordinator)
    }
}
