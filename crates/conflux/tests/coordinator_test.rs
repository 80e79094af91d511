//! Coordinator lifecycle: ordering, idempotency, and the active guard

use conflux::prelude::*;
use conflux::{StrategyBase, StrategyState};
use parking_lot::Mutex;
use tokio::sync::Notify;

type Journal = Arc<Mutex<Vec<String>>>;

/// Records its lifecycle calls; optionally waits on a gate before activating
struct Recording {
    base: StrategyBase,
    journal: Journal,
    gate: Option<Arc<Notify>>,
}

impl Recording {
    fn new(name: &str, journal: &Journal) -> Self {
        Self {
            base: StrategyBase::new(StrategyConfig::named(name), None).unwrap(),
            journal: journal.clone(),
            gate: None,
        }
    }

    fn gated(name: &str, journal: &Journal, gate: Arc<Notify>) -> Self {
        Self {
            gate: Some(gate),
            ..Self::new(name, journal)
        }
    }
}

#[async_trait]
impl Strategy for Recording {
    fn base(&self) -> &StrategyBase {
        &self.base
    }

    async fn activate(&self, coordinator: &Coordinator, options: &ActivationOptions) -> Result<()> {
        self.base.begin_activation(coordinator, options)?;
        if let Some(gate) = &self.gate {
            gate.notified().await;
        }
        self.journal.lock().push(format!("activate {}", self.name()));
        self.base.end_activation(Ok(()))
    }

    async fn deactivate(&self) -> Result<()> {
        if !self.base.begin_deactivation() {
            return Ok(());
        }
        self.journal.lock().push(format!("deactivate {}", self.name()));
        self.base.end_deactivation();
        Ok(())
    }
}

#[tokio::test]
async fn test_activation_order() {
    let journal = Journal::default();
    let coordinator = Coordinator::builder()
        .with_strategy(Recording::new("s1", &journal))
        .with_strategy(Recording::new("s2", &journal))
        .with_strategy(Recording::new("s3", &journal))
        .build()
        .unwrap();

    coordinator.activate(ActivationOptions::new()).await.unwrap();
    coordinator.deactivate().await.unwrap();

    assert_eq!(
        *journal.lock(),
        vec![
            "activate s1",
            "activate s2",
            "activate s3",
            "deactivate s3",
            "deactivate s2",
            "deactivate s1"
        ]
    );
}

#[tokio::test]
async fn test_activate_runs_once() {
    let journal = Journal::default();
    let coordinator = Coordinator::new();
    coordinator
        .add_strategy(Recording::new("s1", &journal))
        .unwrap();

    coordinator.activate(ActivationOptions::new()).await.unwrap();
    coordinator.activate(ActivationOptions::new()).await.unwrap();
    assert_eq!(journal.lock().len(), 1);

    // A fresh activation after deactivating runs again
    coordinator.deactivate().await.unwrap();
    coordinator.activate(ActivationOptions::new()).await.unwrap();
    assert_eq!(
        *journal.lock(),
        vec!["activate s1", "deactivate s1", "activate s1"]
    );
}

#[tokio::test]
async fn test_mutation_while_active_is_rejected() {
    let coordinator = Coordinator::new();
    coordinator.add_source(Source::memory("a")).unwrap();
    coordinator.activate(ActivationOptions::new()).await.unwrap();

    let err = coordinator.add_source(Source::memory("x")).unwrap_err();
    assert!(err.is_config());
    assert!(coordinator.source("x").is_err());
    assert!(coordinator.remove_source("a").unwrap_err().is_config());
    assert!(coordinator
        .add_strategy(LogTruncationStrategy::new())
        .unwrap_err()
        .is_config());

    coordinator.deactivate().await.unwrap();
    coordinator.add_source(Source::memory("x")).unwrap();
    assert_eq!(coordinator.source_names(), vec!["a", "x"]);
}

#[tokio::test]
async fn test_guard_holds_while_activating() {
    let journal = Journal::default();
    let gate = Arc::new(Notify::new());
    let coordinator = Coordinator::new();
    coordinator
        .add_strategy(Recording::gated("slow", &journal, gate.clone()))
        .unwrap();

    let activation = tokio::spawn({
        let coordinator = coordinator.clone();
        async move { coordinator.activate(ActivationOptions::new()).await }
    });
    tokio::task::yield_now().await;

    assert_eq!(coordinator.activation_state(), ActivationState::Activating);
    assert!(coordinator.add_source(Source::memory("late")).is_err());
    let slow = coordinator.strategy("slow").unwrap();
    assert_eq!(slow.base().state(), StrategyState::Activating);

    gate.notify_one();
    activation.await.unwrap().unwrap();
    assert_eq!(coordinator.activation_state(), ActivationState::Active);
    assert!(slow.base().is_active());
}

#[tokio::test]
async fn test_default_log_level_applies() {
    let coordinator = Coordinator::with_config(
        CoordinatorConfig::new().with_default_log_level(LogLevel::Errors),
    );
    let quiet = Arc::new(LogTruncationStrategy::new());
    let loud = Arc::new(LogTruncationStrategy::with_config(
        StrategyConfig::named("loud").with_log_level(LogLevel::Info),
    ));
    coordinator.add_shared_strategy(quiet.clone()).unwrap();
    coordinator.add_shared_strategy(loud.clone()).unwrap();

    coordinator.activate(ActivationOptions::new()).await.unwrap();
    assert_eq!(quiet.base().log_level(), Some(LogLevel::Errors));
    assert_eq!(loud.base().log_level(), Some(LogLevel::Info));

    coordinator.deactivate().await.unwrap();
    coordinator
        .activate(ActivationOptions::new().with_log_level(LogLevel::Warnings))
        .await
        .unwrap();
    assert_eq!(quiet.base().log_level(), Some(LogLevel::Warnings));
}

#[tokio::test]
async fn test_failed_activation_unwinds_earlier_strategies() {
    let journal = Journal::default();
    let coordinator = Coordinator::new();
    coordinator.add_source(Source::memory("memory")).unwrap();
    coordinator
        .add_strategy(Recording::new("first", &journal))
        .unwrap();
    coordinator
        .add_strategy(SyncStrategy::new("memory", "missing").unwrap())
        .unwrap();

    assert!(coordinator.activate(ActivationOptions::new()).await.is_err());
    assert!(matches!(
        coordinator.activation_state(),
        ActivationState::Failed(ConfluxError::NotFound(_))
    ));

    coordinator.deactivate().await.unwrap();
    assert_eq!(*journal.lock(), vec!["activate first", "deactivate first"]);
    assert!(!coordinator.is_active());
}
