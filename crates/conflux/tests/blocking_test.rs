//! Blocking and non-blocking propagation failures

use conflux::prelude::*;
use conflux::SourceEvent;
use futures::FutureExt;
use parking_lot::Mutex;
use std::time::Duration;
use tokio::sync::oneshot;

/// Accepts pushes but fails every sync
struct FailingBackend;

#[async_trait]
impl SourceBackend for FailingBackend {
    fn capabilities(&self) -> Capabilities {
        Capabilities::none()
            .with(Capability::Push)
            .with(Capability::Sync)
    }

    async fn push(&self, transform: &Transform) -> Result<Vec<Transform>> {
        Ok(vec![transform.clone()])
    }

    async fn sync(&self, _transform: &Transform) -> Result<()> {
        Err(ConfluxError::operation("disk full"))
    }
}

fn add(id: &str) -> Transform {
    Transform::new(id, vec![Operation::add_record(Record::new("planet", id))])
}

fn next_event(source: &Source, kind: EventKind) -> oneshot::Receiver<SourceEvent> {
    let (tx, rx) = oneshot::channel();
    let tx = Mutex::new(Some(tx));
    source.on(kind, move |event: &SourceEvent| {
        if let Some(tx) = tx.lock().take() {
            let _ = tx.send(event.clone());
        }
        None
    });
    rx
}

async fn coordinate(strategy: SyncStrategy) -> (Coordinator, Arc<Source>, Arc<Source>) {
    let memory = Source::memory("memory");
    let remote = Source::new("remote", Arc::new(FailingBackend));
    let coordinator = Coordinator::builder()
        .with_source(memory.clone())
        .with_source(remote.clone())
        .with_strategy(strategy)
        .build()
        .unwrap();
    coordinator.activate(ActivationOptions::new()).await.unwrap();
    (coordinator, memory, remote)
}

#[tokio::test]
async fn test_blocking_failure_fails_source_operation() {
    let strategy = SyncStrategy::builder("memory", "remote")
        .blocking(true)
        .build()
        .unwrap();
    let (_coordinator, memory, _remote) = coordinate(strategy).await;

    let push_fail = next_event(&memory, EventKind::PushFail);
    let err = memory.push(add("t1")).await.unwrap_err();
    assert!(matches!(err, ConfluxError::Operation(_)));
    assert!(err.to_string().contains("disk full"));

    // The failure is broadcast before it is raised
    let event = push_fail.await.unwrap();
    assert_eq!(event.transform().map(|t| t.id.as_str()), Some("t1"));
}

#[tokio::test]
async fn test_non_blocking_failure_is_isolated() {
    let strategy = SyncStrategy::new("memory", "remote").unwrap();
    let (_coordinator, memory, remote) = coordinate(strategy).await;

    let sync_fail = next_event(&remote, EventKind::SyncFail);
    let applied = memory.push(add("t1")).await.unwrap();
    assert_eq!(applied.len(), 1);

    let event = tokio::time::timeout(Duration::from_secs(5), sync_fail)
        .await
        .unwrap()
        .unwrap();
    assert!(event.error().is_some());
    assert!(memory.transform_log().contains("t1"));
    assert!(!remote.transform_log().contains("t1"));
}

#[tokio::test]
async fn test_catch_replaces_outcome() {
    let caught = Arc::new(Mutex::new(Vec::new()));
    let seen = caught.clone();
    let strategy = SyncStrategy::builder("memory", "remote")
        .blocking(true)
        .catch(move |error, event| {
            let seen = seen.clone();
            async move {
                let id = event.transform().map(|t| t.id.clone()).unwrap_or_default();
                seen.lock().push((id, error.to_string()));
                Ok(())
            }
            .boxed()
        })
        .build()
        .unwrap();
    let (_coordinator, memory, _remote) = coordinate(strategy).await;

    memory.push(add("t1")).await.unwrap();
    let caught = caught.lock().clone();
    assert_eq!(caught.len(), 1);
    assert_eq!(caught[0].0, "t1");
    assert!(caught[0].1.contains("disk full"));
}

#[tokio::test]
async fn test_blocking_predicate() {
    let strategy = SyncStrategy::builder("memory", "remote")
        .blocking_when(|event: &SourceEvent| {
            event
                .transform()
                .is_some_and(|t| t.id.starts_with("critical"))
        })
        .build()
        .unwrap();
    let (_coordinator, memory, _remote) = coordinate(strategy).await;

    assert!(memory.push(add("routine-1")).await.is_ok());
    assert!(memory.push(add("critical-1")).await.is_err());
}

#[tokio::test]
async fn test_deactivated_strategy_stops_propagating() {
    let strategy = SyncStrategy::builder("memory", "remote")
        .blocking(true)
        .build()
        .unwrap();
    let (coordinator, memory, _remote) = coordinate(strategy).await;

    coordinator.deactivate().await.unwrap();
    assert!(memory.push(add("t1")).await.is_ok());
}
