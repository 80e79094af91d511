//! Quorum truncation across coordinated transform logs

use conflux::prelude::*;
use conflux::SourceEvent;
use parking_lot::Mutex;
use std::time::Duration;
use tokio::sync::oneshot;

fn add(id: &str) -> Transform {
    Transform::new(id, vec![Operation::add_record(Record::new("planet", id))])
}

#[tokio::test]
async fn test_truncates_once_every_log_agrees() {
    let a = Source::memory("a");
    let b = Source::memory("b");
    let coordinator = Coordinator::builder()
        .with_source(a.clone())
        .with_source(b.clone())
        .with_strategy(LogTruncationStrategy::new())
        .build()
        .unwrap();
    coordinator.activate(ActivationOptions::new()).await.unwrap();

    a.push(add("t1")).await.unwrap();
    a.push(add("t2")).await.unwrap();
    assert!(a.transform_log().contains("t1"));
    assert_eq!(a.transform_log().len(), 2);
    assert!(b.transform_log().is_empty());

    b.push(add("t1")).await.unwrap();
    assert_eq!(a.transform_log().entries(), vec!["t2"]);
    assert!(b.transform_log().is_empty());

    b.push(add("t2")).await.unwrap();
    assert!(a.transform_log().is_empty());
    assert!(b.transform_log().is_empty());
}

#[tokio::test]
async fn test_sync_then_truncate() {
    let memory = Source::memory("memory");
    let backup = Source::memory("backup");
    let coordinator = Coordinator::builder()
        .with_source(memory.clone())
        .with_source(backup.clone())
        .with_strategy(SyncStrategy::new("memory", "backup").unwrap())
        .with_strategy(LogTruncationStrategy::new())
        .build()
        .unwrap();
    coordinator.activate(ActivationOptions::new()).await.unwrap();

    // Registered after the truncation listener, so it runs after truncation
    let (tx, rx) = oneshot::channel();
    let tx = Mutex::new(Some(tx));
    backup.on(EventKind::Transform, move |_event: &SourceEvent| {
        if let Some(tx) = tx.lock().take() {
            let _ = tx.send(());
        }
        None
    });

    memory.push(add("t1")).await.unwrap();
    tokio::time::timeout(Duration::from_secs(5), rx)
        .await
        .unwrap()
        .unwrap();
    assert!(memory.transform_log().is_empty());
    assert!(backup.transform_log().is_empty());
}

#[tokio::test]
async fn test_subset_of_sources() {
    let a = Source::memory("a");
    let b = Source::memory("b");
    let c = Source::memory("c");
    let coordinator = Coordinator::builder()
        .with_source(a.clone())
        .with_source(b.clone())
        .with_source(c.clone())
        .with_strategy(LogTruncationStrategy::with_config(
            StrategyConfig::new().with_sources(["a", "b"]),
        ))
        .build()
        .unwrap();
    coordinator.activate(ActivationOptions::new()).await.unwrap();

    a.push(add("t1")).await.unwrap();
    b.push(add("t1")).await.unwrap();
    c.push(add("t1")).await.unwrap();

    assert!(a.transform_log().is_empty());
    assert!(b.transform_log().is_empty());
    assert_eq!(c.transform_log().entries(), vec!["t1"]);
}

#[tokio::test]
async fn test_deactivated_logs_keep_history() {
    let a = Source::memory("a");
    let b = Source::memory("b");
    let coordinator = Coordinator::builder()
        .with_source(a.clone())
        .with_source(b.clone())
        .with_strategy(LogTruncationStrategy::new())
        .build()
        .unwrap();
    coordinator.activate(ActivationOptions::new()).await.unwrap();
    coordinator.deactivate().await.unwrap();

    a.push(add("t1")).await.unwrap();
    b.push(add("t1")).await.unwrap();
    assert_eq!(a.transform_log().len(), 1);
    assert_eq!(b.transform_log().len(), 1);
}
