use conflux_core::TransformLog;
use conflux_file_bucket::{FileBucket, FileBucketConfig};
use std::sync::Arc;
use tempfile::TempDir;

fn bucket(dir: &TempDir) -> Arc<FileBucket> {
    Arc::new(FileBucket::open("logs", FileBucketConfig::new(dir.path())).unwrap())
}

#[tokio::test]
async fn test_log_survives_restart() {
    let dir = TempDir::new().unwrap();

    {
        let log = TransformLog::with_bucket("memory-log", bucket(&dir));
        log.reified().await.unwrap();
        for id in ["t1", "t2", "t3"] {
            log.append(id).await.unwrap();
        }
        log.truncate("t1", 0).await.unwrap();
    }

    let restored = TransformLog::with_bucket("memory-log", bucket(&dir));
    restored.reified().await.unwrap();
    assert_eq!(restored.entries(), vec!["t2", "t3"]);
    assert!(!restored.contains("t1"));

    // Re-appending a restored id stays a no-op
    assert!(!restored.append("t2").await.unwrap());
    assert_eq!(restored.len(), 2);
}

#[tokio::test]
async fn test_logs_share_a_bucket() {
    let dir = TempDir::new().unwrap();
    let shared = bucket(&dir);

    let memory = TransformLog::with_bucket("memory-log", shared.clone());
    let backup = TransformLog::with_bucket("backup-log", shared.clone());
    memory.append("t1").await.unwrap();
    backup.append("t9").await.unwrap();

    let mut keys = shared.keys().unwrap();
    keys.sort();
    assert_eq!(keys, vec!["backup-log", "memory-log"]);
    assert!(!memory.contains("t9"));
}
