//! Persistent key/value backing for transform logs
//!
//! A bucket stores JSON documents under string keys. Transform logs persist
//! their entries under their own name, so several logs can share one bucket.

use crate::error::Result;
use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::Value;
use std::collections::HashMap;

/// Asynchronous key/value storage
#[async_trait]
pub trait Bucket: Send + Sync {
    /// Bucket name, used in log output
    fn name(&self) -> &str;

    async fn get_item(&self, key: &str) -> Result<Option<Value>>;

    async fn set_item(&self, key: &str, value: Value) -> Result<()>;

    async fn remove_item(&self, key: &str) -> Result<()>;
}

/// In-process bucket, mostly useful for tests and ephemeral graphs
pub struct MemoryBucket {
    name: String,
    items: Mutex<HashMap<String, Value>>,
}

impl MemoryBucket {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            items: Mutex::new(HashMap::new()),
        }
    }

    pub fn len(&self) -> usize {
        self.items.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.lock().is_empty()
    }
}

impl Default for MemoryBucket {
    fn default() -> Self {
        Self::new("memory")
    }
}

#[async_trait]
impl Bucket for MemoryBucket {
    fn name(&self) -> &str {
        &self.name
    }

    async fn get_item(&self, key: &str) -> Result<Option<Value>> {
        Ok(self.items.lock().get(key).cloned())
    }

    async fn set_item(&self, key: &str, value: Value) -> Result<()> {
        self.items.lock().insert(key.to_string(), value);
        Ok(())
    }

    async fn remove_item(&self, key: &str) -> Result<()> {
        self.items.lock().remove(key);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn test_memory_bucket() {
        let bucket = MemoryBucket::new("test");
        assert!(bucket.get_item("log").await.unwrap().is_none());

        bucket.set_item("log", json!(["t1", "t2"])).await.unwrap();
        assert_eq!(bucket.get_item("log").await.unwrap(), Some(json!(["t1", "t2"])));
        assert_eq!(bucket.len(), 1);

        bucket.remove_item("log").await.unwrap();
        assert!(bucket.is_empty());
    }
}
