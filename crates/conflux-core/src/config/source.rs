use super::queue::QueueConfig;
use serde::{Deserialize, Serialize};

/// Configuration for a source
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SourceConfig {
    /// Unique within a coordinator
    pub name: String,

    /// Key of the transform log in the bucket
    /// Default: `<name>-log`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub log_name: Option<String>,

    #[serde(default)]
    pub request_queue: QueueConfig,

    #[serde(default)]
    pub sync_queue: QueueConfig,
}

impl SourceConfig {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            log_name: None,
            request_queue: QueueConfig::default(),
            sync_queue: QueueConfig::default(),
        }
    }

    pub fn with_log_name(mut self, log_name: impl Into<String>) -> Self {
        self.log_name = Some(log_name.into());
        self
    }

    pub fn with_request_queue(mut self, config: QueueConfig) -> Self {
        self.request_queue = config;
        self
    }

    pub fn with_sync_queue(mut self, config: QueueConfig) -> Self {
        self.sync_queue = config;
        self
    }

    pub fn log_name(&self) -> String {
        self.log_name
            .clone()
            .unwrap_or_else(|| format!("{}-log", self.name))
    }

    pub fn request_queue_name(&self) -> String {
        format!("{}-requests", self.name)
    }

    pub fn sync_queue_name(&self) -> String {
        format!("{}-sync", self.name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::FailurePolicy;

    #[test]
    fn test_derived_names() {
        let config = SourceConfig::new("memory");
        assert_eq!(config.log_name(), "memory-log");
        assert_eq!(config.request_queue_name(), "memory-requests");
        assert_eq!(config.sync_queue_name(), "memory-sync");
        assert_eq!(config.with_log_name("history").log_name(), "history");
    }

    #[test]
    fn test_partial_document() {
        let config: SourceConfig = serde_json::from_str(
            r#"{"name": "remote", "syncQueue": {"failurePolicy": "halt"}}"#,
        )
        .unwrap();
        assert!(config.request_queue.auto_process);
        assert_eq!(config.sync_queue.failure_policy, FailurePolicy::Halt);
        assert!(config.sync_queue.auto_process);
    }
}
