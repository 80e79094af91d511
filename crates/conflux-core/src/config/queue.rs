use serde::{Deserialize, Serialize};

/// What a queue does after a task fails
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FailurePolicy {
    /// Settle the failed task and move on to the next one
    #[default]
    Continue,
    /// Stop at the failed task until it is retried, skipped or the queue is cleared
    Halt,
}

/// Configuration for a task queue
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QueueConfig {
    /// Start processing as soon as a task is pushed
    /// Default: true
    #[serde(default = "default_auto_process")]
    pub auto_process: bool,

    /// Default: continue with the next task
    #[serde(default)]
    pub failure_policy: FailurePolicy,
}

fn default_auto_process() -> bool {
    true
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            auto_process: default_auto_process(),
            failure_policy: FailurePolicy::default(),
        }
    }
}

impl QueueConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_auto_process(mut self, auto_process: bool) -> Self {
        self.auto_process = auto_process;
        self
    }

    pub fn with_failure_policy(mut self, policy: FailurePolicy) -> Self {
        self.failure_policy = policy;
        self
    }
}
