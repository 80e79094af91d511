use std::io;
use std::sync::Arc;
use thiserror::Error;

/// Errors raised by transform logs, task queues, sources, strategies and coordinators.
///
/// The error is `Clone` because a single failure is delivered to the caller of an
/// operation, broadcast to `*Fail` listeners and possibly returned by several
/// blocking listeners at once. Non-cloneable causes are held behind an `Arc`.
#[derive(Error, Debug, Clone)]
pub enum ConfluxError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Invalid state: {0}")]
    InvalidState(String),

    #[error("Source '{source_name}' does not support {capability}")]
    Unsupported {
        source_name: String,
        capability: String,
    },

    #[error("Out of range: {0}")]
    OutOfRange(String),

    #[error("Operation failed: {0}")]
    Operation(String),

    #[error("Task cancelled: {0}")]
    Cancelled(String),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("IO error: {0}")]
    Io(Arc<io::Error>),

    #[error("Other error: {0}")]
    Other(Arc<anyhow::Error>),
}

impl ConfluxError {
    /// True for errors caused by invalid configuration or misuse of a
    /// coordinator, strategy or source registry.
    pub fn is_config(&self) -> bool {
        matches!(self, ConfluxError::Config(_))
    }

    pub fn config(message: impl Into<String>) -> Self {
        ConfluxError::Config(message.into())
    }

    pub fn operation(message: impl Into<String>) -> Self {
        ConfluxError::Operation(message.into())
    }
}

impl From<io::Error> for ConfluxError {
    fn from(err: io::Error) -> Self {
        ConfluxError::Io(Arc::new(err))
    }
}

impl From<anyhow::Error> for ConfluxError {
    fn from(err: anyhow::Error) -> Self {
        ConfluxError::Other(Arc::new(err))
    }
}

impl From<serde_json::Error> for ConfluxError {
    fn from(err: serde_json::Error) -> Self {
        ConfluxError::Serialization(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, ConfluxError>;

// Backend errors:
//
// A `SourceBackend` can fail with any error type. `anyhow::Error` converts into
// `ConfluxError::Other`, so backends are free to use `anyhow::bail!` or `?` on
// their own error types:
//
// async fn push(&self, transform: &Transform) -> Result<Vec<Transform>> {
//     let response = self.client.post(transform).await.map_err(anyhow::Error::from)?;
//     ...
// }
//
// For errors that should be matched on by strategies, prefer
// `ConfluxError::Operation` with a descriptive message.
