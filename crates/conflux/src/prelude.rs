//! Conflux Prelude
//!
//! Import this to get all commonly used types and traits:
//!
//! ```
//! use conflux::prelude::*;
//! ```

// Core types
pub use crate::{
    ConfluxError, Operation, Query, QueryExpression, Record, RecordIdentity, Result, Transform,
};

// Configs
pub use crate::{
    ActivationOptions, CoordinatorConfig, FailurePolicy, LogLevel, QueueConfig, SourceConfig,
    StrategyConfig,
};

// Sources
pub use crate::{
    Bucket, Capabilities, Capability, Context, EventKind, MemoryBackend, MemoryBucket, Source,
    SourceBackend, SourceEvent,
};

// Strategies
pub use crate::{
    Blocking, ConnectionStrategy, EventLoggingStrategy, LogTruncationStrategy, RequestStrategy,
    Strategy, SyncStrategy,
};

// Coordination
pub use crate::{ActivationState, Coordinator};

// Re-export common external deps
pub use anyhow;
pub use async_trait::async_trait;
pub use serde::{Deserialize, Serialize};
pub use std::sync::Arc;
pub use tracing;
