//! Conflux Core: building blocks for coordinating event-emitting data sources
//!
//! This crate defines the pieces every source and strategy is built from:
//! - Transforms: identified batches of record operations
//! - Transform log: append-only, idempotent, truncatable history of applied ids
//! - Task queue: per-source serialized execution of asynchronous work
//! - Event emitter: per-kind ordered listeners removed by handle
//! - Buckets: key/value persistence for transform logs
//! - Context: runtime services (id generation) threaded through a graph
//!
//! Key properties:
//! - Exactly-once application: a transform id is logged at most once per source
//! - Strict ordering: one task in flight per queue, FIFO submission order
//! - No process-wide state: independent graphs can share a process

pub mod bucket;
pub mod config;
pub mod context;
pub mod error;
pub mod events;
pub mod observe;
pub mod task_queue;
pub mod transform_log;
pub mod types;

pub use bucket::{Bucket, MemoryBucket};
pub use config::{
    ActivationOptions, CoordinatorConfig, FailurePolicy, LogLevel, QueueConfig, SourceConfig,
    StrategyConfig,
};
pub use context::{Context, IdGenerator, SequentialIdGenerator, UuidGenerator};
pub use error::{ConfluxError, Result};
pub use events::{Event, EventEmitter, Listener, ListenerFuture, ListenerHandle};
pub use task_queue::{Performer, Task, TaskCompletion, TaskOutput, TaskPayload, TaskQueue};
pub use transform_log::TransformLog;
pub use types::{
    Capabilities, Capability, Operation, PayloadKind, Query, QueryExpression, Record,
    RecordIdentity, Transform, TransformId,
};
