//! Conflux: coordinate event-emitting data sources
//!
//! Conflux keeps several stores in step by relaying their operations:
//! - **Sources**: named stores with a transform log and two task queues
//! - **Strategies**: rules wiring source events to behavior (propagation,
//!   log truncation, event logging)
//! - **Coordinator**: owns sources and strategies and drives activation
//!
//! # Quick Start
//!
//! ```no_run
//! use conflux::prelude::*;
//!
//! # async fn run() -> Result<()> {
//! let memory = Source::memory("memory");
//! let backup = Source::memory("backup");
//!
//! let coordinator = Coordinator::builder()
//!     .with_source(memory.clone())
//!     .with_source(backup.clone())
//!     .with_strategy(SyncStrategy::new("memory", "backup")?)
//!     .with_strategy(LogTruncationStrategy::new())
//!     .build()?;
//! coordinator.activate(ActivationOptions::new()).await?;
//!
//! let jupiter = Record::new("planet", "jupiter").with_attribute("name", "Jupiter");
//! memory.push(Operation::add_record(jupiter)).await?;
//!
//! coordinator.deactivate().await?;
//! # Ok(())
//! # }
//! ```

pub mod coordinator;
pub mod prelude;
pub mod source;
pub mod strategy;

// Re-export core types
pub use conflux_core::{
    bucket::{Bucket, MemoryBucket},
    config::{
        ActivationOptions, CoordinatorConfig, FailurePolicy, LogLevel, QueueConfig, SourceConfig,
        StrategyConfig,
    },
    context::{Context, IdGenerator, SequentialIdGenerator, UuidGenerator},
    error::{ConfluxError, Result},
    events::{Event, EventEmitter, ListenerFuture, ListenerHandle},
    observe,
    task_queue::{Task, TaskOutput, TaskPayload, TaskQueue},
    transform_log::TransformLog,
    types::{
        Capabilities, Capability, Operation, PayloadKind, Query, QueryExpression, Record,
        RecordIdentity, Transform, TransformId,
    },
};

// Re-export main types from this crate
pub use coordinator::{ActivationState, Coordinator, CoordinatorBuilder, WeakCoordinator};
pub use source::{
    EventKind, Interface, MemoryBackend, QueryInput, Source, SourceBackend, SourceBuilder,
    SourceEvent, TransformInput,
};
pub use strategy::{
    Action, ActionContext, Blocking, ConnectionStrategy, ConnectionStrategyBuilder,
    EventLoggingStrategy, EventLoggingStrategyBuilder, LogLine, LogSink, LogTruncationStrategy,
    MemorySink, RequestStrategy, RequestStrategyBuilder, Strategy, StrategyBase, StrategyState,
    SyncStrategy, SyncStrategyBuilder, TracingSink,
};
