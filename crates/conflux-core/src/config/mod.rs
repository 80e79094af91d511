pub mod activation;
pub mod coordinator;
pub mod queue;
pub mod source;
pub mod strategy;

pub use activation::{ActivationOptions, LogLevel};
pub use coordinator::CoordinatorConfig;
pub use queue::{FailurePolicy, QueueConfig};
pub use source::SourceConfig;
pub use strategy::StrategyConfig;
