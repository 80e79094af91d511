pub mod capability;
pub mod query;
pub mod transform;

pub use capability::{Capabilities, Capability, PayloadKind};
pub use query::{Query, QueryExpression};
pub use transform::{Operation, Record, RecordIdentity, Transform, TransformId};
