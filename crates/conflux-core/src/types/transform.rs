use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::hash::{Hash, Hasher};

/// Transform identifier, unique across every source in a coordination graph
pub type TransformId = String;

/// Identity of a record addressed by an operation
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct RecordIdentity {
    #[serde(rename = "type")]
    pub kind: String,
    pub id: String,
}

impl RecordIdentity {
    pub fn new(kind: impl Into<String>, id: impl Into<String>) -> Self {
        Self {
            kind: kind.into(),
            id: id.into(),
        }
    }
}

/// A record: identity plus free-form attributes
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Record {
    #[serde(flatten)]
    pub identity: RecordIdentity,

    #[serde(default, skip_serializing_if = "Map::is_empty")]
    pub attributes: Map<String, Value>,
}

impl Record {
    pub fn new(kind: impl Into<String>, id: impl Into<String>) -> Self {
        Self {
            identity: RecordIdentity::new(kind, id),
            attributes: Map::new(),
        }
    }

    pub fn with_attribute(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.attributes.insert(name.into(), value.into());
        self
    }
}

/// A single primitive change inside a transform
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "camelCase")]
pub enum Operation {
    AddRecord {
        record: Record,
    },
    ReplaceRecord {
        record: Record,
    },
    RemoveRecord {
        record: RecordIdentity,
    },
    ReplaceAttribute {
        record: RecordIdentity,
        attribute: String,
        value: Value,
    },
}

impl Operation {
    pub fn add_record(record: Record) -> Self {
        Operation::AddRecord { record }
    }

    pub fn replace_record(record: Record) -> Self {
        Operation::ReplaceRecord { record }
    }

    pub fn remove_record(record: RecordIdentity) -> Self {
        Operation::RemoveRecord { record }
    }

    pub fn replace_attribute(
        record: RecordIdentity,
        attribute: impl Into<String>,
        value: impl Into<Value>,
    ) -> Self {
        Operation::ReplaceAttribute {
            record,
            attribute: attribute.into(),
            value: value.into(),
        }
    }

    /// The record this operation touches
    pub fn record_identity(&self) -> &RecordIdentity {
        match self {
            Operation::AddRecord { record } | Operation::ReplaceRecord { record } => {
                &record.identity
            }
            Operation::RemoveRecord { record } | Operation::ReplaceAttribute { record, .. } => {
                record
            }
        }
    }
}

/// An immutable, uniquely identified batch of operations.
///
/// Two transforms are equal iff their ids match.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Transform {
    pub id: TransformId,
    pub operations: Vec<Operation>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub options: Option<Value>,
}

impl Transform {
    pub fn new(id: impl Into<TransformId>, operations: Vec<Operation>) -> Self {
        Self {
            id: id.into(),
            operations,
            options: None,
        }
    }

    pub fn with_options(mut self, options: Value) -> Self {
        self.options = Some(options);
        self
    }
}

impl PartialEq for Transform {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for Transform {}

impl Hash for Transform {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.id.hash(state);
    }
}
