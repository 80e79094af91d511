use super::transform::RecordIdentity;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Query expression understood by sources
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "camelCase")]
pub enum QueryExpression {
    FindRecord {
        record: RecordIdentity,
    },
    FindRecords {
        #[serde(rename = "type")]
        kind: String,
    },
}

impl QueryExpression {
    pub fn find_record(record: RecordIdentity) -> Self {
        QueryExpression::FindRecord { record }
    }

    pub fn find_records(kind: impl Into<String>) -> Self {
        QueryExpression::FindRecords { kind: kind.into() }
    }
}

/// An identified query, the request payload of `pull` and `query`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Query {
    pub id: String,
    pub expression: QueryExpression,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub options: Option<Value>,
}

impl Query {
    pub fn new(id: impl Into<String>, expression: QueryExpression) -> Self {
        Self {
            id: id.into(),
            expression,
            options: None,
        }
    }

    pub fn with_options(mut self, options: Value) -> Self {
        self.options = Some(options);
        self
    }
}
