//! Runtime context threaded through sources
//!
//! Every coordination graph carries its own [`Context`] instead of sharing
//! process-wide state, so independent graphs can live in one process.

use crate::types::{Operation, Query, QueryExpression, Transform, TransformId};
use serde_json::Value;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// Generates identifiers for transforms and queries
pub trait IdGenerator: Send + Sync {
    fn next_id(&self) -> String;
}

/// Random v4 UUIDs
#[derive(Debug, Default, Clone, Copy)]
pub struct UuidGenerator;

impl IdGenerator for UuidGenerator {
    fn next_id(&self) -> String {
        uuid::Uuid::new_v4().to_string()
    }
}

/// Deterministic `<prefix>-<n>` identifiers, starting at 1
#[derive(Debug)]
pub struct SequentialIdGenerator {
    prefix: String,
    counter: AtomicU64,
}

impl SequentialIdGenerator {
    pub fn new(prefix: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
            counter: AtomicU64::new(0),
        }
    }
}

impl IdGenerator for SequentialIdGenerator {
    fn next_id(&self) -> String {
        let n = self.counter.fetch_add(1, Ordering::SeqCst) + 1;
        format!("{}-{}", self.prefix, n)
    }
}

/// Shared runtime services for one coordination graph
#[derive(Clone)]
pub struct Context {
    ids: Arc<dyn IdGenerator>,
}

impl Context {
    pub fn new() -> Self {
        Self {
            ids: Arc::new(UuidGenerator),
        }
    }

    pub fn with_id_generator(ids: Arc<dyn IdGenerator>) -> Self {
        Self { ids }
    }

    pub fn generate_id(&self) -> String {
        self.ids.next_id()
    }

    /// Build a transform, allocating an id unless one is supplied
    pub fn build_transform(
        &self,
        operations: Vec<Operation>,
        options: Option<Value>,
        id: Option<TransformId>,
    ) -> Transform {
        Transform {
            id: id.unwrap_or_else(|| self.generate_id()),
            operations,
            options,
        }
    }

    /// Build a query, allocating an id unless one is supplied
    pub fn build_query(
        &self,
        expression: QueryExpression,
        options: Option<Value>,
        id: Option<String>,
    ) -> Query {
        Query {
            id: id.unwrap_or_else(|| self.generate_id()),
            expression,
            options,
        }
    }
}

impl Default for Context {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for Context {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Context").finish_non_exhaustive()
    }
}
