//! In-memory record cache exposing every capability

use super::backend::SourceBackend;
use async_trait::async_trait;
use conflux_core::{
    Capabilities, ConfluxError, Context, Operation, Query, QueryExpression, Record,
    RecordIdentity, Result, Transform,
};
use parking_lot::Mutex;
use serde_json::Value;
use std::collections::BTreeMap;

/// Backend holding records in memory.
///
/// Transforms are applied atomically: if any operation fails, none of the
/// transform's operations take effect.
pub struct MemoryBackend {
    context: Context,
    records: Mutex<BTreeMap<RecordIdentity, Record>>,
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self::with_context(Context::new())
    }

    /// Pulled transforms get their ids from `context`
    pub fn with_context(context: Context) -> Self {
        Self {
            context,
            records: Mutex::new(BTreeMap::new()),
        }
    }

    pub fn with_records(self, records: impl IntoIterator<Item = Record>) -> Self {
        {
            let mut cache = self.records.lock();
            for record in records {
                cache.insert(record.identity.clone(), record);
            }
        }
        self
    }

    pub fn record(&self, identity: &RecordIdentity) -> Option<Record> {
        self.records.lock().get(identity).cloned()
    }

    /// Records of one type, ordered by id
    pub fn records_of(&self, kind: &str) -> Vec<Record> {
        self.records
            .lock()
            .values()
            .filter(|r| r.identity.kind == kind)
            .cloned()
            .collect()
    }

    pub fn len(&self) -> usize {
        self.records.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.lock().is_empty()
    }

    fn apply(&self, transform: &Transform) -> Result<()> {
        let mut records = self.records.lock();
        let mut next = records.clone();
        for operation in &transform.operations {
            apply_operation(&mut next, operation)?;
        }
        *records = next;
        Ok(())
    }

    fn find(&self, expression: &QueryExpression) -> Result<Vec<Record>> {
        let records = self.records.lock();
        match expression {
            QueryExpression::FindRecord { record } => records
                .get(record)
                .cloned()
                .map(|r| vec![r])
                .ok_or_else(|| record_not_found(record)),
            QueryExpression::FindRecords { kind } => Ok(records
                .values()
                .filter(|r| &r.identity.kind == kind)
                .cloned()
                .collect()),
        }
    }
}

impl Default for MemoryBackend {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl SourceBackend for MemoryBackend {
    fn capabilities(&self) -> Capabilities {
        Capabilities::all()
    }

    async fn pull(&self, query: &Query) -> Result<Vec<Transform>> {
        let operations = self
            .find(&query.expression)?
            .into_iter()
            .map(Operation::add_record)
            .collect();
        Ok(vec![self.context.build_transform(operations, None, None)])
    }

    async fn push(&self, transform: &Transform) -> Result<Vec<Transform>> {
        self.apply(transform)?;
        Ok(vec![transform.clone()])
    }

    async fn update(&self, transform: &Transform) -> Result<Value> {
        self.apply(transform)?;
        let touched: Vec<Option<Record>> = transform
            .operations
            .iter()
            .map(|op| self.record(op.record_identity()))
            .collect();
        // A single operation answers with its record, a batch with a list
        match touched.as_slice() {
            [single] => Ok(serde_json::to_value(single)?),
            _ => Ok(serde_json::to_value(touched)?),
        }
    }

    async fn query(&self, query: &Query) -> Result<Value> {
        let found = self.find(&query.expression)?;
        match &query.expression {
            QueryExpression::FindRecord { .. } => Ok(serde_json::to_value(found.first())?),
            QueryExpression::FindRecords { .. } => Ok(serde_json::to_value(found)?),
        }
    }

    async fn sync(&self, transform: &Transform) -> Result<()> {
        self.apply(transform)
    }
}

fn apply_operation(records: &mut BTreeMap<RecordIdentity, Record>, operation: &Operation) -> Result<()> {
    match operation {
        Operation::AddRecord { record } | Operation::ReplaceRecord { record } => {
            records.insert(record.identity.clone(), record.clone());
        }
        Operation::RemoveRecord { record } => {
            records.remove(record).ok_or_else(|| record_not_found(record))?;
        }
        Operation::ReplaceAttribute {
            record,
            attribute,
            value,
        } => {
            let target = records
                .get_mut(record)
                .ok_or_else(|| record_not_found(record))?;
            target.attributes.insert(attribute.clone(), value.clone());
        }
    }
    Ok(())
}

fn record_not_found(identity: &RecordIdentity) -> ConfluxError {
    ConfluxError::NotFound(format!("Record {}:{}", identity.kind, identity.id))
}
