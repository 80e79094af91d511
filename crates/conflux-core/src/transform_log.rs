//! Append-only log of applied transform ids
//!
//! Each source owns one log. Entries are kept in insertion order with a
//! mirrored index for O(1) membership checks. A log may be backed by a
//! [`Bucket`], in which case every mutation is persisted under the log's name
//! before it becomes visible, and [`TransformLog::reified`] loads the persisted
//! entries exactly once.
//!
//! Positions passed to [`TransformLog::truncate`], [`TransformLog::rollback`],
//! [`TransformLog::before`] and [`TransformLog::after`] are relative to an id:
//! `0` is the id itself, `-1` the entry before it, `1` the entry after it.

use crate::bucket::Bucket;
use crate::error::{ConfluxError, Result};
use crate::observe;
use crate::types::TransformId;
use parking_lot::Mutex;
use std::collections::{HashSet, VecDeque};
use std::sync::Arc;
use tokio::sync::OnceCell;

#[derive(Debug, Default)]
struct LogState {
    entries: VecDeque<TransformId>,
    index: HashSet<TransformId>,
}

impl LogState {
    fn from_entries(entries: Vec<TransformId>) -> Self {
        let mut state = LogState::default();
        for id in entries {
            if state.index.insert(id.clone()) {
                state.entries.push_back(id);
            }
        }
        state
    }

    fn position(&self, id: &str) -> Option<usize> {
        if !self.index.contains(id) {
            return None;
        }
        self.entries.iter().position(|e| e == id)
    }
}

/// Ordered, idempotent, truncatable set of transform ids
pub struct TransformLog {
    name: String,
    bucket: Option<Arc<dyn Bucket>>,
    state: Mutex<LogState>,
    // Serializes mutations so each one is persisted before the next starts
    write_lock: tokio::sync::Mutex<()>,
    reified: OnceCell<()>,
}

impl TransformLog {
    /// In-memory log
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            bucket: None,
            state: Mutex::new(LogState::default()),
            write_lock: tokio::sync::Mutex::new(()),
            reified: OnceCell::new(),
        }
    }

    /// Log persisted to `bucket` under `name`
    pub fn with_bucket(name: impl Into<String>, bucket: Arc<dyn Bucket>) -> Self {
        Self {
            bucket: Some(bucket),
            ..Self::new(name)
        }
    }

    /// Log seeded with existing entries (duplicates are dropped)
    pub fn from_entries(name: impl Into<String>, entries: Vec<TransformId>) -> Self {
        let log = Self::new(name);
        *log.state.lock() = LogState::from_entries(entries);
        log
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn is_persistent(&self) -> bool {
        self.bucket.is_some()
    }

    /// Resolves once persisted entries have been loaded.
    ///
    /// The load runs at most once; later calls return immediately. Mutating
    /// operations reify the log themselves.
    pub async fn reified(&self) -> Result<()> {
        self.reified
            .get_or_try_init(|| async {
                let Some(bucket) = &self.bucket else {
                    return Ok(());
                };
                if let Some(value) = bucket.get_item(&self.name).await? {
                    let entries: Vec<TransformId> = serde_json::from_value(value)?;
                    tracing::debug!(log = %self.name, entries = entries.len(), "Loaded transform log");
                    *self.state.lock() = LogState::from_entries(entries);
                }
                Ok::<(), ConfluxError>(())
            })
            .await?;
        Ok(())
    }

    pub fn is_reified(&self) -> bool {
        self.reified.initialized()
    }

    /// Append `id` unless it is already logged.
    ///
    /// Returns `true` if the id was added. Re-appending is a successful no-op.
    pub async fn append(&self, id: impl Into<TransformId>) -> Result<bool> {
        let id = id.into();
        self.reified().await?;
        let _guard = self.write_lock.lock().await;

        // Only a persistent log needs the full snapshot
        let snapshot = {
            let state = self.state.lock();
            if state.index.contains(&id) {
                return Ok(false);
            }
            self.bucket.is_some().then(|| {
                let mut next: Vec<TransformId> = state.entries.iter().cloned().collect();
                next.push(id.clone());
                next
            })
        };
        if let Some(snapshot) = snapshot {
            self.persist(&snapshot).await?;
        }

        let mut state = self.state.lock();
        state.index.insert(id.clone());
        state.entries.push_back(id);
        drop(state);

        observe::record_append(&self.name);
        Ok(true)
    }

    pub fn contains(&self, id: &str) -> bool {
        self.state.lock().index.contains(id)
    }

    /// Remove every entry at or before `id` offset by `relative_position`.
    ///
    /// Returns the removed ids, oldest first. Truncating at an id that is not
    /// logged is a no-op; any other position outside the log is an error.
    pub async fn truncate(&self, id: &str, relative_position: isize) -> Result<Vec<TransformId>> {
        self.reified().await?;
        let _guard = self.write_lock.lock().await;

        let (removed, kept) = {
            let state = self.state.lock();
            let Some(pos) = state.position(id) else {
                return Ok(Vec::new());
            };
            let target = self.offset(pos, relative_position, state.entries.len(), false)?;
            split_at(&state.entries, target + 1)
        };
        self.commit(kept).await?;

        tracing::debug!(log = %self.name, id, removed = removed.len(), "Truncated transform log");
        observe::record_truncate(&self.name, removed.len());
        Ok(removed)
    }

    /// Remove every entry after `id` offset by `relative_position`.
    ///
    /// A position of `-1` relative to the first entry empties the log.
    /// Returns the removed ids, oldest first.
    pub async fn rollback(&self, id: &str, relative_position: isize) -> Result<Vec<TransformId>> {
        self.reified().await?;
        let _guard = self.write_lock.lock().await;

        let (kept, removed) = {
            let state = self.state.lock();
            let pos = state
                .position(id)
                .ok_or_else(|| self.not_logged(id))?;
            let keep = self.offset(pos, relative_position, state.entries.len(), true)?;
            split_at(&state.entries, keep)
        };
        self.commit(kept).await?;

        tracing::debug!(log = %self.name, id, removed = removed.len(), "Rolled back transform log");
        Ok(removed)
    }

    /// Entries strictly before `id` offset by `relative_position`
    pub fn before(&self, id: &str, relative_position: isize) -> Result<Vec<TransformId>> {
        let state = self.state.lock();
        let pos = state.position(id).ok_or_else(|| self.not_logged(id))?;
        let target = self.offset(pos, relative_position, state.entries.len(), false)?;
        Ok(state.entries.iter().take(target).cloned().collect())
    }

    /// Entries strictly after `id` offset by `relative_position`
    pub fn after(&self, id: &str, relative_position: isize) -> Result<Vec<TransformId>> {
        let state = self.state.lock();
        let pos = state.position(id).ok_or_else(|| self.not_logged(id))?;
        let target = self.offset(pos, relative_position, state.entries.len(), false)?;
        Ok(state.entries.iter().skip(target + 1).cloned().collect())
    }

    /// Remove every entry
    pub async fn clear(&self) -> Result<Vec<TransformId>> {
        self.reified().await?;
        let _guard = self.write_lock.lock().await;
        let removed: Vec<TransformId> = self.state.lock().entries.iter().cloned().collect();
        self.commit(Vec::new()).await?;
        Ok(removed)
    }

    /// Most recently appended id
    pub fn head(&self) -> Option<TransformId> {
        self.state.lock().entries.back().cloned()
    }

    /// Snapshot of all entries, oldest first
    pub fn entries(&self) -> Vec<TransformId> {
        self.state.lock().entries.iter().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.state.lock().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.state.lock().entries.is_empty()
    }

    /// Resolve `pos + relative` to an absolute index.
    ///
    /// With `allow_before_start`, `-1` is accepted and mapped to `0`, which is
    /// the count of entries to keep for a rollback past the first entry.
    fn offset(
        &self,
        pos: usize,
        relative: isize,
        len: usize,
        allow_before_start: bool,
    ) -> Result<usize> {
        let target = pos as isize + relative;
        if allow_before_start {
            // Rollback keeps `target + 1` entries
            if target < -1 || target >= len as isize {
                return Err(self.out_of_range(pos, relative));
            }
            return Ok((target + 1) as usize);
        }
        if target < 0 || target >= len as isize {
            return Err(self.out_of_range(pos, relative));
        }
        Ok(target as usize)
    }

    async fn commit(&self, entries: Vec<TransformId>) -> Result<()> {
        self.persist(&entries).await?;
        *self.state.lock() = LogState::from_entries(entries);
        Ok(())
    }

    async fn persist(&self, entries: &[TransformId]) -> Result<()> {
        if let Some(bucket) = &self.bucket {
            bucket
                .set_item(&self.name, serde_json::to_value(entries)?)
                .await?;
        }
        Ok(())
    }

    fn not_logged(&self, id: &str) -> ConfluxError {
        ConfluxError::NotFound(format!("Transform '{}' is not in log '{}'", id, self.name))
    }

    fn out_of_range(&self, pos: usize, relative: isize) -> ConfluxError {
        ConfluxError::OutOfRange(format!(
            "Position {} offset by {} is outside log '{}'",
            pos, relative, self.name
        ))
    }
}

impl std::fmt::Debug for TransformLog {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TransformLog")
            .field("name", &self.name)
            .field("len", &self.len())
            .field("persistent", &self.is_persistent())
            .finish()
    }
}

fn split_at(entries: &VecDeque<TransformId>, at: usize) -> (Vec<TransformId>, Vec<TransformId>) {
    let head = entries.iter().take(at).cloned().collect();
    let tail = entries.iter().skip(at).cloned().collect();
    (head, tail)
}
