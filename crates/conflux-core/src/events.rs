//! Event emitter with handle-based listener registration
//!
//! Listeners are kept per event kind in registration order. Registering a
//! listener returns a [`ListenerHandle`]; removal goes through that handle,
//! never through closure identity.
//!
//! A listener may hand back a [`ListenerFuture`] that the emitter awaits,
//! depending on how the event is delivered:
//!
//! | Delivery | Listener order | Failure |
//! |----------|----------------|---------|
//! | [`EventEmitter::emit`] | in order, not awaited | pending work is spawned, errors are logged |
//! | [`EventEmitter::settle`] | in order, each awaited | every listener runs, first error wins |
//! | [`EventEmitter::fulfill`] | in order, each awaited | stops at the first error |

use crate::error::Result;
use futures::future::BoxFuture;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::fmt::Debug;
use std::hash::Hash;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// An event that can be routed by kind
pub trait Event: Clone + Send + Sync + 'static {
    type Kind: Copy + Eq + Hash + Debug + Send + Sync + 'static;

    fn kind(&self) -> Self::Kind;
}

/// Pending completion returned by a listener
pub type ListenerFuture = BoxFuture<'static, Result<()>>;

/// A registered listener. Returning `None` means there is nothing to wait for.
pub type Listener<E> = Arc<dyn Fn(&E) -> Option<ListenerFuture> + Send + Sync>;

/// Opaque handle identifying one registration
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ListenerHandle(u64);

/// Per-kind ordered listener lists
pub struct EventEmitter<E: Event> {
    next_handle: AtomicU64,
    listeners: Mutex<HashMap<E::Kind, Vec<(ListenerHandle, Listener<E>)>>>,
}

impl<E: Event> EventEmitter<E> {
    pub fn new() -> Self {
        Self {
            next_handle: AtomicU64::new(1),
            listeners: Mutex::new(HashMap::new()),
        }
    }

    /// Register a listener for one event kind
    pub fn on<F>(&self, kind: E::Kind, listener: F) -> ListenerHandle
    where
        F: Fn(&E) -> Option<ListenerFuture> + Send + Sync + 'static,
    {
        let handle = ListenerHandle(self.next_handle.fetch_add(1, Ordering::SeqCst));
        let listener: Listener<E> = Arc::new(listener);
        self.listeners
            .lock()
            .entry(kind)
            .or_default()
            .push((handle, listener));
        handle
    }

    /// Remove a registration. Returns `true` if the handle was registered.
    pub fn off(&self, handle: ListenerHandle) -> bool {
        let mut listeners = self.listeners.lock();
        for list in listeners.values_mut() {
            if let Some(pos) = list.iter().position(|(h, _)| *h == handle) {
                list.remove(pos);
                return true;
            }
        }
        false
    }

    pub fn listener_count(&self, kind: E::Kind) -> usize {
        self.listeners.lock().get(&kind).map_or(0, Vec::len)
    }

    /// Listeners registered while an event is being delivered only see later events.
    fn snapshot(&self, kind: E::Kind) -> Vec<Listener<E>> {
        self.listeners
            .lock()
            .get(&kind)
            .map(|list| list.iter().map(|(_, l)| Arc::clone(l)).collect())
            .unwrap_or_default()
    }

    /// Fire-and-forget delivery.
    ///
    /// Must be called from within a tokio runtime when listeners return
    /// pending work, since that work is spawned.
    pub fn emit(&self, event: &E) {
        let kind = event.kind();
        for listener in self.snapshot(kind) {
            if let Some(pending) = listener(event) {
                tokio::spawn(async move {
                    if let Err(e) = pending.await {
                        tracing::warn!(event = ?kind, error = %e, "Listener failed");
                    }
                });
            }
        }
    }

    /// Run every listener in order, awaiting each one.
    ///
    /// All listeners run even if an earlier one failed; the first error is
    /// returned once they have all settled.
    pub async fn settle(&self, event: &E) -> Result<()> {
        let mut first_error = None;
        for listener in self.snapshot(event.kind()) {
            if let Some(pending) = listener(event) {
                if let Err(e) = pending.await {
                    first_error.get_or_insert(e);
                }
            }
        }
        match first_error {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }

    /// Run listeners in order, awaiting each one, and stop at the first error
    pub async fn fulfill(&self, event: &E) -> Result<()> {
        for listener in self.snapshot(event.kind()) {
            if let Some(pending) = listener(event) {
                pending.await?;
            }
        }
        Ok(())
    }
}

impl<E: Event> Default for EventEmitter<E> {
    fn default() -> Self {
        Self::new()
    }
}
