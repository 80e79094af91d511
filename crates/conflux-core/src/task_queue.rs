//! Serialized per-source task execution
//!
//! A [`TaskQueue`] runs its tasks strictly one at a time, in submission
//! order, by handing each one to a [`Performer`]. Every pushed task gets a
//! [`TaskCompletion`] future that settles with the task's output or error
//! before the next task starts.
//!
//! The queue holds its performer weakly: a source owns its queues and is also
//! their performer.

use crate::config::{FailurePolicy, QueueConfig};
use crate::error::{ConfluxError, Result};
use crate::observe;
use crate::types::{Capability, Query, Transform};
use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::Value;
use std::collections::VecDeque;
use std::future::Future;
use std::pin::Pin;
use std::sync::{Arc, Weak};
use std::task::{Context, Poll};
use std::time::Instant;
use tokio::sync::{oneshot, Notify};
use tracing::{debug, warn};

/// Request carried by a task
#[derive(Debug, Clone, PartialEq)]
pub enum TaskPayload {
    Transform(Transform),
    Query(Query),
}

/// A unit of work for a performer
#[derive(Debug, Clone, PartialEq)]
pub struct Task {
    pub kind: Capability,
    pub payload: TaskPayload,
}

impl Task {
    pub fn new(kind: Capability, payload: TaskPayload) -> Self {
        Self { kind, payload }
    }

    pub fn transform(kind: Capability, transform: Transform) -> Self {
        Self::new(kind, TaskPayload::Transform(transform))
    }

    pub fn query(kind: Capability, query: Query) -> Self {
        Self::new(kind, TaskPayload::Query(query))
    }

    /// Id of the transform or query carried by the task
    pub fn id(&self) -> &str {
        match &self.payload {
            TaskPayload::Transform(t) => &t.id,
            TaskPayload::Query(q) => &q.id,
        }
    }
}

/// Result of a performed task
#[derive(Debug, Clone, PartialEq)]
pub enum TaskOutput {
    Transforms(Vec<Transform>),
    Data(Value),
    None,
}

impl TaskOutput {
    pub fn into_transforms(self) -> Vec<Transform> {
        match self {
            TaskOutput::Transforms(transforms) => transforms,
            _ => Vec::new(),
        }
    }

    pub fn into_data(self) -> Value {
        match self {
            TaskOutput::Data(value) => value,
            TaskOutput::Transforms(transforms) => {
                serde_json::to_value(transforms).unwrap_or(Value::Null)
            }
            TaskOutput::None => Value::Null,
        }
    }
}

/// Executes tasks on behalf of a queue
#[async_trait]
pub trait Performer: Send + Sync {
    async fn perform(&self, task: Task) -> Result<TaskOutput>;
}

struct QueuedTask {
    task: Task,
    completion: oneshot::Sender<Result<TaskOutput>>,
}

#[derive(Default)]
struct QueueState {
    tasks: VecDeque<QueuedTask>,
    current: Option<Task>,
    processing: bool,
    error: Option<ConfluxError>,
}

struct QueueInner {
    name: String,
    config: QueueConfig,
    performer: Weak<dyn Performer>,
    state: Mutex<QueueState>,
    idle: Notify,
}

/// FIFO queue executing one task at a time
#[derive(Clone)]
pub struct TaskQueue {
    inner: Arc<QueueInner>,
}

impl TaskQueue {
    pub fn new(name: impl Into<String>, performer: Weak<dyn Performer>, config: QueueConfig) -> Self {
        Self {
            inner: Arc::new(QueueInner {
                name: name.into(),
                config,
                performer,
                state: Mutex::new(QueueState::default()),
                idle: Notify::new(),
            }),
        }
    }

    pub fn name(&self) -> &str {
        &self.inner.name
    }

    pub fn config(&self) -> &QueueConfig {
        &self.inner.config
    }

    /// Enqueue a task.
    ///
    /// With `auto_process`, processing starts right away if the queue is idle.
    /// Must be called from within a tokio runtime in that case.
    pub fn push(&self, task: Task) -> TaskCompletion {
        let (completion, receiver) = oneshot::channel();
        let depth = {
            let mut state = self.inner.state.lock();
            state.tasks.push_back(QueuedTask { task, completion });
            state.tasks.len()
        };
        observe::set_queue_depth(&self.inner.name, depth);

        if self.inner.config.auto_process {
            self.process();
        }
        TaskCompletion {
            queue: self.inner.name.clone(),
            receiver,
        }
    }

    /// Start processing unless already processing, halted or empty
    pub fn process(&self) {
        {
            let mut state = self.inner.state.lock();
            if state.processing || state.error.is_some() || state.tasks.is_empty() {
                return;
            }
            state.processing = true;
        }
        tokio::spawn(run(Arc::clone(&self.inner)));
    }

    /// Re-run the task the queue halted at
    pub fn retry(&self) -> Result<()> {
        if self.inner.state.lock().error.take().is_none() {
            return Err(ConfluxError::InvalidState(format!(
                "Queue '{}' is not halted",
                self.inner.name
            )));
        }
        debug!(queue = %self.inner.name, "Retrying halted task");
        self.process();
        Ok(())
    }

    /// Drop the next waiting task, settling it as cancelled.
    ///
    /// On a halted queue this is the task that failed, and processing resumes
    /// as it does after [`TaskQueue::retry`]. Otherwise processing only
    /// restarts when `auto_process` is set.
    pub fn skip(&self) -> Option<Task> {
        let (skipped, was_halted) = {
            let mut state = self.inner.state.lock();
            let was_halted = state.error.take().is_some();
            (state.tasks.pop_front(), was_halted)
        };
        let task = skipped.map(|queued| self.cancel(queued));
        if was_halted || self.inner.config.auto_process {
            self.process();
        }
        task
    }

    /// Cancel every waiting task and lift a halt.
    ///
    /// A task already in flight runs to completion. Returns the number of
    /// cancelled tasks.
    pub fn clear(&self) -> usize {
        let (cleared, idle) = {
            let mut state = self.inner.state.lock();
            state.error = None;
            let cleared: Vec<QueuedTask> = state.tasks.drain(..).collect();
            (cleared, !state.processing)
        };
        let count = cleared.len();
        for queued in cleared {
            self.cancel(queued);
        }
        observe::set_queue_depth(&self.inner.name, 0);
        if idle {
            self.inner.idle.notify_waiters();
        }
        count
    }

    /// Waiting tasks plus the one in flight
    pub fn len(&self) -> usize {
        let state = self.inner.state.lock();
        state.tasks.len() + usize::from(state.current.is_some())
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn is_processing(&self) -> bool {
        self.inner.state.lock().processing
    }

    /// Task in flight
    pub fn current(&self) -> Option<Task> {
        self.inner.state.lock().current.clone()
    }

    /// Failure the queue is halted at
    pub fn error(&self) -> Option<ConfluxError> {
        self.inner.state.lock().error.clone()
    }

    /// Resolves once the queue stops processing: it ran empty or halted.
    pub async fn drained(&self) {
        loop {
            let notified = self.inner.idle.notified();
            if !self.inner.state.lock().processing {
                return;
            }
            notified.await;
        }
    }

    fn cancel(&self, queued: QueuedTask) -> Task {
        let _ = queued.completion.send(Err(ConfluxError::Cancelled(format!(
            "Task '{}' removed from queue '{}'",
            queued.task.id(),
            self.inner.name
        ))));
        queued.task
    }
}

impl std::fmt::Debug for TaskQueue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TaskQueue")
            .field("name", &self.inner.name)
            .field("len", &self.len())
            .field("processing", &self.is_processing())
            .finish()
    }
}

async fn run(inner: Arc<QueueInner>) {
    loop {
        let queued = {
            let mut state = inner.state.lock();
            if state.error.is_some() {
                state.processing = false;
                None
            } else {
                match state.tasks.pop_front() {
                    Some(queued) => {
                        state.current = Some(queued.task.clone());
                        Some(queued)
                    }
                    None => {
                        state.processing = false;
                        None
                    }
                }
            }
        };
        let Some(queued) = queued else {
            inner.idle.notify_waiters();
            return;
        };

        let kind = queued.task.kind;
        debug!(queue = %inner.name, task = %kind, id = queued.task.id(), "Performing task");
        let started = Instant::now();
        let result = match inner.performer.upgrade() {
            Some(performer) => performer.perform(queued.task.clone()).await,
            None => Err(ConfluxError::Cancelled(format!(
                "Performer for queue '{}' was dropped",
                inner.name
            ))),
        };
        observe::record_task(&inner.name, kind.as_str(), started.elapsed(), result.is_ok());

        let depth = {
            let mut state = inner.state.lock();
            state.current = None;
            match result {
                Ok(output) => {
                    let _ = queued.completion.send(Ok(output));
                }
                Err(e) => {
                    warn!(queue = %inner.name, task = %kind, id = queued.task.id(), error = %e, "Task failed");
                    match inner.config.failure_policy {
                        FailurePolicy::Continue => {
                            let _ = queued.completion.send(Err(e));
                        }
                        FailurePolicy::Halt => {
                            state.error = Some(e);
                            state.tasks.push_front(queued);
                        }
                    }
                }
            }
            state.tasks.len()
        };
        observe::set_queue_depth(&inner.name, depth);

        // Let holders of the settled completion observe it before the next task starts
        tokio::task::yield_now().await;
    }
}

/// Settles with the output or error of one queued task
#[must_use = "a task completion does nothing unless awaited"]
pub struct TaskCompletion {
    queue: String,
    receiver: oneshot::Receiver<Result<TaskOutput>>,
}

impl Future for TaskCompletion {
    type Output = Result<TaskOutput>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let queue = self.queue.clone();
        Pin::new(&mut self.receiver).poll(cx).map(|received| {
            received.unwrap_or_else(|_| {
                Err(ConfluxError::Cancelled(format!("Queue '{}' was dropped", queue)))
            })
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicBool, Ordering};

    #[derive(Default)]
    struct Recorder {
        log: Mutex<Vec<String>>,
        in_flight: AtomicBool,
        // Number of times each id fails before succeeding
        failures: Mutex<HashMap<String, usize>>,
    }

    impl Recorder {
        fn failing(id: &str, times: usize) -> Self {
            let recorder = Recorder::default();
            recorder.failures.lock().insert(id.to_string(), times);
            recorder
        }
    }

    #[async_trait]
    impl Performer for Recorder {
        async fn perform(&self, task: Task) -> Result<TaskOutput> {
            assert!(!self.in_flight.swap(true, Ordering::SeqCst), "overlapping tasks");
            let id = task.id().to_string();
            self.log.lock().push(format!("start:{}", id));
            tokio::task::yield_now().await;
            self.log.lock().push(format!("end:{}", id));
            self.in_flight.store(false, Ordering::SeqCst);

            let mut failures = self.failures.lock();
            if let Some(remaining) = failures.get_mut(&id) {
                if *remaining > 0 {
                    *remaining -= 1;
                    return Err(ConfluxError::operation(format!("{} failed", id)));
                }
            }
            Ok(TaskOutput::Data(Value::String(id)))
        }
    }

    fn task(id: &str) -> Task {
        Task::transform(Capability::Push, Transform::new(id, vec![]))
    }

    fn queue(performer: &Arc<Recorder>, config: QueueConfig) -> TaskQueue {
        let weak: Weak<dyn Performer> = Arc::downgrade(performer) as Weak<dyn Performer>;
        TaskQueue::new("test", weak, config)
    }

    #[tokio::test]
    async fn test_fifo_one_at_a_time() {
        let recorder = Arc::new(Recorder::default());
        let queue = queue(&recorder, QueueConfig::default());

        let first = queue.push(task("t1"));
        let second = queue.push(task("t2"));
        let third = queue.push(task("t3"));

        assert_eq!(first.await.unwrap(), TaskOutput::Data("t1".into()));
        assert_eq!(second.await.unwrap(), TaskOutput::Data("t2".into()));
        assert_eq!(third.await.unwrap(), TaskOutput::Data("t3".into()));
        assert_eq!(
            *recorder.log.lock(),
            vec!["start:t1", "end:t1", "start:t2", "end:t2", "start:t3", "end:t3"]
        );
        queue.drained().await;
        assert!(queue.is_empty());
    }

    #[tokio::test]
    async fn test_continue_after_failure() {
        let recorder = Arc::new(Recorder::failing("t1", 1));
        let queue = queue(&recorder, QueueConfig::default());

        let first = queue.push(task("t1"));
        let second = queue.push(task("t2"));

        assert!(first.await.is_err());
        assert!(second.await.is_ok());
        assert!(queue.error().is_none());
    }

    #[tokio::test]
    async fn test_halt_and_retry() {
        let recorder = Arc::new(Recorder::failing("t1", 1));
        let queue = queue(
            &recorder,
            QueueConfig::new().with_failure_policy(FailurePolicy::Halt),
        );

        let first = queue.push(task("t1"));
        let second = queue.push(task("t2"));
        queue.drained().await;

        assert!(queue.error().is_some());
        assert_eq!(queue.len(), 2);

        queue.retry().unwrap();
        assert_eq!(first.await.unwrap(), TaskOutput::Data("t1".into()));
        assert!(second.await.is_ok());
        assert!(queue.retry().is_err());
    }

    #[tokio::test]
    async fn test_halt_and_skip() {
        let recorder = Arc::new(Recorder::failing("t1", 1));
        let queue = queue(
            &recorder,
            QueueConfig::new().with_failure_policy(FailurePolicy::Halt),
        );

        let first = queue.push(task("t1"));
        let second = queue.push(task("t2"));
        queue.drained().await;

        let skipped = queue.skip().unwrap();
        assert_eq!(skipped.id(), "t1");
        assert!(matches!(first.await, Err(ConfluxError::Cancelled(_))));
        assert!(second.await.is_ok());
    }

    #[tokio::test]
    async fn test_skip_resumes_halted_manual_queue() {
        let recorder = Arc::new(Recorder::failing("t1", 1));
        let queue = queue(
            &recorder,
            QueueConfig::new()
                .with_auto_process(false)
                .with_failure_policy(FailurePolicy::Halt),
        );

        let first = queue.push(task("t1"));
        let second = queue.push(task("t2"));
        queue.process();
        queue.drained().await;
        assert!(queue.error().is_some());

        assert_eq!(queue.skip().map(|t| t.id().to_string()), Some("t1".to_string()));
        assert!(matches!(first.await, Err(ConfluxError::Cancelled(_))));
        assert_eq!(second.await.unwrap(), TaskOutput::Data("t2".into()));

        // Without a halt to lift, a manual queue stays idle
        queue.drained().await;
        let third = queue.push(task("t3"));
        let fourth = queue.push(task("t4"));
        assert_eq!(queue.skip().map(|t| t.id().to_string()), Some("t3".to_string()));
        assert!(matches!(third.await, Err(ConfluxError::Cancelled(_))));
        assert!(!queue.is_processing());
        assert_eq!(queue.len(), 1);
        assert_eq!(queue.clear(), 1);
        assert!(fourth.await.is_err());
    }

    #[tokio::test]
    async fn test_manual_processing_and_clear() {
        let recorder = Arc::new(Recorder::default());
        let queue = queue(&recorder, QueueConfig::new().with_auto_process(false));

        let first = queue.push(task("t1"));
        assert_eq!(queue.len(), 1);
        assert!(!queue.is_processing());

        queue.process();
        assert!(first.await.is_ok());
        queue.drained().await;

        let pending = queue.push(task("t2"));
        assert_eq!(queue.clear(), 1);
        assert!(matches!(pending.await, Err(ConfluxError::Cancelled(_))));
        assert_eq!(*recorder.log.lock(), vec!["start:t1", "end:t1"]);
    }

    #[tokio::test]
    async fn test_dropped_performer_cancels() {
        let recorder = Arc::new(Recorder::default());
        let queue = queue(&recorder, QueueConfig::default());
        drop(recorder);

        let err = queue.push(task("t1")).await.unwrap_err();
        assert!(matches!(err, ConfluxError::Cancelled(_)));
    }
}
