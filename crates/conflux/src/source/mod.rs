//! Sources: event-emitting wrappers around a store
//!
//! A [`Source`] owns one [`TransformLog`] and two [`TaskQueue`]s. Externally
//! initiated operations (`push`, `pull`, `update`, `query`) run on the request
//! queue; transforms relayed from other sources (`sync`) run on the sync queue.
//!
//! Every operation follows the same flow:
//!
//! ```text
//! beforeX (fulfill) -> backend call -> log + `transform` per new transform -> X (settle)
//!                   \-> on any failure: XFail (settle, listener errors logged) -> error re-raised
//! ```
//!
//! `transform` events are settled one transform at a time, after the id has
//! been appended, so a listener can rely on the log already containing it.

mod backend;
mod event;
mod memory;

pub use backend::SourceBackend;
pub use event::{EventKind, Interface, SourceEvent};
pub use memory::MemoryBackend;

use async_trait::async_trait;
use conflux_core::{
    Bucket, Capabilities, Capability, ConfluxError, Context, Event, EventEmitter, ListenerFuture,
    ListenerHandle, Operation, Performer, Query, QueryExpression, Result, SourceConfig, Task,
    TaskOutput, TaskPayload, TaskQueue, Transform, TransformLog,
};
use serde_json::Value;
use std::fmt;
use std::future::Future;
use std::sync::{Arc, Weak};
use tracing::{debug, warn};

/// A transform, or operations to wrap in a new transform
#[derive(Debug, Clone)]
pub enum TransformInput {
    Transform(Transform),
    Operations(Vec<Operation>),
}

impl TransformInput {
    fn build(self, context: &Context) -> Transform {
        match self {
            TransformInput::Transform(transform) => transform,
            TransformInput::Operations(operations) => {
                context.build_transform(operations, None, None)
            }
        }
    }
}

impl From<Transform> for TransformInput {
    fn from(transform: Transform) -> Self {
        TransformInput::Transform(transform)
    }
}

impl From<Vec<Operation>> for TransformInput {
    fn from(operations: Vec<Operation>) -> Self {
        TransformInput::Operations(operations)
    }
}

impl From<Operation> for TransformInput {
    fn from(operation: Operation) -> Self {
        TransformInput::Operations(vec![operation])
    }
}

/// A query, or an expression to wrap in a new query
#[derive(Debug, Clone)]
pub enum QueryInput {
    Query(Query),
    Expression(QueryExpression),
}

impl QueryInput {
    fn build(self, context: &Context) -> Query {
        match self {
            QueryInput::Query(query) => query,
            QueryInput::Expression(expression) => context.build_query(expression, None, None),
        }
    }
}

impl From<Query> for QueryInput {
    fn from(query: Query) -> Self {
        QueryInput::Query(query)
    }
}

impl From<QueryExpression> for QueryInput {
    fn from(expression: QueryExpression) -> Self {
        QueryInput::Expression(expression)
    }
}

/// Builder for [`Source`]
pub struct SourceBuilder {
    config: SourceConfig,
    backend: Arc<dyn SourceBackend>,
    bucket: Option<Arc<dyn Bucket>>,
    context: Context,
    capabilities: Option<Capabilities>,
}

impl SourceBuilder {
    pub fn new(name: impl Into<String>, backend: Arc<dyn SourceBackend>) -> Self {
        Self {
            config: SourceConfig::new(name),
            backend,
            bucket: None,
            context: Context::new(),
            capabilities: None,
        }
    }

    /// Replace the whole configuration, name included
    pub fn with_config(mut self, config: SourceConfig) -> Self {
        self.config = config;
        self
    }

    /// Persist the transform log in `bucket`
    pub fn with_bucket(mut self, bucket: Arc<dyn Bucket>) -> Self {
        self.bucket = Some(bucket);
        self
    }

    pub fn with_context(mut self, context: Context) -> Self {
        self.context = context;
        self
    }

    /// Advertise a subset of the backend's capabilities
    pub fn with_capabilities(mut self, capabilities: Capabilities) -> Self {
        self.capabilities = Some(capabilities);
        self
    }

    pub fn build(self) -> Arc<Source> {
        let SourceBuilder {
            config,
            backend,
            bucket,
            context,
            capabilities,
        } = self;
        let capabilities = capabilities.unwrap_or_else(|| backend.capabilities());
        let log = match bucket {
            Some(bucket) => TransformLog::with_bucket(config.log_name(), bucket),
            None => TransformLog::new(config.log_name()),
        };

        Arc::new_cyclic(|source: &Weak<Source>| {
            let performer: Weak<dyn Performer> = source.clone() as Weak<dyn Performer>;
            Source {
                request_queue: TaskQueue::new(
                    config.request_queue_name(),
                    performer.clone(),
                    config.request_queue.clone(),
                ),
                sync_queue: TaskQueue::new(
                    config.sync_queue_name(),
                    performer,
                    config.sync_queue.clone(),
                ),
                name: config.name.clone(),
                config,
                log,
                events: EventEmitter::new(),
                capabilities,
                backend,
                context,
            }
        })
    }
}

/// A named, event-emitting store with exactly-once transform application
pub struct Source {
    name: String,
    config: SourceConfig,
    log: TransformLog,
    request_queue: TaskQueue,
    sync_queue: TaskQueue,
    events: EventEmitter<SourceEvent>,
    capabilities: Capabilities,
    backend: Arc<dyn SourceBackend>,
    context: Context,
}

impl Source {
    pub fn builder(name: impl Into<String>, backend: Arc<dyn SourceBackend>) -> SourceBuilder {
        SourceBuilder::new(name, backend)
    }

    /// Source with default configuration over `backend`
    pub fn new(name: impl Into<String>, backend: Arc<dyn SourceBackend>) -> Arc<Source> {
        SourceBuilder::new(name, backend).build()
    }

    /// Source over a fresh [`MemoryBackend`]
    pub fn memory(name: impl Into<String>) -> Arc<Source> {
        Self::new(name, Arc::new(MemoryBackend::new()))
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn config(&self) -> &SourceConfig {
        &self.config
    }

    pub fn transform_log(&self) -> &TransformLog {
        &self.log
    }

    pub fn request_queue(&self) -> &TaskQueue {
        &self.request_queue
    }

    pub fn sync_queue(&self) -> &TaskQueue {
        &self.sync_queue
    }

    pub fn capabilities(&self) -> Capabilities {
        self.capabilities
    }

    pub fn supports(&self, capability: Capability) -> bool {
        self.capabilities.supports(capability)
    }

    pub fn context(&self) -> &Context {
        &self.context
    }

    pub fn backend(&self) -> &Arc<dyn SourceBackend> {
        &self.backend
    }

    /// Emitter for this source's events
    pub fn events(&self) -> &EventEmitter<SourceEvent> {
        &self.events
    }

    /// Register a listener. Returning a future makes the source wait for it.
    pub fn on<F>(&self, kind: EventKind, listener: F) -> ListenerHandle
    where
        F: Fn(&SourceEvent) -> Option<ListenerFuture> + Send + Sync + 'static,
    {
        self.events.on(kind, listener)
    }

    pub fn off(&self, handle: ListenerHandle) -> bool {
        self.events.off(handle)
    }

    /// Fire-and-forget delivery to this source's listeners
    pub fn emit(&self, event: &SourceEvent) {
        self.events.emit(event)
    }

    /// Apply a transform (or bare operations) and return the applied transforms.
    ///
    /// Resolves to an empty list if the transform is already logged.
    pub async fn push(&self, input: impl Into<TransformInput>) -> Result<Vec<Transform>> {
        self.require(Capability::Push)?;
        self.log.reified().await?;
        let transform = input.into().build(&self.context);
        if self.log.contains(&transform.id) {
            debug!(source = %self.name, id = %transform.id, "Transform already logged, skipping push");
            return Ok(Vec::new());
        }
        let output = self
            .request_queue
            .push(Task::transform(Capability::Push, transform))
            .await?;
        Ok(output.into_transforms())
    }

    /// Fetch transforms answering a query and log them
    pub async fn pull(&self, input: impl Into<QueryInput>) -> Result<Vec<Transform>> {
        self.require(Capability::Pull)?;
        let query = input.into().build(&self.context);
        let output = self
            .request_queue
            .push(Task::query(Capability::Pull, query))
            .await?;
        Ok(output.into_transforms())
    }

    /// Apply a transform and return the resulting data.
    ///
    /// Resolves to `null` if the transform is already logged.
    pub async fn update(&self, input: impl Into<TransformInput>) -> Result<Value> {
        self.require(Capability::Update)?;
        self.log.reified().await?;
        let transform = input.into().build(&self.context);
        if self.log.contains(&transform.id) {
            debug!(source = %self.name, id = %transform.id, "Transform already logged, skipping update");
            return Ok(Value::Null);
        }
        let output = self
            .request_queue
            .push(Task::transform(Capability::Update, transform))
            .await?;
        Ok(output.into_data())
    }

    pub async fn query(&self, input: impl Into<QueryInput>) -> Result<Value> {
        self.require(Capability::Query)?;
        let query = input.into().build(&self.context);
        let output = self
            .request_queue
            .push(Task::query(Capability::Query, query))
            .await?;
        Ok(output.into_data())
    }

    /// Apply a transform that already happened on another source
    pub async fn sync(&self, transform: Transform) -> Result<()> {
        self.require(Capability::Sync)?;
        self.log.reified().await?;
        if self.log.contains(&transform.id) {
            debug!(source = %self.name, id = %transform.id, "Transform already logged, skipping sync");
            return Ok(());
        }
        self.sync_queue
            .push(Task::transform(Capability::Sync, transform))
            .await?;
        Ok(())
    }

    /// Sync transforms one after another, stopping at the first failure
    pub async fn sync_all(&self, transforms: Vec<Transform>) -> Result<()> {
        for transform in transforms {
            self.sync(transform).await?;
        }
        Ok(())
    }

    /// Run a capability with a task payload, the way strategies relay events
    pub async fn invoke(&self, capability: Capability, payload: TaskPayload) -> Result<TaskOutput> {
        match (capability, payload) {
            (Capability::Push, TaskPayload::Transform(t)) => {
                self.push(t).await.map(TaskOutput::Transforms)
            }
            (Capability::Update, TaskPayload::Transform(t)) => {
                self.update(t).await.map(TaskOutput::Data)
            }
            (Capability::Sync, TaskPayload::Transform(t)) => {
                self.sync(t).await.map(|()| TaskOutput::None)
            }
            (Capability::Pull, TaskPayload::Query(q)) => {
                self.pull(q).await.map(TaskOutput::Transforms)
            }
            (Capability::Query, TaskPayload::Query(q)) => {
                self.query(q).await.map(TaskOutput::Data)
            }
            (capability, _) => Err(ConfluxError::config(format!(
                "{} on source '{}' expects a {:?} payload",
                capability,
                self.name,
                capability.payload()
            ))),
        }
    }

    fn require(&self, capability: Capability) -> Result<()> {
        if self.capabilities.supports(capability) {
            Ok(())
        } else {
            Err(ConfluxError::Unsupported {
                source_name: self.name.clone(),
                capability: capability.to_string(),
            })
        }
    }

    /// Log each new transform and settle its `transform` event before the next
    async fn transformed(&self, transforms: &[Transform]) -> Result<()> {
        for transform in transforms {
            if self.log.append(transform.id.clone()).await? {
                self.events
                    .settle(&SourceEvent::Transform(transform.clone()))
                    .await?;
            }
        }
        Ok(())
    }

    async fn run_flow<T, F>(
        &self,
        before: SourceEvent,
        operation: F,
        after: impl FnOnce(&T) -> SourceEvent,
        fail: impl FnOnce(ConfluxError) -> SourceEvent,
    ) -> Result<T>
    where
        F: Future<Output = Result<T>>,
    {
        let result: Result<T> = async {
            self.events.fulfill(&before).await?;
            let output = operation.await?;
            self.events.settle(&after(&output)).await?;
            Ok(output)
        }
        .await;

        match result {
            Ok(output) => Ok(output),
            Err(e) => {
                let failure = fail(e.clone());
                if let Err(listener_error) = self.events.settle(&failure).await {
                    warn!(
                        source = %self.name,
                        event = %failure.kind(),
                        error = %listener_error,
                        "Failure listener failed"
                    );
                }
                Err(e)
            }
        }
    }

    async fn perform_push(&self, transform: Transform) -> Result<Vec<Transform>> {
        if self.log.contains(&transform.id) {
            return Ok(Vec::new());
        }
        self.run_flow(
            SourceEvent::BeforePush(transform.clone()),
            async {
                let applied = self.backend.push(&transform).await?;
                self.transformed(&applied).await?;
                Ok(applied)
            },
            |applied| SourceEvent::Push(transform.clone(), applied.clone()),
            |e| SourceEvent::PushFail(transform.clone(), e),
        )
        .await
    }

    async fn perform_pull(&self, query: Query) -> Result<Vec<Transform>> {
        self.run_flow(
            SourceEvent::BeforePull(query.clone()),
            async {
                let pulled = self.backend.pull(&query).await?;
                self.transformed(&pulled).await?;
                Ok(pulled)
            },
            |pulled| SourceEvent::Pull(query.clone(), pulled.clone()),
            |e| SourceEvent::PullFail(query.clone(), e),
        )
        .await
    }

    async fn perform_update(&self, transform: Transform) -> Result<Value> {
        if self.log.contains(&transform.id) {
            return Ok(Value::Null);
        }
        self.run_flow(
            SourceEvent::BeforeUpdate(transform.clone()),
            async {
                let data = self.backend.update(&transform).await?;
                self.transformed(std::slice::from_ref(&transform)).await?;
                Ok(data)
            },
            |data| SourceEvent::Update(transform.clone(), data.clone()),
            |e| SourceEvent::UpdateFail(transform.clone(), e),
        )
        .await
    }

    async fn perform_query(&self, query: Query) -> Result<Value> {
        self.run_flow(
            SourceEvent::BeforeQuery(query.clone()),
            self.backend.query(&query),
            |data| SourceEvent::Query(query.clone(), data.clone()),
            |e| SourceEvent::QueryFail(query.clone(), e),
        )
        .await
    }

    async fn perform_sync(&self, transform: Transform) -> Result<()> {
        if self.log.contains(&transform.id) {
            return Ok(());
        }
        self.run_flow(
            SourceEvent::BeforeSync(transform.clone()),
            async {
                self.backend.sync(&transform).await?;
                self.transformed(std::slice::from_ref(&transform)).await
            },
            |()| SourceEvent::Sync(transform.clone()),
            |e| SourceEvent::SyncFail(transform.clone(), e),
        )
        .await
    }
}

#[async_trait]
impl Performer for Source {
    async fn perform(&self, task: Task) -> Result<TaskOutput> {
        match (task.kind, task.payload) {
            (Capability::Push, TaskPayload::Transform(t)) => {
                self.perform_push(t).await.map(TaskOutput::Transforms)
            }
            (Capability::Pull, TaskPayload::Query(q)) => {
                self.perform_pull(q).await.map(TaskOutput::Transforms)
            }
            (Capability::Update, TaskPayload::Transform(t)) => {
                self.perform_update(t).await.map(TaskOutput::Data)
            }
            (Capability::Query, TaskPayload::Query(q)) => {
                self.perform_query(q).await.map(TaskOutput::Data)
            }
            (Capability::Sync, TaskPayload::Transform(t)) => {
                self.perform_sync(t).await.map(|()| TaskOutput::None)
            }
            (kind, _) => Err(ConfluxError::InvalidState(format!(
                "Task '{}' on source '{}' carries the wrong payload",
                kind, self.name
            ))),
        }
    }
}

impl fmt::Debug for Source {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Source")
            .field("name", &self.name)
            .field("capabilities", &self.capabilities)
            .field("log", &self.log)
            .finish_non_exhaustive()
    }
}
