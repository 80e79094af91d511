use async_trait::async_trait;
use conflux_core::{Capabilities, Capability, ConfluxError, Query, Result, Transform};
use serde_json::Value;

/// Executes a source's operations against its underlying store.
///
/// A source wraps a backend with queuing, logging and events; the backend
/// only does the work. Operations a backend does not advertise in
/// [`SourceBackend::capabilities`] are rejected by the source before they
/// reach the backend.
///
/// # Example
///
/// ```ignore
/// struct Remote { client: Client }
///
/// #[async_trait]
/// impl SourceBackend for Remote {
///     fn capabilities(&self) -> Capabilities {
///         Capabilities::none().with(Capability::Push)
///     }
///
///     async fn push(&self, transform: &Transform) -> Result<Vec<Transform>> {
///         self.client.send(transform).await?;
///         Ok(vec![transform.clone()])
///     }
/// }
/// ```
#[async_trait]
pub trait SourceBackend: Send + Sync {
    fn capabilities(&self) -> Capabilities;

    /// Fetch the transforms that answer `query`
    async fn pull(&self, _query: &Query) -> Result<Vec<Transform>> {
        Err(not_implemented(Capability::Pull))
    }

    /// Apply `transform`, returning the transforms that were actually applied
    async fn push(&self, _transform: &Transform) -> Result<Vec<Transform>> {
        Err(not_implemented(Capability::Push))
    }

    /// Apply `transform`, returning any resulting data
    async fn update(&self, _transform: &Transform) -> Result<Value> {
        Err(not_implemented(Capability::Update))
    }

    async fn query(&self, _query: &Query) -> Result<Value> {
        Err(not_implemented(Capability::Query))
    }

    /// Apply a transform that already happened elsewhere
    async fn sync(&self, _transform: &Transform) -> Result<()> {
        Err(not_implemented(Capability::Sync))
    }
}

fn not_implemented(capability: Capability) -> ConfluxError {
    ConfluxError::operation(format!("{} is not implemented by this backend", capability))
}
