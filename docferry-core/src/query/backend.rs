//! Backend seam for the query adapter.

use async_trait::async_trait;
use serde_json::Value;

/// Failure reported by a [`QueryBackend`] call.
///
/// The variant decides the adapter's next step: `Unsupported` and `Execution`
/// are capability signals that trigger the substrate fallback, `Connection`
/// is not and fails the call directly.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum BackendError {
    /// The engine does not implement a stage or operator used by the request
    #[error("unsupported by backend: {0}")]
    Unsupported(String),

    /// The engine accepted the request but failed while executing it
    #[error("execution failed: {0}")]
    Execution(String),

    /// The backend could not be reached or rejected the session
    #[error("connection failed: {0}")]
    Connection(String),
}

impl BackendError {
    /// Whether this error means the native pipeline cannot run on this backend.
    pub fn is_capability(&self) -> bool {
        matches!(self, BackendError::Unsupported(_) | BackendError::Execution(_))
    }
}

/// A backend that can run native pipelines and raw substrate statements.
///
/// Documents cross this seam as JSON values so implementations can use
/// whatever driver representation they like internally.
#[async_trait]
pub trait QueryBackend: Send + Sync {
    /// Stable, secret-free identity used for capability memoization.
    fn profile_key(&self) -> String;

    /// Runs an aggregation pipeline against `collection`.
    async fn run_pipeline(
        &self,
        collection: &str,
        pipeline: Vec<Value>,
    ) -> std::result::Result<Vec<Value>, BackendError>;

    /// Runs a substrate statement through the pass-through channel.
    async fn run_passthrough(&self, statement: &str)
    -> std::result::Result<Vec<Value>, BackendError>;
}

#[async_trait]
impl<T: QueryBackend + ?Sized> QueryBackend for std::sync::Arc<T> {
    fn profile_key(&self) -> String {
        (**self).profile_key()
    }

    async fn run_pipeline(
        &self,
        collection: &str,
        pipeline: Vec<Value>,
    ) -> std::result::Result<Vec<Value>, BackendError> {
        (**self).run_pipeline(collection, pipeline).await
    }

    async fn run_passthrough(
        &self,
        statement: &str,
    ) -> std::result::Result<Vec<Value>, BackendError> {
        (**self).run_passthrough(statement).await
    }
}
