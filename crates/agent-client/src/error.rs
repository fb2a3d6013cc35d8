//! The control-plane client's error taxonomy.

use adno_agent_transport::TransportError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ClientError {
    /// 401 — bearer rejected. Fatal at startup (`authenticate`); surfaced
    /// as an ordinary error from individual calls at runtime.
    #[error("credential rejected by control plane")]
    Unauthorized,

    /// 403 — bearer valid but not authorized for this operation. Fatal at
    /// startup; logged-and-continued elsewhere.
    #[error("insufficient permission")]
    Forbidden,

    /// Everything else: transient failures, non-retryable 4xx, circuit-open,
    /// or a response that didn't decode into the expected shape.
    #[error(transparent)]
    Infra(TransportError),
}

impl From<TransportError> for ClientError {
    fn from(err: TransportError) -> Self {
        match err.status() {
            Some(401) => ClientError::Unauthorized,
            Some(403) => ClientError::Forbidden,
            _ => ClientError::Infra(err),
        }
    }
}
