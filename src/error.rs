/// Error taxonomy shared by the ingestion, query and admin operations.
///
/// `MonitorError` is what every core operation returns; `StoreError` is what
/// a `PlantStore` implementation returns and is wrapped as
/// `MonitorError::Store`. HTTP status mapping lives here so the endpoint and
/// the command-line tools agree on it.

use thiserror::Error;

use crate::export::ExportError;

/// Failure reported by a backing store.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("database error: {0}")]
    Postgres(#[from] postgres::Error),

    /// A stored row could not be mapped onto the model (e.g. an unknown
    /// lifecycle label written by another tool).
    #[error("malformed row: {0}")]
    InvalidRow(String),
}

/// Error returned by core operations.
#[derive(Debug, Error)]
pub enum MonitorError {
    /// Missing or malformed caller input.
    #[error("validation error: {0}")]
    Validation(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("conflict: {0}")]
    Conflict(String),

    #[error(transparent)]
    Store(#[from] StoreError),

    /// Rendering a result set failed on the server side.
    #[error(transparent)]
    Export(#[from] ExportError),
}

impl MonitorError {
    pub fn validation(message: impl Into<String>) -> Self {
        MonitorError::Validation(message.into())
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        MonitorError::NotFound(message.into())
    }

    /// HTTP status used when this error reaches the endpoint.
    pub fn status_code(&self) -> u16 {
        match self {
            MonitorError::Validation(_) => 400,
            MonitorError::NotFound(_) => 404,
            MonitorError::Conflict(_) => 409,
            MonitorError::Store(_) | MonitorError::Export(_) => 500,
        }
    }

    /// Message safe to return to a client. Store details stay in the logs.
    pub fn public_message(&self) -> String {
        match self {
            MonitorError::Store(_) => "Database error".to_string(),
            MonitorError::Export(_) => "Export failed".to_string(),
            other => other.to_string(),
        }
    }
}
