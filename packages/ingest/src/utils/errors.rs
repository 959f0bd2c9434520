// packages/ingest/src/utils/errors.rs
//! Error types for the ingestion server

use crate::blobstore::BlobError;
use thiserror::Error;
use tonic::Status;

/// Crate-wide result type
pub type Result<T> = std::result::Result<T, IngestError>;

/// Errors raised while configuring the server or processing an event stream
#[derive(Error, Debug)]
pub enum IngestError {
    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Invalid event: {0}")]
    InvalidEvent(String),

    #[error("Event handling failed: {0}")]
    SessionFailed(String),

    #[error("Incomplete event stream: saw sequence number {saw}, wanted {wanted}")]
    IncompleteStream { saw: i64, wanted: i64 },

    #[error("Inbound stream failed: {0}")]
    Transport(#[from] Status),

    #[error("Storage error: {0}")]
    Storage(#[from] BlobError),

    #[error("Server error: {0}")]
    ServerError(String),
}

impl From<config::ConfigError> for IngestError {
    fn from(err: config::ConfigError) -> Self {
        IngestError::ConfigError(err.to_string())
    }
}

impl From<IngestError> for Status {
    fn from(err: IngestError) -> Self {
        match err {
            IngestError::Transport(status) => status,
            IngestError::InvalidEvent(msg) => Status::invalid_argument(msg),
            // The client only recovers by resending the whole stream.
            err @ IngestError::IncompleteStream { .. } => Status::aborted(err.to_string()),
            err => Status::internal(err.to_string()),
        }
    }
}
