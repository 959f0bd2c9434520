// packages/ingest/src/blobstore/error.rs
use thiserror::Error;

/// Result type for blob operations
pub type BlobResult<T> = std::result::Result<T, BlobError>;

/// Errors that can occur during blob operations
#[derive(Error, Debug)]
pub enum BlobError {
    #[error("Invalid blob name: {name} must not contain '..' and must not be empty")]
    InvalidName { name: String },

    #[error("Blob not found: {name}")]
    NotFound { name: String },

    #[error("Blob {name} is gzip-framed but could not be decompressed: {source}")]
    Corrupt {
        name: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Storage backend error: {source}")]
    Backend {
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    #[error("I/O error: {source}")]
    Io {
        #[from]
        source: std::io::Error,
    },
}

impl BlobError {
    /// Create a backend error from any error type
    pub fn backend<E>(error: E) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        Self::Backend {
            source: Box::new(error),
        }
    }

    /// Create a not found error
    pub fn not_found<S: Into<String>>(name: S) -> Self {
        Self::NotFound { name: name.into() }
    }

    /// Map an I/O error, folding `ErrorKind::NotFound` into the canonical not-found variant
    pub fn from_io(name: &str, error: std::io::Error) -> Self {
        if error.kind() == std::io::ErrorKind::NotFound {
            Self::not_found(name)
        } else {
            Self::Io { source: error }
        }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }
}
