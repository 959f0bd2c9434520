// packages/ingest/src/lib.rs
//! Build Event Ingestion Server Library
//!
//! Accepts build event streams from build clients, acknowledges them all or
//! nothing, replicates them best-effort to proxy servers, and persists event
//! payloads through a pluggable blob store.
//!
//! # Architecture
//!
//! The server is structured into several key modules:
//!
//! - **ingest**: streaming protocol state machine, sessions, proxy fan-out
//! - **blobstore**: storage abstraction with disk and cloud backends
//! - **grpc**: wire messages, service routing and proxy client
//! - **observability**: tracing and metrics setup
//! - **utils**: configuration and error types

// Public module exports
pub mod blobstore;
pub mod grpc;
pub mod ingest;
pub mod observability;
pub mod utils;

// Re-export commonly used types
pub use blobstore::{BackendConfig, BlobError, BlobResult, BlobStore};
pub use grpc::PublishBuildEventService;
pub use ingest::{IngestContext, LifecycleRelay, StreamIngestHandler};
pub use utils::config::ServerConfig;
pub use utils::errors::{IngestError, Result};

// Version information
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_version() {
        assert!(!VERSION.is_empty());
    }
}
