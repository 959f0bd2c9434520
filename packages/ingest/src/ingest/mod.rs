// packages/ingest/src/ingest/mod.rs
//! Build event ingestion
//!
//! - **Handler**: the all-or-nothing streaming protocol
//! - **Ack**: sequence tracking and completeness check
//! - **Session**: per-stream event processing
//! - **Forwarder**: best-effort replication to proxy targets
//! - **Lifecycle**: fire-and-forget lifecycle relay
//!
//! # Architecture
//!
//! ```text
//! client ──events──► StreamIngestHandler ──► EventSession ──► BlobStore
//!                          │
//!                          └──try_send──► ForwardingStream ──► proxy target
//! ```

pub mod ack;
pub mod forwarder;
pub mod handler;
pub mod lifecycle;
pub mod session;

use std::sync::Arc;

// Re-export commonly used types
pub use ack::AckSet;
pub use forwarder::{EventReceiver, ForwardingStream, ProxyTarget};
pub use handler::StreamIngestHandler;
pub use lifecycle::LifecycleRelay;
pub use session::{BlobEventSession, BlobSessionFactory, EventSession, SessionFactory};

/// Collaborators shared by every stream, built once at startup
#[derive(Clone)]
pub struct IngestContext {
    pub sessions: Arc<dyn SessionFactory>,
    pub proxies: Vec<Arc<dyn ProxyTarget>>,

    /// Events buffered per proxy target and stream
    pub forward_buffer: usize,
}

impl IngestContext {
    pub fn new(sessions: Arc<dyn SessionFactory>) -> Self {
        Self {
            sessions,
            proxies: Vec::new(),
            forward_buffer: 1024,
        }
    }

    pub fn with_proxies(mut self, proxies: Vec<Arc<dyn ProxyTarget>>) -> Self {
        self.proxies = proxies;
        self
    }

    pub fn with_forward_buffer(mut self, capacity: usize) -> Self {
        self.forward_buffer = capacity;
        self
    }
}
