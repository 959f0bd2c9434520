// packages/ingest/src/ingest/session.rs
//! Per-stream event processing sessions
//!
//! The handler opens one session per stream and feeds it every event in
//! arrival order, one call at a time, so a session may keep unsynchronized
//! per-invocation state.

use crate::blobstore::{BlobStore, BlobWriter};
use crate::grpc::proto::StreamId;
use crate::grpc::ToolEventRequest;
use crate::utils::errors::{IngestError, Result};
use async_trait::async_trait;
use prost::Message;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Processes the events of a single stream
#[async_trait]
pub trait EventSession: Send {
    /// Handle one event; an error aborts the whole stream
    async fn handle_event(&mut self, request: &ToolEventRequest) -> Result<()>;
}

/// Opens a dedicated [`EventSession`] for each new stream
#[async_trait]
pub trait SessionFactory: Send + Sync {
    async fn open(&self, stream_id: &StreamId) -> Result<Box<dyn EventSession>>;
}

/// Factory for [`BlobEventSession`]s writing into one blob store
pub struct BlobSessionFactory {
    store: Arc<dyn BlobStore>,
}

impl BlobSessionFactory {
    pub fn new(store: Arc<dyn BlobStore>) -> Self {
        Self { store }
    }
}

/// Blob holding the event log of an invocation
pub fn event_log_name(invocation_id: &str) -> String {
    format!("{}/events.pb", invocation_id)
}

#[async_trait]
impl SessionFactory for BlobSessionFactory {
    async fn open(&self, stream_id: &StreamId) -> Result<Box<dyn EventSession>> {
        if stream_id.invocation_id.is_empty() {
            return Err(IngestError::InvalidEvent(
                "stream id carries no invocation id".to_string(),
            ));
        }

        let name = event_log_name(&stream_id.invocation_id);
        let writer = self.store.blob_writer(&name).await?;

        info!("Opened event log {} for build {}", name, stream_id.build_id);

        Ok(Box::new(BlobEventSession {
            name,
            writer: Some(writer),
            events: 0,
        }))
    }
}

/// Appends length-delimited requests to the invocation's event log
///
/// Each entry holds the request bytes exactly as the client sent them.
///
/// The log is committed when the component stream reports it finished. A
/// stream that aborts earlier drops the writer and leaves any previous log
/// untouched.
pub struct BlobEventSession {
    name: String,
    writer: Option<BlobWriter>,
    events: u64,
}

#[async_trait]
impl EventSession for BlobEventSession {
    async fn handle_event(&mut self, request: &ToolEventRequest) -> Result<()> {
        let Some(ordered) = &request.ordered_build_event else {
            return Err(IngestError::InvalidEvent("missing ordered build event".to_string()));
        };

        let Some(writer) = self.writer.as_mut() else {
            warn!(
                "Event {} arrived after {} was committed; ignoring",
                ordered.sequence_number, self.name
            );
            return Ok(());
        };

        writer.append(&request.encode_length_delimited_to_vec()).await?;
        self.events += 1;

        let finished = ordered
            .event
            .as_ref()
            .map(|event| event.is_stream_finished())
            .unwrap_or(false);

        if finished {
            if let Some(writer) = self.writer.take() {
                let stored = writer.commit().await?;
                info!("Committed {} events to {} ({} bytes)", self.events, self.name, stored);
            }
        } else {
            debug!("Appended event {} to {}", ordered.sequence_number, self.name);
        }

        Ok(())
    }
}
