// packages/ingest/src/ingest/handler.rs
//! Streaming ingestion protocol
//!
//! One call carries every event of one invocation stream:
//!
//! ```text
//! AwaitingFirstEvent ──first event──► Streaming ──clean end──► Finalizing
//!        │                               │                       │
//!        │  open session + proxies       │  forward, delegate,   ├─ 1..=N complete → acks
//!        │                               │  record seq           └─ gap/duplicate  → Aborted
//!        └───────────── any error ───────┴──────────────────────────► abort, zero acks
//! ```
//!
//! Nothing is acknowledged unless every sequence number `1..=N` arrived and
//! every event was handled, so a client that sees an error simply resends
//! the whole stream.

use crate::grpc::proto::{PublishBuildToolEventStreamResponse, StreamId};
use crate::grpc::ToolEventRequest;
use crate::ingest::ack::AckSet;
use crate::ingest::forwarder::{ForwardingStream, ProxyTarget};
use crate::ingest::session::{EventSession, SessionFactory};
use crate::ingest::IngestContext;
use crate::observability::{ACKS_SENT, EVENTS_RECEIVED, STREAMS_ABORTED};
use crate::utils::errors::{IngestError, Result};
use futures::{Stream, StreamExt};
use std::sync::Arc;
use tonic::Status;
use tracing::{debug, error, info, instrument};

/// Accepts event streams and decides their acknowledgment
pub struct StreamIngestHandler {
    sessions: Arc<dyn SessionFactory>,
    proxies: Vec<Arc<dyn ProxyTarget>>,
    forward_buffer: usize,
}

/// State owned by a stream once its first event arrived
struct ActiveStream {
    stream_id: StreamId,
    session: Box<dyn EventSession>,
    forwarders: Vec<ForwardingStream>,
    acks: AckSet,
}

impl StreamIngestHandler {
    pub fn new(context: &IngestContext) -> Self {
        Self {
            sessions: Arc::clone(&context.sessions),
            proxies: context.proxies.clone(),
            forward_buffer: context.forward_buffer,
        }
    }

    /// Run one stream to completion, returning the acks to send
    ///
    /// Acks are only produced after the client half-closed and the stream
    /// proved complete; any error means no ack at all.
    #[instrument(name = "event_stream", skip_all)]
    pub async fn ingest<S>(&self, inbound: S) -> Result<Vec<PublishBuildToolEventStreamResponse>>
    where
        S: Stream<Item = std::result::Result<ToolEventRequest, Status>> + Send,
    {
        let result = self.run(inbound).await;
        if let Err(e) = &result {
            error!("Aborting event stream: {}", e);
            metrics::counter!(STREAMS_ABORTED).increment(1);
        }
        result
    }

    async fn run<S>(&self, inbound: S) -> Result<Vec<PublishBuildToolEventStreamResponse>>
    where
        S: Stream<Item = std::result::Result<ToolEventRequest, Status>> + Send,
    {
        let mut inbound = std::pin::pin!(inbound);

        // `None` until the first event identifies the stream.
        let mut active: Option<ActiveStream> = None;

        while let Some(request) = inbound.next().await {
            let request = request?;
            let sequence_number = match &request.ordered_build_event {
                Some(ordered) => ordered.sequence_number,
                None => {
                    return Err(IngestError::InvalidEvent(
                        "request carries no ordered build event".to_string(),
                    ))
                }
            };

            let stream = match active {
                Some(ref mut stream) => stream,
                None => active.insert(self.open(&request).await?),
            };

            metrics::counter!(EVENTS_RECEIVED).increment(1);
            stream.handle(request, sequence_number).await?;
        }

        match active {
            Some(stream) => stream.finalize(),
            None => {
                debug!("Stream ended before any event");
                Ok(Vec::new())
            }
        }
    }

    /// Leave `AwaitingFirstEvent`: bind a session and proxies to the stream
    async fn open(&self, first: &ToolEventRequest) -> Result<ActiveStream> {
        let stream_id = first
            .ordered_build_event
            .as_ref()
            .and_then(|ordered| ordered.stream_id.clone())
            .ok_or_else(|| IngestError::InvalidEvent("first event carries no stream id".to_string()))?;

        info!(
            invocation_id = %stream_id.invocation_id,
            build_id = %stream_id.build_id,
            "Opening event stream"
        );

        let session = self.sessions.open(&stream_id).await?;
        let forwarders = self
            .proxies
            .iter()
            .map(|target| ForwardingStream::open(Arc::clone(target), self.forward_buffer))
            .collect();

        Ok(ActiveStream {
            stream_id,
            session,
            forwarders,
            acks: AckSet::new(),
        })
    }
}

impl ActiveStream {
    async fn handle(&mut self, request: ToolEventRequest, sequence_number: i64) -> Result<()> {
        for forwarder in &self.forwarders {
            forwarder.forward(&request);
        }

        self.session.handle_event(&request).await.map_err(|e| {
            error!(
                "Error handling event {}; this means a broken build command: {}",
                sequence_number, e
            );
            e
        })?;

        self.acks.record(sequence_number);
        debug!("Handled event {} of {}", sequence_number, self.stream_id.invocation_id);

        Ok(())
    }

    /// Clean end of input: acknowledge everything or nothing
    fn finalize(self) -> Result<Vec<PublishBuildToolEventStreamResponse>> {
        let ActiveStream {
            stream_id,
            forwarders,
            acks,
            ..
        } = self;

        // Half-close; proxies finish their calls on their own.
        for forwarder in forwarders {
            drop(forwarder.close());
        }

        let total = acks.len();
        let ordered = acks.into_ordered()?;

        info!(
            invocation_id = %stream_id.invocation_id,
            "Acknowledging {} events",
            total
        );
        metrics::counter!(ACKS_SENT).increment(total as u64);

        Ok(ordered
            .into_iter()
            .map(|sequence_number| PublishBuildToolEventStreamResponse {
                stream_id: Some(stream_id.clone()),
                sequence_number,
            })
            .collect())
    }
}
