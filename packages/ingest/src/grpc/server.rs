// packages/ingest/src/grpc/server.rs
//! `PublishBuildEvent` service implementation
//!
//! Dispatches the two RPCs onto [`StreamIngestHandler`] and
//! [`LifecycleRelay`]. Acks are produced lazily by the response stream, so a
//! client disconnect drops the in-flight stream processing with it.

use crate::grpc::proto::publish_build_event_server::{PublishBuildEvent, PublishBuildEventServer};
use crate::grpc::proto::{Empty, PublishBuildToolEventStreamResponse};
use crate::grpc::{LifecycleEventRequest, ToolEventRequest};
use crate::ingest::{IngestContext, LifecycleRelay, StreamIngestHandler};
use futures::Stream;
use std::pin::Pin;
use std::sync::Arc;
use tonic::{Request, Response, Status, Streaming};
use tracing::debug;

/// Server-side ack stream
pub type AckStream = Pin<Box<dyn Stream<Item = Result<PublishBuildToolEventStreamResponse, Status>> + Send>>;

/// Stream ingestion and lifecycle relay behind the generated service
#[derive(Clone)]
pub struct PublishBuildEventService {
    handler: Arc<StreamIngestHandler>,
    relay: Arc<LifecycleRelay>,
}

impl PublishBuildEventService {
    pub fn new(context: &IngestContext) -> Self {
        Self {
            handler: Arc::new(StreamIngestHandler::new(context)),
            relay: Arc::new(LifecycleRelay::new(context.proxies.clone())),
        }
    }

    /// Wrap into the tonic service added to the server
    pub fn into_server(self) -> PublishBuildEventServer<Self> {
        PublishBuildEventServer::new(self)
    }

    /// Run one ingestion stream; acks are yielded only after it completed
    pub fn ack_stream<S>(&self, inbound: S) -> AckStream
    where
        S: Stream<Item = Result<ToolEventRequest, Status>> + Send + 'static,
    {
        let handler = Arc::clone(&self.handler);
        Box::pin(async_stream::stream! {
            match handler.ingest(inbound).await {
                Ok(acks) => {
                    for ack in acks {
                        yield Ok::<_, Status>(ack);
                    }
                }
                Err(e) => yield Err(Status::from(e)),
            }
        })
    }
}

#[tonic::async_trait]
impl PublishBuildEvent for PublishBuildEventService {
    /// Relay a lifecycle notification; always succeeds
    async fn publish_lifecycle_event(&self, request: Request<LifecycleEventRequest>) -> Result<Response<Empty>, Status> {
        let spawned = self.relay.relay(request.into_inner());
        debug!("Relaying lifecycle event to {} proxies", spawned.len());
        Ok(Response::new(()))
    }

    type PublishBuildToolEventStreamStream = AckStream;

    async fn publish_build_tool_event_stream(
        &self,
        request: Request<Streaming<ToolEventRequest>>,
    ) -> Result<Response<Self::PublishBuildToolEventStreamStream>, Status> {
        Ok(Response::new(self.ack_stream(request.into_inner())))
    }
}
