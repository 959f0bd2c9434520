// packages/ingest/src/ingest/forwarder.rs
//! Best-effort replication of event streams to proxy targets
//!
//! Each stream opens one [`ForwardingStream`] per proxy target: a bounded
//! channel drained by a background task that owns the outbound call.
//! Forwarding never waits: a full or closed channel drops the event for that
//! target only. Dropping the [`ForwardingStream`] half-closes the outbound
//! call, so every exit path of the owning stream releases it.

use crate::grpc::{LifecycleEventRequest, ToolEventRequest};
use crate::observability::PROXY_EVENTS_DROPPED;
use async_trait::async_trait;
use std::sync::Arc;
use tokio::sync::mpsc::{self, error::TrySendError};
use tokio::task::JoinHandle;
use tokio_stream::wrappers::ReceiverStream;
use tonic::Status;
use tracing::{debug, warn};

/// Outbound events for one proxy target
pub type EventReceiver = ReceiverStream<ToolEventRequest>;

/// A secondary server receiving a copy of all traffic
#[async_trait]
pub trait ProxyTarget: Send + Sync {
    /// Human-readable target name for logs and metrics
    fn name(&self) -> &str;

    async fn publish_lifecycle_event(&self, request: LifecycleEventRequest) -> Result<(), Status>;

    /// Stream `events` to the target until the receiver closes
    async fn forward_event_stream(&self, events: EventReceiver) -> Result<(), Status>;
}

/// Forwarding connection to one proxy target for one stream
pub struct ForwardingStream {
    target: String,
    sender: mpsc::Sender<ToolEventRequest>,
    task: JoinHandle<()>,
}

impl ForwardingStream {
    /// Start forwarding to `target`, buffering up to `capacity` events
    pub fn open(target: Arc<dyn ProxyTarget>, capacity: usize) -> Self {
        let (sender, receiver) = mpsc::channel(capacity.max(1));
        let name = target.name().to_string();

        let task = tokio::spawn({
            let name = name.clone();
            async move {
                match target.forward_event_stream(ReceiverStream::new(receiver)).await {
                    Ok(()) => debug!("Proxy stream to {} finished", name),
                    Err(status) => warn!("Unable to proxy stream to {}: {}", name, status),
                }
            }
        });

        Self {
            target: name,
            sender,
            task,
        }
    }

    /// Queue `request` for the target without waiting
    pub fn forward(&self, request: &ToolEventRequest) {
        match self.sender.try_send(request.clone()) {
            Ok(()) => {}
            Err(TrySendError::Full(_)) => {
                warn!("Proxy {} is falling behind; dropping event", self.target);
                metrics::counter!(PROXY_EVENTS_DROPPED, "target" => self.target.clone()).increment(1);
            }
            Err(TrySendError::Closed(_)) => {
                debug!("Proxy stream to {} is closed; dropping event", self.target);
                metrics::counter!(PROXY_EVENTS_DROPPED, "target" => self.target.clone()).increment(1);
            }
        }
    }

    pub fn target(&self) -> &str {
        &self.target
    }

    /// Half-close the outbound stream
    ///
    /// The returned handle completes once the target finishes the call.
    pub fn close(self) -> JoinHandle<()> {
        debug!("Closing proxy stream to {}", self.target);
        self.task
    }
}
