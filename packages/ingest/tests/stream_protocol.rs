// packages/ingest/tests/stream_protocol.rs
//! End-to-end behavior of the streaming ingestion protocol

use async_trait::async_trait;
use bes_ingest::grpc::proto::{build_event, BuildEvent, PublishBuildToolEventStreamRequest, StreamId};
use bes_ingest::grpc::{LifecycleEventRequest, ToolEventRequest};
use bes_ingest::ingest::{
    BlobSessionFactory, EventReceiver, EventSession, IngestContext, ProxyTarget, SessionFactory,
    StreamIngestHandler,
};
use bes_ingest::blobstore::{BlobStore, DiskBackend};
use bes_ingest::{IngestError, Result};
use futures::StreamExt;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tempfile::tempdir;
use tokio::sync::Notify;
use tonic::Status;

fn stream_id() -> StreamId {
    StreamId {
        build_id: "build-1".to_string(),
        component: 3,
        invocation_id: "inv-1".to_string(),
    }
}

fn request(seq: i64) -> ToolEventRequest {
    PublishBuildToolEventStreamRequest::ordered(stream_id(), seq, BuildEvent::default()).into()
}

fn finished(seq: i64) -> ToolEventRequest {
    let event = BuildEvent {
        event_time: None,
        event: Some(build_event::Event::ComponentStreamFinished(
            build_event::BuildComponentStreamFinished { r#type: 1 },
        )),
    };
    PublishBuildToolEventStreamRequest::ordered(stream_id(), seq, event).into()
}

fn inbound(
    requests: Vec<ToolEventRequest>,
) -> impl futures::Stream<Item = std::result::Result<ToolEventRequest, Status>> + Send {
    futures::stream::iter(requests.into_iter().map(Ok))
}

/// Records handled sequence numbers; fails on a chosen one
#[derive(Default)]
struct RecordingFactory {
    handled: Arc<Mutex<Vec<i64>>>,
    fail_on: Option<i64>,
}

struct RecordingSession {
    handled: Arc<Mutex<Vec<i64>>>,
    fail_on: Option<i64>,
}

#[async_trait]
impl SessionFactory for RecordingFactory {
    async fn open(&self, _stream_id: &StreamId) -> Result<Box<dyn EventSession>> {
        Ok(Box::new(RecordingSession {
            handled: Arc::clone(&self.handled),
            fail_on: self.fail_on,
        }))
    }
}

#[async_trait]
impl EventSession for RecordingSession {
    async fn handle_event(&mut self, request: &ToolEventRequest) -> Result<()> {
        let seq = request
            .ordered_build_event
            .as_ref()
            .map(|ordered| ordered.sequence_number)
            .unwrap_or_default();
        if self.fail_on == Some(seq) {
            return Err(IngestError::SessionFailed(format!("rejected event {}", seq)));
        }
        self.handled.lock().unwrap().push(seq);
        Ok(())
    }
}

/// Proxy target collecting forwarded sequence numbers
struct CollectingProxy {
    received: Mutex<Vec<i64>>,
    done: Notify,
}

impl CollectingProxy {
    fn new() -> Arc<Self> {
        Arc::new(Self {
            received: Mutex::new(Vec::new()),
            done: Notify::new(),
        })
    }
}

#[async_trait]
impl ProxyTarget for CollectingProxy {
    fn name(&self) -> &str {
        "collector"
    }

    async fn publish_lifecycle_event(&self, _request: LifecycleEventRequest) -> std::result::Result<(), Status> {
        Ok(())
    }

    async fn forward_event_stream(&self, mut events: EventReceiver) -> std::result::Result<(), Status> {
        while let Some(request) = events.next().await {
            let seq = request
                .ordered_build_event
                .as_ref()
                .map(|e| e.sequence_number)
                .unwrap_or_default();
            self.received.lock().unwrap().push(seq);
        }
        self.done.notify_one();
        Ok(())
    }
}

struct UnreachableProxy;

#[async_trait]
impl ProxyTarget for UnreachableProxy {
    fn name(&self) -> &str {
        "unreachable"
    }

    async fn publish_lifecycle_event(&self, _request: LifecycleEventRequest) -> std::result::Result<(), Status> {
        Err(Status::unavailable("connection refused"))
    }

    async fn forward_event_stream(&self, _events: EventReceiver) -> std::result::Result<(), Status> {
        Err(Status::unavailable("connection refused"))
    }
}

fn handler(factory: RecordingFactory) -> StreamIngestHandler {
    StreamIngestHandler::new(&IngestContext::new(Arc::new(factory)))
}

#[tokio::test]
async fn test_complete_stream_acknowledges_every_event() {
    let factory = RecordingFactory::default();
    let handled = Arc::clone(&factory.handled);

    let acks = handler(factory)
        .ingest(inbound(vec![request(1), request(2), request(3)]))
        .await
        .unwrap();

    let sequence: Vec<i64> = acks.iter().map(|ack| ack.sequence_number).collect();
    assert_eq!(sequence, vec![1, 2, 3]);
    assert!(acks.iter().all(|ack| ack.stream_id == Some(stream_id())));
    assert_eq!(*handled.lock().unwrap(), vec![1, 2, 3]);
}

#[tokio::test]
async fn test_out_of_order_arrival_is_acknowledged_sorted() {
    let acks = handler(RecordingFactory::default())
        .ingest(inbound(vec![request(2), request(3), request(1)]))
        .await
        .unwrap();

    let sequence: Vec<i64> = acks.iter().map(|ack| ack.sequence_number).collect();
    assert_eq!(sequence, vec![1, 2, 3]);
}

#[tokio::test]
async fn test_gap_yields_no_acks() {
    let result = handler(RecordingFactory::default())
        .ingest(inbound(vec![request(1), request(3)]))
        .await;

    assert!(matches!(result, Err(IngestError::IncompleteStream { saw: 3, wanted: 2 })));
    let status = Status::from(result.unwrap_err());
    assert_eq!(status.code(), tonic::Code::Aborted);
}

#[tokio::test]
async fn test_duplicate_yields_no_acks() {
    let result = handler(RecordingFactory::default())
        .ingest(inbound(vec![request(1), request(1), request(2)]))
        .await;

    assert!(matches!(result, Err(IngestError::IncompleteStream { .. })));
}

#[tokio::test]
async fn test_delegation_failure_stops_the_stream() {
    let factory = RecordingFactory {
        fail_on: Some(2),
        ..Default::default()
    };
    let handled = Arc::clone(&factory.handled);

    let result = handler(factory)
        .ingest(inbound(vec![request(1), request(2), request(3)]))
        .await;

    assert!(matches!(result, Err(IngestError::SessionFailed(_))));
    // Event 3 never reaches the session.
    assert_eq!(*handled.lock().unwrap(), vec![1]);
}

#[tokio::test]
async fn test_inbound_error_aborts_without_acks() {
    let requests = futures::stream::iter(vec![
        Ok(request(1)),
        Err(Status::cancelled("client went away")),
    ]);

    let result = handler(RecordingFactory::default()).ingest(requests).await;

    assert!(matches!(result, Err(IngestError::Transport(_))));
}

#[tokio::test]
async fn test_empty_stream_succeeds_without_acks() {
    let acks = handler(RecordingFactory::default())
        .ingest(inbound(Vec::new()))
        .await
        .unwrap();

    assert!(acks.is_empty());
}

#[tokio::test]
async fn test_missing_stream_id_is_rejected() {
    let mut first = request(1).into_message();
    if let Some(ordered) = first.ordered_build_event.as_mut() {
        ordered.stream_id = None;
    }

    let result = handler(RecordingFactory::default())
        .ingest(inbound(vec![first.into()]))
        .await;

    let status = Status::from(result.unwrap_err());
    assert_eq!(status.code(), tonic::Code::InvalidArgument);
}

#[tokio::test]
async fn test_missing_ordered_event_is_rejected() {
    let result = handler(RecordingFactory::default())
        .ingest(inbound(vec![ToolEventRequest::default()]))
        .await;

    assert!(matches!(result, Err(IngestError::InvalidEvent(_))));
}

#[tokio::test]
async fn test_proxies_receive_every_event_despite_unreachable_peer() {
    let collector = CollectingProxy::new();
    let proxies: Vec<Arc<dyn ProxyTarget>> = vec![Arc::new(UnreachableProxy), collector.clone()];
    let context = IngestContext::new(Arc::new(RecordingFactory::default())).with_proxies(proxies);

    let acks = StreamIngestHandler::new(&context)
        .ingest(inbound(vec![request(1), request(2), request(3)]))
        .await
        .unwrap();
    assert_eq!(acks.len(), 3);

    tokio::time::timeout(Duration::from_secs(5), collector.done.notified())
        .await
        .unwrap();
    assert_eq!(*collector.received.lock().unwrap(), vec![1, 2, 3]);
}

#[tokio::test]
async fn test_proxies_see_events_of_a_failed_stream() {
    let collector = CollectingProxy::new();
    let proxies: Vec<Arc<dyn ProxyTarget>> = vec![collector.clone()];
    let context = IngestContext::new(Arc::new(RecordingFactory::default())).with_proxies(proxies);

    let result = StreamIngestHandler::new(&context)
        .ingest(inbound(vec![request(1), request(3)]))
        .await;
    assert!(result.is_err());

    tokio::time::timeout(Duration::from_secs(5), collector.done.notified())
        .await
        .unwrap();
    assert_eq!(*collector.received.lock().unwrap(), vec![1, 3]);
}

#[tokio::test]
async fn test_event_log_is_persisted_on_stream_finish() {
    let dir = tempdir().unwrap();
    let store = Arc::new(DiskBackend::open(dir.path()).await.unwrap());
    let context = IngestContext::new(Arc::new(BlobSessionFactory::new(store.clone())));

    let acks = StreamIngestHandler::new(&context)
        .ingest(inbound(vec![request(1), request(2), finished(3)]))
        .await
        .unwrap();

    assert_eq!(acks.len(), 3);
    assert!(store.blob_exists("inv-1/events.pb").await.unwrap());
}

#[tokio::test]
async fn test_aborted_stream_leaves_no_event_log() {
    let dir = tempdir().unwrap();
    let store = Arc::new(DiskBackend::open(dir.path()).await.unwrap());
    let context = IngestContext::new(Arc::new(BlobSessionFactory::new(store.clone())));

    let result = StreamIngestHandler::new(&context)
        .ingest(inbound(vec![request(1), request(3)]))
        .await;

    assert!(result.is_err());
    assert!(!store.blob_exists("inv-1/events.pb").await.unwrap());
}
