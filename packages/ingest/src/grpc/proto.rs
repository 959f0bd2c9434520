// packages/ingest/src/grpc/proto.rs
//! Generated `google.devtools.build.v1` messages and service glue

tonic::include_proto!("google.devtools.build.v1");
include!(concat!(env!("OUT_DIR"), "/google.devtools.build.v1.PublishBuildEvent.rs"));

/// Response of `PublishLifecycleEvent` (`google.protobuf.Empty`)
pub type Empty = ();

impl PublishBuildToolEventStreamRequest {
    /// Convenience constructor for a request carrying a single event
    pub fn ordered(stream_id: StreamId, sequence_number: i64, event: BuildEvent) -> Self {
        Self {
            ordered_build_event: Some(OrderedBuildEvent {
                stream_id: Some(stream_id),
                sequence_number,
                event: Some(event),
            }),
            ..Default::default()
        }
    }
}

impl BuildEvent {
    /// Whether this event closes the component stream
    pub fn is_stream_finished(&self) -> bool {
        matches!(self.event, Some(build_event::Event::ComponentStreamFinished(_)))
    }
}
