// packages/ingest/build.rs
//! Build script for compiling the Build Event Service definitions
//!
//! Messages come from the `.proto` files. The service glue is described with
//! `tonic_build::manual` so the two request types can carry the bytes they
//! were decoded from, which proxy targets then receive unchanged.

use std::io::{Error, Result};
use tonic_build::manual::{Builder, Method, Service};

const PROTOS: &[&str] = &[
    "proto/google/devtools/build/v1/build_status.proto",
    "proto/google/devtools/build/v1/build_events.proto",
    "proto/google/devtools/build/v1/publish_build_event.proto",
];

fn main() -> Result<()> {
    // Use the vendored protoc so no system installation is needed
    let protoc = protoc_bin_vendored::protoc_bin_path().map_err(|e| Error::other(e.to_string()))?;
    let well_known = protoc_bin_vendored::include_path().map_err(|e| Error::other(e.to_string()))?;
    std::env::set_var("PROTOC", protoc);

    // Compile messages only; the service is generated below
    tonic_build::configure()
        .build_server(false)
        .build_client(false)
        .compile(PROTOS, &[std::path::PathBuf::from("proto"), well_known])?;

    let publish_build_event = Service::builder()
        .name("PublishBuildEvent")
        .package("google.devtools.build.v1")
        .method(
            Method::builder()
                .name("publish_lifecycle_event")
                .route_name("PublishLifecycleEvent")
                .input_type("crate::grpc::LifecycleEventRequest")
                .output_type("crate::grpc::proto::Empty")
                .codec_path("tonic::codec::ProstCodec")
                .build(),
        )
        .method(
            Method::builder()
                .name("publish_build_tool_event_stream")
                .route_name("PublishBuildToolEventStream")
                .input_type("crate::grpc::ToolEventRequest")
                .output_type("crate::grpc::proto::PublishBuildToolEventStreamResponse")
                .codec_path("tonic::codec::ProstCodec")
                .client_streaming()
                .server_streaming()
                .build(),
        )
        .build();

    Builder::new().compile(&[publish_build_event]);

    // Recompile if proto files change
    for proto in PROTOS {
        println!("cargo:rerun-if-changed={}", proto);
    }

    Ok(())
}
