// packages/ingest/src/grpc/mod.rs
//! gRPC surface of the `PublishBuildEvent` service
//!
//! - **proto**: messages and service glue generated at build time
//! - **retained**: request wrappers that keep their wire bytes
//! - **server**: service implementation over the ingestion handler and lifecycle relay
//! - **proxy**: client used to replicate traffic to proxy targets

pub mod proto;
pub mod proxy;
pub mod retained;
pub mod server;

pub use proxy::GrpcProxyTarget;
pub use retained::{LifecycleEventRequest, Retained, ToolEventRequest};
pub use server::PublishBuildEventService;
