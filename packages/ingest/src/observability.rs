// packages/ingest/src/observability.rs
//! Logging and metrics setup

use crate::utils::errors::{IngestError, Result};
use metrics_exporter_prometheus::PrometheusBuilder;
use std::net::SocketAddr;
use tracing::info;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, EnvFilter};

/// Set to `json` for structured log lines
pub const LOG_FORMAT_ENV: &str = "BES_INGEST_LOG_FORMAT";

pub const EVENTS_RECEIVED: &str = "bes_ingest_events_received_total";
pub const ACKS_SENT: &str = "bes_ingest_acks_sent_total";
pub const STREAMS_ABORTED: &str = "bes_ingest_streams_aborted_total";
pub const PROXY_EVENTS_DROPPED: &str = "bes_ingest_proxy_events_dropped_total";
pub const LIFECYCLE_FORWARD_FAILURES: &str = "bes_ingest_lifecycle_forward_failures_total";
pub const BLOB_BYTES_WRITTEN: &str = "bes_ingest_blob_bytes_written_total";

/// Install the global tracing subscriber
///
/// Filtering follows `RUST_LOG`, defaulting to `info`.
pub fn init_tracing() -> Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let json = std::env::var(LOG_FORMAT_ENV)
        .map(|format| format.eq_ignore_ascii_case("json"))
        .unwrap_or(false);

    let registry = tracing_subscriber::registry().with(filter);
    let result = if json {
        registry.with(fmt::layer().json()).try_init()
    } else {
        registry.with(fmt::layer()).try_init()
    };

    result.map_err(|e| IngestError::ServerError(format!("Failed to install tracing subscriber: {}", e)))
}

/// Install the Prometheus exporter when a listen address is configured
pub fn init_metrics(listen: Option<SocketAddr>) -> Result<()> {
    let Some(addr) = listen else {
        return Ok(());
    };

    PrometheusBuilder::new()
        .with_http_listener(addr)
        .install()
        .map_err(|e| IngestError::ServerError(format!("Failed to install metrics exporter: {}", e)))?;

    metrics::describe_counter!(EVENTS_RECEIVED, "Build events received on ingestion streams");
    metrics::describe_counter!(ACKS_SENT, "Acknowledgments sent to clients");
    metrics::describe_counter!(STREAMS_ABORTED, "Streams that ended without acknowledgment");
    metrics::describe_counter!(PROXY_EVENTS_DROPPED, "Events not forwarded to a proxy target");
    metrics::describe_counter!(LIFECYCLE_FORWARD_FAILURES, "Lifecycle events a proxy target rejected");
    metrics::describe_counter!(BLOB_BYTES_WRITTEN, "Compressed bytes persisted to blob storage");

    info!("Serving metrics on {}", addr);
    Ok(())
}
