// packages/ingest/src/main.rs
//! Build Event Ingestion Server
//!
//! Serves the `PublishBuildEvent` gRPC service, persisting event logs to the
//! configured blob store and replicating traffic to proxy targets.

use anyhow::Result;
use bes_ingest::blobstore;
use bes_ingest::grpc::{GrpcProxyTarget, PublishBuildEventService};
use bes_ingest::ingest::{BlobSessionFactory, IngestContext};
use bes_ingest::observability::{init_metrics, init_tracing};
use bes_ingest::utils::config::ServerConfig;
use std::sync::Arc;
use tracing::{error, info};

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing()?;

    info!("Starting build event ingestion server v{}", env!("CARGO_PKG_VERSION"));

    // Load configuration; backend problems stop startup here
    let config = ServerConfig::load()?;
    info!("Configuration loaded: {:?}", config);

    init_metrics(config.metrics.listen)?;

    let store = blobstore::open_configured(config.backend()?).await?;
    let proxies = GrpcProxyTarget::from_urls(&config.proxy.targets)?;

    let context = IngestContext::new(Arc::new(BlobSessionFactory::new(store)))
        .with_proxies(proxies)
        .with_forward_buffer(config.proxy.forward_buffer);

    let addr = config.listen_addr()?;
    info!("Starting gRPC server on {}", addr);
    let server = PublishBuildEventService::new(&context).into_server();

    // Graceful shutdown handler
    let shutdown_signal = async {
        match tokio::signal::ctrl_c().await {
            Ok(()) => info!("Received shutdown signal, cleaning up..."),
            Err(e) => error!("Failed to listen for shutdown signal: {}", e),
        }
    };

    match tonic::transport::Server::builder()
        .add_service(server)
        .serve_with_shutdown(addr, shutdown_signal)
        .await
    {
        Ok(_) => {
            info!("Server stopped gracefully");
            Ok(())
        }
        Err(e) => {
            error!("Server error: {}", e);
            Err(e.into())
        }
    }
}
