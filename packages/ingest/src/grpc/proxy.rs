// packages/ingest/src/grpc/proxy.rs
//! gRPC client for proxy targets

use crate::grpc::proto::publish_build_event_client::PublishBuildEventClient;
use crate::grpc::LifecycleEventRequest;
use crate::ingest::forwarder::{EventReceiver, ProxyTarget};
use crate::utils::errors::{IngestError, Result};
use async_trait::async_trait;
use std::sync::Arc;
use tonic::transport::{Channel, Endpoint};
use tonic::Status;
use tracing::{debug, info};

/// A secondary `PublishBuildEvent` server
///
/// The channel connects lazily, so an unreachable target only surfaces as a
/// failed call, never as a startup error.
#[derive(Debug, Clone)]
pub struct GrpcProxyTarget {
    url: String,
    client: PublishBuildEventClient<Channel>,
}

impl GrpcProxyTarget {
    pub fn new(url: &str) -> Result<Self> {
        let endpoint = Endpoint::from_shared(url.to_string())
            .map_err(|e| IngestError::ConfigError(format!("Invalid proxy target {}: {}", url, e)))?;

        Ok(Self {
            url: url.to_string(),
            client: PublishBuildEventClient::new(endpoint.connect_lazy()),
        })
    }

    /// One target per configured URL
    pub fn from_urls(urls: &[String]) -> Result<Vec<Arc<dyn ProxyTarget>>> {
        urls.iter()
            .map(|url| {
                info!("Proxying build events to {}", url);
                Ok(Arc::new(Self::new(url)?) as Arc<dyn ProxyTarget>)
            })
            .collect()
    }
}

#[async_trait]
impl ProxyTarget for GrpcProxyTarget {
    fn name(&self) -> &str {
        &self.url
    }

    async fn publish_lifecycle_event(&self, request: LifecycleEventRequest) -> std::result::Result<(), Status> {
        self.client.clone().publish_lifecycle_event(request).await?;
        Ok(())
    }

    async fn forward_event_stream(&self, events: EventReceiver) -> std::result::Result<(), Status> {
        let response = self.client.clone().publish_build_tool_event_stream(events).await?;

        // Drain the target's acks so the call runs to completion.
        let mut acks = response.into_inner();
        let mut acked = 0u64;
        while acks.message().await?.is_some() {
            acked += 1;
        }

        debug!("Proxy {} acknowledged {} events", self.url, acked);
        Ok(())
    }
}
