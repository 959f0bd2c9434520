// packages/ingest/src/ingest/lifecycle.rs
//! Fire-and-forget relay of lifecycle notifications

use crate::grpc::LifecycleEventRequest;
use crate::ingest::forwarder::ProxyTarget;
use crate::observability::LIFECYCLE_FORWARD_FAILURES;
use std::sync::Arc;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

/// Copies lifecycle notifications to every proxy target
///
/// Notifications carry no sequence/ack protocol and are not interpreted here.
pub struct LifecycleRelay {
    proxies: Vec<Arc<dyn ProxyTarget>>,
}

impl LifecycleRelay {
    pub fn new(proxies: Vec<Arc<dyn ProxyTarget>>) -> Self {
        Self { proxies }
    }

    /// Start one detached forwarding task per target and return immediately
    ///
    /// The handles are returned for callers that want to observe completion;
    /// dropping them leaves the tasks running.
    pub fn relay(&self, request: LifecycleEventRequest) -> Vec<JoinHandle<()>> {
        self.proxies
            .iter()
            .map(|target| {
                let target = Arc::clone(target);
                let request = request.clone();
                tokio::spawn(async move {
                    match target.publish_lifecycle_event(request).await {
                        Ok(()) => debug!("Forwarded lifecycle event to {}", target.name()),
                        Err(status) => {
                            warn!("Unable to forward lifecycle event to {}: {}", target.name(), status);
                            metrics::counter!(LIFECYCLE_FORWARD_FAILURES, "target" => target.name().to_string())
                                .increment(1);
                        }
                    }
                })
            })
            .collect()
    }
}
