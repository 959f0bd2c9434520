// packages/ingest/src/blobstore/mod.rs
//! Backend-agnostic blob storage
//!
//! Event payloads are persisted as named blobs in a flat namespace. Every
//! backend offers the same contract:
//!
//! - **Compression**: writes are gzip-compressed; reads fall back to raw bytes
//!   for legacy blobs written before compression existed
//! - **Atomic visibility**: readers see the complete old or the complete new
//!   content, never a partial write, for both whole and streamed writes
//! - **Unified not-found**: a missing blob is always [`BlobError::NotFound`]
//! - **Name validation**: names containing `..` never reach a backend
//!
//! # Backends
//!
//! ```text
//! BackendConfig ──► open_configured() ──► Arc<dyn BlobStore>
//!      │                                      ▲
//!      ├─ Disk  { root_directory }  ──► DiskBackend   (stage + rename)
//!      └─ Cloud { bucket, ... }     ──► CloudBackend  (lazy bucket, object puts)
//! ```

pub mod cloud;
pub mod codec;
pub mod disk;
mod error;
pub mod s3;

use async_trait::async_trait;
use std::sync::Arc;
use tracing::info;

pub use cloud::{CloudBackend, ObjectClient};
pub use codec::{BlobRead, StoredFormat};
pub use disk::DiskBackend;
pub use error::{BlobError, BlobResult};
pub use s3::S3ObjectClient;

use crate::utils::config::{CloudConfig, DiskConfig};

/// Uniform storage contract over named byte payloads
#[async_trait]
pub trait BlobStore: Send + Sync {
    /// Compress and persist `data` under `name`, returning the stored size
    async fn write_blob(&self, name: &str, data: &[u8]) -> BlobResult<u64>;

    /// Read and decompress the blob stored under `name`
    async fn read_blob(&self, name: &str) -> BlobResult<Vec<u8>>;

    /// Remove the blob stored under `name`
    async fn delete_blob(&self, name: &str) -> BlobResult<()>;

    /// Whether a blob is stored under `name`
    async fn blob_exists(&self, name: &str) -> BlobResult<bool>;

    /// Stream the logical content starting at `offset`, at most `length` bytes
    async fn blob_reader(&self, name: &str, offset: u64, length: Option<u64>) -> BlobResult<BlobRead>;

    /// Open a streaming writer; nothing is visible under `name` until commit
    async fn blob_writer(&self, name: &str) -> BlobResult<BlobWriter>;
}

/// Incremental writer returned by [`BlobStore::blob_writer`]
///
/// Dropping a sink without calling [`BlobSink::commit`] discards everything
/// written so far.
#[async_trait]
pub trait BlobSink: Send {
    /// Append `buf` to the staged content
    async fn append(&mut self, buf: &[u8]) -> BlobResult<()>;

    /// Atomically publish the staged content, returning the stored size
    async fn commit(self: Box<Self>) -> BlobResult<u64>;
}

pub type BlobWriter = Box<dyn BlobSink>;

/// Reject names that could escape the storage namespace
pub fn validate_name(name: &str) -> BlobResult<()> {
    if name.is_empty() || name.contains("..") {
        return Err(BlobError::InvalidName {
            name: name.to_string(),
        });
    }
    Ok(())
}

/// The single storage backend selected for a deployment
#[derive(Debug, Clone)]
pub enum BackendConfig {
    Disk(DiskConfig),
    Cloud(CloudConfig),
}

/// Build the configured backend behind the common capability
pub async fn open_configured(config: BackendConfig) -> BlobResult<Arc<dyn BlobStore>> {
    match config {
        BackendConfig::Disk(disk) => {
            let backend = DiskBackend::open(&disk.root_directory).await?;
            info!("Using disk blob storage at {:?}", backend.root());
            Ok(Arc::new(backend))
        }
        BackendConfig::Cloud(cloud) => {
            info!(
                project_id = cloud.project_id.as_deref().unwrap_or_default(),
                "Using cloud blob storage in bucket {}",
                cloud.bucket
            );
            let client = S3ObjectClient::from_config(&cloud).await;
            Ok(Arc::new(CloudBackend::new(Arc::new(client), cloud.bucket)))
        }
    }
}
