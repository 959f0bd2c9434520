// packages/ingest/src/blobstore/cloud.rs
//! Object-storage blob backend
//!
//! Blobs map one-to-one onto objects in a single bucket. The bucket is
//! provisioned lazily: the first operation checks for it and creates it when
//! missing, and every later operation reuses that outcome. Object puts are
//! atomic, so streamed writes are staged in memory and published with one put.

use crate::blobstore::codec::{self, BlobRead, StoredFormat};
use crate::blobstore::{validate_name, BlobError, BlobResult, BlobSink, BlobStore, BlobWriter};
use crate::observability::BLOB_BYTES_WRITTEN;
use async_compression::tokio::write::GzipEncoder;
use async_trait::async_trait;
use bytes::Bytes;
use std::io::Cursor;
use std::sync::Arc;
use tokio::io::AsyncWriteExt;
use tokio::sync::OnceCell;
use tracing::{debug, info};

/// Minimal object API a cloud backend needs
///
/// Implementations translate their own "no such object" signal into
/// [`BlobError::NotFound`](crate::blobstore::BlobError::NotFound).
#[async_trait]
pub trait ObjectClient: Send + Sync {
    async fn bucket_exists(&self, bucket: &str) -> BlobResult<bool>;

    /// Create `bucket`; succeeds when a concurrent caller already created it
    async fn create_bucket(&self, bucket: &str) -> BlobResult<()>;

    async fn get_object(&self, bucket: &str, key: &str) -> BlobResult<Bytes>;

    async fn put_object(&self, bucket: &str, key: &str, body: Bytes) -> BlobResult<()>;

    async fn delete_object(&self, bucket: &str, key: &str) -> BlobResult<()>;

    async fn object_exists(&self, bucket: &str, key: &str) -> BlobResult<bool>;
}

/// Blob store over a remote bucket
pub struct CloudBackend {
    client: Arc<dyn ObjectClient>,
    bucket: String,
    provisioned: OnceCell<()>,
}

impl CloudBackend {
    pub fn new(client: Arc<dyn ObjectClient>, bucket: impl Into<String>) -> Self {
        Self {
            client,
            bucket: bucket.into(),
            provisioned: OnceCell::new(),
        }
    }

    /// Bucket name, provisioning it on first use
    async fn bucket(&self) -> BlobResult<&str> {
        self.provisioned
            .get_or_try_init(|| async {
                if !self.client.bucket_exists(&self.bucket).await? {
                    info!("Creating storage bucket: {}", self.bucket);
                    self.client.create_bucket(&self.bucket).await?;
                }
                Ok::<_, BlobError>(())
            })
            .await?;

        Ok(&self.bucket)
    }

    async fn fetch(&self, name: &str) -> BlobResult<Bytes> {
        validate_name(name)?;
        let bucket = self.bucket().await?;
        self.client.get_object(bucket, name).await
    }
}

#[async_trait]
impl BlobStore for CloudBackend {
    async fn write_blob(&self, name: &str, data: &[u8]) -> BlobResult<u64> {
        validate_name(name)?;
        let bucket = self.bucket().await?;

        let compressed = codec::compress(data).await?;
        let stored = compressed.len() as u64;
        self.client.put_object(bucket, name, Bytes::from(compressed)).await?;
        metrics::counter!(BLOB_BYTES_WRITTEN, "backend" => "cloud").increment(stored);

        debug!("Wrote blob {} to bucket {} ({} bytes stored)", name, bucket, stored);
        Ok(stored)
    }

    async fn read_blob(&self, name: &str) -> BlobResult<Vec<u8>> {
        let stored = self.fetch(name).await?;
        StoredFormat::inspect(stored.to_vec()).await.into_content(name)
    }

    async fn delete_blob(&self, name: &str) -> BlobResult<()> {
        validate_name(name)?;
        let bucket = self.bucket().await?;

        // Some object APIs treat deleting a missing key as success.
        if !self.client.object_exists(bucket, name).await? {
            return Err(BlobError::not_found(name));
        }
        self.client.delete_object(bucket, name).await
    }

    async fn blob_exists(&self, name: &str) -> BlobResult<bool> {
        validate_name(name)?;
        let bucket = self.bucket().await?;
        self.client.object_exists(bucket, name).await
    }

    async fn blob_reader(&self, name: &str, offset: u64, length: Option<u64>) -> BlobResult<BlobRead> {
        let stored = self.fetch(name).await?;
        codec::logical_reader(Cursor::new(stored), offset, length).await
    }

    async fn blob_writer(&self, name: &str) -> BlobResult<BlobWriter> {
        validate_name(name)?;
        let bucket = self.bucket().await?.to_string();

        Ok(Box::new(CloudBlobWriter {
            client: Arc::clone(&self.client),
            bucket,
            key: name.to_string(),
            encoder: GzipEncoder::new(Vec::new()),
        }))
    }
}

/// Streaming writer that publishes with a single object put on commit
pub struct CloudBlobWriter {
    client: Arc<dyn ObjectClient>,
    bucket: String,
    key: String,
    encoder: GzipEncoder<Vec<u8>>,
}

#[async_trait]
impl BlobSink for CloudBlobWriter {
    async fn append(&mut self, buf: &[u8]) -> BlobResult<()> {
        self.encoder.write_all(buf).await?;
        Ok(())
    }

    async fn commit(self: Box<Self>) -> BlobResult<u64> {
        let CloudBlobWriter {
            client,
            bucket,
            key,
            mut encoder,
        } = *self;

        encoder.shutdown().await?;
        let compressed = encoder.into_inner();
        let stored = compressed.len() as u64;

        client.put_object(&bucket, &key, Bytes::from(compressed)).await?;
        metrics::counter!(BLOB_BYTES_WRITTEN, "backend" => "cloud").increment(stored);
        debug!("Committed streamed blob {} to bucket {} ({} bytes stored)", key, bucket, stored);

        Ok(stored)
    }
}
