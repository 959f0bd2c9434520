// packages/ingest/src/blobstore/disk.rs
//! Local filesystem blob backend
//!
//! Blobs live as files under a root directory. Every write goes to a staging
//! file next to its final path; the staging file is synced, closed and then
//! renamed over the final path, so new content only becomes visible at the
//! rename. Abandoned staging files are removed when their handle drops.

use crate::blobstore::codec::{self, BlobRead, StoredFormat};
use crate::blobstore::{validate_name, BlobError, BlobResult, BlobSink, BlobStore, BlobWriter};
use crate::observability::BLOB_BYTES_WRITTEN;
use async_compression::tokio::write::GzipEncoder;
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use tempfile::TempPath;
use tokio::fs::{self, File};
use tokio::io::AsyncWriteExt;
use tracing::debug;

const STAGING_PREFIX: &str = ".staging-";

/// Disk-backed blob store
#[derive(Debug, Clone)]
pub struct DiskBackend {
    root: PathBuf,
}

impl DiskBackend {
    /// Open a disk backend, creating the root directory when missing
    pub async fn open(root: impl AsRef<Path>) -> BlobResult<Self> {
        let root = root.as_ref().to_path_buf();
        fs::create_dir_all(&root).await?;

        Ok(Self { root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn blob_path(&self, name: &str) -> BlobResult<PathBuf> {
        validate_name(name)?;
        Ok(self.root.join(name.trim_start_matches('/')))
    }

    /// Create a staging file in the directory that will hold `final_path`
    async fn stage(final_path: &Path) -> BlobResult<(File, TempPath)> {
        let parent = final_path
            .parent()
            .ok_or_else(|| BlobError::backend(std::io::Error::other("blob path has no parent")))?;
        fs::create_dir_all(parent).await?;

        let parent = parent.to_path_buf();
        let staged = tokio::task::spawn_blocking(move || {
            tempfile::Builder::new()
                .prefix(STAGING_PREFIX)
                .tempfile_in(parent)
        })
        .await
        .map_err(BlobError::backend)??;

        let (file, staging_path) = staged.into_parts();
        Ok((File::from_std(file), staging_path))
    }

    /// Sync and close `file`, then move it over `final_path`
    async fn publish(file: File, staging_path: TempPath, final_path: &Path) -> BlobResult<u64> {
        file.sync_all().await?;
        let stored = file.metadata().await?.len();
        drop(file);

        let final_path = final_path.to_path_buf();
        tokio::task::spawn_blocking(move || staging_path.persist(final_path))
            .await
            .map_err(BlobError::backend)?
            .map_err(std::io::Error::from)?;

        metrics::counter!(BLOB_BYTES_WRITTEN, "backend" => "disk").increment(stored);
        Ok(stored)
    }
}

#[async_trait]
impl BlobStore for DiskBackend {
    async fn write_blob(&self, name: &str, data: &[u8]) -> BlobResult<u64> {
        let final_path = self.blob_path(name)?;
        let compressed = codec::compress(data).await?;

        let (mut file, staging_path) = Self::stage(&final_path).await?;
        file.write_all(&compressed).await?;
        file.flush().await?;

        let stored = Self::publish(file, staging_path, &final_path).await?;
        debug!("Wrote blob {} ({} bytes stored)", name, stored);

        Ok(stored)
    }

    async fn read_blob(&self, name: &str) -> BlobResult<Vec<u8>> {
        let path = self.blob_path(name)?;
        let stored = fs::read(&path).await.map_err(|e| BlobError::from_io(name, e))?;

        StoredFormat::inspect(stored).await.into_content(name)
    }

    async fn delete_blob(&self, name: &str) -> BlobResult<()> {
        let path = self.blob_path(name)?;
        fs::remove_file(&path)
            .await
            .map_err(|e| BlobError::from_io(name, e))?;

        debug!("Deleted blob {}", name);
        Ok(())
    }

    async fn blob_exists(&self, name: &str) -> BlobResult<bool> {
        let path = self.blob_path(name)?;
        match fs::metadata(&path).await {
            Ok(metadata) => Ok(metadata.is_file()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(e.into()),
        }
    }

    async fn blob_reader(&self, name: &str, offset: u64, length: Option<u64>) -> BlobResult<BlobRead> {
        let path = self.blob_path(name)?;
        let file = File::open(&path).await.map_err(|e| BlobError::from_io(name, e))?;

        codec::logical_reader(file, offset, length).await
    }

    async fn blob_writer(&self, name: &str) -> BlobResult<BlobWriter> {
        let final_path = self.blob_path(name)?;
        let (file, staging_path) = Self::stage(&final_path).await?;

        Ok(Box::new(DiskBlobWriter {
            encoder: GzipEncoder::new(file),
            staging_path,
            final_path,
        }))
    }
}

/// Streaming writer compressing into a staging file
pub struct DiskBlobWriter {
    encoder: GzipEncoder<File>,
    staging_path: TempPath,
    final_path: PathBuf,
}

#[async_trait]
impl BlobSink for DiskBlobWriter {
    async fn append(&mut self, buf: &[u8]) -> BlobResult<()> {
        self.encoder.write_all(buf).await?;
        Ok(())
    }

    async fn commit(self: Box<Self>) -> BlobResult<u64> {
        let DiskBlobWriter {
            mut encoder,
            staging_path,
            final_path,
        } = *self;

        // Writes the gzip trailer and flushes the file.
        encoder.shutdown().await?;
        let file = encoder.into_inner();

        let stored = DiskBackend::publish(file, staging_path, &final_path).await?;
        debug!("Committed streamed blob {:?} ({} bytes stored)", final_path, stored);

        Ok(stored)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;
    use tokio::io::AsyncReadExt;

    async fn backend() -> (tempfile::TempDir, DiskBackend) {
        let dir = tempdir().unwrap();
        let backend = DiskBackend::open(dir.path()).await.unwrap();
        (dir, backend)
    }

    #[tokio::test]
    async fn test_open_creates_missing_root() {
        let dir = tempdir().unwrap();
        let root = dir.path().join("nested/blobs");

        let backend = DiskBackend::open(&root).await.unwrap();
        assert_eq!(backend.root(), root.as_path());
        assert!(root.is_dir());
    }

    fn staging_files(dir: &Path) -> Vec<PathBuf> {
        std::fs::read_dir(dir)
            .unwrap()
            .map(|entry| entry.unwrap().path())
            .filter(|path| {
                path.file_name()
                    .and_then(|n| n.to_str())
                    .map(|n| n.starts_with(STAGING_PREFIX))
                    .unwrap_or(false)
            })
            .collect()
    }

    #[tokio::test]
    async fn test_write_read_blob() {
        let (_dir, backend) = backend().await;

        let data = b"hello build events".to_vec();
        backend.write_blob("inv-1/events", &data).await.unwrap();

        assert_eq!(backend.read_blob("inv-1/events").await.unwrap(), data);
    }

    #[tokio::test]
    async fn test_stored_bytes_are_gzip() {
        let (dir, backend) = backend().await;

        let data = b"compress me ".repeat(100);
        let stored = backend.write_blob("compressed", &data).await.unwrap();

        let on_disk = std::fs::read(dir.path().join("compressed")).unwrap();
        assert_eq!(on_disk.len() as u64, stored);
        assert!(codec::has_gzip_header(&on_disk));
        assert!(on_disk.len() < data.len());
    }

    #[tokio::test]
    async fn test_legacy_raw_blob_is_returned_unchanged() {
        let (dir, backend) = backend().await;

        let raw = b"written before compression existed".to_vec();
        std::fs::write(dir.path().join("legacy"), &raw).unwrap();

        assert_eq!(backend.read_blob("legacy").await.unwrap(), raw);
    }

    #[tokio::test]
    async fn test_corrupt_gzip_blob_is_an_error() {
        let (dir, backend) = backend().await;

        let mut stored = codec::compress(b"soon to be truncated content").await.unwrap();
        stored.truncate(12);
        std::fs::write(dir.path().join("broken"), &stored).unwrap();

        let result = backend.read_blob("broken").await;
        assert!(matches!(result, Err(BlobError::Corrupt { .. })));
    }

    #[tokio::test]
    async fn test_missing_blob_is_not_found() {
        let (_dir, backend) = backend().await;

        assert!(backend.read_blob("missing").await.unwrap_err().is_not_found());
        assert!(backend.delete_blob("missing").await.unwrap_err().is_not_found());
        assert!(backend
            .blob_reader("missing", 0, None)
            .await
            .err()
            .unwrap()
            .is_not_found());
    }

    #[tokio::test]
    async fn test_blob_reader_range() {
        let (_dir, backend) = backend().await;

        let data: Vec<u8> = (0..50_000u32).map(|i| (i % 251) as u8).collect();
        backend.write_blob("ranged", &data).await.unwrap();

        let mut reader = backend.blob_reader("ranged", 1_000, Some(2_000)).await.unwrap();
        let mut out = Vec::new();
        reader.read_to_end(&mut out).await.unwrap();
        assert_eq!(out, &data[1_000..3_000]);

        let mut reader = backend.blob_reader("ranged", 49_990, None).await.unwrap();
        let mut tail = Vec::new();
        reader.read_to_end(&mut tail).await.unwrap();
        assert_eq!(tail, &data[49_990..]);
    }

    #[tokio::test]
    async fn test_blob_writer_commit_is_atomic() {
        let (dir, backend) = backend().await;

        backend.write_blob("streamed", b"old content").await.unwrap();

        let mut writer = backend.blob_writer("streamed").await.unwrap();
        writer.append(b"new ").await.unwrap();
        writer.append(b"content").await.unwrap();

        // Old content stays visible until commit.
        assert_eq!(backend.read_blob("streamed").await.unwrap(), b"old content");
        assert_eq!(staging_files(dir.path()).len(), 1);

        writer.commit().await.unwrap();

        assert_eq!(backend.read_blob("streamed").await.unwrap(), b"new content");
        assert!(staging_files(dir.path()).is_empty());
    }

    #[tokio::test]
    async fn test_dropped_writer_leaves_nothing() {
        let (dir, backend) = backend().await;

        let mut writer = backend.blob_writer("abandoned").await.unwrap();
        writer.append(b"partial").await.unwrap();
        drop(writer);

        assert!(!backend.blob_exists("abandoned").await.unwrap());
        assert!(staging_files(dir.path()).is_empty());
    }

    #[tokio::test]
    async fn test_leading_slash_stays_under_root() {
        let (dir, backend) = backend().await;

        backend.write_blob("/rooted", b"x").await.unwrap();
        assert!(dir.path().join("rooted").is_file());
    }
}
