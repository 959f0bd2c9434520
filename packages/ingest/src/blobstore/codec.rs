// packages/ingest/src/blobstore/codec.rs
//! gzip framing for stored blobs
//!
//! Every write is gzip-compressed. Blobs written before compression was
//! introduced are stored raw, so reads run a format detection step first:
//!
//! - gzip magic + deflate method → [`StoredFormat::Compressed`]
//! - anything else → [`StoredFormat::RawLegacy`], returned untouched
//! - gzip header whose body does not inflate → [`StoredFormat::Corrupt`]

use crate::blobstore::{BlobError, BlobResult};
use async_compression::tokio::bufread::{GzipDecoder, GzipEncoder};
use std::io::Cursor;
use std::pin::Pin;
use tokio::io::{AsyncRead, AsyncReadExt, BufReader};
use tracing::debug;

const GZIP_MAGIC: [u8; 2] = [0x1f, 0x8b];
const DEFLATE_METHOD: u8 = 0x08;
const HEADER_PEEK_LEN: usize = 3;

/// Streaming reader over logical blob content
pub type BlobRead = Pin<Box<dyn AsyncRead + Send>>;

/// Result of inspecting stored bytes
#[derive(Debug)]
pub enum StoredFormat {
    /// Inflated content of a gzip-framed blob
    Compressed(Vec<u8>),

    /// Legacy blob stored without compression
    RawLegacy(Vec<u8>),

    /// gzip header present but the body is damaged
    Corrupt(std::io::Error),
}

impl StoredFormat {
    /// Detect the stored format and inflate when needed
    pub async fn inspect(stored: Vec<u8>) -> Self {
        if !has_gzip_header(&stored) {
            return StoredFormat::RawLegacy(stored);
        }

        match inflate(&stored).await {
            Ok(content) => StoredFormat::Compressed(content),
            Err(e) => StoredFormat::Corrupt(e),
        }
    }

    /// Logical content, or an error for corrupt blobs
    pub fn into_content(self, name: &str) -> BlobResult<Vec<u8>> {
        match self {
            StoredFormat::Compressed(content) => Ok(content),
            StoredFormat::RawLegacy(content) => {
                debug!("Blob {} has no gzip header, returning raw bytes", name);
                Ok(content)
            }
            StoredFormat::Corrupt(source) => Err(BlobError::Corrupt {
                name: name.to_string(),
                source,
            }),
        }
    }
}

/// Whether `stored` starts with a gzip member header
pub fn has_gzip_header(stored: &[u8]) -> bool {
    match stored {
        [m0, m1] => [*m0, *m1] == GZIP_MAGIC,
        [m0, m1, method, ..] => [*m0, *m1] == GZIP_MAGIC && *method == DEFLATE_METHOD,
        _ => false,
    }
}

/// gzip-compress `data`
pub async fn compress(data: &[u8]) -> BlobResult<Vec<u8>> {
    let mut encoder = GzipEncoder::new(data);
    let mut compressed = Vec::with_capacity(data.len() / 2 + 32);
    encoder.read_to_end(&mut compressed).await?;

    debug!("Compressed {} bytes -> {} bytes", data.len(), compressed.len());

    Ok(compressed)
}

async fn inflate(stored: &[u8]) -> std::io::Result<Vec<u8>> {
    let mut decoder = GzipDecoder::new(stored);
    decoder.multiple_members(true);

    let mut content = Vec::with_capacity(stored.len() * 2);
    decoder.read_to_end(&mut content).await?;

    debug!("Decompressed {} bytes -> {} bytes", stored.len(), content.len());

    Ok(content)
}

/// Wrap a raw stored-byte reader into a reader over logical content
///
/// The first bytes are checked for a gzip header; the content is then skipped
/// forward to `offset` and limited to `length` bytes when given.
pub async fn logical_reader<R>(mut raw: R, offset: u64, length: Option<u64>) -> BlobResult<BlobRead>
where
    R: AsyncRead + Send + Unpin + 'static,
{
    let mut prefix = Vec::with_capacity(HEADER_PEEK_LEN);
    (&mut raw)
        .take(HEADER_PEEK_LEN as u64)
        .read_to_end(&mut prefix)
        .await?;

    let compressed = has_gzip_header(&prefix);
    let joined = Cursor::new(prefix).chain(raw);

    let mut content: BlobRead = if compressed {
        let mut decoder = GzipDecoder::new(BufReader::new(joined));
        decoder.multiple_members(true);
        Box::pin(decoder)
    } else {
        Box::pin(joined)
    };

    if offset > 0 {
        let skipped = tokio::io::copy(&mut (&mut content).take(offset), &mut tokio::io::sink()).await?;
        debug!("Skipped {} of {} requested bytes", skipped, offset);
    }

    let limited: BlobRead = match length {
        Some(length) => Box::pin(content.take(length)),
        None => content,
    };
    Ok(limited)
}
