//! Upload pipeline
//!
//! Consumes one logical file as a bounded byte stream, splits it into
//! fixed-size chunks, and writes through a draft blob. On success the
//! draft is finalized; on any failure (stream error, chunk write
//! failure, oversize body) the draft is aborted first, so callers see
//! either a fully usable blob or no blob at all.
//!
//! Multi-file uploads run one independent pipeline pass per file under
//! a semaphore; one file's failure does not abort its siblings.

use bytes::{Bytes, BytesMut};
use futures::stream::Stream;
use futures_util::StreamExt;
use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::Semaphore;
use tracing::{info, warn};

use crate::media::registry::BlobRegistry;
use crate::media::stream::ByteStream;
use crate::types::{LodgewayError, Result};

/// Upload limits and chunking parameters
#[derive(Debug, Clone)]
pub struct UploadConfig {
    /// Fixed chunk size in bytes
    pub chunk_size: usize,
    /// Ceiling on declared and observed upload size
    pub max_bytes: u64,
    /// Accepted content types, lowercase
    pub allowed_types: Vec<String>,
    /// Cap on simultaneous in-flight uploads
    pub max_concurrent: usize,
}

impl Default for UploadConfig {
    fn default() -> Self {
        Self {
            chunk_size: crate::config::DEFAULT_CHUNK_SIZE,
            max_bytes: 10 * 1024 * 1024,
            allowed_types: vec![
                "image/jpeg".to_string(),
                "image/png".to_string(),
                "image/webp".to_string(),
                "image/gif".to_string(),
            ],
            max_concurrent: 4,
        }
    }
}

/// Declared properties of one incoming file
#[derive(Debug, Clone)]
pub struct IncomingFile {
    pub filename: String,
    pub content_type: String,
    /// Declared size, checked upfront when present
    pub declared_len: Option<u64>,
    /// Free-form key/value metadata (e.g. owning listing id)
    pub metadata: HashMap<String, String>,
}

/// Result of a successful upload
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StoredBlob {
    pub blob_id: String,
    pub filename: String,
    pub length: u64,
    pub content_type: String,
}

/// Streams upload bodies into chunked blob storage
pub struct UploadPipeline {
    registry: Arc<BlobRegistry>,
    config: UploadConfig,
    permits: Arc<Semaphore>,
}

impl UploadPipeline {
    pub fn new(registry: Arc<BlobRegistry>, config: UploadConfig) -> Self {
        let permits = Arc::new(Semaphore::new(config.max_concurrent.max(1)));
        Self {
            registry,
            config,
            permits,
        }
    }

    /// The registry this pipeline writes through
    pub fn registry(&self) -> Arc<BlobRegistry> {
        Arc::clone(&self.registry)
    }

    /// Reject uploads the declared headers already rule out
    fn check_upfront(&self, file: &IncomingFile) -> Result<()> {
        let content_type = file.content_type.to_ascii_lowercase();
        if !self.config.allowed_types.iter().any(|t| *t == content_type) {
            return Err(LodgewayError::UnsupportedMediaType(file.content_type.clone()));
        }
        if let Some(declared) = file.declared_len {
            if declared > self.config.max_bytes {
                return Err(LodgewayError::SizeLimitExceeded {
                    limit: self.config.max_bytes,
                    actual: declared,
                });
            }
        }
        Ok(())
    }

    /// Upload one file. Returns the finalized blob or an error after
    /// the draft has been cleaned up.
    pub async fn upload<S>(&self, file: IncomingFile, mut body: S) -> Result<StoredBlob>
    where
        S: Stream<Item = Result<Bytes>> + Unpin + Send,
    {
        self.check_upfront(&file)?;

        let _permit = self
            .permits
            .acquire()
            .await
            .map_err(|_| LodgewayError::Storage("upload pipeline is shut down".to_string()))?;

        let blob_id =
            self.registry
                .begin_blob(&file.filename, &file.content_type, file.metadata.clone());

        match self.write_chunks(&blob_id, &mut body).await {
            Ok((length, chunk_count)) => {
                let record = self.registry.finalize(&blob_id, length, chunk_count).await?;
                info!(%blob_id, length, chunk_count, filename = %file.filename, "upload complete");
                Ok(StoredBlob {
                    blob_id: record.blob_id,
                    filename: record.filename,
                    length: record.length,
                    content_type: record.content_type,
                })
            }
            Err(e) => {
                warn!(%blob_id, error = %e, "upload failed, aborting draft");
                // Cleanup must not mask the original failure
                if let Err(abort_err) = self.registry.abort(&blob_id).await {
                    warn!(%blob_id, error = %abort_err, "draft cleanup failed, chunks may linger");
                }
                Err(e)
            }
        }
    }

    /// Drain the body into fixed-size chunks, returning total length
    /// and chunk count
    async fn write_chunks<S>(&self, blob_id: &str, body: &mut S) -> Result<(u64, u32)>
    where
        S: Stream<Item = Result<Bytes>> + Unpin + Send,
    {
        let chunks = self.registry.chunk_store();
        let mut buffer = BytesMut::new();
        let mut total: u64 = 0;
        let mut sequence: u32 = 0;

        while let Some(piece) = body.next().await {
            let piece = piece?;
            total += piece.len() as u64;
            if total > self.config.max_bytes {
                return Err(LodgewayError::SizeLimitExceeded {
                    limit: self.config.max_bytes,
                    actual: total,
                });
            }

            buffer.extend_from_slice(&piece);
            while buffer.len() >= self.config.chunk_size {
                let chunk = buffer.split_to(self.config.chunk_size).freeze();
                chunks.write(blob_id, sequence, chunk).await?;
                sequence += 1;
            }
        }

        if !buffer.is_empty() {
            chunks.write(blob_id, sequence, buffer.freeze()).await?;
            sequence += 1;
        }

        Ok((total, sequence))
    }

    /// Upload several files with independent outcomes, bounded by the
    /// concurrency cap. Order of results matches the input order.
    pub async fn upload_many(
        &self,
        files: Vec<(IncomingFile, ByteStream)>,
    ) -> Vec<Result<StoredBlob>> {
        futures::future::join_all(
            files
                .into_iter()
                .map(|(file, body)| self.upload(file, body)),
        )
        .await
    }
}
