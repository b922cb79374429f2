//! Chunk storage backends
//!
//! A chunk is immutable once written. Writes are idempotent per
//! `(blob_id, sequence)`: a retried write carrying identical bytes is a
//! no-op success, while different bytes for an already-written sequence
//! number are rejected as a consistency violation — never silently
//! overwritten. Idempotence is checked by SHA-256 digest so a retry
//! does not need to ship the original bytes back out of the store.

use async_trait::async_trait;
use bson::{doc, Binary};
use bytes::Bytes;
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tracing::debug;

use crate::db::MongoClient;
use crate::types::{LodgewayError, Result};

/// Collection name for media chunks
pub const CHUNK_COLLECTION: &str = "media_chunks";

/// Compute the SHA-256 digest of chunk data as lowercase hex
pub fn chunk_digest(data: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(data);
    hex::encode(hasher.finalize())
}

/// Durable storage of fixed-size binary chunks keyed by blob id and
/// sequence number
#[async_trait]
pub trait ChunkStore: Send + Sync {
    /// Write one chunk. Idempotent for identical bytes; a differing
    /// rewrite fails with `ConsistencyViolation`.
    async fn write(&self, blob_id: &str, sequence: u32, bytes: Bytes) -> Result<()>;

    /// Read one chunk, `NotFound` if absent
    async fn read(&self, blob_id: &str, sequence: u32) -> Result<Bytes>;

    /// Remove every chunk of a blob. Removing an unknown blob is a
    /// no-op success.
    async fn delete_all(&self, blob_id: &str) -> Result<()>;
}

// ============================================================================
// In-memory backend
// ============================================================================

struct StoredChunk {
    digest: String,
    bytes: Bytes,
}

/// In-memory chunk store used by unit tests and as a reference
/// implementation of the write semantics
#[derive(Default)]
pub struct MemoryChunkStore {
    chunks: DashMap<(String, u32), StoredChunk>,
}

impl MemoryChunkStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of chunks currently held for a blob
    pub fn chunk_count(&self, blob_id: &str) -> usize {
        self.chunks.iter().filter(|e| e.key().0 == blob_id).count()
    }

    /// Number of chunks held across all blobs
    pub fn total_chunks(&self) -> usize {
        self.chunks.len()
    }
}

#[async_trait]
impl ChunkStore for MemoryChunkStore {
    async fn write(&self, blob_id: &str, sequence: u32, bytes: Bytes) -> Result<()> {
        let key = (blob_id.to_string(), sequence);
        let digest = chunk_digest(&bytes);

        if let Some(existing) = self.chunks.get(&key) {
            if existing.digest == digest {
                return Ok(());
            }
            return Err(LodgewayError::ConsistencyViolation {
                blob_id: blob_id.to_string(),
                sequence,
            });
        }

        self.chunks.insert(key, StoredChunk { digest, bytes });
        Ok(())
    }

    async fn read(&self, blob_id: &str, sequence: u32) -> Result<Bytes> {
        self.chunks
            .get(&(blob_id.to_string(), sequence))
            .map(|c| c.bytes.clone())
            .ok_or_else(|| {
                LodgewayError::NotFound(format!("chunk {} of blob {}", sequence, blob_id))
            })
    }

    async fn delete_all(&self, blob_id: &str) -> Result<()> {
        self.chunks.retain(|key, _| key.0 != blob_id);
        Ok(())
    }
}

// ============================================================================
// MongoDB backend
// ============================================================================

/// Chunk document stored in MongoDB
#[derive(Serialize, Deserialize)]
struct ChunkDoc {
    blob_id: String,
    sequence: u32,
    digest: String,
    data: Binary,
}

/// MongoDB-backed chunk store
pub struct MongoChunkStore {
    chunks: mongodb::Collection<ChunkDoc>,
}

impl MongoChunkStore {
    /// Create the store and ensure the unique `(blob_id, sequence)` index
    pub async fn new(client: &MongoClient) -> Result<Self> {
        let chunks = client.raw_collection::<ChunkDoc>(CHUNK_COLLECTION);

        let index = mongodb::IndexModel::builder()
            .keys(doc! { "blob_id": 1, "sequence": 1 })
            .options(mongodb::options::IndexOptions::builder().unique(true).build())
            .build();
        chunks
            .create_index(index)
            .await
            .map_err(|e| LodgewayError::Database(format!("Failed to create chunk index: {}", e)))?;

        Ok(Self { chunks })
    }
}

#[async_trait]
impl ChunkStore for MongoChunkStore {
    async fn write(&self, blob_id: &str, sequence: u32, bytes: Bytes) -> Result<()> {
        let digest = chunk_digest(&bytes);
        let filter = doc! { "blob_id": blob_id, "sequence": sequence };

        if let Some(existing) = self
            .chunks
            .find_one(filter.clone())
            .await
            .map_err(|e| LodgewayError::Storage(format!("chunk lookup failed: {}", e)))?
        {
            if existing.digest == digest {
                debug!(blob_id, sequence, "chunk already written, retry is a no-op");
                return Ok(());
            }
            return Err(LodgewayError::ConsistencyViolation {
                blob_id: blob_id.to_string(),
                sequence,
            });
        }

        let chunk = ChunkDoc {
            blob_id: blob_id.to_string(),
            sequence,
            digest: digest.clone(),
            data: Binary {
                subtype: bson::spec::BinarySubtype::Generic,
                bytes: bytes.to_vec(),
            },
        };

        match self.chunks.insert_one(chunk).await {
            Ok(_) => Ok(()),
            // A concurrent retry may have landed first; the unique index
            // turns that into a duplicate-key error. Re-read and compare.
            Err(e) => match self.chunks.find_one(filter).await {
                Ok(Some(existing)) if existing.digest == digest => Ok(()),
                Ok(Some(_)) => Err(LodgewayError::ConsistencyViolation {
                    blob_id: blob_id.to_string(),
                    sequence,
                }),
                _ => Err(LodgewayError::Storage(format!("chunk write failed: {}", e))),
            },
        }
    }

    async fn read(&self, blob_id: &str, sequence: u32) -> Result<Bytes> {
        let chunk = self
            .chunks
            .find_one(doc! { "blob_id": blob_id, "sequence": sequence })
            .await
            .map_err(|e| LodgewayError::Storage(format!("chunk read failed: {}", e)))?
            .ok_or_else(|| {
                LodgewayError::NotFound(format!("chunk {} of blob {}", sequence, blob_id))
            })?;

        Ok(Bytes::from(chunk.data.bytes))
    }

    async fn delete_all(&self, blob_id: &str) -> Result<()> {
        self.chunks
            .delete_many(doc! { "blob_id": blob_id })
            .await
            .map_err(|e| LodgewayError::Storage(format!("chunk delete failed: {}", e)))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_write_then_read_round_trip() {
        let store = MemoryChunkStore::new();
        store
            .write("blob-1", 0, Bytes::from_static(b"hello"))
            .await
            .unwrap();

        let bytes = store.read("blob-1", 0).await.unwrap();
        assert_eq!(&bytes[..], b"hello");
    }

    #[tokio::test]
    async fn test_identical_rewrite_is_noop() {
        let store = MemoryChunkStore::new();
        store
            .write("blob-1", 0, Bytes::from_static(b"same"))
            .await
            .unwrap();
        store
            .write("blob-1", 0, Bytes::from_static(b"same"))
            .await
            .unwrap();

        assert_eq!(store.chunk_count("blob-1"), 1);
        assert_eq!(&store.read("blob-1", 0).await.unwrap()[..], b"same");
    }

    #[tokio::test]
    async fn test_differing_rewrite_is_rejected() {
        let store = MemoryChunkStore::new();
        store
            .write("blob-1", 0, Bytes::from_static(b"original"))
            .await
            .unwrap();

        let err = store
            .write("blob-1", 0, Bytes::from_static(b"different"))
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            LodgewayError::ConsistencyViolation { sequence: 0, .. }
        ));

        // Original content survives the rejected rewrite
        assert_eq!(&store.read("blob-1", 0).await.unwrap()[..], b"original");
    }

    #[tokio::test]
    async fn test_read_missing_chunk_is_not_found() {
        let store = MemoryChunkStore::new();
        assert!(matches!(
            store.read("nope", 0).await.unwrap_err(),
            LodgewayError::NotFound(_)
        ));
    }

    #[tokio::test]
    async fn test_delete_all_removes_only_target_blob() {
        let store = MemoryChunkStore::new();
        store.write("a", 0, Bytes::from_static(b"x")).await.unwrap();
        store.write("a", 1, Bytes::from_static(b"y")).await.unwrap();
        store.write("b", 0, Bytes::from_static(b"z")).await.unwrap();

        store.delete_all("a").await.unwrap();

        assert_eq!(store.chunk_count("a"), 0);
        assert_eq!(store.chunk_count("b"), 1);

        // Deleting an unknown blob is a no-op success
        store.delete_all("a").await.unwrap();
    }

    #[test]
    fn test_chunk_digest_stability() {
        assert_eq!(chunk_digest(b"abc"), chunk_digest(b"abc"));
        assert_ne!(chunk_digest(b"abc"), chunk_digest(b"abd"));
        assert_eq!(chunk_digest(b"abc").len(), 64);
    }
}
