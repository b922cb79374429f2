//! Blob metadata registry
//!
//! Maps a blob id to its record (filename, content type, length, chunk
//! count, free-form metadata, creation time). A blob passes through a
//! draft phase while its chunks are written: the draft lives only in
//! process memory, and the persistent record is written at `finalize`.
//! Readers therefore never observe a partially written blob — an error
//! or crash before finalize leaves no visible trace, only unreferenced
//! chunks that `abort` (or a later sweep) reclaims.
//!
//! Deletion removes chunks first, then the record, so an interrupted
//! delete can leave orphan chunks but never a record pointing at
//! missing data.

use async_trait::async_trait;
use bson::doc;
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::db::MongoClient;
use crate::media::chunk_store::ChunkStore;
use crate::types::{LodgewayError, Result};

/// Collection name for blob records
pub const BLOB_COLLECTION: &str = "media_blobs";

/// Metadata for one stored blob
#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct BlobRecord {
    /// Generated blob id, globally unique, never reused
    pub blob_id: String,
    /// Stored filename
    pub filename: String,
    /// Declared content type
    pub content_type: String,
    /// Total length in bytes
    pub length: u64,
    /// Number of chunks
    pub chunk_count: u32,
    /// Free-form key/value metadata (open key set)
    #[serde(default)]
    pub metadata: HashMap<String, String>,
    /// When the blob was finalized
    pub created_at: bson::DateTime,
}

/// Persistence for finalized blob records
#[async_trait]
pub trait BlobRecordStore: Send + Sync {
    async fn insert(&self, record: BlobRecord) -> Result<()>;
    async fn get(&self, blob_id: &str) -> Result<Option<BlobRecord>>;
    /// Remove a record; `false` if it was not present
    async fn delete(&self, blob_id: &str) -> Result<bool>;
}

/// In-memory record store used by unit tests
#[derive(Default)]
pub struct MemoryRecordStore {
    records: DashMap<String, BlobRecord>,
}

impl MemoryRecordStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of visible records
    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

#[async_trait]
impl BlobRecordStore for MemoryRecordStore {
    async fn insert(&self, record: BlobRecord) -> Result<()> {
        self.records.insert(record.blob_id.clone(), record);
        Ok(())
    }

    async fn get(&self, blob_id: &str) -> Result<Option<BlobRecord>> {
        Ok(self.records.get(blob_id).map(|r| r.clone()))
    }

    async fn delete(&self, blob_id: &str) -> Result<bool> {
        Ok(self.records.remove(blob_id).is_some())
    }
}

/// MongoDB-backed record store
pub struct MongoRecordStore {
    records: mongodb::Collection<BlobRecord>,
}

impl MongoRecordStore {
    /// Create the store and ensure the unique blob id index
    pub async fn new(client: &MongoClient) -> Result<Self> {
        let records = client.raw_collection::<BlobRecord>(BLOB_COLLECTION);

        let index = mongodb::IndexModel::builder()
            .keys(doc! { "blob_id": 1 })
            .options(mongodb::options::IndexOptions::builder().unique(true).build())
            .build();
        records
            .create_index(index)
            .await
            .map_err(|e| LodgewayError::Database(format!("Failed to create blob index: {}", e)))?;

        Ok(Self { records })
    }
}

#[async_trait]
impl BlobRecordStore for MongoRecordStore {
    async fn insert(&self, record: BlobRecord) -> Result<()> {
        self.records
            .insert_one(record)
            .await
            .map_err(|e| LodgewayError::Storage(format!("blob record insert failed: {}", e)))?;
        Ok(())
    }

    async fn get(&self, blob_id: &str) -> Result<Option<BlobRecord>> {
        self.records
            .find_one(doc! { "blob_id": blob_id })
            .await
            .map_err(|e| LodgewayError::Storage(format!("blob record lookup failed: {}", e)))
    }

    async fn delete(&self, blob_id: &str) -> Result<bool> {
        let result = self
            .records
            .delete_one(doc! { "blob_id": blob_id })
            .await
            .map_err(|e| LodgewayError::Storage(format!("blob record delete failed: {}", e)))?;
        Ok(result.deleted_count > 0)
    }
}

/// In-process draft state for a blob being written
struct Draft {
    filename: String,
    content_type: String,
    metadata: HashMap<String, String>,
}

/// Generate a blob id: epoch millis plus a random suffix
fn generate_blob_id() -> String {
    format!(
        "{}-{}",
        chrono::Utc::now().timestamp_millis(),
        Uuid::new_v4().simple()
    )
}

/// Blob metadata layer built on a [`ChunkStore`]
pub struct BlobRegistry {
    chunks: Arc<dyn ChunkStore>,
    records: Arc<dyn BlobRecordStore>,
    drafts: DashMap<String, Draft>,
}

impl BlobRegistry {
    pub fn new(chunks: Arc<dyn ChunkStore>, records: Arc<dyn BlobRecordStore>) -> Self {
        Self {
            chunks,
            records,
            drafts: DashMap::new(),
        }
    }

    /// Registry backed entirely by memory, for tests
    pub fn in_memory() -> Self {
        Self::new(
            Arc::new(super::chunk_store::MemoryChunkStore::new()),
            Arc::new(MemoryRecordStore::new()),
        )
    }

    /// The chunk store this registry writes through
    pub fn chunk_store(&self) -> Arc<dyn ChunkStore> {
        Arc::clone(&self.chunks)
    }

    /// Open a draft blob and return its id. Nothing is visible to
    /// readers until `finalize`.
    pub fn begin_blob(
        &self,
        filename: &str,
        content_type: &str,
        metadata: HashMap<String, String>,
    ) -> String {
        let blob_id = generate_blob_id();
        self.drafts.insert(
            blob_id.clone(),
            Draft {
                filename: filename.to_string(),
                content_type: content_type.to_string(),
                metadata,
            },
        );
        debug!(%blob_id, filename, "draft blob opened");
        blob_id
    }

    /// Persist the record for a fully written draft, making it visible
    pub async fn finalize(&self, draft_id: &str, length: u64, chunk_count: u32) -> Result<BlobRecord> {
        let (_, draft) = self.drafts.remove(draft_id).ok_or_else(|| {
            LodgewayError::Validation(format!("unknown draft blob: {}", draft_id))
        })?;

        let record = BlobRecord {
            blob_id: draft_id.to_string(),
            filename: draft.filename,
            content_type: draft.content_type,
            length,
            chunk_count,
            metadata: draft.metadata,
            created_at: bson::DateTime::now(),
        };

        self.records.insert(record.clone()).await?;
        info!(blob_id = draft_id, length, chunk_count, "blob finalized");
        Ok(record)
    }

    /// Drop a draft and any chunks already written for it
    pub async fn abort(&self, draft_id: &str) -> Result<()> {
        self.drafts.remove(draft_id);
        self.chunks.delete_all(draft_id).await?;
        warn!(blob_id = draft_id, "draft blob aborted");
        Ok(())
    }

    /// Look up a finalized blob
    pub async fn get(&self, blob_id: &str) -> Result<Option<BlobRecord>> {
        self.records.get(blob_id).await
    }

    /// Delete a finalized blob and all its chunks. Chunks go first so
    /// an interruption never leaves a record pointing at missing data.
    pub async fn delete(&self, blob_id: &str) -> Result<()> {
        if self.records.get(blob_id).await?.is_none() {
            return Err(LodgewayError::NotFound(format!("blob {}", blob_id)));
        }

        self.chunks.delete_all(blob_id).await?;
        let removed = self.records.delete(blob_id).await?;
        if !removed {
            // Another caller finished the delete between our check and now
            return Err(LodgewayError::NotFound(format!("blob {}", blob_id)));
        }

        info!(blob_id, "blob deleted");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::Bytes;

    #[tokio::test]
    async fn test_blob_invisible_until_finalize() {
        let registry = BlobRegistry::in_memory();
        let id = registry.begin_blob("a.png", "image/png", HashMap::new());

        registry
            .chunk_store()
            .write(&id, 0, Bytes::from_static(b"data"))
            .await
            .unwrap();

        assert!(registry.get(&id).await.unwrap().is_none());

        let record = registry.finalize(&id, 4, 1).await.unwrap();
        assert_eq!(record.length, 4);
        assert!(registry.get(&id).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_abort_leaves_no_trace() {
        let chunks = Arc::new(super::super::chunk_store::MemoryChunkStore::new());
        let registry = BlobRegistry::new(chunks.clone(), Arc::new(MemoryRecordStore::new()));

        let id = registry.begin_blob("a.png", "image/png", HashMap::new());
        registry
            .chunk_store()
            .write(&id, 0, Bytes::from_static(b"partial"))
            .await
            .unwrap();

        registry.abort(&id).await.unwrap();

        assert!(registry.get(&id).await.unwrap().is_none());
        assert_eq!(chunks.chunk_count(&id), 0);
        // Finalize after abort must fail: the draft is gone
        assert!(registry.finalize(&id, 7, 1).await.is_err());
    }

    #[tokio::test]
    async fn test_delete_is_idempotent_in_outcome() {
        let registry = BlobRegistry::in_memory();
        let id = registry.begin_blob("a.png", "image/png", HashMap::new());
        registry
            .chunk_store()
            .write(&id, 0, Bytes::from_static(b"x"))
            .await
            .unwrap();
        registry.finalize(&id, 1, 1).await.unwrap();

        registry.delete(&id).await.unwrap();
        let err = registry.delete(&id).await.unwrap_err();
        assert!(matches!(err, LodgewayError::NotFound(_)));
        assert!(registry.get(&id).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_blob_ids_are_unique() {
        let registry = BlobRegistry::in_memory();
        let a = registry.begin_blob("a", "image/png", HashMap::new());
        let b = registry.begin_blob("a", "image/png", HashMap::new());
        assert_ne!(a, b);
    }

    #[tokio::test]
    async fn test_record_carries_draft_metadata() {
        let registry = BlobRegistry::in_memory();
        let mut meta = HashMap::new();
        meta.insert("listing".to_string(), "L-42".to_string());

        let id = registry.begin_blob("front.jpg", "image/jpeg", meta);
        let record = registry.finalize(&id, 0, 0).await.unwrap();

        assert_eq!(record.filename, "front.jpg");
        assert_eq!(record.content_type, "image/jpeg");
        assert_eq!(record.metadata.get("listing").map(String::as_str), Some("L-42"));
    }
}
