//! Chunked media storage
//!
//! Blobs are stored as fixed-size chunks addressed by
//! `(blob_id, sequence)`. The pieces, leaves first:
//!
//! - [`chunk_store`] - durable chunk storage, no knowledge of blobs as
//!   a whole
//! - [`registry`] - blob metadata with a draft → finalize/abort
//!   lifecycle; a blob is never visible until all its chunks landed
//! - [`upload`] - splits an incoming byte stream into chunks, owns
//!   partial-failure cleanup
//! - [`stream`] - lazy, finite, offset-capable retrieval

pub mod chunk_store;
pub mod registry;
pub mod stream;
pub mod upload;

pub use chunk_store::{ChunkStore, MemoryChunkStore, MongoChunkStore};
pub use registry::{BlobRecord, BlobRecordStore, BlobRegistry, MemoryRecordStore, MongoRecordStore};
pub use stream::{open_blob, ByteStream};
pub use upload::{IncomingFile, StoredBlob, UploadConfig, UploadPipeline};
