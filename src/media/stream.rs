//! Lazy blob retrieval
//!
//! `open_blob` yields a finite stream of byte chunks in ascending
//! sequence order. Chunks are fetched from the store only as the
//! consumer polls, so a slow sink applies natural backpressure and an
//! abandoned download stops reading. A range request skips whole
//! chunks up to the offset and trims the first yielded chunk; a read
//! failure surfaces as an `Err` item and ends the stream.

use bytes::Bytes;
use futures::stream::Stream;
use futures_util::StreamExt;
use std::pin::Pin;
use std::sync::Arc;

use crate::media::chunk_store::ChunkStore;
use crate::media::registry::BlobRecord;
use crate::types::{LodgewayError, Result};

/// Boxed stream of blob bytes
pub type ByteStream = Pin<Box<dyn Stream<Item = Result<Bytes>> + Send>>;

/// Open a blob's bytes starting at `offset`, given its record and the
/// chunk size it was written with. `offset` must be within the blob
/// (or 0 for an empty blob).
pub fn open_blob(
    chunks: Arc<dyn ChunkStore>,
    record: &BlobRecord,
    offset: u64,
    chunk_size: usize,
) -> Result<ByteStream> {
    if offset > 0 && offset >= record.length {
        return Err(LodgewayError::Validation(format!(
            "offset {} is past the end of blob {} ({} bytes)",
            offset, record.blob_id, record.length
        )));
    }

    let first_sequence = (offset / chunk_size as u64) as u32;
    let trim = (offset % chunk_size as u64) as usize;
    let blob_id = record.blob_id.clone();
    let chunk_count = record.chunk_count;

    let stream = futures::stream::unfold(
        (first_sequence, trim, chunks),
        move |(sequence, trim, chunks)| {
            let blob_id = blob_id.clone();
            async move {
                if sequence >= chunk_count {
                    return None;
                }
                match chunks.read(&blob_id, sequence).await {
                    Ok(bytes) => {
                        let bytes = if trim > 0 {
                            if trim < bytes.len() {
                                bytes.slice(trim..)
                            } else {
                                Bytes::new()
                            }
                        } else {
                            bytes
                        };
                        Some((Ok(bytes), (sequence + 1, 0, chunks)))
                    }
                    // Surface the failure and terminate; no retry
                    Err(e) => Some((Err(e), (chunk_count, 0, chunks))),
                }
            }
        },
    );

    Ok(Box::pin(stream))
}

/// Cap a byte stream at `limit` bytes, truncating the final chunk
pub fn take_bytes(stream: ByteStream, limit: u64) -> ByteStream {
    Box::pin(stream.scan(limit, |remaining, item| {
        let out = match item {
            Ok(bytes) => {
                if *remaining == 0 {
                    None
                } else {
                    let take = (*remaining).min(bytes.len() as u64) as usize;
                    *remaining -= take as u64;
                    Some(Ok(bytes.slice(..take)))
                }
            }
            Err(e) => {
                *remaining = 0;
                Some(Err(e))
            }
        };
        futures::future::ready(out)
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::media::registry::BlobRegistry;
    use std::collections::HashMap;

    async fn store_blob(registry: &BlobRegistry, content: &[u8], chunk_size: usize) -> BlobRecord {
        let id = registry.begin_blob("t.png", "image/png", HashMap::new());
        let chunks = registry.chunk_store();
        let mut sequence = 0u32;
        for part in content.chunks(chunk_size) {
            chunks
                .write(&id, sequence, Bytes::copy_from_slice(part))
                .await
                .unwrap();
            sequence += 1;
        }
        registry
            .finalize(&id, content.len() as u64, sequence)
            .await
            .unwrap()
    }

    async fn collect(stream: ByteStream) -> Vec<u8> {
        let mut out = Vec::new();
        let mut stream = stream;
        while let Some(item) = stream.next().await {
            out.extend_from_slice(&item.unwrap());
        }
        out
    }

    #[tokio::test]
    async fn test_full_read_matches_original() {
        let registry = BlobRegistry::in_memory();
        let content = b"the quick brown fox jumps over the lazy dog";
        let record = store_blob(&registry, content, 8).await;

        let stream = open_blob(registry.chunk_store(), &record, 0, 8).unwrap();
        assert_eq!(collect(stream).await, content);
    }

    #[tokio::test]
    async fn test_offset_read_yields_exact_tail() {
        let registry = BlobRegistry::in_memory();
        let content: Vec<u8> = (0u8..=99).collect();
        let record = store_blob(&registry, &content, 16).await;

        // Offsets landing mid-chunk, on a boundary, and in the last chunk
        for offset in [1u64, 16, 17, 50, 99] {
            let stream = open_blob(registry.chunk_store(), &record, offset, 16).unwrap();
            let bytes = collect(stream).await;
            assert_eq!(bytes.len() as u64, record.length - offset);
            assert_eq!(bytes, &content[offset as usize..]);
        }
    }

    #[tokio::test]
    async fn test_offset_past_end_is_rejected() {
        let registry = BlobRegistry::in_memory();
        let record = store_blob(&registry, b"12345", 4).await;

        assert!(open_blob(registry.chunk_store(), &record, 5, 4).is_err());
        assert!(open_blob(registry.chunk_store(), &record, 99, 4).is_err());
    }

    #[tokio::test]
    async fn test_empty_blob_yields_empty_stream() {
        let registry = BlobRegistry::in_memory();
        let record = store_blob(&registry, b"", 4).await;

        let stream = open_blob(registry.chunk_store(), &record, 0, 4).unwrap();
        assert!(collect(stream).await.is_empty());
    }

    #[tokio::test]
    async fn test_missing_chunk_surfaces_error_and_ends_stream() {
        let registry = BlobRegistry::in_memory();
        let record = store_blob(&registry, b"abcdefgh", 4).await;

        // Simulate a lost chunk under a still-visible record
        registry.chunk_store().delete_all(&record.blob_id).await.unwrap();

        let mut stream = open_blob(registry.chunk_store(), &record, 0, 4).unwrap();
        let first = stream.next().await.unwrap();
        assert!(matches!(first.unwrap_err(), LodgewayError::NotFound(_)));
        assert!(stream.next().await.is_none());
    }

    #[tokio::test]
    async fn test_take_bytes_truncates_final_chunk() {
        let registry = BlobRegistry::in_memory();
        let content: Vec<u8> = (0u8..32).collect();
        let record = store_blob(&registry, &content, 8).await;

        let stream = open_blob(registry.chunk_store(), &record, 4, 8).unwrap();
        let bytes = collect(take_bytes(stream, 10)).await;
        assert_eq!(bytes, &content[4..14]);
    }
}
