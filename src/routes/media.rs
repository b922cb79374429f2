//! Media routes with HTTP 206 Range request support
//!
//! - `POST /media` - stream one payload into chunked storage
//! - `GET /media/{id}` - stream content back, full or byte range
//! - `HEAD /media/{id}` - headers only
//! - `GET /media/{id}/info` - metadata without the payload
//! - `DELETE /media/{id}` - remove the blob and its chunks
//!
//! Downloads are streamed chunk by chunk: the store is read only as
//! fast as the client drains the response, and an abandoned download
//! stops reading.

use bytes::Bytes;
use futures_util::StreamExt;
use http_body_util::{BodyExt, BodyStream, StreamBody};
use hyper::body::{Frame, Incoming};
use hyper::{header, Method, Request, Response, StatusCode};
use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::media::stream::{open_blob, take_bytes, ByteStream};
use crate::media::upload::IncomingFile;
use crate::routes::{
    error_response, error_to_response, full_body, json_response, parse_query_params,
    storage_unavailable, BoxBody,
};
use crate::server::AppState;
use crate::types::LodgewayError;

/// Upload response, per file
#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct UploadResponse {
    blob_id: String,
    filename: String,
    url: String,
    original_name: String,
    size: u64,
    mimetype: String,
}

/// Blob metadata response
#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct BlobInfoResponse {
    blob_id: String,
    filename: String,
    content_type: String,
    upload_date: String,
    metadata: HashMap<String, String>,
    length: u64,
}

/// Parse an HTTP Range header against a total size.
/// Supports `bytes=start-end`, `bytes=start-`, and `bytes=-suffix`.
///
/// Returns (start, end) where end is exclusive.
fn parse_range_header(range_header: &str, total_size: u64) -> Option<(u64, u64)> {
    let range_str = range_header.strip_prefix("bytes=")?;

    if let Some(suffix) = range_str.strip_prefix('-') {
        // Suffix range: bytes=-500 means last 500 bytes
        let suffix: u64 = suffix.parse().ok()?;
        let start = total_size.saturating_sub(suffix);
        return Some((start, total_size));
    }

    let parts: Vec<&str> = range_str.split('-').collect();
    if parts.len() != 2 {
        return None;
    }

    let start: u64 = parts[0].parse().ok()?;

    let end = if parts[1].is_empty() {
        // Open-ended range: bytes=1000-
        total_size
    } else {
        // HTTP end is inclusive; make it exclusive
        let end: u64 = parts[1].parse().ok()?;
        end + 1
    };

    if start >= total_size || end > total_size || start >= end {
        return None;
    }

    Some((start, end))
}

/// Handle POST /media
pub async fn handle_upload(state: Arc<AppState>, req: Request<Incoming>) -> Response<BoxBody> {
    let Some(pipeline) = state.upload.clone() else {
        return storage_unavailable();
    };

    let content_type = match req
        .headers()
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .map(|v| v.split(';').next().unwrap_or(v).trim().to_string())
    {
        Some(ct) if !ct.is_empty() => ct,
        _ => {
            return error_response(
                StatusCode::BAD_REQUEST,
                "Content-Type header is required",
                "VALIDATION_ERROR",
            )
        }
    };

    let filename = req
        .headers()
        .get("x-filename")
        .and_then(|v| v.to_str().ok())
        .filter(|v| !v.is_empty())
        .unwrap_or("upload")
        .to_string();

    let declared_len = req
        .headers()
        .get(header::CONTENT_LENGTH)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.parse::<u64>().ok());

    // Query parameters become free-form blob metadata (e.g. listing=L-1)
    let metadata = parse_query_params(req.uri().query().unwrap_or(""));

    let file = IncomingFile {
        filename: filename.clone(),
        content_type,
        declared_len,
        metadata,
    };

    let body = BodyStream::new(req.into_body()).map(|item| match item {
        Ok(frame) => Ok(frame.into_data().unwrap_or_default()),
        Err(e) => Err(LodgewayError::Storage(format!("request body error: {}", e))),
    });

    match pipeline.upload(file, Box::pin(body)).await {
        Ok(stored) => {
            info!(blob_id = %stored.blob_id, size = stored.length, "media uploaded");
            let response = UploadResponse {
                url: format!("/media/{}", stored.blob_id),
                original_name: filename,
                blob_id: stored.blob_id,
                filename: stored.filename,
                size: stored.length,
                mimetype: stored.content_type,
            };
            json_response(StatusCode::CREATED, &response)
        }
        Err(e) => {
            warn!(error = %e, "media upload failed");
            error_to_response(&e)
        }
    }
}

/// Handle GET/HEAD/DELETE under /media/{id} and GET /media/{id}/info
pub async fn handle_media_by_id(
    state: Arc<AppState>,
    req: Request<Incoming>,
    rest: &str,
) -> Response<BoxBody> {
    let Some(registry) = state.registry.clone() else {
        return storage_unavailable();
    };

    let (blob_id, info) = match rest.strip_suffix("/info") {
        Some(id) => (id, true),
        None => (rest, false),
    };
    if blob_id.is_empty() || blob_id.contains('/') {
        return error_response(StatusCode::NOT_FOUND, "No such blob", "NOT_FOUND");
    }

    let record = match registry.get(blob_id).await {
        Ok(Some(record)) => record,
        Ok(None) => {
            return error_response(StatusCode::NOT_FOUND, "Blob not found", "NOT_FOUND");
        }
        Err(e) => return error_to_response(&e),
    };

    match (req.method().clone(), info) {
        (Method::GET, true) => {
            let response = BlobInfoResponse {
                blob_id: record.blob_id.clone(),
                filename: record.filename.clone(),
                content_type: record.content_type.clone(),
                upload_date: record
                    .created_at
                    .try_to_rfc3339_string()
                    .unwrap_or_default(),
                metadata: record.metadata.clone(),
                length: record.length,
            };
            json_response(StatusCode::OK, &response)
        }
        (Method::HEAD, false) => Response::builder()
            .status(StatusCode::OK)
            .header(header::CONTENT_TYPE, &record.content_type)
            .header(header::CONTENT_LENGTH, record.length)
            .header(header::ACCEPT_RANGES, "bytes")
            .body(full_body(Bytes::new()))
            .unwrap(),
        (Method::GET, false) => {
            let chunk_size = state.args.chunk_size_bytes;
            let range = req
                .headers()
                .get(header::RANGE)
                .and_then(|v| v.to_str().ok())
                .map(str::to_string);

            match range {
                Some(range_str) => {
                    let Some((start, end)) = parse_range_header(&range_str, record.length) else {
                        warn!(blob_id, range = %range_str, "invalid range header");
                        return error_response(
                            StatusCode::RANGE_NOT_SATISFIABLE,
                            "Invalid range",
                            "INVALID_RANGE",
                        );
                    };

                    let stream = match open_blob(registry.chunk_store(), &record, start, chunk_size)
                    {
                        Ok(s) => take_bytes(s, end - start),
                        Err(e) => return error_to_response(&e),
                    };

                    debug!(blob_id, start, end, "serving partial content");
                    Response::builder()
                        .status(StatusCode::PARTIAL_CONTENT)
                        .header(header::CONTENT_TYPE, &record.content_type)
                        .header(header::CONTENT_LENGTH, end - start)
                        .header(
                            header::CONTENT_RANGE,
                            format!("bytes {}-{}/{}", start, end - 1, record.length),
                        )
                        .header(header::ACCEPT_RANGES, "bytes")
                        .body(stream_body(stream))
                        .unwrap()
                }
                None => {
                    let stream = match open_blob(registry.chunk_store(), &record, 0, chunk_size) {
                        Ok(s) => s,
                        Err(e) => return error_to_response(&e),
                    };

                    debug!(blob_id, length = record.length, "serving full content");
                    Response::builder()
                        .status(StatusCode::OK)
                        .header(header::CONTENT_TYPE, &record.content_type)
                        .header(header::CONTENT_LENGTH, record.length)
                        .header(header::ACCEPT_RANGES, "bytes")
                        .body(stream_body(stream))
                        .unwrap()
                }
            }
        }
        (Method::DELETE, false) => match registry.delete(blob_id).await {
            Ok(()) => {
                let body = serde_json::json!({ "deleted": true, "blobId": blob_id });
                json_response(StatusCode::OK, &body)
            }
            Err(e) => error_to_response(&e),
        },
        _ => error_response(
            StatusCode::METHOD_NOT_ALLOWED,
            "Method not allowed",
            "METHOD_NOT_ALLOWED",
        ),
    }
}

/// Wrap a byte stream as a response body
fn stream_body(stream: ByteStream) -> BoxBody {
    StreamBody::new(stream.map(|item| item.map(Frame::data))).boxed_unsync()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_range_header() {
        let total = 1000;

        assert_eq!(parse_range_header("bytes=0-499", total), Some((0, 500)));
        assert_eq!(parse_range_header("bytes=500-999", total), Some((500, 1000)));

        // Open-ended range
        assert_eq!(parse_range_header("bytes=500-", total), Some((500, 1000)));

        // Suffix range
        assert_eq!(parse_range_header("bytes=-200", total), Some((800, 1000)));

        // Invalid ranges
        assert_eq!(parse_range_header("bytes=1000-1500", total), None);
        assert_eq!(parse_range_header("bytes=500-499", total), None);
        assert_eq!(parse_range_header("invalid", total), None);
    }

    #[test]
    fn test_parse_range_edge_cases() {
        // First byte
        assert_eq!(parse_range_header("bytes=0-0", 100), Some((0, 1)));

        // Last byte
        assert_eq!(parse_range_header("bytes=99-99", 100), Some((99, 100)));

        // Full file
        assert_eq!(parse_range_header("bytes=0-99", 100), Some((0, 100)));

        // Suffix larger than file
        assert_eq!(parse_range_header("bytes=-200", 100), Some((0, 100)));

        // Empty file has no satisfiable range
        assert_eq!(parse_range_header("bytes=0-", 0), None);
    }
}
