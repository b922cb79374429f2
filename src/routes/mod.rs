//! HTTP routes for Lodgeway
//!
//! Shared response helpers live here; the per-surface handlers are in
//! the submodules. Handlers translate the error taxonomy to HTTP
//! statuses in one place so route code stays declarative.

pub mod health;
pub mod listings;
pub mod media;

use bytes::Bytes;
use http_body_util::{BodyExt, Full};
use hyper::{Response, StatusCode};
use serde::Serialize;
use std::collections::HashMap;

use crate::types::LodgewayError;

pub use health::{health_check, readiness_check};
pub use listings::{handle_import, handle_listings, handle_search, handle_stats};
pub use media::{handle_media_by_id, handle_upload};

/// Boxed response body; streamed downloads and buffered JSON share it.
/// Unsync because download bodies poll chunk reads that are Send only.
pub type BoxBody = http_body_util::combinators::UnsyncBoxBody<Bytes, LodgewayError>;

/// Buffered body from bytes
pub fn full_body(bytes: impl Into<Bytes>) -> BoxBody {
    Full::new(bytes.into())
        .map_err(|never| match never {})
        .boxed_unsync()
}

/// API error payload
#[derive(Debug, Serialize)]
struct ApiError {
    error: String,
    code: &'static str,
}

/// Build a JSON error response
pub fn error_response(status: StatusCode, message: &str, code: &'static str) -> Response<BoxBody> {
    let error = ApiError {
        error: message.to_string(),
        code,
    };
    let body = serde_json::to_vec(&error).unwrap_or_default();

    Response::builder()
        .status(status)
        .header("Content-Type", "application/json")
        .header("Cache-Control", "no-cache")
        .header("Access-Control-Allow-Origin", "*")
        .body(full_body(body))
        .unwrap_or_else(|_| {
            Response::builder()
                .status(StatusCode::INTERNAL_SERVER_ERROR)
                .body(full_body(r#"{"error":"Internal error"}"#.as_bytes().to_vec()))
                .unwrap()
        })
}

/// Build a successful JSON response
pub fn json_response<T: Serialize>(status: StatusCode, data: &T) -> Response<BoxBody> {
    let body = serde_json::to_vec(data).unwrap_or_default();
    Response::builder()
        .status(status)
        .header("Content-Type", "application/json")
        .header("Access-Control-Allow-Origin", "*")
        .body(full_body(body))
        .unwrap()
}

/// Map a service error to its HTTP response
pub fn error_to_response(err: &LodgewayError) -> Response<BoxBody> {
    let (status, code) = match err {
        LodgewayError::Validation(_) => (StatusCode::BAD_REQUEST, "VALIDATION_ERROR"),
        LodgewayError::NotFound(_) => (StatusCode::NOT_FOUND, "NOT_FOUND"),
        LodgewayError::SizeLimitExceeded { .. } => {
            (StatusCode::PAYLOAD_TOO_LARGE, "SIZE_LIMIT_EXCEEDED")
        }
        LodgewayError::UnsupportedMediaType(_) => {
            (StatusCode::UNSUPPORTED_MEDIA_TYPE, "UNSUPPORTED_MEDIA_TYPE")
        }
        LodgewayError::ConsistencyViolation { .. } => (StatusCode::CONFLICT, "CONSISTENCY_VIOLATION"),
        LodgewayError::Storage(_) => (StatusCode::INTERNAL_SERVER_ERROR, "STORAGE_FAILURE"),
        LodgewayError::Database(_) => (StatusCode::INTERNAL_SERVER_ERROR, "DATABASE_ERROR"),
        LodgewayError::Config(_) => (StatusCode::INTERNAL_SERVER_ERROR, "CONFIG_ERROR"),
    };
    error_response(status, &err.to_string(), code)
}

/// Storage backend not connected
pub fn storage_unavailable() -> Response<BoxBody> {
    error_response(
        StatusCode::SERVICE_UNAVAILABLE,
        "Storage backend not available",
        "STORAGE_UNAVAILABLE",
    )
}

/// Parse a query string into a key-value map, percent-decoding values
pub fn parse_query_params(query: &str) -> HashMap<String, String> {
    if query.is_empty() {
        return HashMap::new();
    }

    query
        .split('&')
        .filter_map(|pair| {
            let mut parts = pair.splitn(2, '=');
            let key = parts.next()?;
            let value = parts.next().unwrap_or("");
            let key = urlencoding::decode(key).map(|s| s.into_owned()).ok()?;
            let value = urlencoding::decode(value)
                .map(|s| s.into_owned())
                .unwrap_or_else(|_| value.to_string());
            Some((key, value))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_query_params() {
        let params = parse_query_params("limit=50&page=2");
        assert_eq!(params.get("limit"), Some(&"50".to_string()));
        assert_eq!(params.get("page"), Some(&"2".to_string()));
    }

    #[test]
    fn test_parse_query_params_decodes_values() {
        let params = parse_query_params("location=New%20York&q=river+view");
        assert_eq!(params.get("location"), Some(&"New York".to_string()));
    }

    #[test]
    fn test_parse_query_params_empty() {
        assert!(parse_query_params("").is_empty());
    }

    #[test]
    fn test_error_mapping_statuses() {
        let cases = [
            (
                LodgewayError::Validation("x".into()),
                StatusCode::BAD_REQUEST,
            ),
            (LodgewayError::NotFound("x".into()), StatusCode::NOT_FOUND),
            (
                LodgewayError::SizeLimitExceeded {
                    limit: 1,
                    actual: 2,
                },
                StatusCode::PAYLOAD_TOO_LARGE,
            ),
            (
                LodgewayError::UnsupportedMediaType("x".into()),
                StatusCode::UNSUPPORTED_MEDIA_TYPE,
            ),
            (
                LodgewayError::Storage("x".into()),
                StatusCode::INTERNAL_SERVER_ERROR,
            ),
        ];
        for (err, status) in cases {
            assert_eq!(error_to_response(&err).status(), status);
        }
    }
}
