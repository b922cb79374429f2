//! Error taxonomy for Lodgeway
//!
//! One enum covers the whole service so handlers can map outcomes to
//! HTTP statuses in a single place. User-correctable problems
//! (validation, unsupported media types, oversize uploads) are kept
//! distinct from infrastructure faults (storage, database).

use thiserror::Error;

/// Result alias used throughout the crate
pub type Result<T> = std::result::Result<T, LodgewayError>;

/// Error types for Lodgeway operations
#[derive(Debug, Error)]
pub enum LodgewayError {
    /// Malformed or missing request field (4xx-equivalent)
    #[error("validation error: {0}")]
    Validation(String),

    /// Blob or listing id does not resolve
    #[error("not found: {0}")]
    NotFound(String),

    /// Upload exceeds the configured ceiling
    #[error("upload of {actual} bytes exceeds limit of {limit} bytes")]
    SizeLimitExceeded { limit: u64, actual: u64 },

    /// Content type outside the allowed set
    #[error("unsupported media type: {0}")]
    UnsupportedMediaType(String),

    /// Underlying chunk write/read failure
    #[error("storage failure: {0}")]
    Storage(String),

    /// Attempted rewrite of an immutable chunk with different content
    #[error("chunk {sequence} of blob {blob_id} already written with different content")]
    ConsistencyViolation { blob_id: String, sequence: u32 },

    /// MongoDB operation failed
    #[error("database error: {0}")]
    Database(String),

    /// Invalid configuration
    #[error("configuration error: {0}")]
    Config(String),
}

impl From<std::io::Error> for LodgewayError {
    fn from(e: std::io::Error) -> Self {
        LodgewayError::Storage(e.to_string())
    }
}

impl LodgewayError {
    /// Whether this error is caused by the request rather than the service
    pub fn is_user_error(&self) -> bool {
        matches!(
            self,
            LodgewayError::Validation(_)
                | LodgewayError::NotFound(_)
                | LodgewayError::SizeLimitExceeded { .. }
                | LodgewayError::UnsupportedMediaType(_)
        )
    }
}
