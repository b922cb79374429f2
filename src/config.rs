//! Configuration for Lodgeway
//!
//! CLI arguments and environment variable handling using clap.

use clap::Parser;
use std::net::SocketAddr;

/// Default chunk size: 255 KiB, the common chunked-storage default
pub const DEFAULT_CHUNK_SIZE: usize = 255 * 1024;

/// Lodgeway - catalog gateway for lodging listings and media
#[derive(Parser, Debug, Clone)]
#[command(name = "lodgeway")]
#[command(about = "Catalog gateway for lodging listings with chunked media storage")]
pub struct Args {
    /// Address to listen on
    #[arg(long, env = "LISTEN", default_value = "0.0.0.0:8080")]
    pub listen: SocketAddr,

    /// MongoDB connection URI
    #[arg(long, env = "MONGODB_URI", default_value = "mongodb://localhost:27017")]
    pub mongodb_uri: String,

    /// MongoDB database name
    #[arg(long, env = "MONGODB_DB", default_value = "lodgeway")]
    pub mongodb_db: String,

    /// Enable development mode (continues without MongoDB, data routes return 503)
    #[arg(long, env = "DEV_MODE", default_value = "false")]
    pub dev_mode: bool,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, env = "LOG_LEVEL", default_value = "info")]
    pub log_level: String,

    /// Chunk size in bytes for media storage
    #[arg(long, env = "CHUNK_SIZE_BYTES", default_value_t = DEFAULT_CHUNK_SIZE)]
    pub chunk_size_bytes: usize,

    /// Maximum accepted upload size in bytes
    #[arg(long, env = "MAX_UPLOAD_BYTES", default_value = "10485760")]
    pub max_upload_bytes: u64,

    /// Maximum simultaneous in-flight uploads
    #[arg(long, env = "MAX_CONCURRENT_UPLOADS", default_value = "4")]
    pub max_concurrent_uploads: usize,

    /// Comma-separated list of accepted upload content types
    #[arg(
        long,
        env = "ALLOWED_MEDIA_TYPES",
        default_value = "image/jpeg,image/png,image/webp,image/gif"
    )]
    pub allowed_media_types: String,

    /// Default page size for catalog listings
    #[arg(long, env = "DEFAULT_PAGE_SIZE", default_value = "10")]
    pub default_page_size: u32,

    /// Maximum page size for catalog listings
    #[arg(long, env = "MAX_PAGE_SIZE", default_value = "100")]
    pub max_page_size: u32,

    /// Maximum results returned by keyword search
    #[arg(long, env = "SEARCH_RESULT_CAP", default_value = "20")]
    pub search_result_cap: usize,

    /// Number of locations reported in facet summaries
    #[arg(long, env = "FACET_TOP_LOCATIONS", default_value = "10")]
    pub facet_top_locations: usize,

    /// Maximum items per bulk import batch
    #[arg(long, env = "MAX_IMPORT_BATCH", default_value = "100")]
    pub max_import_batch: usize,
}

impl Args {
    /// Get the list of accepted upload content types
    pub fn allowed_media_type_list(&self) -> Vec<String> {
        self.allowed_media_types
            .split(',')
            .map(|s| s.trim().to_ascii_lowercase())
            .filter(|s| !s.is_empty())
            .collect()
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<(), String> {
        if self.chunk_size_bytes == 0 {
            return Err("CHUNK_SIZE_BYTES must be greater than zero".to_string());
        }
        if self.chunk_size_bytes as u64 > self.max_upload_bytes {
            return Err("CHUNK_SIZE_BYTES must not exceed MAX_UPLOAD_BYTES".to_string());
        }
        if self.max_concurrent_uploads == 0 {
            return Err("MAX_CONCURRENT_UPLOADS must be greater than zero".to_string());
        }
        if self.default_page_size == 0 || self.max_page_size == 0 {
            return Err("page sizes must be greater than zero".to_string());
        }
        if self.default_page_size > self.max_page_size {
            return Err("DEFAULT_PAGE_SIZE must not exceed MAX_PAGE_SIZE".to_string());
        }
        if self.allowed_media_type_list().is_empty() {
            return Err("ALLOWED_MEDIA_TYPES must name at least one content type".to_string());
        }
        Ok(())
    }
}
