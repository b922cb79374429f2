//! HTTP server implementation
//!
//! Uses hyper http1 with TokioIo for async handling. Routing is a
//! plain match over (method, path); the data surfaces check storage
//! readiness themselves and answer 503 until the backend is connected.

use hyper::body::Incoming;
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper::{Method, Request, Response, StatusCode};
use hyper_util::rt::TokioIo;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Instant;
use tokio::net::TcpListener;
use tracing::{error, info, warn};

use crate::catalog::{CatalogStore, MongoCatalog};
use crate::config::Args;
use crate::db::MongoClient;
use crate::media::upload::UploadConfig;
use crate::media::{BlobRegistry, MongoChunkStore, MongoRecordStore, UploadPipeline};
use crate::routes::{self, error_response, full_body, BoxBody};
use crate::types::Result;

/// Shared application state
pub struct AppState {
    pub args: Args,
    pub mongo: Option<MongoClient>,
    /// Blob metadata + chunk storage; None until MongoDB is connected
    pub registry: Option<Arc<BlobRegistry>>,
    /// Upload pipeline over the registry
    pub upload: Option<Arc<UploadPipeline>>,
    /// Catalog query/aggregation backend
    pub catalog: Option<Arc<dyn CatalogStore>>,
    pub started_at: Instant,
}

impl AppState {
    /// Create AppState without a storage backend (dev mode only).
    /// Data routes answer 503 until a backend is connected; there is
    /// deliberately no mock fallback.
    pub fn new(args: Args) -> Self {
        Self {
            args,
            mongo: None,
            registry: None,
            upload: None,
            catalog: None,
            started_at: Instant::now(),
        }
    }

    /// Create AppState with MongoDB-backed media and catalog stores
    pub async fn with_mongo(args: Args, mongo: MongoClient) -> Result<Self> {
        let chunks = Arc::new(MongoChunkStore::new(&mongo).await?);
        let records = Arc::new(MongoRecordStore::new(&mongo).await?);
        let registry = Arc::new(BlobRegistry::new(chunks, records));

        let upload = Arc::new(UploadPipeline::new(
            Arc::clone(&registry),
            UploadConfig {
                chunk_size: args.chunk_size_bytes,
                max_bytes: args.max_upload_bytes,
                allowed_types: args.allowed_media_type_list(),
                max_concurrent: args.max_concurrent_uploads,
            },
        ));

        let catalog: Arc<dyn CatalogStore> = Arc::new(MongoCatalog::new(&mongo).await?);

        Ok(Self {
            args,
            mongo: Some(mongo),
            registry: Some(registry),
            upload: Some(upload),
            catalog: Some(catalog),
            started_at: Instant::now(),
        })
    }

    /// Whether the storage backend is connected and usable
    pub fn storage_ready(&self) -> bool {
        self.mongo.is_some() && self.registry.is_some() && self.catalog.is_some()
    }
}

/// Start the HTTP server
pub async fn run(state: Arc<AppState>) -> Result<()> {
    let listener = TcpListener::bind(state.args.listen).await?;

    info!("Lodgeway listening on {}", state.args.listen);

    if state.args.dev_mode {
        warn!("Development mode enabled");
    }
    if !state.storage_ready() {
        warn!("Storage backend not connected; data routes will answer 503");
    }

    loop {
        match listener.accept().await {
            Ok((stream, addr)) => {
                let state = Arc::clone(&state);
                tokio::spawn(async move {
                    let io = TokioIo::new(stream);

                    let service = service_fn(move |req| {
                        let state = Arc::clone(&state);
                        async move { handle_request(state, addr, req).await }
                    });

                    if let Err(err) = http1::Builder::new().serve_connection(io, service).await {
                        error!("Error serving connection from {}: {:?}", addr, err);
                    }
                });
            }
            Err(e) => {
                error!("Error accepting connection: {:?}", e);
            }
        }
    }
}

/// Route incoming HTTP requests
async fn handle_request(
    state: Arc<AppState>,
    addr: SocketAddr,
    req: Request<Incoming>,
) -> std::result::Result<Response<BoxBody>, hyper::Error> {
    let method = req.method().clone();
    let path = req.uri().path().to_string();
    let query = req.uri().query().map(str::to_string);

    info!("[{}] {} {}", addr, method, path);

    let response = match (method, path.as_str()) {
        // Liveness probe - 200 whenever the process is up
        (Method::GET, "/health") | (Method::GET, "/healthz") => {
            routes::health_check(Arc::clone(&state))
        }

        // Readiness probe - 200 only once storage is connected
        (Method::GET, "/ready") | (Method::GET, "/readyz") => {
            routes::readiness_check(Arc::clone(&state))
        }

        // CORS preflight
        (Method::OPTIONS, _) => preflight_response(),

        // ====================================================================
        // Media storage
        // ====================================================================
        (Method::POST, "/media") => routes::handle_upload(Arc::clone(&state), req).await,

        (_, p) if p.starts_with("/media/") => {
            let rest = p.strip_prefix("/media/").unwrap_or("").to_string();
            routes::handle_media_by_id(Arc::clone(&state), req, &rest).await
        }

        // ====================================================================
        // Catalog
        // ====================================================================
        (Method::GET, "/api/v1/listings") => {
            routes::handle_listings(Arc::clone(&state), query.as_deref()).await
        }

        (Method::GET, "/api/v1/listings/search") => {
            routes::handle_search(Arc::clone(&state), query.as_deref()).await
        }

        (Method::GET, "/api/v1/listings/stats") => {
            routes::handle_stats(Arc::clone(&state), query.as_deref()).await
        }

        (Method::POST, "/api/v1/listings/import") => {
            routes::handle_import(Arc::clone(&state), req).await
        }

        _ => error_response(StatusCode::NOT_FOUND, "No such route", "NOT_FOUND"),
    };

    Ok(response)
}

/// CORS preflight response
fn preflight_response() -> Response<BoxBody> {
    Response::builder()
        .status(StatusCode::NO_CONTENT)
        .header("Access-Control-Allow-Origin", "*")
        .header(
            "Access-Control-Allow-Methods",
            "GET, POST, DELETE, HEAD, OPTIONS",
        )
        .header(
            "Access-Control-Allow-Headers",
            "Content-Type, X-Filename, Range",
        )
        .body(full_body(bytes::Bytes::new()))
        .unwrap()
}
