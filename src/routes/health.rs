//! Health check endpoints
//!
//! Kubernetes-style probe split:
//! - /health, /healthz - liveness (is the service running?)
//! - /ready, /readyz - readiness (is the storage backend connected?)
//!
//! Liveness always answers 200. Readiness answers 200 only once the
//! storage backend is connected; in dev mode the service may run
//! without one, and readiness reports that honestly rather than
//! pretending with a mock backend.

use chrono::Utc;
use hyper::{Response, StatusCode};
use serde::Serialize;
use std::sync::Arc;

use crate::routes::{json_response, BoxBody};
use crate::server::AppState;

/// Health response body
#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HealthResponse {
    pub healthy: bool,
    pub version: &'static str,
    pub uptime: u64,
    pub timestamp: String,
    pub mode: String,
    pub storage: StorageHealth,
}

/// Storage backend status
#[derive(Serialize)]
pub struct StorageHealth {
    pub connected: bool,
}

/// Handle GET /health
pub fn health_check(state: Arc<AppState>) -> Response<BoxBody> {
    let response = HealthResponse {
        healthy: true,
        version: env!("CARGO_PKG_VERSION"),
        uptime: state.started_at.elapsed().as_secs(),
        timestamp: Utc::now().to_rfc3339(),
        mode: if state.args.dev_mode {
            "development".to_string()
        } else {
            "production".to_string()
        },
        storage: StorageHealth {
            connected: state.storage_ready(),
        },
    };
    json_response(StatusCode::OK, &response)
}

/// Handle GET /ready
pub fn readiness_check(state: Arc<AppState>) -> Response<BoxBody> {
    let ready = state.storage_ready();
    let status = if ready {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };

    let body = serde_json::json!({
        "ready": ready,
        "storage": { "connected": ready },
    });
    json_response(status, &body)
}
