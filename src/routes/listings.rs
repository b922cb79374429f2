//! Catalog listing routes
//!
//! - `GET /api/v1/listings` - filtered, sorted, paginated page plus
//!   the current price range and distinct-value facets for filter UIs
//! - `GET /api/v1/listings/search?q=` - capped keyword search
//! - `GET /api/v1/listings/stats[?category=]` - facet summary
//! - `POST /api/v1/listings/import` - bounded bulk import

use http_body_util::BodyExt;
use hyper::body::Incoming;
use hyper::{Request, Response, StatusCode};
use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{debug, warn};

use crate::catalog::import::{import_batch, ListingCandidate};
use crate::catalog::query::QueryBuilder;
use crate::db::schemas::ListingDoc;
use crate::routes::{
    error_response, error_to_response, json_response, parse_query_params, storage_unavailable,
    BoxBody,
};
use crate::server::AppState;

/// Listing page response with the facets the filter UI needs
#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct ListingsResponse {
    items: Vec<ListingDoc>,
    page: u32,
    limit: u32,
    total_count: u64,
    total_pages: u32,
    price_range: PriceRange,
    facets: BTreeMap<String, Vec<serde_json::Value>>,
}

#[derive(Serialize)]
struct PriceRange {
    min: f64,
    max: f64,
}

/// Handle GET /api/v1/listings
pub async fn handle_listings(state: Arc<AppState>, query: Option<&str>) -> Response<BoxBody> {
    let Some(catalog) = state.catalog.clone() else {
        return storage_unavailable();
    };

    let raw = parse_query_params(query.unwrap_or(""));
    let builder = QueryBuilder::new(state.args.default_page_size, state.args.max_page_size);

    let (criteria, sort, page_spec) = match builder.build(&raw) {
        Ok(built) => built,
        Err(e) => return error_to_response(&e),
    };

    debug!(?criteria, page = page_spec.page, size = page_spec.size, "listing query");

    let page = match catalog.execute(&criteria, &sort, &page_spec).await {
        Ok(page) => page,
        Err(e) => return error_to_response(&e),
    };

    // Facets are collection-global so the filter UI stays complete
    // even while a narrow filter is active
    let summary = match catalog.summarize(None, state.args.facet_top_locations).await {
        Ok(summary) => summary,
        Err(e) => return error_to_response(&e),
    };

    let response = ListingsResponse {
        items: page.items,
        page: page.page,
        limit: page.size,
        total_count: page.total_count,
        total_pages: page.total_pages,
        price_range: PriceRange {
            min: summary.price_min,
            max: summary.price_max,
        },
        facets: summary.distinct_values,
    };
    json_response(StatusCode::OK, &response)
}

/// Handle GET /api/v1/listings/search
pub async fn handle_search(state: Arc<AppState>, query: Option<&str>) -> Response<BoxBody> {
    let Some(catalog) = state.catalog.clone() else {
        return storage_unavailable();
    };

    let raw = parse_query_params(query.unwrap_or(""));
    let keyword = match raw.get("q").map(|s| s.trim()).filter(|s| !s.is_empty()) {
        Some(k) => k.to_string(),
        None => {
            return error_response(
                StatusCode::BAD_REQUEST,
                "Query parameter q is required",
                "VALIDATION_ERROR",
            )
        }
    };

    match catalog.search(&keyword, state.args.search_result_cap).await {
        Ok(items) => {
            let count = items.len();
            let body = serde_json::json!({ "items": items, "count": count });
            json_response(StatusCode::OK, &body)
        }
        Err(e) => error_to_response(&e),
    }
}

/// Handle GET /api/v1/listings/stats
pub async fn handle_stats(state: Arc<AppState>, query: Option<&str>) -> Response<BoxBody> {
    let Some(catalog) = state.catalog.clone() else {
        return storage_unavailable();
    };

    let raw = parse_query_params(query.unwrap_or(""));
    let category = raw.get("category").map(|s| s.trim()).filter(|s| !s.is_empty());

    match catalog
        .summarize(category, state.args.facet_top_locations)
        .await
    {
        Ok(summary) => json_response(StatusCode::OK, &summary),
        Err(e) => error_to_response(&e),
    }
}

/// Handle POST /api/v1/listings/import
pub async fn handle_import(state: Arc<AppState>, req: Request<Incoming>) -> Response<BoxBody> {
    let Some(catalog) = state.catalog.clone() else {
        return storage_unavailable();
    };

    let body = match req.into_body().collect().await {
        Ok(collected) => collected.to_bytes(),
        Err(e) => {
            warn!(error = %e, "failed to read import body");
            return error_response(
                StatusCode::BAD_REQUEST,
                "Failed to read request body",
                "VALIDATION_ERROR",
            );
        }
    };

    let candidates: Vec<ListingCandidate> = match serde_json::from_slice(&body) {
        Ok(candidates) => candidates,
        Err(e) => {
            return error_response(
                StatusCode::BAD_REQUEST,
                &format!("Invalid import payload: {}", e),
                "VALIDATION_ERROR",
            )
        }
    };

    match import_batch(catalog.as_ref(), candidates, state.args.max_import_batch).await {
        Ok(summary) => json_response(StatusCode::OK, &summary),
        Err(e) => error_to_response(&e),
    }
}
