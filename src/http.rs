//! HTTP server for metrics and administration.
//!
//! Runs on a separate tokio task and serves:
//! - `GET /metrics` for Prometheus scraping
//! - `GET /health`
//! - `GET /models` and `GET /models/:model` for registration info
//! - `GET /subscriptions` for leak detection
//! - `PUT|PATCH|DELETE /entities/:model/:key` to write through the store

use crate::error::StoreError;
use crate::state::SyncManager;
use crate::store::MemoryStore;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::{Json, Router};
use serde_json::{Value, json};
use std::sync::Arc;
use tokio::net::TcpListener;

/// Shared state for admin handlers.
#[derive(Clone)]
pub struct AdminState {
    pub manager: Arc<SyncManager>,
    pub store: Arc<MemoryStore>,
}

/// Handler for GET /metrics - returns Prometheus metrics in text format.
async fn metrics_handler() -> String {
    crate::metrics::gather_metrics()
}

async fn health_handler() -> &'static str {
    "ok"
}

async fn list_models(State(state): State<AdminState>) -> Json<Value> {
    Json(json!({ "models": state.manager.model_names() }))
}

async fn model_info(State(state): State<AdminState>, Path(model): Path<String>) -> Response {
    match state.manager.model_info(&model) {
        Some(info) => Json(info).into_response(),
        None => not_found(&model),
    }
}

async fn list_subscriptions(State(state): State<AdminState>) -> Json<Value> {
    let subscriptions = state.manager.active_subscriptions();
    Json(json!({
        "count": subscriptions.len(),
        "subscriptions": subscriptions,
    }))
}

async fn put_entity(
    State(state): State<AdminState>,
    Path((model, key)): Path<(String, String)>,
    Json(entity): Json<Value>,
) -> Response {
    let Some(collection) = state.manager.model_source(&model) else {
        return not_found(&model);
    };
    Json(state.store.insert(&collection, &key, entity)).into_response()
}

async fn patch_entity(
    State(state): State<AdminState>,
    Path((model, key)): Path<(String, String)>,
    Json(diff): Json<Value>,
) -> Response {
    let Some(collection) = state.manager.model_source(&model) else {
        return not_found(&model);
    };
    match state.store.update(&collection, &key, diff) {
        Ok(Some(merged)) => Json(merged).into_response(),
        Ok(None) => not_found(&format!("{model}/{key}")),
        Err(e) => store_error(e),
    }
}

async fn delete_entity(
    State(state): State<AdminState>,
    Path((model, key)): Path<(String, String)>,
) -> Response {
    let Some(collection) = state.manager.model_source(&model) else {
        return not_found(&model);
    };
    match state.store.remove(&collection, &key) {
        Some(removed) => Json(removed).into_response(),
        None => not_found(&format!("{model}/{key}")),
    }
}

fn not_found(what: &str) -> Response {
    (
        StatusCode::NOT_FOUND,
        Json(json!({ "error": "not_found", "target": what })),
    )
        .into_response()
}

fn store_error(e: StoreError) -> Response {
    let status = match e {
        StoreError::InvalidPayload(_) => StatusCode::BAD_REQUEST,
        StoreError::NotAuthorized => StatusCode::FORBIDDEN,
        StoreError::Unavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
    };
    (
        status,
        Json(json!({ "error": e.error_code(), "message": e.to_string() })),
    )
        .into_response()
}

/// Build the admin router.
pub fn router(state: AdminState) -> Router {
    Router::new()
        .route("/metrics", get(metrics_handler))
        .route("/health", get(health_handler))
        .route("/models", get(list_models))
        .route("/models/:model", get(model_info))
        .route("/subscriptions", get(list_subscriptions))
        .route(
            "/entities/:model/:key",
            axum::routing::put(put_entity)
                .patch(patch_entity)
                .delete(delete_entity),
        )
        .with_state(state)
}

/// Serve the admin router on an already bound listener.
pub async fn serve(listener: TcpListener, state: AdminState) {
    if let Err(e) = axum::serve(listener, router(state)).await {
        tracing::error!("HTTP server error: {}", e);
    }
}
