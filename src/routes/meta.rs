//! Metadata endpoints: model listing, per-model info, errors, refresh.

use std::collections::HashMap;
use std::sync::Arc;

use axum::extract::{Path, State};
use axum::routing::get;
use axum::{Json, Router};
use serde_json::{json, Value};

use crate::scheduler;
use crate::state::AppState;

pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/health", get(health))
        .route("/models", get(models))
        .route("/modelinfo/:name", get(modelinfo))
        .route("/errors", get(errors))
        .route("/refresh", get(refresh))
}

async fn health() -> Json<Value> {
    Json(json!({"status": "ok"}))
}

/// GET /models - list of all available model names.
async fn models(State(state): State<Arc<AppState>>) -> Json<Vec<String>> {
    Json(state.handlers.list().await)
}

/// GET /modelinfo/{name} - basic information of a model. Unknown names get
/// an empty map rather than an error.
async fn modelinfo(
    State(state): State<Arc<AppState>>,
    Path(name): Path<String>,
) -> Json<Value> {
    match state.handlers.get(&name).await {
        Some(handler) => Json(handler.info()),
        None => Json(json!({})),
    }
}

/// GET /errors - name -> last-error map, including the registry-wide key.
async fn errors(State(state): State<Arc<AppState>>) -> Json<HashMap<String, String>> {
    Json(state.handlers.errors().await)
}

/// GET /refresh - trigger reconciliation without waiting for it.
async fn refresh(State(state): State<Arc<AppState>>) -> &'static str {
    scheduler::trigger(state.reconciler.clone());
    "OK. Please be patient :)"
}
