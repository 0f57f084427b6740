//! Per-model predict endpoint.
//!
//! A single capture route serves every published model: GET for input-less
//! models, POST with a field-keyed JSON body otherwise. The published-route
//! table decides which method a name accepts; the handler registry provides
//! the live handler.

use std::sync::Arc;

use axum::extract::{Path, State};
use axum::http::{header, HeaderMap, Method};
use axum::routing::get;
use axum::{Json, Router};
use serde_json::{Map, Value};

use crate::error::{Error, Result};
use crate::state::AppState;

pub fn router() -> Router<Arc<AppState>> {
    Router::new().route("/:name", get(predict_get).post(predict_post))
}

/// Bearer-token check against the configured allow-list. An empty list means
/// open access.
fn check_token(state: &AppState, headers: &HeaderMap) -> Result<()> {
    if state.config.auth.tokens.is_empty() {
        return Ok(());
    }
    let token = headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .ok_or(Error::Unauthorized)?;
    if state.config.auth.tokens.iter().any(|t| t == token) {
        Ok(())
    } else {
        Err(Error::Unauthorized)
    }
}

async fn predict_get(
    State(state): State<Arc<AppState>>,
    Path(name): Path<String>,
    headers: HeaderMap,
) -> Result<Json<Map<String, Value>>> {
    predict(&state, &name, &headers, Method::GET, None).await
}

async fn predict_post(
    State(state): State<Arc<AppState>>,
    Path(name): Path<String>,
    headers: HeaderMap,
    Json(body): Json<Map<String, Value>>,
) -> Result<Json<Map<String, Value>>> {
    predict(&state, &name, &headers, Method::POST, Some(body)).await
}

async fn predict(
    state: &AppState,
    name: &str,
    headers: &HeaderMap,
    method: Method,
    body: Option<Map<String, Value>>,
) -> Result<Json<Map<String, Value>>> {
    check_token(state, headers)?;

    let route = state
        .publisher
        .get(name)
        .await
        .ok_or_else(|| Error::ModelNotFound(name.to_string()))?;
    if route.method != method {
        return Err(Error::MethodNotAllowed(name.to_string()));
    }

    // The registry and the route table are updated in the same
    // reconciliation step, so a published name always resolves.
    let handler = state
        .handlers
        .get(name)
        .await
        .ok_or_else(|| Error::ModelNotFound(name.to_string()))?;

    let output = handler.apply(body).await?;
    Ok(Json(output))
}
