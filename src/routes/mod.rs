//! HTTP routes.

pub mod meta;
pub mod predict;

use std::sync::Arc;

use axum::Router;

use crate::state::AppState;

/// Build the full route table. Static metadata routes take precedence over
/// the per-model capture route.
pub fn router() -> Router<Arc<AppState>> {
    Router::new().merge(meta::router()).merge(predict::router())
}
