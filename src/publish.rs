//! Route publication for model endpoints.
//!
//! Axum's route table is fixed at startup, so per-model publication is a
//! catch-all typed route plus this table of published models. Publishing is a
//! single map insert, so replacing a model's version leaves no window where
//! its route is absent.

use std::collections::HashMap;

use axum::http::Method;
use tokio::sync::RwLock;

use crate::handler::Handler;

/// Published route metadata for one model.
#[derive(Debug, Clone)]
pub struct PublishedRoute {
    /// GET for input-less models, POST for models with a typed body.
    pub method: Method,
    /// Human-readable description with schemas and provenance.
    pub description: String,
}

#[derive(Default)]
pub struct EndpointPublisher {
    routes: RwLock<HashMap<String, PublishedRoute>>,
}

impl EndpointPublisher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Install (or replace) the route for a handler's model name.
    pub async fn publish(&self, handler: &Handler) {
        let method = if handler.has_inputs() {
            Method::POST
        } else {
            Method::GET
        };
        let route = PublishedRoute {
            method: method.clone(),
            description: handler.long_description.clone(),
        };
        self.routes
            .write()
            .await
            .insert(handler.name.clone(), route);
        tracing::info!(model = %handler.name, method = %method, "Published route");
    }

    pub async fn unpublish(&self, name: &str) -> Option<PublishedRoute> {
        let removed = self.routes.write().await.remove(name);
        if removed.is_some() {
            tracing::info!(model = %name, "Unpublished route");
        }
        removed
    }

    pub async fn get(&self, name: &str) -> Option<PublishedRoute> {
        self.routes.read().await.get(name).cloned()
    }
}
