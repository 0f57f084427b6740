//! Registry of live handlers and last-known errors.
//!
//! This is the single serialization point between the reconciler (writer) and
//! concurrent inference requests (readers). Handlers are swapped whole behind
//! the lock, so a lookup observes either the fully-old or fully-new handler.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::RwLock;

use crate::handler::Handler;

/// Reserved error-map key for registry-wide (not per-model) failures.
pub const GLOBAL_ERROR_KEY: &str = "server";

#[derive(Default)]
pub struct HandlerRegistry {
    handlers: RwLock<HashMap<String, Arc<Handler>>>,
    errors: RwLock<HashMap<String, String>>,
}

impl HandlerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn get(&self, name: &str) -> Option<Arc<Handler>> {
        self.handlers.read().await.get(name).cloned()
    }

    /// Atomically replace the handler for a name, returning the superseded
    /// one so the caller can tear it down off the lock.
    pub async fn swap(&self, name: &str, handler: Arc<Handler>) -> Option<Arc<Handler>> {
        self.handlers.write().await.insert(name.to_string(), handler)
    }

    /// Remove a handler. Teardown of its process is the caller's job.
    pub async fn remove(&self, name: &str) -> Option<Arc<Handler>> {
        self.handlers.write().await.remove(name)
    }

    /// Stable snapshot of live model names, sorted.
    pub async fn list(&self) -> Vec<String> {
        let mut names: Vec<String> = self.handlers.read().await.keys().cloned().collect();
        names.sort();
        names
    }

    /// Run id currently served for a name, if any.
    pub async fn active_run_id(&self, name: &str) -> Option<String> {
        self.handlers
            .read()
            .await
            .get(name)
            .map(|h| h.run_id.clone())
    }

    pub async fn record_error(&self, name: &str, message: impl Into<String>) {
        self.errors
            .write()
            .await
            .insert(name.to_string(), message.into());
    }

    pub async fn clear_error(&self, name: &str) {
        self.errors.write().await.remove(name);
    }

    /// Snapshot of the name -> last-error map.
    pub async fn errors(&self) -> HashMap<String, String> {
        self.errors.read().await.clone()
    }
}
