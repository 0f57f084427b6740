//! Shared application state.

use std::sync::Arc;

use crate::config::Config;
use crate::publish::EndpointPublisher;
use crate::reconcile::Reconciler;
use crate::serving::HandlerRegistry;

/// Shared application state passed to all request handlers.
pub struct AppState {
    pub config: Config,
    pub handlers: Arc<HandlerRegistry>,
    pub publisher: Arc<EndpointPublisher>,
    pub reconciler: Arc<Reconciler>,
}

impl AppState {
    pub fn new(
        config: Config,
        handlers: Arc<HandlerRegistry>,
        publisher: Arc<EndpointPublisher>,
        reconciler: Arc<Reconciler>,
    ) -> Self {
        Self {
            config,
            handlers,
            publisher,
            reconciler,
        }
    }
}
