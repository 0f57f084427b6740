//! Model registry gateway - serves each registered model version behind a
//! typed HTTP endpoint.

use std::sync::Arc;

use axum::Router;
use tokio::net::TcpListener;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use pyfunc_gateway::artifact::LocalArtifactFetcher;
use pyfunc_gateway::config::Config;
use pyfunc_gateway::provision::EnvironmentProvisioner;
use pyfunc_gateway::publish::EndpointPublisher;
use pyfunc_gateway::reconcile::{LaunchHandlerFactory, Reconciler};
use pyfunc_gateway::registry::HttpRegistryClient;
use pyfunc_gateway::serving::HandlerRegistry;
use pyfunc_gateway::state::AppState;
use pyfunc_gateway::supervise::ProcessSupervisor;
use pyfunc_gateway::{routes, scheduler};

fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Load configuration before building the runtime so the worker count
    // applies to the request domain.
    let config = Config::load().map_err(|e| format!("Failed to load configuration: {e}"))?;

    let mut builder = tokio::runtime::Builder::new_multi_thread();
    builder.enable_all();
    if config.server.workers > 0 {
        builder.worker_threads(config.server.workers);
    }
    builder.build()?.block_on(run(config))
}

async fn run(config: Config) -> Result<(), Box<dyn std::error::Error>> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!(registry = %config.registry.url, "Starting pyfunc-gateway");

    // A registry client that cannot even be constructed is a fatal startup
    // misconfiguration; listing failures later are not.
    let registry_client = Arc::new(HttpRegistryClient::new(&config.registry)?);

    let provisioner = EnvironmentProvisioner::new(
        config.provision.clone(),
        Arc::new(LocalArtifactFetcher),
    );
    let supervisor = ProcessSupervisor::new(config.supervise.clone());
    let factory = Arc::new(LaunchHandlerFactory::new(provisioner, supervisor));

    let handlers = Arc::new(HandlerRegistry::new());
    let publisher = Arc::new(EndpointPublisher::new());

    let reconciler = Arc::new(Reconciler::new(
        registry_client,
        handlers.clone(),
        publisher.clone(),
        factory,
        config.reconcile.prefer_staging,
        config.reconcile.tags.clone(),
        config.supervise.shutdown_timeout_secs,
    ));

    let _reconcile_loop = scheduler::start(reconciler.clone(), &config.reconcile);

    let state = Arc::new(AppState::new(
        config.clone(),
        handlers,
        publisher,
        reconciler,
    ));

    // Build router, mounted under the configured base path.
    let api = routes::router()
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(state);
    let app = if config.server.base_path.is_empty() {
        api
    } else {
        Router::new().nest(&config.server.base_path, api)
    };

    // Start server
    let addr = format!("{}:{}", config.server.host, config.server.port);
    tracing::info!("Listening on {}", addr);

    let listener = TcpListener::bind(&addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
