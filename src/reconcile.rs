//! The reconciliation loop.
//!
//! One pass compares the registry's desired state against the live handlers
//! and converges per model: provision, supervise, introspect, publish, swap.
//! Every model runs inside its own error boundary so one failure never blocks
//! the others, and a registry-wide failure leaves all current handlers
//! serving last-known-good state.

use std::collections::HashSet;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::Mutex;

use crate::error::Result;
use crate::handler::Handler;
use crate::introspect::introspect;
use crate::persist::HandlerSnapshot;
use crate::predictor::HttpPredictor;
use crate::provision::EnvironmentProvisioner;
use crate::publish::EndpointPublisher;
use crate::registry::{select_version, ModelDescriptor, ModelVersion, RegistryClient};
use crate::serving::{HandlerRegistry, GLOBAL_ERROR_KEY};
use crate::supervise::ProcessSupervisor;

/// Builds a live handler for a model version. The seam lets tests build
/// handlers without venvs or subprocesses.
#[async_trait]
pub trait HandlerFactory: Send + Sync {
    async fn build(&self, descriptor: &ModelDescriptor, version: &ModelVersion)
        -> Result<Handler>;
}

/// Production factory: provision the environment, start and await the model
/// server, introspect the contract, and wire an HTTP predictor to the port.
pub struct LaunchHandlerFactory {
    provisioner: EnvironmentProvisioner,
    supervisor: ProcessSupervisor,
}

impl LaunchHandlerFactory {
    pub fn new(provisioner: EnvironmentProvisioner, supervisor: ProcessSupervisor) -> Self {
        Self {
            provisioner,
            supervisor,
        }
    }

    async fn launch(
        &self,
        version: &ModelVersion,
    ) -> Result<(std::path::PathBuf, crate::supervise::ManagedProcess)> {
        let model_dir = self.provisioner.provision(version).await?;
        let port = self.supervisor.allocate_port().await?;
        let process = self.supervisor.start(&model_dir, port)?;
        if let Err(e) = self.supervisor.wait_ready(&process).await {
            process.stop(self.supervisor.shutdown_timeout_secs()).await;
            return Err(e);
        }
        Ok((model_dir, process))
    }

    /// Rebuild a handler from its durable snapshot: re-provisioning is a
    /// no-op when the environment is still on disk, then the process is
    /// re-acquired. The caller re-publishes the route.
    pub async fn revive(&self, snapshot: &HandlerSnapshot) -> Result<Handler> {
        let version = snapshot.version_ref();
        let (model_dir, process) = self.launch(&version).await?;
        let predictor = Arc::new(HttpPredictor::new(process.port()));
        Ok(Handler::new(
            snapshot.name.clone(),
            snapshot.version,
            snapshot.run_id.clone(),
            snapshot.source.clone(),
            model_dir,
            snapshot.input_schema.clone(),
            snapshot.output_schema.clone(),
            snapshot.input_example.clone(),
            snapshot.description.clone(),
            snapshot.creation_timestamp,
            Some(process),
            predictor,
        ))
    }
}

#[async_trait]
impl HandlerFactory for LaunchHandlerFactory {
    async fn build(
        &self,
        descriptor: &ModelDescriptor,
        version: &ModelVersion,
    ) -> Result<Handler> {
        let (model_dir, process) = self.launch(version).await?;
        let intro = introspect(&model_dir);
        let predictor = Arc::new(HttpPredictor::new(process.port()));

        Ok(Handler::new(
            descriptor.name.clone(),
            version.version,
            version.run_id.clone(),
            version.source.clone(),
            model_dir,
            intro.input_schema,
            intro.output_schema,
            intro.input_example,
            descriptor.description.clone(),
            version.creation_timestamp,
            Some(process),
            predictor,
        ))
    }
}

pub struct Reconciler {
    client: Arc<dyn RegistryClient>,
    handlers: Arc<HandlerRegistry>,
    publisher: Arc<EndpointPublisher>,
    factory: Arc<dyn HandlerFactory>,
    prefer_staging: bool,
    tags: Vec<String>,
    shutdown_timeout_secs: u64,
    /// Serializes overlapping runs; an on-demand trigger queues behind the
    /// scheduled one instead of provisioning the same model twice.
    run_lock: Mutex<()>,
}

impl Reconciler {
    pub fn new(
        client: Arc<dyn RegistryClient>,
        handlers: Arc<HandlerRegistry>,
        publisher: Arc<EndpointPublisher>,
        factory: Arc<dyn HandlerFactory>,
        prefer_staging: bool,
        tags: Vec<String>,
        shutdown_timeout_secs: u64,
    ) -> Self {
        Self {
            client,
            handlers,
            publisher,
            factory,
            prefer_staging,
            tags,
            shutdown_timeout_secs,
            run_lock: Mutex::new(()),
        }
    }

    /// One reconciliation pass. Safe to call concurrently; runs serialize.
    pub async fn reconcile(&self) {
        let _guard = self.run_lock.lock().await;
        tracing::info!("Update models");

        let descriptors = match self.client.list_models().await {
            Ok(descriptors) => {
                self.handlers.clear_error(GLOBAL_ERROR_KEY).await;
                descriptors
            }
            Err(e) => {
                // Stale-serving fallback: keep every current handler.
                tracing::warn!("Registry listing failed: {e}");
                self.handlers.record_error(GLOBAL_ERROR_KEY, e.to_string()).await;
                return;
            }
        };

        for descriptor in &descriptors {
            self.reconcile_model(descriptor).await;
        }

        self.retire_unlisted(&descriptors).await;
    }

    async fn reconcile_model(&self, descriptor: &ModelDescriptor) {
        let name = &descriptor.name;

        let Some(version) = select_version(descriptor, self.prefer_staging) else {
            return;
        };

        if !self.tags.is_empty() && !self.tags.iter().any(|t| descriptor.tags.contains_key(t)) {
            return;
        }

        // Idempotent no-op when the desired run id is already live.
        if self.handlers.active_run_id(name).await.as_deref() == Some(version.run_id.as_str()) {
            return;
        }

        tracing::info!(model = %name, run_id = %version.run_id, "Update model");

        match self.factory.build(descriptor, version).await {
            Ok(handler) => {
                let handler = Arc::new(handler);
                self.publisher.publish(&handler).await;
                if let Some(old) = self.handlers.swap(name, handler).await {
                    old.shutdown(self.shutdown_timeout_secs).await;
                }
                self.handlers.clear_error(name).await;
            }
            Err(e) => {
                // Keyed by the model's own name; the prior handler, if any,
                // keeps serving.
                tracing::warn!(model = %name, "Model update failed: {e}");
                self.handlers.record_error(name, e.to_string()).await;
            }
        }
    }

    /// Tear down handlers whose model disappeared from the registry. Models
    /// merely filtered by the tag allow-list stay listed, so they are not
    /// retired here.
    async fn retire_unlisted(&self, descriptors: &[ModelDescriptor]) {
        let listed: HashSet<&str> = descriptors.iter().map(|d| d.name.as_str()).collect();
        for name in self.handlers.list().await {
            if listed.contains(name.as_str()) {
                continue;
            }
            tracing::info!(model = %name, "Model gone from registry, retiring");
            self.publisher.unpublish(&name).await;
            if let Some(old) = self.handlers.remove(&name).await {
                old.shutdown(self.shutdown_timeout_secs).await;
            }
            self.handlers.clear_error(&name).await;
        }
    }
}
