//! Test doubles for the reconciliation and serving stack.

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{Map, Value};
use tokio::sync::RwLock;

use crate::error::{Error, Result};
use crate::handler::Handler;
use crate::introspect::{RUN_ID_FIELD, VERSION_FIELD};
use crate::predictor::Predictor;
use crate::reconcile::HandlerFactory;
use crate::registry::{ModelDescriptor, ModelVersion, RegistryClient, Stage};
use crate::schema::{Dtype, SchemaField};

/// Registry client returning a settable listing or failure.
pub struct MockRegistryClient {
    response: RwLock<std::result::Result<Vec<ModelDescriptor>, String>>,
}

impl MockRegistryClient {
    pub fn new(models: Vec<ModelDescriptor>) -> Self {
        Self {
            response: RwLock::new(Ok(models)),
        }
    }

    pub async fn set_models(&self, models: Vec<ModelDescriptor>) {
        *self.response.write().await = Ok(models);
    }

    pub async fn set_failure(&self, message: &str) {
        *self.response.write().await = Err(message.to_string());
    }
}

#[async_trait]
impl RegistryClient for MockRegistryClient {
    async fn list_models(&self) -> Result<Vec<ModelDescriptor>> {
        self.response
            .read()
            .await
            .clone()
            .map_err(Error::RegistryUnavailable)
    }
}

/// Predictor returning a fixed raw result.
pub struct StaticPredictor(pub Value);

#[async_trait]
impl Predictor for StaticPredictor {
    async fn predict(&self, _batch: Map<String, Value>) -> Result<Value> {
        Ok(self.0.clone())
    }
}

/// Handler factory that builds in-process handlers without provisioning or
/// subprocesses. Counts builds for idempotence assertions.
pub struct StubHandlerFactory {
    pub input_schema: Vec<SchemaField>,
    pub prediction: Value,
    builds: AtomicUsize,
}

impl StubHandlerFactory {
    pub fn new(input_schema: Vec<SchemaField>, prediction: Value) -> Self {
        Self {
            input_schema,
            prediction,
            builds: AtomicUsize::new(0),
        }
    }

    pub fn build_count(&self) -> usize {
        self.builds.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl HandlerFactory for StubHandlerFactory {
    async fn build(
        &self,
        descriptor: &ModelDescriptor,
        version: &ModelVersion,
    ) -> Result<Handler> {
        self.builds.fetch_add(1, Ordering::SeqCst);
        Ok(Handler::new(
            descriptor.name.clone(),
            version.version,
            version.run_id.clone(),
            version.source.clone(),
            PathBuf::from(format!("/tmp/cache/{}", version.run_id)),
            self.input_schema.clone(),
            vec![
                SchemaField::tensor(VERSION_FIELD, Dtype::Int64, vec![1]),
                SchemaField::tensor(RUN_ID_FIELD, Dtype::String, vec![1]),
            ],
            Map::new(),
            descriptor.description.clone(),
            version.creation_timestamp,
            None,
            Arc::new(StaticPredictor(self.prediction.clone())),
        ))
    }
}

/// Handler factory that always fails, for error-boundary tests.
pub struct FailingHandlerFactory;

#[async_trait]
impl HandlerFactory for FailingHandlerFactory {
    async fn build(
        &self,
        descriptor: &ModelDescriptor,
        _version: &ModelVersion,
    ) -> Result<Handler> {
        Err(Error::Provisioning(format!(
            "cannot build {}",
            descriptor.name
        )))
    }
}

/// Descriptor with a single version, for scenario setups.
pub fn descriptor(name: &str, versions: Vec<ModelVersion>) -> ModelDescriptor {
    ModelDescriptor {
        name: name.to_string(),
        tags: BTreeMap::new(),
        description: format!("{name} test model"),
        latest_versions: versions,
    }
}

pub fn version(number: i64, run_id: &str, stage: Stage) -> ModelVersion {
    ModelVersion {
        version: number,
        run_id: run_id.to_string(),
        source: format!("/artifacts/{run_id}/model"),
        stage,
        creation_timestamp: 1700000000000,
    }
}
