//! Model registry abstraction layer.
//!
//! The registry is the external source of truth for models and their
//! versions. The gateway only ever reads it; descriptors are immutable once
//! listed.

mod http;

pub use http::HttpRegistryClient;

use std::collections::BTreeMap;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::Result;

/// Lifecycle stage of a model version.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum Stage {
    #[default]
    None,
    Staging,
    Production,
}

impl Stage {
    pub fn parse(s: &str) -> Self {
        match s {
            "Staging" => Stage::Staging,
            "Production" => Stage::Production,
            _ => Stage::None,
        }
    }
}

/// One immutable version of a registered model.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelVersion {
    pub version: i64,
    pub run_id: String,
    /// Artifact source URI; its final path segment names the model directory.
    pub source: String,
    pub stage: Stage,
    /// Creation time in milliseconds since the epoch.
    pub creation_timestamp: i64,
}

/// A registered model as listed by the registry. Read-only to the gateway.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelDescriptor {
    pub name: String,
    /// Tag key -> value. The tag allow-list matches against keys.
    #[serde(default)]
    pub tags: BTreeMap<String, String>,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub latest_versions: Vec<ModelVersion>,
}

/// Read access to the model registry.
#[async_trait]
pub trait RegistryClient: Send + Sync {
    /// List all registered models with their latest versions.
    ///
    /// Transport or auth failures surface as `Error::RegistryUnavailable`.
    async fn list_models(&self) -> Result<Vec<ModelDescriptor>>;
}

/// Stage-preference resolution: pick the version to serve for a descriptor.
///
/// Staging wins when preferred and present, else Production when present,
/// else the first listed version. Purely a function of the descriptor, so
/// repeated resolution is deterministic.
pub fn select_version(descriptor: &ModelDescriptor, prefer_staging: bool) -> Option<&ModelVersion> {
    let staging = descriptor
        .latest_versions
        .iter()
        .find(|v| v.stage == Stage::Staging);
    let production = descriptor
        .latest_versions
        .iter()
        .find(|v| v.stage == Stage::Production);

    if prefer_staging {
        if let Some(v) = staging {
            return Some(v);
        }
    }
    if let Some(v) = production {
        return Some(v);
    }
    descriptor.latest_versions.first()
}
