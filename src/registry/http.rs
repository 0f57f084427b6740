//! HTTP client for an MLflow-style model registry.

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;

use super::{ModelDescriptor, ModelVersion, RegistryClient, Stage};
use crate::config::RegistryConfig;
use crate::error::{Error, Result};

/// Registry client speaking the MLflow REST protocol.
pub struct HttpRegistryClient {
    base_url: String,
    token: Option<String>,
    http: Client,
}

impl HttpRegistryClient {
    pub fn new(config: &RegistryConfig) -> Result<Self> {
        let http = Client::builder()
            .danger_accept_invalid_certs(config.no_verify)
            .build()
            .map_err(|e| Error::Internal(format!("Failed to build HTTP client: {e}")))?;

        Ok(Self {
            base_url: config.url.trim_end_matches('/').to_string(),
            token: config.token.clone(),
            http,
        })
    }
}

// Wire types for the registry's search endpoint. Version numbers and
// timestamps arrive as strings and are converted on ingestion.

#[derive(Debug, Deserialize)]
struct SearchResponse {
    #[serde(default)]
    registered_models: Vec<WireModel>,
}

#[derive(Debug, Deserialize)]
struct WireModel {
    name: String,
    #[serde(default)]
    description: Option<String>,
    #[serde(default)]
    tags: Vec<WireTag>,
    #[serde(default)]
    latest_versions: Vec<WireVersion>,
}

#[derive(Debug, Deserialize)]
struct WireTag {
    key: String,
    #[serde(default)]
    value: String,
}

#[derive(Debug, Deserialize)]
struct WireVersion {
    version: String,
    #[serde(default)]
    run_id: String,
    #[serde(default)]
    source: String,
    #[serde(default)]
    current_stage: String,
    #[serde(default)]
    creation_timestamp: i64,
}

impl From<WireModel> for ModelDescriptor {
    fn from(m: WireModel) -> Self {
        ModelDescriptor {
            name: m.name,
            tags: m.tags.into_iter().map(|t| (t.key, t.value)).collect(),
            description: m.description.unwrap_or_default(),
            latest_versions: m
                .latest_versions
                .into_iter()
                .map(|v| ModelVersion {
                    version: v.version.parse().unwrap_or(0),
                    run_id: v.run_id,
                    source: v.source,
                    stage: Stage::parse(&v.current_stage),
                    creation_timestamp: v.creation_timestamp,
                })
                .collect(),
        }
    }
}

#[async_trait]
impl RegistryClient for HttpRegistryClient {
    async fn list_models(&self) -> Result<Vec<ModelDescriptor>> {
        let url = format!("{}/api/2.0/mlflow/registered-models/search", self.base_url);

        let mut request = self.http.get(&url);
        if let Some(ref token) = self.token {
            request = request.bearer_auth(token);
        }

        let response = request
            .send()
            .await
            .map_err(|e| Error::RegistryUnavailable(e.to_string()))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(Error::RegistryUnavailable(format!("{status}: {body}")));
        }

        let search: SearchResponse = response
            .json()
            .await
            .map_err(|e| Error::RegistryUnavailable(format!("Malformed listing: {e}")))?;

        Ok(search
            .registered_models
            .into_iter()
            .map(ModelDescriptor::from)
            .collect())
    }
}
