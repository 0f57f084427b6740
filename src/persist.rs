//! Durable handler state for fast restarts.
//!
//! Only the durable subset of a handler is ever serialized: schemas, example,
//! provenance and the environment path. Transient handles (the process, the
//! live predictor) are excluded by construction rather than nulled out before
//! writing.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::{Error, Result};
use crate::handler::Handler;
use crate::registry::{ModelVersion, Stage};
use crate::schema::SchemaField;

const SNAPSHOT_FILE: &str = "handler.json";

/// The serializable subset of a handler's state.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HandlerSnapshot {
    pub name: String,
    pub version: i64,
    pub run_id: String,
    pub source: String,
    pub env_path: PathBuf,
    pub input_schema: Vec<SchemaField>,
    pub output_schema: Vec<SchemaField>,
    pub input_example: Map<String, Value>,
    pub description: String,
    pub creation_timestamp: i64,
}

impl HandlerSnapshot {
    /// The model version this snapshot was built from, for re-provisioning.
    pub fn version_ref(&self) -> ModelVersion {
        ModelVersion {
            version: self.version,
            run_id: self.run_id.clone(),
            source: self.source.clone(),
            stage: Stage::None,
            creation_timestamp: self.creation_timestamp,
        }
    }
}

pub struct PersistenceCache;

impl PersistenceCache {
    /// Write a handler's durable state into `dir`.
    pub fn save(handler: &Handler, dir: &Path) -> Result<()> {
        let snapshot = HandlerSnapshot {
            name: handler.name.clone(),
            version: handler.version,
            run_id: handler.run_id.clone(),
            source: handler.source.clone(),
            env_path: handler.env_path.clone(),
            input_schema: handler.input_schema.clone(),
            output_schema: handler.output_schema.clone(),
            input_example: handler.input_example.clone(),
            description: handler.description.clone(),
            creation_timestamp: handler.creation_timestamp,
        };

        std::fs::create_dir_all(dir)
            .map_err(|e| Error::Internal(format!("Failed to create cache dir: {e}")))?;
        let json = serde_json::to_string_pretty(&snapshot)
            .map_err(|e| Error::Internal(format!("Failed to serialize handler: {e}")))?;
        std::fs::write(dir.join(SNAPSHOT_FILE), json)
            .map_err(|e| Error::Internal(format!("Failed to write snapshot: {e}")))?;
        Ok(())
    }

    /// Read a handler snapshot back from `dir`. Reviving it into a live
    /// handler (process + predictor + route) is the factory's job.
    pub fn load(dir: &Path) -> Result<HandlerSnapshot> {
        let content = std::fs::read_to_string(dir.join(SNAPSHOT_FILE))
            .map_err(|e| Error::Internal(format!("Failed to read snapshot: {e}")))?;
        serde_json::from_str(&content)
            .map_err(|e| Error::Internal(format!("Malformed snapshot: {e}")))
    }
}
