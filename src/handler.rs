//! The per-model serving unit.
//!
//! A `Handler` bundles everything needed to serve one model version: its
//! schemas, provisioned environment, supervised process and predictor. It is
//! built by the reconciler, swapped into the handler registry, and torn down
//! when superseded.

use std::path::PathBuf;
use std::sync::Arc;

use chrono::DateTime;
use serde_json::{json, Map, Value};

use crate::error::{Error, PipelineStage, Result};
use crate::introspect::{RUN_ID_FIELD, VERSION_FIELD};
use crate::predictor::{normalize_output, Predictor};
use crate::schema::{render, Dtype, SchemaField};
use crate::supervise::ManagedProcess;

pub struct Handler {
    pub name: String,
    pub version: i64,
    pub run_id: String,
    pub source: String,
    pub env_path: PathBuf,
    pub port: Option<u16>,
    pub input_schema: Vec<SchemaField>,
    pub output_schema: Vec<SchemaField>,
    pub input_example: Map<String, Value>,
    pub description: String,
    /// Creation time of the served version, milliseconds since the epoch.
    pub creation_timestamp: i64,
    /// Creation time of the served version, "YYYY-MM-DD HH:MM".
    pub creation: String,
    /// Rendered route description with schemas and provenance.
    pub long_description: String,
    /// Supervised process backing the predictor; absent for in-process
    /// predictors.
    process: Option<ManagedProcess>,
    predictor: Arc<dyn Predictor>,
}

impl Handler {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        name: String,
        version: i64,
        run_id: String,
        source: String,
        env_path: PathBuf,
        input_schema: Vec<SchemaField>,
        output_schema: Vec<SchemaField>,
        input_example: Map<String, Value>,
        description: String,
        creation_timestamp: i64,
        process: Option<ManagedProcess>,
        predictor: Arc<dyn Predictor>,
    ) -> Self {
        let creation = format_creation(creation_timestamp);
        let long_description = long_description(
            &description,
            &input_schema,
            &output_schema,
            version,
            &run_id,
            &creation,
        );
        Self {
            name,
            version,
            run_id,
            source,
            env_path,
            port: process.as_ref().map(|p| p.port()),
            input_schema,
            output_schema,
            input_example,
            description,
            creation_timestamp,
            creation,
            long_description,
            process,
            predictor,
        }
    }

    /// Run one predict call through the three-stage pipeline and append the
    /// provenance fields.
    pub async fn apply(&self, raw_input: Option<Map<String, Value>>) -> Result<Map<String, Value>> {
        let batch = if self.input_schema.is_empty() {
            Map::new()
        } else {
            let raw = raw_input.unwrap_or_default();
            self.coerce_input(raw)?
        };

        let raw_output = self.predictor.predict(batch).await.map_err(|e| match e {
            pipeline @ Error::Pipeline { .. } => pipeline,
            other => Error::pipeline(PipelineStage::Predict, other),
        })?;

        let mut output = normalize_output(raw_output)?;

        output.insert(VERSION_FIELD.to_string(), json!([self.version]));
        output.insert(RUN_ID_FIELD.to_string(), json!([self.run_id.clone()]));

        Ok(output)
    }

    /// Convert the supplied field-keyed values into per-field arrays coerced
    /// to each field's declared dtype.
    fn coerce_input(&self, mut raw: Map<String, Value>) -> Result<Map<String, Value>> {
        let mut batch = Map::new();
        for field in &self.input_schema {
            let value = raw.remove(&field.name).ok_or_else(|| {
                Error::pipeline(
                    PipelineStage::ParseInput,
                    format!("Missing field '{}'", field.name),
                )
            })?;
            batch.insert(field.name.clone(), coerce(value, field.dtype, &field.name)?);
        }
        Ok(batch)
    }

    /// Metadata map served by the modelinfo endpoint.
    pub fn info(&self) -> Value {
        json!({
            "name": self.name,
            "version": self.version,
            "run_id": self.run_id,
            "source": self.source,
            "input": self.input_schema,
            "output": self.output_schema,
            "description": self.description,
            "creation": self.creation,
        })
    }

    pub fn has_inputs(&self) -> bool {
        !self.input_schema.is_empty()
    }

    /// Tear down the supervised process, if any.
    pub async fn shutdown(&self, timeout_secs: u64) {
        if let Some(ref process) = self.process {
            process.stop(timeout_secs).await;
        }
    }

    /// Explicit liveness check on the backing process. Handlers without a
    /// process are considered live.
    pub async fn is_alive(&self) -> bool {
        match self.process {
            Some(ref process) => process.is_alive().await,
            None => true,
        }
    }
}

/// Cast a value to a declared dtype, recursing through nested lists.
fn coerce(value: Value, dtype: Dtype, field: &str) -> Result<Value> {
    let fail = |got: &Value| {
        Error::pipeline(
            PipelineStage::ParseInput,
            format!("Field '{field}' expects {dtype}, got {got}"),
        )
    };

    match value {
        Value::Array(items) => {
            let coerced: Result<Vec<Value>> = items
                .into_iter()
                .map(|v| coerce(v, dtype, field))
                .collect();
            Ok(Value::Array(coerced?))
        }
        scalar => match dtype {
            Dtype::Float64 | Dtype::Float32 => match &scalar {
                Value::Number(n) => Ok(json!(n.as_f64())),
                Value::String(s) => s
                    .parse::<f64>()
                    .map(|f| json!(f))
                    .map_err(|_| fail(&scalar)),
                _ => Err(fail(&scalar)),
            },
            Dtype::Int64 | Dtype::Int32 => match &scalar {
                Value::Number(n) => {
                    if let Some(i) = n.as_i64() {
                        Ok(json!(i))
                    } else {
                        // Truncating cast, as an array cast would do.
                        Ok(json!(n.as_f64().unwrap_or(0.0) as i64))
                    }
                }
                Value::String(s) => s
                    .parse::<i64>()
                    .map(|i| json!(i))
                    .map_err(|_| fail(&scalar)),
                _ => Err(fail(&scalar)),
            },
            Dtype::String => match scalar {
                Value::String(s) => Ok(json!(s)),
                Value::Number(n) => Ok(json!(n.to_string())),
                other => Err(fail(&other)),
            },
            Dtype::Object => Ok(scalar),
        },
    }
}

fn format_creation(timestamp_ms: i64) -> String {
    DateTime::from_timestamp_millis(timestamp_ms)
        .map(|dt| dt.format("%Y-%m-%d %H:%M").to_string())
        .unwrap_or_default()
}

fn long_description(
    description: &str,
    input_schema: &[SchemaField],
    output_schema: &[SchemaField],
    version: i64,
    run_id: &str,
    creation: &str,
) -> String {
    let mut out = format!("{description}\n\n");
    if !input_schema.is_empty() {
        out.push_str(&format!("Input schema: {}\n", render(input_schema)));
    }
    if !output_schema.is_empty() {
        out.push_str(&format!("Output schema: {}\n", render(output_schema)));
    }
    out.push_str(&format!(
        "Version: {version}\nRun: {run_id}\nCreation: {creation}\n"
    ));
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::SchemaField;
    use async_trait::async_trait;

    struct FixedPredictor(Value);

    #[async_trait]
    impl Predictor for FixedPredictor {
        async fn predict(&self, _batch: Map<String, Value>) -> Result<Value> {
            Ok(self.0.clone())
        }
    }

    struct EchoPredictor;

    #[async_trait]
    impl Predictor for EchoPredictor {
        async fn predict(&self, batch: Map<String, Value>) -> Result<Value> {
            Ok(Value::Object(batch))
        }
    }

    fn handler(
        input_schema: Vec<SchemaField>,
        predictor: Arc<dyn Predictor>,
    ) -> Handler {
        Handler::new(
            "iris".to_string(),
            1,
            "r1".to_string(),
            "/artifacts/r1/model".to_string(),
            PathBuf::from("/tmp/cache/r1/model"),
            input_schema,
            vec![
                SchemaField::tensor(VERSION_FIELD, Dtype::Int64, vec![1]),
                SchemaField::tensor(RUN_ID_FIELD, Dtype::String, vec![1]),
            ],
            Map::new(),
            "a classifier".to_string(),
            1700000000000,
            None,
            predictor,
        )
    }

    #[tokio::test]
    async fn test_apply_appends_provenance() {
        let h = handler(vec![], Arc::new(FixedPredictor(json!({"y": [0.5]}))));
        let out = h.apply(None).await.unwrap();
        assert_eq!(out["y"], json!([0.5]));
        assert_eq!(out[VERSION_FIELD], json!([1]));
        assert_eq!(out[RUN_ID_FIELD], json!(["r1"]));
    }

    #[tokio::test]
    async fn test_apply_provenance_overwrites_model_output() {
        let h = handler(
            vec![],
            Arc::new(FixedPredictor(json!({"version": ["model-says"], "y": [1]}))),
        );
        let out = h.apply(None).await.unwrap();
        assert_eq!(out[VERSION_FIELD], json!([1]));
    }

    #[tokio::test]
    async fn test_apply_coerces_input_dtypes() {
        let h = handler(
            vec![
                SchemaField::tensor("x", Dtype::Float64, vec![2]),
                SchemaField::scalar("n", Dtype::Int64),
            ],
            Arc::new(EchoPredictor),
        );
        let mut raw = Map::new();
        raw.insert("x".to_string(), json!(["1.5", 2]));
        raw.insert("n".to_string(), json!(3.7));
        let out = h.apply(Some(raw)).await.unwrap();
        assert_eq!(out["x"], json!([1.5, 2.0]));
        assert_eq!(out["n"], json!([3]));
    }

    #[tokio::test]
    async fn test_apply_missing_field_is_parse_input() {
        let h = handler(
            vec![SchemaField::scalar("x", Dtype::Float64)],
            Arc::new(EchoPredictor),
        );
        let err = h.apply(Some(Map::new())).await.unwrap_err();
        assert!(matches!(
            err,
            Error::Pipeline {
                stage: PipelineStage::ParseInput,
                ..
            }
        ));
    }

    #[tokio::test]
    async fn test_apply_unparsable_value_is_parse_input() {
        let h = handler(
            vec![SchemaField::scalar("x", Dtype::Int64)],
            Arc::new(EchoPredictor),
        );
        let mut raw = Map::new();
        raw.insert("x".to_string(), json!("not-a-number"));
        let err = h.apply(Some(raw)).await.unwrap_err();
        assert!(matches!(
            err,
            Error::Pipeline {
                stage: PipelineStage::ParseInput,
                ..
            }
        ));
    }

    #[test]
    fn test_info_contains_contract() {
        let h = handler(vec![SchemaField::scalar("x", Dtype::Float64)], Arc::new(EchoPredictor));
        let info = h.info();
        assert_eq!(info["name"], "iris");
        assert_eq!(info["version"], 1);
        assert_eq!(info["creation"], "2023-11-14 22:13");
        assert!(info["input"].as_array().is_some());
    }

    #[test]
    fn test_long_description_renders_schemas() {
        let h = handler(vec![SchemaField::scalar("x", Dtype::Float64)], Arc::new(EchoPredictor));
        assert!(h.long_description.contains("Input schema: x: float64"));
        assert!(h.long_description.contains("Run: r1"));
    }
}
