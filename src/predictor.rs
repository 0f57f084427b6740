//! Predictor abstraction over inference backends.
//!
//! A predictor accepts a field-keyed input batch and returns either a
//! columnar (field-keyed) or tabular (row-oriented) result. The supervised
//! subprocess reached over HTTP and any in-process implementation are
//! interchangeable behind the same trait.

use async_trait::async_trait;
use reqwest::Client;
use serde_json::{Map, Value};

use crate::error::{Error, PipelineStage, Result};

#[async_trait]
pub trait Predictor: Send + Sync {
    /// Run inference on a field-keyed batch. The raw result shape is
    /// normalized by the caller.
    async fn predict(&self, batch: Map<String, Value>) -> Result<Value>;
}

/// Predictor addressing a supervised model server over its local port.
pub struct HttpPredictor {
    url: String,
    http: Client,
}

impl HttpPredictor {
    pub fn new(port: u16) -> Self {
        Self {
            url: format!("http://127.0.0.1:{port}/invocations"),
            http: Client::new(),
        }
    }
}

#[async_trait]
impl Predictor for HttpPredictor {
    async fn predict(&self, batch: Map<String, Value>) -> Result<Value> {
        let response = self
            .http
            .post(&self.url)
            .json(&Value::Object(batch))
            .send()
            .await
            .map_err(|e| Error::pipeline(PipelineStage::Predict, e))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(Error::pipeline(
                PipelineStage::Predict,
                format!("{status}: {body}"),
            ));
        }

        response
            .json()
            .await
            .map_err(|e| Error::pipeline(PipelineStage::Predict, e))
    }
}

/// Normalize a predictor result into a plain field -> value-list mapping.
///
/// Accepts a columnar object (values wrapped into lists when scalar) or a
/// tabular array of row objects (transposed into columns).
pub fn normalize_output(raw: Value) -> Result<Map<String, Value>> {
    match raw {
        Value::Object(fields) => {
            let mut out = Map::new();
            for (name, value) in fields {
                let column = match value {
                    Value::Array(_) => value,
                    other => Value::Array(vec![other]),
                };
                out.insert(name, column);
            }
            Ok(out)
        }
        Value::Array(rows) => {
            let mut out = Map::new();
            for (i, row) in rows.into_iter().enumerate() {
                let Value::Object(fields) = row else {
                    return Err(Error::pipeline(
                        PipelineStage::ParseOutput,
                        format!("Tabular result row {i} is not an object"),
                    ));
                };
                for (name, value) in fields {
                    out.entry(name)
                        .or_insert_with(|| Value::Array(vec![]))
                        .as_array_mut()
                        .expect("columns are arrays")
                        .push(value);
                }
            }
            Ok(out)
        }
        other => Err(Error::pipeline(
            PipelineStage::ParseOutput,
            format!("Unsupported result shape: {other}"),
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_normalize_columnar_passthrough() {
        let raw = json!({"y": [1, 2, 3]});
        let out = normalize_output(raw).unwrap();
        assert_eq!(out["y"], json!([1, 2, 3]));
    }

    #[test]
    fn test_normalize_columnar_wraps_scalars() {
        let raw = json!({"label": "setosa"});
        let out = normalize_output(raw).unwrap();
        assert_eq!(out["label"], json!(["setosa"]));
    }

    #[test]
    fn test_normalize_tabular_transposes_rows() {
        let raw = json!([
            {"a": 1, "b": "x"},
            {"a": 2, "b": "y"}
        ]);
        let out = normalize_output(raw).unwrap();
        assert_eq!(out["a"], json!([1, 2]));
        assert_eq!(out["b"], json!(["x", "y"]));
    }

    #[test]
    fn test_normalize_rejects_scalar_result() {
        let err = normalize_output(json!(42)).unwrap_err();
        assert!(matches!(
            err,
            Error::Pipeline {
                stage: PipelineStage::ParseOutput,
                ..
            }
        ));
    }

    #[test]
    fn test_normalize_rejects_non_object_rows() {
        let err = normalize_output(json!([1, 2])).unwrap_err();
        assert!(matches!(
            err,
            Error::Pipeline {
                stage: PipelineStage::ParseOutput,
                ..
            }
        ));
    }
}
