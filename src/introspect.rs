//! Schema introspection for provisioned model versions.
//!
//! Reads the model's declared metadata out of the provisioned directory and
//! derives the input/output contracts plus an example payload. Missing or
//! unparsable metadata is not an error: it yields empty schemas.

use std::path::Path;

use serde::Deserialize;
use serde_json::{Map, Value};

use crate::schema::{Dtype, FieldKind, SchemaField};

/// Synthetic output field carrying the served model version.
pub const VERSION_FIELD: &str = "version";
/// Synthetic output field carrying the served run identifier.
pub const RUN_ID_FIELD: &str = "run_id";

const METADATA_FILE: &str = "MLmodel.json";
const INPUT_EXAMPLE_FILE: &str = "input_example.json";

/// Result of introspecting one model directory.
#[derive(Debug, Clone)]
pub struct Introspection {
    pub input_schema: Vec<SchemaField>,
    /// Output schema; always ends with the two provenance fields.
    pub output_schema: Vec<SchemaField>,
    /// Field-keyed example input: bundled values where available, synthetic
    /// samples for the rest.
    pub input_example: Map<String, Value>,
}

#[derive(Debug, Deserialize, Default)]
struct ModelMetadata {
    #[serde(default)]
    signature: Option<Signature>,
}

#[derive(Debug, Deserialize, Default)]
struct Signature {
    #[serde(default)]
    inputs: Option<Value>,
    #[serde(default)]
    outputs: Option<Value>,
}

/// Derive schemas and an example payload for a provisioned model directory.
pub fn introspect(model_dir: &Path) -> Introspection {
    let metadata = load_metadata(model_dir);
    let signature = metadata.signature.unwrap_or_default();

    let input_schema = signature
        .inputs
        .as_ref()
        .map(parse_fields)
        .unwrap_or_default();
    let mut output_schema = signature
        .outputs
        .as_ref()
        .map(parse_fields)
        .unwrap_or_default();

    // The synthetic provenance fields are authoritative: a model-declared
    // field with the same name is dropped before they are appended.
    output_schema.retain(|f| f.name != VERSION_FIELD && f.name != RUN_ID_FIELD);
    output_schema.push(SchemaField::tensor(VERSION_FIELD, Dtype::Int64, vec![1]));
    output_schema.push(SchemaField::tensor(RUN_ID_FIELD, Dtype::String, vec![1]));

    let input_example = build_input_example(model_dir, &input_schema);

    Introspection {
        input_schema,
        output_schema,
        input_example,
    }
}

fn load_metadata(model_dir: &Path) -> ModelMetadata {
    let path = model_dir.join(METADATA_FILE);
    let content = match std::fs::read_to_string(&path) {
        Ok(c) => c,
        Err(e) => {
            tracing::debug!(path = %path.display(), "No model metadata: {e}");
            return ModelMetadata::default();
        }
    };
    match serde_json::from_str(&content) {
        Ok(m) => m,
        Err(e) => {
            tracing::warn!(path = %path.display(), "Unparsable model metadata: {e}");
            ModelMetadata::default()
        }
    }
}

/// Parse a declared field list. The metadata encodes it either as a JSON
/// array or as a JSON-encoded string holding that array.
fn parse_fields(value: &Value) -> Vec<SchemaField> {
    let entries: Vec<Value> = match value {
        Value::Array(items) => items.clone(),
        Value::String(encoded) => serde_json::from_str(encoded).unwrap_or_default(),
        _ => vec![],
    };

    entries.iter().filter_map(parse_field).collect()
}

fn parse_field(entry: &Value) -> Option<SchemaField> {
    let name = entry.get("name")?.as_str()?.to_string();
    let type_tag = entry.get("type").and_then(Value::as_str).unwrap_or("");

    if type_tag == "tensor" {
        let spec = entry.get("tensor-spec")?;
        let dtype = Dtype::parse(spec.get("dtype")?.as_str()?)?;
        let shape = spec
            .get("shape")
            .and_then(Value::as_array)
            .map(|dims| {
                dims.iter()
                    // Variable extents are declared as -1; treat as unknown.
                    .map(|d| d.as_i64().unwrap_or(0).max(0) as usize)
                    .collect()
            })
            .unwrap_or_default();
        Some(SchemaField::tensor(name, dtype, shape))
    } else {
        let dtype = Dtype::parse(type_tag)?;
        Some(SchemaField::scalar(name, dtype))
    }
}

/// Example payload: values from the bundled example file where present,
/// synthetic samples for every field it lacks.
fn build_input_example(model_dir: &Path, input_schema: &[SchemaField]) -> Map<String, Value> {
    let bundled: Map<String, Value> = std::fs::read_to_string(model_dir.join(INPUT_EXAMPLE_FILE))
        .ok()
        .and_then(|c| serde_json::from_str(&c).ok())
        .unwrap_or_default();

    let mut example = Map::new();
    for field in input_schema {
        let value = bundled
            .get(&field.name)
            .cloned()
            .unwrap_or_else(|| field.example());
        example.insert(field.name.clone(), value);
    }
    example
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn write_metadata(dir: &Path, metadata: Value) {
        std::fs::write(dir.join(METADATA_FILE), metadata.to_string()).unwrap();
    }

    #[test]
    fn test_missing_metadata_yields_empty_input_schema() {
        let dir = tempfile::tempdir().unwrap();
        let intro = introspect(dir.path());
        assert!(intro.input_schema.is_empty());
        // Provenance fields are present even without declared outputs.
        assert_eq!(intro.output_schema.len(), 2);
        assert_eq!(intro.output_schema[0].name, VERSION_FIELD);
        assert_eq!(intro.output_schema[1].name, RUN_ID_FIELD);
    }

    #[test]
    fn test_tensor_signature_parsed() {
        let dir = tempfile::tempdir().unwrap();
        write_metadata(
            dir.path(),
            json!({
                "signature": {
                    "inputs": [
                        {"name": "x", "type": "tensor",
                         "tensor-spec": {"dtype": "float64", "shape": [-1, 4]}}
                    ],
                    "outputs": [
                        {"name": "y", "type": "tensor",
                         "tensor-spec": {"dtype": "int64", "shape": [1]}}
                    ]
                }
            }),
        );

        let intro = introspect(dir.path());
        assert_eq!(intro.input_schema.len(), 1);
        assert_eq!(intro.input_schema[0].name, "x");
        assert_eq!(intro.input_schema[0].dtype, Dtype::Float64);
        assert_eq!(intro.input_schema[0].shape, vec![0, 4]);
        assert_eq!(intro.output_schema.len(), 3);
        assert_eq!(intro.output_schema[0].name, "y");
    }

    #[test]
    fn test_json_string_encoded_signature_parsed() {
        let dir = tempfile::tempdir().unwrap();
        let inputs = json!([
            {"name": "text", "type": "string"}
        ]);
        write_metadata(
            dir.path(),
            json!({"signature": {"inputs": inputs.to_string()}}),
        );

        let intro = introspect(dir.path());
        assert_eq!(intro.input_schema.len(), 1);
        assert_eq!(intro.input_schema[0].kind, FieldKind::Scalar);
        assert_eq!(intro.input_schema[0].dtype, Dtype::String);
    }

    #[test]
    fn test_colliding_declared_field_is_dropped() {
        let dir = tempfile::tempdir().unwrap();
        write_metadata(
            dir.path(),
            json!({
                "signature": {
                    "outputs": [
                        {"name": "version", "type": "string"},
                        {"name": "score", "type": "double"}
                    ]
                }
            }),
        );

        let intro = introspect(dir.path());
        let names: Vec<&str> = intro.output_schema.iter().map(|f| f.name.as_str()).collect();
        assert_eq!(names, vec!["score", VERSION_FIELD, RUN_ID_FIELD]);
        // The synthetic field kept its own dtype, not the declared one.
        assert_eq!(intro.output_schema[1].dtype, Dtype::Int64);
    }

    #[test]
    fn test_bundled_example_wins_over_synthetic() {
        let dir = tempfile::tempdir().unwrap();
        write_metadata(
            dir.path(),
            json!({
                "signature": {
                    "inputs": [
                        {"name": "a", "type": "tensor",
                         "tensor-spec": {"dtype": "float64", "shape": [2]}},
                        {"name": "b", "type": "tensor",
                         "tensor-spec": {"dtype": "string", "shape": [1]}}
                    ]
                }
            }),
        );
        std::fs::write(
            dir.path().join(INPUT_EXAMPLE_FILE),
            json!({"a": [9.9, 8.8]}).to_string(),
        )
        .unwrap();

        let intro = introspect(dir.path());
        assert_eq!(intro.input_example["a"], json!([9.9, 8.8]));
        assert_eq!(intro.input_example["b"], json!(["A"]));
    }
}
