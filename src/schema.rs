//! Field schemas for model inputs and outputs.
//!
//! A model's contract is a flat list of named fields. Instead of generating a
//! request/response type per model, the gateway validates a generic
//! field-keyed JSON value against the schema at call time.

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

/// Element type of a schema field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Dtype {
    Float64,
    Float32,
    Int64,
    Int32,
    String,
    /// Generic python-object column; passed through untyped.
    Object,
}

impl Dtype {
    /// Deterministic sample value used when a field has no concrete example.
    pub fn sample(&self) -> Value {
        match self {
            Dtype::Float64 | Dtype::Float32 => json!(1.234),
            Dtype::Int64 | Dtype::Int32 => json!(1),
            Dtype::String => json!("A"),
            Dtype::Object => json!("?"),
        }
    }

    /// Parse the dtype names found in model metadata. Scalar column types
    /// ("double", "long", ...) map onto the tensor dtypes.
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "float64" | "double" => Some(Dtype::Float64),
            "float32" | "float" => Some(Dtype::Float32),
            "int64" | "long" | "int" => Some(Dtype::Int64),
            "int32" | "integer" => Some(Dtype::Int32),
            "str" | "string" => Some(Dtype::String),
            "object" | "binary" => Some(Dtype::Object),
            _ => None,
        }
    }
}

impl std::fmt::Display for Dtype {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Dtype::Float64 => "float64",
            Dtype::Float32 => "float32",
            Dtype::Int64 => "int64",
            Dtype::Int32 => "int32",
            Dtype::String => "string",
            Dtype::Object => "object",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FieldKind {
    Scalar,
    Tensor,
}

/// One named field of an input or output contract.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchemaField {
    pub name: String,
    pub kind: FieldKind,
    pub dtype: Dtype,
    /// Declared extents, outermost first. Empty for scalars.
    #[serde(default)]
    pub shape: Vec<usize>,
}

impl SchemaField {
    pub fn scalar(name: impl Into<String>, dtype: Dtype) -> Self {
        Self {
            name: name.into(),
            kind: FieldKind::Scalar,
            dtype,
            shape: vec![],
        }
    }

    pub fn tensor(name: impl Into<String>, dtype: Dtype, shape: Vec<usize>) -> Self {
        Self {
            name: name.into(),
            kind: FieldKind::Tensor,
            dtype,
            shape,
        }
    }

    /// Synthesize a deterministic example value for this field, nested
    /// according to its declared shape. Every dimension is materialized with
    /// extent max(1, d) so zero or unknown extents still produce one element.
    pub fn example(&self) -> Value {
        nested_sample(self.dtype, &self.shape)
    }
}

fn nested_sample(dtype: Dtype, shape: &[usize]) -> Value {
    match shape.split_first() {
        None => dtype.sample(),
        Some((&d, rest)) => {
            let inner = nested_sample(dtype, rest);
            Value::Array(vec![inner; d.max(1)])
        }
    }
}

/// Human-readable rendering of a schema, used in route descriptions.
pub fn render(fields: &[SchemaField]) -> String {
    fields
        .iter()
        .map(|f| {
            if f.shape.is_empty() {
                format!("{}: {}", f.name, f.dtype)
            } else {
                format!("{}: {} {:?}", f.name, f.dtype, f.shape)
            }
        })
        .collect::<Vec<_>>()
        .join(", ")
}
