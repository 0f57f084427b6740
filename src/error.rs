//! Error types for the gateway.

use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;

/// Location of a failure inside the predict pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PipelineStage {
    ParseInput,
    Predict,
    ParseOutput,
}

impl std::fmt::Display for PipelineStage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            PipelineStage::ParseInput => "Parse input error",
            PipelineStage::Predict => "Model prediction error",
            PipelineStage::ParseOutput => "Parse output error",
        };
        f.write_str(s)
    }
}

/// Error types for gateway operations.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Registry unavailable: {0}")]
    RegistryUnavailable(String),

    #[error("Provisioning failed: {0}")]
    Provisioning(String),

    #[error("Supervision failed: {0}")]
    Supervision(String),

    #[error("{stage}: {message}")]
    Pipeline {
        stage: PipelineStage,
        message: String,
    },

    #[error("Unauthorized")]
    Unauthorized,

    #[error("Model not found: {0}")]
    ModelNotFound(String),

    #[error("Method not allowed for model: {0}")]
    MethodNotAllowed(String),

    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl Error {
    pub fn pipeline(stage: PipelineStage, err: impl std::fmt::Display) -> Self {
        Error::Pipeline {
            stage,
            message: err.to_string(),
        }
    }
}

impl IntoResponse for Error {
    fn into_response(self) -> Response {
        match &self {
            // Structured client error carrying the pipeline location.
            Error::Pipeline { stage, message } => {
                let body = Json(json!({
                    "detail": [{
                        "loc": [stage.to_string()],
                        "msg": message,
                        "type": "pipeline_error"
                    }]
                }));
                (StatusCode::UNPROCESSABLE_ENTITY, body).into_response()
            }
            Error::Unauthorized => (
                StatusCode::UNAUTHORIZED,
                [(header::WWW_AUTHENTICATE, "Bearer")],
                Json(json!({"detail": "Incorrect or missing bearer token"})),
            )
                .into_response(),
            _ => {
                let (status, error_type) = match &self {
                    Error::RegistryUnavailable(_) => (StatusCode::BAD_GATEWAY, "registry_unavailable"),
                    Error::Provisioning(_) => (StatusCode::INTERNAL_SERVER_ERROR, "provisioning_failed"),
                    Error::Supervision(_) => (StatusCode::INTERNAL_SERVER_ERROR, "supervision_failed"),
                    Error::ModelNotFound(_) => (StatusCode::NOT_FOUND, "model_not_found"),
                    Error::MethodNotAllowed(_) => (StatusCode::METHOD_NOT_ALLOWED, "method_not_allowed"),
                    Error::InvalidRequest(_) => (StatusCode::BAD_REQUEST, "invalid_request"),
                    _ => (StatusCode::INTERNAL_SERVER_ERROR, "internal_error"),
                };
                let body = Json(json!({
                    "error": {
                        "type": error_type,
                        "message": self.to_string()
                    }
                }));
                (status, body).into_response()
            }
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;
