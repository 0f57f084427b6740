//! Model registry gateway.
//!
//! Mirrors a remote model registry: periodically discovers model versions,
//! provisions an isolated runtime and inference process per version, and
//! publishes a typed HTTP endpoint per model that forwards requests to the
//! right process and annotates responses with provenance.

pub mod artifact;
pub mod config;
pub mod error;
pub mod handler;
pub mod introspect;
pub mod persist;
pub mod predictor;
pub mod provision;
pub mod publish;
pub mod reconcile;
pub mod registry;
pub mod routes;
pub mod scheduler;
pub mod schema;
pub mod serving;
pub mod state;
pub mod supervise;
pub mod test_util;

pub use artifact::{ArtifactFetcher, LocalArtifactFetcher};
pub use config::Config;
pub use error::{Error, PipelineStage, Result};
pub use handler::Handler;
pub use persist::{HandlerSnapshot, PersistenceCache};
pub use predictor::{HttpPredictor, Predictor};
pub use provision::EnvironmentProvisioner;
pub use publish::EndpointPublisher;
pub use reconcile::{HandlerFactory, LaunchHandlerFactory, Reconciler};
pub use registry::{select_version, HttpRegistryClient, ModelDescriptor, ModelVersion, RegistryClient, Stage};
pub use schema::{Dtype, FieldKind, SchemaField};
pub use serving::{HandlerRegistry, GLOBAL_ERROR_KEY};
pub use state::AppState;
pub use supervise::ProcessSupervisor;
