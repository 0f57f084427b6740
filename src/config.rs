//! Configuration for the gateway.

use config::{Config as ConfigLoader, ConfigError, Environment, File};
use serde::Deserialize;

/// Main configuration structure for the gateway.
#[derive(Debug, Clone, Deserialize, Default)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub registry: RegistryConfig,
    #[serde(default)]
    pub reconcile: ReconcileConfig,
    #[serde(default)]
    pub auth: AuthConfig,
    #[serde(default)]
    pub provision: ProvisionConfig,
    #[serde(default)]
    pub supervise: SuperviseConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    /// Base path under which all routes are mounted, e.g. "/serving".
    /// Empty string mounts routes at the root.
    #[serde(default)]
    pub base_path: String,
    /// Number of worker threads for the request domain. 0 = tokio default.
    #[serde(default)]
    pub workers: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            base_path: String::new(),
            workers: 0,
        }
    }
}

/// Connection parameters for the model registry.
#[derive(Debug, Clone, Deserialize)]
pub struct RegistryConfig {
    #[serde(default = "default_registry_url")]
    pub url: String,
    /// Bearer credential sent with registry requests.
    #[serde(default)]
    pub token: Option<String>,
    /// Skip TLS certificate verification when talking to the registry.
    #[serde(default)]
    pub no_verify: bool,
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            url: default_registry_url(),
            token: None,
            no_verify: false,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct ReconcileConfig {
    /// Seconds between scheduled reconciliation runs.
    #[serde(default = "default_interval")]
    pub interval_secs: u64,
    /// Delay before the initial reconciliation after startup.
    #[serde(default = "default_initial_delay")]
    pub initial_delay_secs: u64,
    /// Prefer Staging versions over Production ones.
    #[serde(default)]
    pub prefer_staging: bool,
    /// Tag allow-list. When non-empty, only models carrying at least one of
    /// these tag keys get a handler.
    #[serde(default)]
    pub tags: Vec<String>,
}

impl Default for ReconcileConfig {
    fn default() -> Self {
        Self {
            interval_secs: default_interval(),
            initial_delay_secs: default_initial_delay(),
            prefer_staging: false,
            tags: vec![],
        }
    }
}

/// Bearer-token allow-list for the predict routes. Empty = open access.
#[derive(Debug, Clone, Deserialize, Default)]
pub struct AuthConfig {
    #[serde(default)]
    pub tokens: Vec<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ProvisionConfig {
    /// Directory holding per-run-id work folders.
    #[serde(default = "default_cache_dir")]
    pub cache_dir: String,
    /// Python interpreter used to create isolated runtimes.
    #[serde(default = "default_python_bin")]
    pub python_bin: String,
    /// Fallback dependency list for models without a bundled manifest.
    #[serde(default = "default_requirements")]
    pub default_requirements: Vec<String>,
}

impl Default for ProvisionConfig {
    fn default() -> Self {
        Self {
            cache_dir: default_cache_dir(),
            python_bin: default_python_bin(),
            default_requirements: default_requirements(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct SuperviseConfig {
    /// Model server startup timeout in seconds.
    #[serde(default = "default_startup_timeout")]
    pub startup_timeout_secs: u64,
    /// Interval between readiness probes in milliseconds.
    #[serde(default = "default_retry_interval")]
    pub retry_interval_ms: u64,
    /// Graceful shutdown timeout in seconds.
    #[serde(default = "default_shutdown_timeout")]
    pub shutdown_timeout_secs: u64,
}

impl Default for SuperviseConfig {
    fn default() -> Self {
        Self {
            startup_timeout_secs: default_startup_timeout(),
            retry_interval_ms: default_retry_interval(),
            shutdown_timeout_secs: default_shutdown_timeout(),
        }
    }
}

// Default values
fn default_host() -> String {
    "0.0.0.0".to_string()
}
fn default_port() -> u16 {
    5000
}
fn default_registry_url() -> String {
    "http://localhost:4040".to_string()
}
fn default_interval() -> u64 {
    600
}
fn default_initial_delay() -> u64 {
    10
}
fn default_cache_dir() -> String {
    "./cache".to_string()
}
fn default_python_bin() -> String {
    "python3".to_string()
}
fn default_requirements() -> Vec<String> {
    vec!["mlflow".to_string(), "pandas".to_string(), "numpy".to_string()]
}
fn default_startup_timeout() -> u64 {
    120
}
fn default_retry_interval() -> u64 {
    500
}
fn default_shutdown_timeout() -> u64 {
    10
}

impl Config {
    /// Load configuration from file and environment variables.
    ///
    /// Configuration sources (in order of precedence):
    /// 1. Environment variables (GATEWAY__SECTION__KEY format)
    /// 2. config.toml file (if present)
    /// 3. Built-in defaults
    pub fn load() -> Result<Self, ConfigError> {
        let config = ConfigLoader::builder()
            .add_source(File::with_name("config").required(false))
            .add_source(
                Environment::with_prefix("GATEWAY")
                    .separator("__")
                    .try_parsing(true)
                    .list_separator(",")
                    .with_list_parse_key("reconcile.tags")
                    .with_list_parse_key("auth.tokens")
                    .with_list_parse_key("provision.default_requirements"),
            )
            .build()?;

        config.try_deserialize()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_server_config() {
        let server = ServerConfig::default();
        assert_eq!(server.host, "0.0.0.0");
        assert_eq!(server.port, 5000);
        assert_eq!(server.base_path, "");
    }

    #[test]
    fn test_default_reconcile_config() {
        let reconcile = ReconcileConfig::default();
        assert_eq!(reconcile.interval_secs, 600);
        assert_eq!(reconcile.initial_delay_secs, 10);
        assert!(!reconcile.prefer_staging);
        assert!(reconcile.tags.is_empty());
    }

    #[test]
    fn test_default_registry_config() {
        let registry = RegistryConfig::default();
        assert_eq!(registry.url, "http://localhost:4040");
        assert!(registry.token.is_none());
        assert!(!registry.no_verify);
    }
}
