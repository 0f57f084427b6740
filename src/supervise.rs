//! Supervision of per-model inference server processes.
//!
//! Each active model version runs its isolated runtime's serve command as a
//! detached child process on its own local port. The supervisor retains the
//! process handle for later shutdown; there is no automatic restart on crash,
//! liveness is an explicit check the caller may make.

use std::fs::OpenOptions;
use std::path::Path;
use std::process::Stdio;
use std::time::{Duration, Instant};

use reqwest::Client;
use tokio::net::TcpListener;
use tokio::process::{Child, Command};
use tokio::sync::Mutex;

use crate::config::SuperviseConfig;
use crate::error::{Error, Result};

/// A supervised inference server process bound to a local port.
#[derive(Debug)]
pub struct ManagedProcess {
    port: u16,
    child: Mutex<Option<Child>>,
}

impl ManagedProcess {
    pub fn port(&self) -> u16 {
        self.port
    }

    /// Explicit liveness check on the child process.
    pub async fn is_alive(&self) -> bool {
        let mut child = self.child.lock().await;
        match child.as_mut() {
            Some(c) => matches!(c.try_wait(), Ok(None)),
            None => false,
        }
    }

    /// Terminate the process: SIGTERM first, bounded wait, then kill.
    pub async fn stop(&self, timeout_secs: u64) {
        let mut guard = self.child.lock().await;
        if let Some(mut child) = guard.take() {
            #[cfg(unix)]
            {
                use nix::sys::signal::{kill, Signal};
                use nix::unistd::Pid;

                if let Some(pid) = child.id() {
                    let _ = kill(Pid::from_raw(pid as i32), Signal::SIGTERM);
                }
            }

            match tokio::time::timeout(Duration::from_secs(timeout_secs), child.wait()).await {
                Ok(Ok(status)) => {
                    tracing::debug!(port = self.port, %status, "Model server exited");
                }
                Ok(Err(e)) => {
                    tracing::warn!(port = self.port, "Error waiting for model server: {e}");
                }
                Err(_timeout) => {
                    tracing::warn!(port = self.port, "Model server didn't stop gracefully, killing");
                    let _ = child.kill().await;
                }
            }
        }
    }
}

pub struct ProcessSupervisor {
    config: SuperviseConfig,
    http: Client,
}

impl ProcessSupervisor {
    pub fn new(config: SuperviseConfig) -> Self {
        Self {
            config,
            http: Client::new(),
        }
    }

    /// Allocate an unused local port by a bind-then-release probe.
    ///
    /// Known race: another allocation may observe the same port before the
    /// child binds it. OS-assigned ephemeral ports make a collision between
    /// concurrently provisioning models unlikely; closing the window fully
    /// would require holding the listener until the child has bound.
    pub async fn allocate_port(&self) -> Result<u16> {
        let listener = TcpListener::bind("127.0.0.1:0")
            .await
            .map_err(|e| Error::Supervision(format!("Failed to bind for port allocation: {e}")))?;
        let port = listener
            .local_addr()
            .map_err(|e| Error::Supervision(format!("Failed to get local addr: {e}")))?
            .port();
        drop(listener);
        Ok(port)
    }

    /// Launch the isolated runtime's serve command for the model directory,
    /// bound to `port`, with output appended to a per-model serve log.
    ///
    /// Does not wait for startup; call `wait_ready` afterwards.
    pub fn start(&self, model_dir: &Path, port: u16) -> Result<ManagedProcess> {
        let log_path = model_dir
            .parent()
            .unwrap_or(model_dir)
            .join(format!("{}_serve_log.txt", dir_name(model_dir)));
        let log = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&log_path)
            .map_err(|e| Error::Supervision(format!("Failed to open serve log: {e}")))?;
        let log_err = log
            .try_clone()
            .map_err(|e| Error::Supervision(format!("Failed to clone serve log: {e}")))?;

        let serve_bin = model_dir.join("env/bin/mlflow");
        let child = Command::new(&serve_bin)
            .args(["models", "serve", "-m", ".", "--env-manager", "local"])
            .args(["--host", "127.0.0.1", "--port", &port.to_string()])
            .current_dir(model_dir)
            .stdin(Stdio::null())
            .stdout(Stdio::from(log))
            .stderr(Stdio::from(log_err))
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| {
                Error::Supervision(format!(
                    "Failed to spawn model server {}: {e}",
                    serve_bin.display()
                ))
            })?;

        tracing::info!(
            model_dir = %model_dir.display(),
            port,
            pid = ?child.id(),
            "Spawned model server"
        );

        Ok(ManagedProcess {
            port,
            child: Mutex::new(Some(child)),
        })
    }

    /// Bounded readiness probe: poll the server's ping endpoint until it
    /// answers or the startup timeout elapses. Fails fast when the child
    /// exits during startup.
    pub async fn wait_ready(&self, process: &ManagedProcess) -> Result<()> {
        let timeout = Duration::from_secs(self.config.startup_timeout_secs);
        let retry = Duration::from_millis(self.config.retry_interval_ms);
        let start = Instant::now();
        let ping_url = format!("http://127.0.0.1:{}/ping", process.port());

        loop {
            if start.elapsed() > timeout {
                return Err(Error::Supervision(format!(
                    "Model server on port {} not ready after {:?}",
                    process.port(),
                    start.elapsed()
                )));
            }

            if !process.is_alive().await {
                return Err(Error::Supervision(format!(
                    "Model server on port {} died during startup",
                    process.port()
                )));
            }

            if let Ok(resp) = self.http.get(&ping_url).send().await {
                if resp.status().is_success() {
                    tracing::info!(
                        port = process.port(),
                        elapsed = ?start.elapsed(),
                        "Model server ready"
                    );
                    return Ok(());
                }
            }

            tokio::time::sleep(retry).await;
        }
    }

    pub fn shutdown_timeout_secs(&self) -> u64 {
        self.config.shutdown_timeout_secs
    }
}

fn dir_name(path: &Path) -> &str {
    path.file_name().and_then(|n| n.to_str()).unwrap_or("model")
}
