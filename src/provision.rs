//! Isolated runtime provisioning for model versions.
//!
//! Each model version gets its own work folder keyed by run id, holding the
//! fetched artifact and a dedicated virtualenv with the model's dependencies
//! installed. Provisioning is idempotent: an existing model directory is
//! reused as-is.

use std::fs::OpenOptions;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::Arc;

use tokio::process::Command;

use crate::artifact::ArtifactFetcher;
use crate::config::ProvisionConfig;
use crate::error::{Error, Result};
use crate::registry::ModelVersion;

pub struct EnvironmentProvisioner {
    config: ProvisionConfig,
    fetcher: Arc<dyn ArtifactFetcher>,
}

impl EnvironmentProvisioner {
    pub fn new(config: ProvisionConfig, fetcher: Arc<dyn ArtifactFetcher>) -> Self {
        Self { config, fetcher }
    }

    /// Work folder for a run id. Deterministic, so two runs never collide on
    /// disk and re-provisioning the same run id is a no-op.
    pub fn work_dir(&self, run_id: &str) -> PathBuf {
        PathBuf::from(&self.config.cache_dir).join(run_id)
    }

    /// Model directory inside the work folder, named after the final path
    /// segment of the version's source URI.
    pub fn model_dir(&self, version: &ModelVersion) -> PathBuf {
        let segment = version
            .source
            .trim_end_matches('/')
            .rsplit('/')
            .next()
            .unwrap_or("model");
        self.work_dir(&version.run_id).join(segment)
    }

    /// Build the isolated runtime for a model version and return its model
    /// directory. Returns immediately when the directory already exists.
    pub async fn provision(&self, version: &ModelVersion) -> Result<PathBuf> {
        let work_dir = self.work_dir(&version.run_id);
        let model_dir = self.model_dir(version);

        if model_dir.exists() {
            tracing::debug!(run_id = %version.run_id, "Environment already provisioned");
            return Ok(model_dir);
        }

        std::fs::create_dir_all(&work_dir)
            .map_err(|e| Error::Provisioning(format!("Failed to create work dir: {e}")))?;

        let log_path = work_dir.join(format!("{}_setup_log.txt", dir_name(&model_dir)));
        log_line(&log_path, &format!("Start download {}", model_dir.display()))?;

        self.fetcher.fetch(&version.source, &work_dir).await?;
        log_line(&log_path, &format!("End download {}", model_dir.display()))?;

        // Fresh isolated runtime inside the model directory.
        self.run_checked(
            Command::new(&self.config.python_bin).args(["-m", "venv", "env"]),
            &model_dir,
            &log_path,
            "venv creation",
        )
        .await?;

        let pip = model_dir.join("env/bin/pip");
        let python = model_dir.join("env/bin/python");

        let mut requirements = self.read_requirements(&model_dir)?;
        let code_packages = bundled_code_packages(&model_dir);

        // A directly-vendored package wins over its registry counterpart.
        for pkg in &code_packages {
            let pkg_name = dir_name(pkg);
            requirements.retain(|r| !r.contains(&pkg_name));
        }

        log_line(&log_path, "Install req:")?;
        for r in &requirements {
            log_line(&log_path, r)?;
        }

        if !requirements.is_empty() {
            self.run_checked(
                Command::new(&pip).arg("install").args(&requirements),
                &model_dir,
                &log_path,
                "dependency install",
            )
            .await?;
        }

        for pkg in &code_packages {
            let pkg_requirements = pkg.join("requirements.txt");
            if pkg_requirements.exists() {
                self.run_checked(
                    Command::new(&pip).args(["install", "-r"]).arg(&pkg_requirements),
                    &model_dir,
                    &log_path,
                    "package dependency install",
                )
                .await?;
            }

            self.run_checked(
                Command::new(&python).args(["./setup.py", "build", "install"]),
                pkg,
                &log_path,
                "package install",
            )
            .await?;
        }

        tracing::info!(
            run_id = %version.run_id,
            model_dir = %model_dir.display(),
            "Provisioned environment"
        );

        Ok(model_dir)
    }

    /// Dependency list for the model: its bundled manifest when present,
    /// otherwise the configured platform defaults.
    fn read_requirements(&self, model_dir: &Path) -> Result<Vec<String>> {
        let manifest = model_dir.join("requirements.txt");
        if !manifest.exists() {
            return Ok(self.config.default_requirements.clone());
        }
        let content = std::fs::read_to_string(&manifest)
            .map_err(|e| Error::Provisioning(format!("Failed to read requirements: {e}")))?;
        Ok(content
            .lines()
            .map(str::trim)
            .filter(|l| !l.is_empty() && !l.starts_with('#'))
            .map(String::from)
            .collect())
    }

    /// Run one provisioning step with output appended to the setup log and
    /// the exit status checked. A non-zero status aborts the attempt.
    async fn run_checked(
        &self,
        command: &mut Command,
        cwd: &Path,
        log_path: &Path,
        step: &str,
    ) -> Result<()> {
        let log = OpenOptions::new()
            .create(true)
            .append(true)
            .open(log_path)
            .map_err(|e| Error::Provisioning(format!("Failed to open setup log: {e}")))?;
        let log_err = log
            .try_clone()
            .map_err(|e| Error::Provisioning(format!("Failed to clone setup log: {e}")))?;

        let status = command
            .current_dir(cwd)
            .stdin(Stdio::null())
            .stdout(Stdio::from(log))
            .stderr(Stdio::from(log_err))
            .status()
            .await
            .map_err(|e| Error::Provisioning(format!("Failed to spawn {step}: {e}")))?;

        if !status.success() {
            return Err(Error::Provisioning(format!(
                "{step} exited with {status} (see {})",
                log_path.display()
            )));
        }
        Ok(())
    }
}

/// Bundled code packages vendored under `code/` in the model directory.
fn bundled_code_packages(model_dir: &Path) -> Vec<PathBuf> {
    let code_dir = model_dir.join("code");
    let mut packages = vec![];
    if let Ok(entries) = std::fs::read_dir(code_dir) {
        for entry in entries.flatten() {
            if entry.path().is_dir() {
                packages.push(entry.path());
            }
        }
    }
    packages.sort();
    packages
}

fn dir_name(path: &Path) -> String {
    path.file_name()
        .and_then(|n| n.to_str())
        .unwrap_or("model")
        .to_string()
}

fn log_line(log_path: &Path, line: &str) -> Result<()> {
    use std::io::Write;
    let mut log = OpenOptions::new()
        .create(true)
        .append(true)
        .open(log_path)
        .map_err(|e| Error::Provisioning(format!("Failed to open setup log: {e}")))?;
    writeln!(log, "{line}").map_err(|e| Error::Provisioning(format!("Failed to write log: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::artifact::LocalArtifactFetcher;
    use crate::registry::Stage;

    fn version_for(source: &Path) -> ModelVersion {
        ModelVersion {
            version: 1,
            run_id: "r1".to_string(),
            source: source.display().to_string(),
            stage: Stage::Production,
            creation_timestamp: 0,
        }
    }

    fn provisioner(cache_dir: &Path) -> EnvironmentProvisioner {
        EnvironmentProvisioner::new(
            ProvisionConfig {
                cache_dir: cache_dir.display().to_string(),
                python_bin: "python3".to_string(),
                default_requirements: vec!["mlflow".to_string()],
            },
            Arc::new(LocalArtifactFetcher),
        )
    }

    #[test]
    fn test_model_dir_derived_from_source_segment() {
        let cache = tempfile::tempdir().unwrap();
        let p = provisioner(cache.path());
        let v = ModelVersion {
            version: 1,
            run_id: "abc".to_string(),
            source: "s3://bucket/runs/abc/artifacts/model".to_string(),
            stage: Stage::None,
            creation_timestamp: 0,
        };
        assert_eq!(p.model_dir(&v), cache.path().join("abc").join("model"));
    }

    #[test]
    fn test_work_dirs_distinct_per_run_id() {
        let cache = tempfile::tempdir().unwrap();
        let p = provisioner(cache.path());
        assert_ne!(p.work_dir("r1"), p.work_dir("r2"));
    }

    #[tokio::test]
    async fn test_provision_reuses_existing_model_dir() {
        let cache = tempfile::tempdir().unwrap();
        let store = tempfile::tempdir().unwrap();
        let source = store.path().join("model");
        std::fs::create_dir_all(&source).unwrap();

        let p = provisioner(cache.path());
        let v = version_for(&source);

        // Pre-create the model dir: provisioning must be a no-op.
        let model_dir = p.model_dir(&v);
        std::fs::create_dir_all(&model_dir).unwrap();
        let got = p.provision(&v).await.unwrap();
        assert_eq!(got, model_dir);
        // No setup log written means no step ran.
        assert!(!p.work_dir("r1").join("model_setup_log.txt").exists());
    }

    #[test]
    fn test_requirements_fall_back_to_defaults() {
        let cache = tempfile::tempdir().unwrap();
        let model_dir = tempfile::tempdir().unwrap();
        let p = provisioner(cache.path());
        let reqs = p.read_requirements(model_dir.path()).unwrap();
        assert_eq!(reqs, vec!["mlflow".to_string()]);
    }

    #[test]
    fn test_requirements_read_from_manifest() {
        let cache = tempfile::tempdir().unwrap();
        let model_dir = tempfile::tempdir().unwrap();
        std::fs::write(
            model_dir.path().join("requirements.txt"),
            "numpy==1.26\n\n# comment\nscikit-learn\n",
        )
        .unwrap();
        let p = provisioner(cache.path());
        let reqs = p.read_requirements(model_dir.path()).unwrap();
        assert_eq!(reqs, vec!["numpy==1.26".to_string(), "scikit-learn".to_string()]);
    }

    #[test]
    fn test_bundled_code_packages_listed() {
        let model_dir = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(model_dir.path().join("code/alpha")).unwrap();
        std::fs::create_dir_all(model_dir.path().join("code/beta")).unwrap();
        std::fs::write(model_dir.path().join("code/readme.txt"), "").unwrap();

        let packages = bundled_code_packages(model_dir.path());
        let names: Vec<String> = packages.iter().map(|p| dir_name(p)).collect();
        assert_eq!(names, vec!["alpha".to_string(), "beta".to_string()]);
    }
}
