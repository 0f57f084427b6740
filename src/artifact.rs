//! Artifact store access.
//!
//! The artifact store itself is an external collaborator; the gateway only
//! needs "resolve this source URI into a local directory". Remote backends
//! plug in behind the same trait.

use std::path::{Path, PathBuf};

use async_trait::async_trait;

use crate::error::{Error, Result};

/// Resolves a model version's source URI to a local directory.
#[async_trait]
pub trait ArtifactFetcher: Send + Sync {
    /// Fetch the artifact tree at `source` into `dest_dir` and return the
    /// local path of the model directory.
    async fn fetch(&self, source: &str, dest_dir: &Path) -> Result<PathBuf>;
}

/// Fetcher for sources already present on the local filesystem, either as a
/// plain path or a `file://` URI. Copies the artifact tree into the work
/// directory so provisioning never mutates the store.
pub struct LocalArtifactFetcher;

#[async_trait]
impl ArtifactFetcher for LocalArtifactFetcher {
    async fn fetch(&self, source: &str, dest_dir: &Path) -> Result<PathBuf> {
        let source_path = PathBuf::from(source.strip_prefix("file://").unwrap_or(source));
        if !source_path.exists() {
            return Err(Error::Provisioning(format!(
                "Artifact source not found: {}",
                source_path.display()
            )));
        }

        let name = source_path
            .file_name()
            .ok_or_else(|| Error::Provisioning(format!("Source has no final segment: {source}")))?;
        let dest = dest_dir.join(name);

        let src = source_path.clone();
        let dst = dest.clone();
        tokio::task::spawn_blocking(move || copy_tree(&src, &dst))
            .await
            .map_err(|e| Error::Internal(format!("Copy task failed: {e}")))?
            .map_err(|e| Error::Provisioning(format!("Failed to copy artifact: {e}")))?;

        Ok(dest)
    }
}

fn copy_tree(src: &Path, dst: &Path) -> std::io::Result<()> {
    if src.is_dir() {
        std::fs::create_dir_all(dst)?;
        for entry in std::fs::read_dir(src)? {
            let entry = entry?;
            copy_tree(&entry.path(), &dst.join(entry.file_name()))?;
        }
    } else {
        if let Some(parent) = dst.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::copy(src, dst)?;
    }
    Ok(())
}
