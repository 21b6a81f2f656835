//! Spec Locator and Spec Loader collaborators.
//!
//! The search layer only depends on the two traits. [`FsSpecLocator`] and
//! [`FsSpecLoader`] are the filesystem implementations for the standard
//! `<kernels-dir>/<name>/kernel.json` layout.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use futures::stream::{self, BoxStream, StreamExt};
use jupyter_protocol::JupyterKernelspec;
use log::warn;
use tokio_util::sync::CancellationToken;

use crate::env::Environment;
use crate::error::{FinderError, Result};
use crate::spec::{KernelSpecDocument, KernelSpecReference};

/// File name of a kernelspec inside its directory.
pub const KERNEL_JSON: &str = "kernel.json";

/// Finds candidate kernelspec files under a directory.
#[async_trait]
pub trait SpecLocator: Send + Sync {
    async fn find_candidates(
        &self,
        search_path: &Path,
        cancel: &CancellationToken,
    ) -> Result<Vec<KernelSpecReference>>;
}

/// Loads one candidate into a document bound to `env`.
#[async_trait]
pub trait SpecLoader: Send + Sync {
    async fn load(
        &self,
        candidate: &KernelSpecReference,
        cancel: &CancellationToken,
        env: &Environment,
    ) -> Result<KernelSpecDocument>;
}

/// Lists `kernel.json` files one directory below the search path.
#[derive(Debug, Clone, Default)]
pub struct FsSpecLocator;

#[async_trait]
impl SpecLocator for FsSpecLocator {
    async fn find_candidates(
        &self,
        search_path: &Path,
        cancel: &CancellationToken,
    ) -> Result<Vec<KernelSpecReference>> {
        let entries = match tokio::fs::read_dir(search_path).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };

        let entries = stream::unfold(entries, |mut entries| async move {
            match entries.next_entry().await {
                Ok(Some(entry)) => Some((Ok(entry.path()), entries)),
                Ok(None) => None,
                Err(e) => Some((Err(e), entries)),
            }
        });
        let mut candidates = collect_candidates(entries.boxed(), search_path, cancel).await?;

        // read_dir order is platform dependent
        candidates.sort();
        Ok(candidates
            .into_iter()
            .map(|path| KernelSpecReference { path })
            .collect())
    }
}

/// Keep the `<entry>/kernel.json` files among directory entries.
///
/// An entry that cannot be read is skipped; the rest are still listed.
async fn collect_candidates(
    mut entries: BoxStream<'_, std::io::Result<PathBuf>>,
    search_path: &Path,
    cancel: &CancellationToken,
) -> Result<Vec<PathBuf>> {
    let mut candidates = Vec::new();
    while let Some(entry) = entries.next().await {
        if cancel.is_cancelled() {
            return Err(FinderError::Cancelled);
        }
        let entry = match entry {
            Ok(entry) => entry,
            Err(e) => {
                warn!("[kernelspec] Skipping unreadable entry in {:?}: {}", search_path, e);
                continue;
            }
        };
        let kernel_json = entry.join(KERNEL_JSON);
        if tokio::fs::metadata(&kernel_json)
            .await
            .map(|m| m.is_file())
            .unwrap_or(false)
        {
            candidates.push(kernel_json);
        }
    }
    Ok(candidates)
}

/// Reads and parses `kernel.json`, naming the kernel after its directory.
#[derive(Debug, Clone, Default)]
pub struct FsSpecLoader;

#[async_trait]
impl SpecLoader for FsSpecLoader {
    async fn load(
        &self,
        candidate: &KernelSpecReference,
        cancel: &CancellationToken,
        env: &Environment,
    ) -> Result<KernelSpecDocument> {
        if cancel.is_cancelled() {
            return Err(FinderError::Cancelled);
        }
        let path = &candidate.path;
        let contents = tokio::fs::read_to_string(path).await?;
        let file: JupyterKernelspec =
            serde_json::from_str(&contents).map_err(|source| FinderError::InvalidSpec {
                path: path.clone(),
                source,
            })?;

        let name = path
            .parent()
            .and_then(|dir| dir.file_name())
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_default();

        let mut doc = KernelSpecDocument::from_file(name, file, path);
        doc.environment_id = Some(env.id.clone());
        Ok(doc)
    }
}
