//! Resource lifecycle: local workspace and remote staging bookkeeping.
//!
//! Three layers, innermost first:
//! 1. each segment removes its own local file and staged object as soon as
//!    its inference call ends ([`crate::pipeline::adapter`])
//! 2. [`StagingLedger`] remembers every key staged for the analysis until
//!    its deletion is confirmed; [`sweep_staging`] retries whatever is left
//!    plus anything listed under the analysis prefix
//! 3. [`Workspace`] owns the analysis's temp directory and removes it
//!    wholesale on close (or on drop, if the analysis future is abandoned)

use crate::error::{AnalysisError, StorageError};
use crate::retry::RetryPolicy;
use crate::storage::ObjectStore;
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use tempfile::TempDir;
use tracing::{debug, info, warn};

/// Per-analysis local scratch directory.
#[derive(Debug)]
pub struct Workspace {
    dir: TempDir,
}

impl Workspace {
    /// Create `analysis_<random>` under `root`, or under the system temp dir.
    pub fn create(root: Option<&Path>) -> Result<Self, AnalysisError> {
        let mut builder = tempfile::Builder::new();
        builder.prefix("analysis_");
        let dir = match root {
            Some(root) => builder.tempdir_in(root),
            None => builder.tempdir(),
        }
        .map_err(|source| AnalysisError::WorkspaceUnavailable {
            root: root.map(Path::to_path_buf).unwrap_or_else(std::env::temp_dir),
            source,
        })?;
        debug!("Workspace at {}", dir.path().display());
        Ok(Self { dir })
    }

    pub fn path(&self) -> &Path {
        self.dir.path()
    }

    /// Directory the segmenter writes into, created on first call.
    pub async fn segments_dir(&self) -> Result<PathBuf, AnalysisError> {
        let dir = self.dir.path().join("segments");
        tokio::fs::create_dir_all(&dir)
            .await
            .map_err(|source| AnalysisError::WorkspaceUnavailable {
                root: dir.clone(),
                source,
            })?;
        Ok(dir)
    }

    /// Delete everything under the workspace, whatever earlier steps left.
    pub fn close(self) {
        let path = self.dir.path().to_path_buf();
        if let Err(e) = self.dir.close() {
            warn!("Could not remove workspace {}: {}", path.display(), e);
        }
    }
}

/// Best-effort removal of a local file.
pub async fn remove_local(path: &Path) {
    match tokio::fs::remove_file(path).await {
        Ok(()) => {}
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
        Err(e) => debug!("Could not delete {}: {}", path.display(), e),
    }
}

/// Staged keys whose deletion has not been confirmed yet.
#[derive(Debug, Default)]
pub struct StagingLedger {
    pending: Mutex<BTreeSet<String>>,
}

impl StagingLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Call before uploading, so a key is tracked even if the upload is
    /// abandoned half-way.
    pub fn record(&self, key: &str) {
        self.lock().insert(key.to_string());
    }

    pub fn confirm(&self, key: &str) {
        self.lock().remove(key);
    }

    pub fn pending(&self) -> Vec<String> {
        self.lock().iter().cloned().collect()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, BTreeSet<String>> {
        // a panic elsewhere must not stop cleanup bookkeeping
        self.pending.lock().unwrap_or_else(|e| e.into_inner())
    }
}

/// `<prefix>/<analysis_id>/`: everything one analysis stages lives here.
pub fn analysis_prefix(staging_prefix: &str, analysis_id: &str) -> String {
    format!("{staging_prefix}/{analysis_id}/")
}

/// A fresh, globally unique staging key for one segment.
pub fn staging_key(staging_prefix: &str, analysis_id: &str, extension: &str) -> String {
    format!(
        "{}{}.{}",
        analysis_prefix(staging_prefix, analysis_id),
        uuid::Uuid::new_v4(),
        extension
    )
}

/// Delete `key` with retries; transient store errors are retried.
pub async fn delete_staged(store: &dyn ObjectStore, key: &str, policy: &RetryPolicy) -> Result<(), StorageError> {
    let (res, _) = policy
        .run(&format!("delete {key}"), StorageError::is_transient, |_| store.delete(key))
        .await;
    res
}

/// Final remote cleanup for one analysis.
///
/// Deletes every key still pending in the ledger and everything listed under
/// `prefix`. Returns how many objects could not be confirmed deleted; each
/// one is logged with its key.
pub async fn sweep_staging(
    store: &dyn ObjectStore,
    ledger: &StagingLedger,
    prefix: &str,
    policy: &RetryPolicy,
) -> usize {
    let mut keys: BTreeSet<String> = ledger.pending().into_iter().collect();
    match store.list(prefix).await {
        Ok(listed) => keys.extend(listed),
        Err(e) => warn!("Could not list staging prefix {}: {}", prefix, e),
    }
    if keys.is_empty() {
        return 0;
    }

    info!("Sweeping {} staged objects under {}", keys.len(), prefix);
    let mut leaked = 0;
    for key in keys {
        match delete_staged(store, &key, policy).await {
            Ok(()) => ledger.confirm(&key),
            Err(e) => {
                warn!("Staged object left behind, delete out of band: {} ({})", key, e);
                leaked += 1;
            }
        }
    }
    leaked
}
