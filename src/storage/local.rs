//! Directory-backed object store.
//!
//! Keys map to files under a root directory (`a/b/c.pdf` → `<root>/a/b/c.pdf`)
//! and staged URIs are `file://` URLs. Useful for local runs against
//! a file-capable inference backend, and for exercising the whole pipeline
//! in tests without a network.

use super::ObjectStore;
use crate::error::StorageError;
use async_trait::async_trait;
use std::path::{Component, Path, PathBuf};
use tracing::debug;

/// An [`ObjectStore`] rooted at a local directory.
#[derive(Debug, Clone)]
pub struct LocalObjectStore {
    root: PathBuf,
}

impl LocalObjectStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn key_path(&self, key: &str) -> Result<PathBuf, StorageError> {
        let rel = Path::new(key.trim_start_matches('/'));
        if key.is_empty() || rel.components().any(|c| !matches!(c, Component::Normal(_))) {
            return Err(StorageError::InvalidUri {
                uri: key.to_string(),
                reason: "keys must be relative paths without '..'".to_string(),
            });
        }
        Ok(self.root.join(rel))
    }

    /// Resolve a download location: `file://` URL, absolute path, or key.
    fn resolve(&self, uri: &str) -> Result<PathBuf, StorageError> {
        if let Some(path) = uri.strip_prefix("file://") {
            return Ok(PathBuf::from(path));
        }
        let path = Path::new(uri);
        if path.is_absolute() {
            Ok(path.to_path_buf())
        } else {
            self.key_path(uri)
        }
    }
}

fn io_error(path: &Path, source: std::io::Error) -> StorageError {
    if source.kind() == std::io::ErrorKind::NotFound {
        StorageError::NotFound {
            uri: path.display().to_string(),
        }
    } else {
        StorageError::Io {
            path: path.to_path_buf(),
            source,
        }
    }
}

#[async_trait]
impl ObjectStore for LocalObjectStore {
    async fn download(&self, uri: &str, dest: &Path) -> Result<(), StorageError> {
        let src = self.resolve(uri)?;
        tokio::fs::copy(&src, dest)
            .await
            .map_err(|e| io_error(&src, e))?;
        debug!("Copied {} → {}", src.display(), dest.display());
        Ok(())
    }

    async fn upload(&self, src: &Path, key: &str, _content_type: &str) -> Result<String, StorageError> {
        let dest = self.key_path(key)?;
        if let Some(parent) = dest.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| io_error(parent, e))?;
        }
        if !tokio::fs::try_exists(src).await.unwrap_or(false) {
            return Err(io_error(src, std::io::ErrorKind::NotFound.into()));
        }
        tokio::fs::copy(src, &dest)
            .await
            .map_err(|e| io_error(&dest, e))?;
        Ok(format!("file://{}", dest.display()))
    }

    async fn delete(&self, key: &str) -> Result<(), StorageError> {
        let path = self.key_path(key)?;
        // directories are left in place: another upload may be about to
        // write into the same one
        match tokio::fs::remove_file(&path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(io_error(&path, e)),
        }
    }

    async fn list(&self, prefix: &str) -> Result<Vec<String>, StorageError> {
        let mut keys = Vec::new();
        let mut pending = vec![self.root.clone()];
        while let Some(dir) = pending.pop() {
            let mut entries = match tokio::fs::read_dir(&dir).await {
                Ok(entries) => entries,
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => continue,
                Err(e) => return Err(io_error(&dir, e)),
            };
            while let Some(entry) = entries.next_entry().await.map_err(|e| io_error(&dir, e))? {
                let path = entry.path();
                let file_type = entry.file_type().await.map_err(|e| io_error(&path, e))?;
                if file_type.is_dir() {
                    pending.push(path);
                } else if let Ok(rel) = path.strip_prefix(&self.root) {
                    let key = rel
                        .components()
                        .map(|c| c.as_os_str().to_string_lossy())
                        .collect::<Vec<_>>()
                        .join("/");
                    if key.starts_with(prefix) {
                        keys.push(key);
                    }
                }
            }
        }
        keys.sort();
        Ok(keys)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn stage_list_and_delete() {
        let root = tempfile::tempdir().unwrap();
        let scratch = tempfile::tempdir().unwrap();
        let src = scratch.path().join("seg.pdf");
        tokio::fs::write(&src, b"%PDF-1.7").await.unwrap();

        let store = LocalObjectStore::new(root.path());
        let uri = store
            .upload(&src, "tmp_chunks/run1/a.pdf", "application/pdf")
            .await
            .unwrap();
        assert!(uri.starts_with("file://"));
        assert_eq!(store.list("tmp_chunks/run1").await.unwrap(), vec!["tmp_chunks/run1/a.pdf"]);
        assert!(store.list("other").await.unwrap().is_empty());

        store.delete("tmp_chunks/run1/a.pdf").await.unwrap();
        assert!(store.list("tmp_chunks").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn deletes_do_not_break_concurrent_uploads() {
        let root = tempfile::tempdir().unwrap();
        let scratch = tempfile::tempdir().unwrap();
        let src = scratch.path().join("seg.pdf");
        tokio::fs::write(&src, b"%PDF-1.7").await.unwrap();
        let store = LocalObjectStore::new(root.path());

        // each task stages then deletes under the same prefix, so one
        // task's delete can empty the directory another is writing into
        let tasks = (0..64).map(|i| {
            let store = store.clone();
            let src = src.clone();
            tokio::spawn(async move {
                let key = format!("tmp_chunks/run1/{i}.pdf");
                store.upload(&src, &key, "application/pdf").await?;
                store.delete(&key).await
            })
        });
        for result in futures::future::join_all(tasks).await {
            result.unwrap().unwrap();
        }
        assert!(store.list("tmp_chunks").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn upload_of_missing_source_names_the_source() {
        let root = tempfile::tempdir().unwrap();
        let store = LocalObjectStore::new(root.path());
        let missing = root.path().join("gone.pdf");
        let err = store
            .upload(&missing, "tmp_chunks/run1/a.pdf", "application/pdf")
            .await
            .unwrap_err();
        match err {
            StorageError::NotFound { uri } => assert!(uri.ends_with("gone.pdf"), "{uri}"),
            other => panic!("expected NotFound, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn delete_missing_is_ok() {
        let root = tempfile::tempdir().unwrap();
        let store = LocalObjectStore::new(root.path());
        store.delete("nope/missing.pdf").await.unwrap();
    }

    #[tokio::test]
    async fn download_missing_is_not_found() {
        let root = tempfile::tempdir().unwrap();
        let store = LocalObjectStore::new(root.path());
        let err = store
            .download("inputs/missing.pdf", &root.path().join("out.pdf"))
            .await
            .unwrap_err();
        assert!(matches!(err, StorageError::NotFound { .. }));
    }

    #[tokio::test]
    async fn download_by_file_url() {
        let root = tempfile::tempdir().unwrap();
        let src = root.path().join("in.mp3");
        tokio::fs::write(&src, b"ID3").await.unwrap();
        let store = LocalObjectStore::new(root.path());
        let dest = root.path().join("copy.mp3");
        store
            .download(&format!("file://{}", src.display()), &dest)
            .await
            .unwrap();
        assert_eq!(tokio::fs::read(&dest).await.unwrap(), b"ID3");
    }

    #[test]
    fn parent_components_rejected() {
        let store = LocalObjectStore::new("/tmp/x");
        assert!(store.key_path("../etc/passwd").is_err());
        assert!(store.key_path("").is_err());
    }
}
