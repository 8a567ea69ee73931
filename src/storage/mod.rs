//! Object-store adapters.
//!
//! The pipeline needs four operations from remote storage: fetch the artifact,
//! stage a segment where the inference service can read it, delete the staged
//! copy, and list what is left under a prefix. [`ObjectStore`] is that seam;
//! [`GcsObjectStore`] talks to Google Cloud Storage and [`LocalObjectStore`]
//! keeps everything in a directory for local runs and tests.

pub mod gcs;
pub mod local;

pub use gcs::GcsObjectStore;
pub use local::LocalObjectStore;

use crate::error::StorageError;
use async_trait::async_trait;
use std::path::Path;

/// Remote storage used for artifact download and segment staging.
///
/// `key`s are object names inside the store's own staging bucket/root;
/// `uri`s are fully qualified locations (`gs://bucket/name`, `file:///…`).
#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// Download the object at `uri` to the local file `dest`.
    async fn download(&self, uri: &str, dest: &Path) -> Result<(), StorageError>;

    /// Upload `src` under `key` and return the URI the inference service
    /// should be given.
    async fn upload(&self, src: &Path, key: &str, content_type: &str) -> Result<String, StorageError>;

    /// Delete the object at `key`. A missing object is not an error.
    async fn delete(&self, key: &str) -> Result<(), StorageError>;

    /// Keys of every object whose name starts with `prefix`.
    async fn list(&self, prefix: &str) -> Result<Vec<String>, StorageError>;
}

/// A `gs://bucket/object` location split into its parts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GcsUri {
    pub bucket: String,
    pub object: String,
}

impl GcsUri {
    pub fn parse(uri: &str) -> Result<Self, StorageError> {
        let invalid = |reason: &str| StorageError::InvalidUri {
            uri: uri.to_string(),
            reason: reason.to_string(),
        };
        let rest = uri
            .strip_prefix("gs://")
            .ok_or_else(|| invalid("expected a gs:// URI"))?;
        let (bucket, object) = rest
            .split_once('/')
            .ok_or_else(|| invalid("missing object name"))?;
        if bucket.is_empty() || object.is_empty() {
            return Err(invalid("bucket and object must be non-empty"));
        }
        Ok(Self {
            bucket: bucket.to_string(),
            object: object.to_string(),
        })
    }
}

impl std::fmt::Display for GcsUri {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "gs://{}/{}", self.bucket, self.object)
    }
}
