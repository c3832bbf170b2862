//! Collaborators the engine consumes: a key/value object store for workbook
//! blobs and the contributor directory.

use std::collections::HashMap;
use std::io::Write;
use std::path::{Component, Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use serde::Deserialize;
use tempfile::NamedTempFile;
use thiserror::Error;
use tracing::debug;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StorageError {
    #[error("storage bucket '{0}' is not provisioned")]
    BucketMissing(String),
    #[error("{0}")]
    Transport(String),
}

impl From<std::io::Error> for StorageError {
    fn from(e: std::io::Error) -> StorageError {
        StorageError::Transport(e.to_string())
    }
}

/// Blob storage keyed by path-like strings. `store` is an upsert: the last
/// writer wins.
#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// `Ok(None)` when the bucket exists but holds nothing under `key`.
    async fn fetch(&self, key: &str) -> Result<Option<Vec<u8>>, StorageError>;

    async fn store(&self, key: &str, bytes: Vec<u8>, content_type: &str)
    -> Result<(), StorageError>;
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct Contributor {
    pub id: String,
    #[serde(alias = "name")]
    pub display_name: String,
}

impl Contributor {
    pub fn new(id: impl Into<String>, display_name: impl Into<String>) -> Self {
        Contributor {
            id: id.into(),
            display_name: display_name.into(),
        }
    }
}

#[async_trait]
pub trait ContributorDirectory: Send + Sync {
    async fn list_contributors(&self) -> Result<Vec<Contributor>, StorageError>;
}

#[async_trait]
impl<T: ObjectStore + ?Sized> ObjectStore for Arc<T> {
    async fn fetch(&self, key: &str) -> Result<Option<Vec<u8>>, StorageError> {
        (**self).fetch(key).await
    }

    async fn store(
        &self,
        key: &str,
        bytes: Vec<u8>,
        content_type: &str,
    ) -> Result<(), StorageError> {
        (**self).store(key, bytes, content_type).await
    }
}

#[async_trait]
impl<T: ContributorDirectory + ?Sized> ContributorDirectory for Arc<T> {
    async fn list_contributors(&self) -> Result<Vec<Contributor>, StorageError> {
        (**self).list_contributors().await
    }
}

/// In-process store. An unprovisioned store behaves like a missing bucket.
#[derive(Debug)]
pub struct MemoryObjectStore {
    bucket: String,
    provisioned: bool,
    objects: Mutex<HashMap<String, Vec<u8>>>,
}

impl MemoryObjectStore {
    pub fn new(bucket: &str) -> Self {
        MemoryObjectStore {
            bucket: bucket.to_string(),
            provisioned: true,
            objects: Mutex::new(HashMap::new()),
        }
    }

    pub fn unprovisioned(bucket: &str) -> Self {
        MemoryObjectStore {
            provisioned: false,
            ..MemoryObjectStore::new(bucket)
        }
    }

    pub fn get(&self, key: &str) -> Option<Vec<u8>> {
        self.objects.lock().get(key).cloned()
    }

    pub fn keys(&self) -> Vec<String> {
        let mut keys: Vec<String> = self.objects.lock().keys().cloned().collect();
        keys.sort();
        keys
    }

    fn check_bucket(&self) -> Result<(), StorageError> {
        if self.provisioned {
            Ok(())
        } else {
            Err(StorageError::BucketMissing(self.bucket.clone()))
        }
    }
}

#[async_trait]
impl ObjectStore for MemoryObjectStore {
    async fn fetch(&self, key: &str) -> Result<Option<Vec<u8>>, StorageError> {
        self.check_bucket()?;
        Ok(self.get(key))
    }

    async fn store(
        &self,
        key: &str,
        bytes: Vec<u8>,
        _content_type: &str,
    ) -> Result<(), StorageError> {
        self.check_bucket()?;
        self.objects.lock().insert(key.to_string(), bytes);
        Ok(())
    }
}

/// A directory used as a bucket. Keys map to relative paths below it; writes
/// go through a temp file in the target directory and are renamed into place.
#[derive(Debug, Clone)]
pub struct FsObjectStore {
    root: PathBuf,
}

impl FsObjectStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        FsObjectStore { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn path_for(&self, key: &str) -> Result<PathBuf, StorageError> {
        let rel = Path::new(key);
        if key.is_empty() || !rel.components().all(|c| matches!(c, Component::Normal(_))) {
            return Err(StorageError::Transport(format!("invalid object key '{key}'")));
        }
        Ok(self.root.join(rel))
    }

    async fn check_bucket(&self) -> Result<(), StorageError> {
        match tokio::fs::metadata(&self.root).await {
            Ok(meta) if meta.is_dir() => Ok(()),
            _ => Err(StorageError::BucketMissing(self.root.display().to_string())),
        }
    }
}

#[async_trait]
impl ObjectStore for FsObjectStore {
    async fn fetch(&self, key: &str) -> Result<Option<Vec<u8>>, StorageError> {
        self.check_bucket().await?;
        let path = self.path_for(key)?;
        match tokio::fs::read(&path).await {
            Ok(bytes) => Ok(Some(bytes)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    async fn store(
        &self,
        key: &str,
        bytes: Vec<u8>,
        _content_type: &str,
    ) -> Result<(), StorageError> {
        self.check_bucket().await?;
        let path = self.path_for(key)?;
        let dir = path
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_else(|| self.root.clone());
        tokio::fs::create_dir_all(&dir).await?;

        let len = bytes.len();
        tokio::task::spawn_blocking(move || -> Result<(), StorageError> {
            let mut temp = NamedTempFile::new_in(&dir)?;
            temp.write_all(&bytes)?;
            temp.as_file().sync_all()?;
            temp.persist(&path).map_err(|e| StorageError::from(e.error))?;
            Ok(())
        })
        .await
        .map_err(|e| StorageError::Transport(e.to_string()))??;

        debug!(key, bytes = len, "stored object");
        Ok(())
    }
}

/// A fixed contributor list.
#[derive(Debug, Clone, Default)]
pub struct StaticDirectory {
    contributors: Vec<Contributor>,
}

impl StaticDirectory {
    pub fn new(contributors: Vec<Contributor>) -> Self {
        StaticDirectory { contributors }
    }
}

#[async_trait]
impl ContributorDirectory for StaticDirectory {
    async fn list_contributors(&self) -> Result<Vec<Contributor>, StorageError> {
        Ok(self.contributors.clone())
    }
}
