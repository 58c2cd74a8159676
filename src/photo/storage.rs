//! Flat keyed blob store for photo artifacts.

use std::collections::HashMap;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use async_trait::async_trait;
use thiserror::Error;
use tracing::{debug, info};
use uuid::Uuid;

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("invalid storage key: {0:?}")]
    InvalidKey(String),

    #[error("no artifact stored under {0:?}")]
    NotFound(String),

    #[error("stored artifact {key:?} has {actual} bytes, expected {expected}")]
    SizeMismatch {
        key: String,
        expected: u64,
        actual: u64,
    },

    #[error("storage I/O failed for {key:?}")]
    Io {
        key: String,
        #[source]
        source: std::io::Error,
    },
}

#[async_trait]
pub trait PhotoStore: Send + Sync {
    /// Prepares the backend. Idempotent; called once at startup.
    async fn ensure_ready(&self) -> Result<(), StorageError>;

    /// Stores `bytes` under `key`, replacing any previous artifact.
    async fn put(&self, key: &str, bytes: &[u8]) -> Result<(), StorageError>;

    async fn exists(&self, key: &str) -> Result<bool, StorageError>;

    async fn size(&self, key: &str) -> Result<u64, StorageError>;

    async fn read(&self, key: &str) -> Result<Vec<u8>, StorageError>;
}

/// Keys are single flat file names: ASCII alphanumerics, `_`, `-` and `.`,
/// not starting with a dot.
pub fn validate_key(key: &str) -> Result<(), StorageError> {
    let allowed = |c: char| c.is_ascii_alphanumeric() || matches!(c, '_' | '-' | '.');
    if key.is_empty() || key.len() > 200 || key.starts_with('.') || !key.chars().all(allowed) {
        return Err(StorageError::InvalidKey(key.to_string()));
    }
    Ok(())
}

/* =========================
Filesystem backend
========================= */
#[derive(Debug, Clone)]
pub struct FsPhotoStore {
    root: PathBuf,
}

impl FsPhotoStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn path_for(&self, key: &str) -> Result<PathBuf, StorageError> {
        validate_key(key)?;
        Ok(self.root.join(key))
    }
}

fn io_error(key: &str, source: std::io::Error) -> StorageError {
    if source.kind() == ErrorKind::NotFound {
        StorageError::NotFound(key.to_string())
    } else {
        StorageError::Io {
            key: key.to_string(),
            source,
        }
    }
}

#[async_trait]
impl PhotoStore for FsPhotoStore {
    async fn ensure_ready(&self) -> Result<(), StorageError> {
        tokio::fs::create_dir_all(&self.root)
            .await
            .map_err(|source| StorageError::Io {
                key: self.root.display().to_string(),
                source,
            })?;
        info!(root = %self.root.display(), "Photo store ready");
        Ok(())
    }

    async fn put(&self, key: &str, bytes: &[u8]) -> Result<(), StorageError> {
        let path = self.path_for(key)?;
        // write-then-rename so readers never observe a partial file
        let staging = self.root.join(format!(".{}.{}.part", key, Uuid::new_v4()));

        if let Err(source) = tokio::fs::write(&staging, bytes).await {
            return Err(StorageError::Io {
                key: key.to_string(),
                source,
            });
        }
        if let Err(source) = tokio::fs::rename(&staging, &path).await {
            let _ = tokio::fs::remove_file(&staging).await;
            return Err(StorageError::Io {
                key: key.to_string(),
                source,
            });
        }

        debug!(key, size = bytes.len(), "Photo written");
        Ok(())
    }

    async fn exists(&self, key: &str) -> Result<bool, StorageError> {
        let path = self.path_for(key)?;
        tokio::fs::try_exists(&path)
            .await
            .map_err(|source| io_error(key, source))
    }

    async fn size(&self, key: &str) -> Result<u64, StorageError> {
        let path = self.path_for(key)?;
        let meta = tokio::fs::metadata(&path)
            .await
            .map_err(|source| io_error(key, source))?;
        Ok(meta.len())
    }

    async fn read(&self, key: &str) -> Result<Vec<u8>, StorageError> {
        let path = self.path_for(key)?;
        tokio::fs::read(&path)
            .await
            .map_err(|source| io_error(key, source))
    }
}

/* =========================
In-memory backend
========================= */
#[derive(Debug, Default)]
pub struct MemoryPhotoStore {
    blobs: Mutex<HashMap<String, Vec<u8>>>,
}

impl MemoryPhotoStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Sorted keys of every stored artifact.
    pub fn keys(&self) -> Vec<String> {
        let mut keys: Vec<String> = self.lock().keys().cloned().collect();
        keys.sort();
        keys
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<String, Vec<u8>>> {
        self.blobs.lock().unwrap_or_else(|p| p.into_inner())
    }
}

#[async_trait]
impl PhotoStore for MemoryPhotoStore {
    async fn ensure_ready(&self) -> Result<(), StorageError> {
        Ok(())
    }

    async fn put(&self, key: &str, bytes: &[u8]) -> Result<(), StorageError> {
        validate_key(key)?;
        self.lock().insert(key.to_string(), bytes.to_vec());
        Ok(())
    }

    async fn exists(&self, key: &str) -> Result<bool, StorageError> {
        validate_key(key)?;
        Ok(self.lock().contains_key(key))
    }

    async fn size(&self, key: &str) -> Result<u64, StorageError> {
        validate_key(key)?;
        self.lock()
            .get(key)
            .map(|b| b.len() as u64)
            .ok_or_else(|| StorageError::NotFound(key.to_string()))
    }

    async fn read(&self, key: &str) -> Result<Vec<u8>, StorageError> {
        validate_key(key)?;
        self.lock()
            .get(key)
            .cloned()
            .ok_or_else(|| StorageError::NotFound(key.to_string()))
    }
}
