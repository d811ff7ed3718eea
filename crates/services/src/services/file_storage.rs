//! Blob storage on the local filesystem, addressed by `{owner}/{token}_{name}` keys.

use std::{
    io::ErrorKind,
    path::{Component, Path, PathBuf},
};

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info};
use ts_rs::TS;
use utils::text::{random_token, sanitize_filename};
use uuid::Uuid;

#[derive(Debug, Error)]
pub enum FileStorageError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("invalid storage path: {0}")]
    InvalidPath(String),
    #[error("file not found: {0}")]
    NotFound(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
pub struct StoredFile {
    /// Storage key, relative to the storage root
    pub path: String,
    pub file_name: String,
    pub size: u64,
    pub mime_type: Option<String>,
}

#[derive(Debug, Clone)]
pub struct FileStorage {
    root: PathBuf,
    public_base_url: String,
}

impl FileStorage {
    pub fn new(root: impl Into<PathBuf>, public_base_url: impl Into<String>) -> Self {
        Self {
            root: root.into(),
            public_base_url: public_base_url.into().trim_end_matches('/').to_string(),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub async fn ensure_root(&self) -> Result<(), FileStorageError> {
        tokio::fs::create_dir_all(&self.root).await?;
        Ok(())
    }

    /// Store `bytes` under a fresh key for `owner`.
    pub async fn upload(
        &self,
        owner: Uuid,
        file_name: &str,
        bytes: &[u8],
    ) -> Result<StoredFile, FileStorageError> {
        let safe_name = sanitize_filename(file_name);
        let key = format!("{owner}/{}_{safe_name}", random_token());
        let target = self.resolve(&key)?;
        if let Some(parent) = target.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::write(&target, bytes).await?;

        info!(owner = %owner, path = %key, size = bytes.len(), "Stored file");
        Ok(StoredFile {
            path: key,
            file_name: file_name.to_string(),
            size: bytes.len() as u64,
            mime_type: guess_mime(file_name),
        })
    }

    pub async fn download(&self, key: &str) -> Result<Vec<u8>, FileStorageError> {
        let target = self.resolve(key)?;
        tokio::fs::read(&target).await.map_err(|e| match e.kind() {
            ErrorKind::NotFound => FileStorageError::NotFound(key.to_string()),
            _ => FileStorageError::Io(e),
        })
    }

    /// Deleting a missing file is not an error.
    pub async fn delete(&self, key: &str) -> Result<(), FileStorageError> {
        let target = self.resolve(key)?;
        match tokio::fs::remove_file(&target).await {
            Ok(()) => {
                debug!(path = %key, "Deleted file");
                Ok(())
            }
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    pub fn public_url(&self, key: &str) -> String {
        format!("{}/api/files/{}", self.public_base_url, key)
    }

    fn resolve(&self, key: &str) -> Result<PathBuf, FileStorageError> {
        let path = Path::new(key);
        let only_normal = path
            .components()
            .all(|component| matches!(component, Component::Normal(_)));
        if key.is_empty() || !only_normal {
            return Err(FileStorageError::InvalidPath(key.to_string()));
        }
        Ok(self.root.join(path))
    }
}

pub fn guess_mime(file_name: &str) -> Option<String> {
    mime_guess::from_path(file_name)
        .first()
        .map(|mime| mime.essence_str().to_string())
}
