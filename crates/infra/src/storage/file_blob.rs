//! File-backed [`BlobStorage`]
//!
//! Writes go to a sibling `.tmp` file which is synced and then renamed over
//! the target, so readers only ever see a complete blob. On unix the file is
//! created with mode `0600`.

use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tokenlink_core::ports::BlobStorage;
use tokenlink_core::OAuthResult;
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tracing::{debug, instrument};

use crate::errors::InfraError;

#[derive(Debug, Clone)]
pub struct FileBlobStorage {
    path: PathBuf,
}

impl FileBlobStorage {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn temp_path(&self) -> PathBuf {
        let mut name = self.path.file_name().map(|n| n.to_os_string()).unwrap_or_default();
        name.push(".tmp");
        self.path.with_file_name(name)
    }
}

#[async_trait]
impl BlobStorage for FileBlobStorage {
    async fn read(&self) -> OAuthResult<Option<Vec<u8>>> {
        match fs::read(&self.path).await {
            Ok(bytes) => Ok(Some(bytes)),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(InfraError::from(e).into()),
        }
    }

    #[instrument(skip(self, bytes), fields(path = %self.path.display(), len = bytes.len()))]
    async fn write(&self, bytes: &[u8]) -> OAuthResult<()> {
        let temp_path = self.temp_path();

        if let Some(parent) = temp_path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).await.map_err(InfraError::from)?;
        }

        let mut options = fs::OpenOptions::new();
        options.write(true).create(true).truncate(true);
        #[cfg(unix)]
        options.mode(0o600);

        let mut file = options.open(&temp_path).await.map_err(InfraError::from)?;
        file.write_all(bytes).await.map_err(InfraError::from)?;
        file.sync_all().await.map_err(InfraError::from)?;
        drop(file);

        fs::rename(&temp_path, &self.path).await.map_err(InfraError::from)?;
        debug!("Token blob written");
        Ok(())
    }

    async fn delete(&self) -> OAuthResult<()> {
        match fs::remove_file(&self.path).await {
            Ok(()) => {
                debug!(path = %self.path.display(), "Token blob deleted");
                Ok(())
            }
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(InfraError::from(e).into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use tempfile::TempDir;

    use super::*;

    #[tokio::test]
    async fn test_write_read_delete() {
        let dir = TempDir::new().expect("tempdir");
        let storage = FileBlobStorage::new(dir.path().join("nested/tokens.json"));

        assert_eq!(storage.read().await.expect("read"), None);
        storage.delete().await.expect("deleting nothing is fine");

        storage.write(b"first").await.expect("write");
        storage.write(b"second").await.expect("overwrite");
        assert_eq!(storage.read().await.expect("read"), Some(b"second".to_vec()));
        assert!(!storage.temp_path().exists(), "temp file is renamed away");

        storage.delete().await.expect("delete");
        assert_eq!(storage.read().await.expect("read"), None);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_file_is_owner_only() {
        use std::os::unix::fs::PermissionsExt;

        let dir = TempDir::new().expect("tempdir");
        let storage = FileBlobStorage::new(dir.path().join("tokens.json"));
        storage.write(b"{}").await.expect("write");

        let mode = std::fs::metadata(storage.path()).expect("metadata").permissions().mode();
        assert_eq!(mode & 0o777, 0o600);
    }

    #[tokio::test]
    async fn test_unreadable_path_is_storage_error() {
        let dir = TempDir::new().expect("tempdir");
        // A directory where the file should be
        let storage = FileBlobStorage::new(dir.path());
        let err = storage.read().await.expect_err("directory is not a blob");
        assert!(matches!(err, tokenlink_core::OAuthError::Storage { .. }), "{err:?}");
    }
}
