//! Filesystem blob store. Paths are relative to a root directory and may not
//! leave it.

use std::path::{Component, Path, PathBuf};

use async_trait::async_trait;

use crate::error::StoreError;
use crate::traits::BlobStore;

#[derive(Debug, Clone)]
pub struct FsBlobStore {
    root: PathBuf,
}

impl FsBlobStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn resolve(&self, path: &str) -> Result<PathBuf, StoreError> {
        let relative = Path::new(path);
        let clean = !path.is_empty()
            && relative.components().all(|c| matches!(c, Component::Normal(_)));
        if !clean {
            return Err(StoreError::InvalidPath(path.to_string()));
        }
        Ok(self.root.join(relative))
    }
}

#[async_trait]
impl BlobStore for FsBlobStore {
    async fn put(&self, path: &str, bytes: &[u8], mime_type: &str) -> Result<(), StoreError> {
        let target = self.resolve(path)?;
        if let Some(parent) = target.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::write(&target, bytes).await?;
        tracing::debug!(path, mime_type, len = bytes.len(), "blob stored");
        Ok(())
    }

    async fn get(&self, path: &str) -> Result<Option<Vec<u8>>, StoreError> {
        let target = self.resolve(path)?;
        match tokio::fs::read(&target).await {
            Ok(bytes) => Ok(Some(bytes)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    async fn delete(&self, path: &str) -> Result<bool, StoreError> {
        let target = self.resolve(path)?;
        match tokio::fs::remove_file(&target).await {
            Ok(()) => {
                tracing::debug!(path, "blob removed");
                Ok(true)
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(e.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn put_then_get() {
        let dir = tempfile::tempdir().unwrap();
        let store = FsBlobStore::new(dir.path());
        store.put("alice/abc.bin", b"cipher", "image/jpeg").await.unwrap();
        assert_eq!(store.get("alice/abc.bin").await.unwrap().unwrap(), b"cipher");
        assert!(store.get("alice/missing.bin").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn delete_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let store = FsBlobStore::new(dir.path());
        store.put("alice/abc.bin", b"cipher", "image/jpeg").await.unwrap();
        assert!(store.delete("alice/abc.bin").await.unwrap());
        assert!(!store.delete("alice/abc.bin").await.unwrap());
        assert!(store.get("alice/abc.bin").await.unwrap().is_none());
        assert!(matches!(store.delete("../abc.bin").await, Err(StoreError::InvalidPath(_))));
    }

    #[tokio::test]
    async fn rejects_escaping_paths() {
        let dir = tempfile::tempdir().unwrap();
        let store = FsBlobStore::new(dir.path());
        for bad in ["", "../x", "/etc/passwd", "a/../../b", "./a"] {
            assert!(
                matches!(store.put(bad, b"x", "video/mp4").await, Err(StoreError::InvalidPath(_))),
                "{bad} accepted"
            );
        }
    }
}
