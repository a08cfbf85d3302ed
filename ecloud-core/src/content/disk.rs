//! Directory-backed content store
//!
//! One file per content key. The file name is the SHA-256 of the key, fanned
//! out over 256 subdirectories like a git object store.

use async_trait::async_trait;
use bytes::Bytes;
use sha2::{Digest, Sha256};
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use super::{verify_content, ByteRange, ContentKey, ContentStore, PutResult};
use crate::error::{Result, StoreError};

pub struct DiskContentStore {
    root: PathBuf,
}

impl DiskContentStore {
    /// Open (creating if needed) a store rooted at `root`
    pub fn open(root: &Path) -> Result<Self> {
        std::fs::create_dir_all(root)?;
        Ok(Self {
            root: root.to_path_buf(),
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn blob_path(&self, key: &ContentKey) -> PathBuf {
        let hex = hex::encode(Sha256::digest(key.to_storage_key().as_bytes()));
        self.root.join(&hex[..2]).join(&hex[2..])
    }

    /// Write through a unique temp file so readers never see partial content
    async fn write_atomic(&self, path: &Path, data: &[u8]) -> Result<()> {
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        let tmp_path = path.with_extension(format!("{}.tmp", uuid::Uuid::new_v4()));
        tokio::fs::write(&tmp_path, data).await?;
        if let Err(e) = tokio::fs::rename(&tmp_path, path).await {
            let _ = tokio::fs::remove_file(&tmp_path).await;
            return Err(e.into());
        }
        Ok(())
    }

    async fn read(&self, key: &ContentKey) -> Result<Bytes> {
        match tokio::fs::read(self.blob_path(key)).await {
            Ok(data) => Ok(Bytes::from(data)),
            Err(e) if e.kind() == ErrorKind::NotFound => Err(StoreError::FileNotFound(key.to_string())),
            Err(e) => Err(e.into()),
        }
    }
}

#[async_trait]
impl ContentStore for DiskContentStore {
    async fn put(&self, key: &ContentKey, data: Bytes, declared_md5: Option<&str>) -> Result<PutResult> {
        let result = verify_content(&data, declared_md5)?;
        self.write_atomic(&self.blob_path(key), &data).await?;
        tracing::debug!("Stored {} bytes at {}", result.content_length, key);
        Ok(result)
    }

    async fn get(&self, key: &ContentKey, range: ByteRange) -> Result<Bytes> {
        let data = self.read(key).await?;
        range.slice(&data)
    }

    async fn exists(&self, key: &ContentKey) -> Result<bool> {
        Ok(tokio::fs::try_exists(self.blob_path(key)).await?)
    }

    async fn copy(&self, src: &ContentKey, dst: &ContentKey) -> Result<()> {
        let data = self.read(src).await?;
        self.write_atomic(&self.blob_path(dst), &data).await
    }

    async fn rename(&self, src: &ContentKey, dst: &ContentKey) -> Result<()> {
        let dst_path = self.blob_path(dst);
        if let Some(parent) = dst_path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        match tokio::fs::rename(self.blob_path(src), &dst_path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::NotFound => Err(StoreError::FileNotFound(src.to_string())),
            Err(e) => Err(e.into()),
        }
    }

    async fn delete(&self, key: &ContentKey) -> Result<()> {
        match tokio::fs::remove_file(self.blob_path(key)).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn key(file: &str) -> ContentKey {
        ContentKey::new("R1", "edm", "v1", file)
    }

    #[tokio::test]
    async fn test_disk_roundtrip() {
        let temp_dir = TempDir::new().unwrap();
        let store = DiskContentStore::open(temp_dir.path()).unwrap();

        let data = Bytes::from_static(b"Hello, disk!");
        store.put(&key("a.txt"), data.clone(), None).await.unwrap();
        assert!(store.exists(&key("a.txt")).await.unwrap());
        assert_eq!(store.get(&key("a.txt"), ByteRange::full()).await.unwrap(), data);
        assert_eq!(
            store.get(&key("a.txt"), ByteRange::new(7, 10).unwrap()).await.unwrap(),
            Bytes::from_static(b"disk")
        );
    }

    #[tokio::test]
    async fn test_disk_survives_reopen() {
        let temp_dir = TempDir::new().unwrap();
        {
            let store = DiskContentStore::open(temp_dir.path()).unwrap();
            store.put(&key("a.txt"), Bytes::from_static(b"kept"), None).await.unwrap();
        }
        let store = DiskContentStore::open(temp_dir.path()).unwrap();
        assert_eq!(
            store.get(&key("a.txt"), ByteRange::full()).await.unwrap(),
            Bytes::from_static(b"kept")
        );
    }

    #[tokio::test]
    async fn test_disk_rename_and_delete() {
        let temp_dir = TempDir::new().unwrap();
        let store = DiskContentStore::open(temp_dir.path()).unwrap();

        store.put(&key("staged"), Bytes::from_static(b"x"), None).await.unwrap();
        store.rename(&key("staged"), &key("final")).await.unwrap();
        assert!(!store.exists(&key("staged")).await.unwrap());
        assert!(store.exists(&key("final")).await.unwrap());

        store.delete(&key("final")).await.unwrap();
        store.delete(&key("final")).await.unwrap();
        assert!(matches!(
            store.get(&key("final"), ByteRange::full()).await,
            Err(StoreError::FileNotFound(_))
        ));
        assert!(matches!(
            store.rename(&key("missing"), &key("other")).await,
            Err(StoreError::FileNotFound(_))
        ));
    }
}
