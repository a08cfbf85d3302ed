//! In-memory content store

use async_trait::async_trait;
use bytes::Bytes;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

use super::{verify_content, ByteRange, ContentKey, ContentStore, PutResult};
use crate::error::{Result, StoreError};

/// Content held in a process-local map
#[derive(Default)]
pub struct InMemoryContentStore {
    blobs: Arc<RwLock<HashMap<ContentKey, Bytes>>>,
}

impl InMemoryContentStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored blobs
    pub async fn len(&self) -> usize {
        self.blobs.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.blobs.read().await.is_empty()
    }
}

#[async_trait]
impl ContentStore for InMemoryContentStore {
    async fn put(&self, key: &ContentKey, data: Bytes, declared_md5: Option<&str>) -> Result<PutResult> {
        let result = verify_content(&data, declared_md5)?;
        self.blobs.write().await.insert(key.clone(), data);
        Ok(result)
    }

    async fn get(&self, key: &ContentKey, range: ByteRange) -> Result<Bytes> {
        let blobs = self.blobs.read().await;
        let data = blobs
            .get(key)
            .ok_or_else(|| StoreError::FileNotFound(key.to_string()))?;
        range.slice(data)
    }

    async fn exists(&self, key: &ContentKey) -> Result<bool> {
        Ok(self.blobs.read().await.contains_key(key))
    }

    async fn copy(&self, src: &ContentKey, dst: &ContentKey) -> Result<()> {
        let mut blobs = self.blobs.write().await;
        let data = blobs
            .get(src)
            .cloned()
            .ok_or_else(|| StoreError::FileNotFound(src.to_string()))?;
        blobs.insert(dst.clone(), data);
        Ok(())
    }

    async fn rename(&self, src: &ContentKey, dst: &ContentKey) -> Result<()> {
        let mut blobs = self.blobs.write().await;
        let data = blobs
            .remove(src)
            .ok_or_else(|| StoreError::FileNotFound(src.to_string()))?;
        blobs.insert(dst.clone(), data);
        Ok(())
    }

    async fn delete(&self, key: &ContentKey) -> Result<()> {
        self.blobs.write().await.remove(key);
        Ok(())
    }
}
