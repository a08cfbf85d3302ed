//! Content storage
//!
//! Bytes of every file live in a [`ContentStore`], keyed by
//! `(cloud id, representation name, version content id, file name)`.
//! Metadata about the bytes (hash, length, mime type) lives in the
//! record store; the content store only computes and verifies it.

use async_trait::async_trait;
use bytes::Bytes;
use std::fmt;
use std::sync::Arc;

use crate::error::{Result, StoreError};
use crate::model::{Representation, StorageBackend};

pub mod disk;
pub mod memory;
pub mod sqlite;

pub use disk::DiskContentStore;
pub use memory::InMemoryContentStore;
pub use sqlite::SqliteContentStore;

/// Address of one content blob
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ContentKey {
    pub cloud_id: String,
    pub representation_name: String,
    pub version: String,
    pub file_name: String,
}

impl ContentKey {
    pub fn new(
        cloud_id: impl Into<String>,
        representation_name: impl Into<String>,
        version: impl Into<String>,
        file_name: impl Into<String>,
    ) -> Self {
        Self {
            cloud_id: cloud_id.into(),
            representation_name: representation_name.into(),
            version: version.into(),
            file_name: file_name.into(),
        }
    }

    /// Key of `file_name` inside the given version
    pub fn for_file(rep: &Representation, file_name: &str) -> Self {
        Self::new(
            rep.cloud_id.clone(),
            rep.representation_name.clone(),
            rep.content_id.to_string(),
            file_name,
        )
    }

    /// Flat string form, unique per key
    pub fn to_storage_key(&self) -> String {
        format!(
            "{}\n{}\n{}\n{}",
            self.cloud_id, self.representation_name, self.version, self.file_name
        )
    }
}

impl fmt::Display for ContentKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}/{}/{}/{}",
            self.cloud_id, self.representation_name, self.version, self.file_name
        )
    }
}

/// Hash and length computed while storing content
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PutResult {
    pub md5: String,
    pub content_length: u64,
}

/// Inclusive byte range. `None` bounds are open.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ByteRange {
    pub start: Option<u64>,
    pub end: Option<u64>,
}

lazy_static::lazy_static! {
    static ref RANGE_HEADER: regex::Regex =
        regex::Regex::new(r"^bytes=(?P<start>\d+)-(?P<end>\d*)$").expect("valid range regex");
}

impl ByteRange {
    /// The whole content
    pub fn full() -> Self {
        Self::default()
    }

    /// Everything from `start` to the end
    pub fn from(start: u64) -> Self {
        Self { start: Some(start), end: None }
    }

    pub fn new(start: u64, end: u64) -> Result<Self> {
        if end < start {
            return Err(StoreError::InvalidArgument(format!(
                "Range end {} is smaller than range start {}",
                end, start
            )));
        }
        Ok(Self { start: Some(start), end: Some(end) })
    }

    /// Parse an HTTP `Range` header of the form `bytes=S-E` or `bytes=S-`
    pub fn parse(header: &str) -> Result<Self> {
        let caps = RANGE_HEADER.captures(header.trim()).ok_or_else(|| {
            StoreError::InvalidArgument(format!(
                "Expected range header format is bytes=<start>-[<end>], got {:?}",
                header
            ))
        })?;
        let start: u64 = caps["start"]
            .parse()
            .map_err(|e| StoreError::InvalidArgument(format!("Cannot parse range: {}", e)))?;
        match &caps["end"] {
            "" => Ok(Self::from(start)),
            end => {
                let end: u64 = end
                    .parse()
                    .map_err(|e| StoreError::InvalidArgument(format!("Cannot parse range: {}", e)))?;
                Self::new(start, end)
            }
        }
    }

    pub fn is_full(&self) -> bool {
        self.start.is_none() && self.end.is_none()
    }

    /// Cut `data` down to this range
    pub fn slice(&self, data: &Bytes) -> Result<Bytes> {
        let length = data.len() as u64;
        if let Some(start) = self.start {
            if start >= length {
                return Err(StoreError::UnsatisfiableRange { start, length });
            }
        }
        if length == 0 {
            return Ok(Bytes::new());
        }
        let start = self.start.unwrap_or(0);
        let end = self.end.map(|e| e.min(length - 1)).unwrap_or(length - 1);
        if end < start {
            return Err(StoreError::InvalidArgument(format!(
                "Range end {} is smaller than range start {}",
                end, start
            )));
        }
        Ok(data.slice(start as usize..=end as usize))
    }
}

/// Lowercase hex MD5 of `data`
pub fn md5_hex(data: &[u8]) -> String {
    format!("{:x}", md5::compute(data))
}

/// Hash `data` and check it against the hash the caller declared
pub(crate) fn verify_content(data: &[u8], declared_md5: Option<&str>) -> Result<PutResult> {
    let md5 = md5_hex(data);
    if let Some(declared) = declared_md5 {
        if !declared.eq_ignore_ascii_case(&md5) {
            return Err(StoreError::ContentHashMismatch {
                declared: declared.to_string(),
                computed: md5,
            });
        }
    }
    Ok(PutResult {
        md5,
        content_length: data.len() as u64,
    })
}

/// Generic content store interface
///
/// All backends must implement this trait
#[async_trait]
pub trait ContentStore: Send + Sync {
    /// Store bytes under `key`. On a hash mismatch nothing is written.
    async fn put(&self, key: &ContentKey, data: Bytes, declared_md5: Option<&str>) -> Result<PutResult>;

    /// Read (part of) the bytes under `key`
    async fn get(&self, key: &ContentKey, range: ByteRange) -> Result<Bytes>;

    /// Check if content exists
    async fn exists(&self, key: &ContentKey) -> Result<bool>;

    /// Duplicate bytes to another key without re-hashing
    async fn copy(&self, src: &ContentKey, dst: &ContentKey) -> Result<()>;

    /// Move bytes to another key, replacing whatever was there
    async fn rename(&self, src: &ContentKey, dst: &ContentKey) -> Result<()>;

    /// Delete content. Deleting a missing key is not an error.
    async fn delete(&self, key: &ContentKey) -> Result<()>;
}

/// Picks the content store for a file's storage backend
#[derive(Clone)]
pub struct ContentRouter {
    object: Arc<dyn ContentStore>,
    database: Arc<dyn ContentStore>,
}

impl ContentRouter {
    pub fn new(object: Arc<dyn ContentStore>, database: Arc<dyn ContentStore>) -> Self {
        Self { object, database }
    }

    /// Both backends held in memory
    pub fn in_memory() -> Self {
        Self::new(
            Arc::new(InMemoryContentStore::new()),
            Arc::new(InMemoryContentStore::new()),
        )
    }

    pub fn store(&self, backend: StorageBackend) -> &Arc<dyn ContentStore> {
        match backend {
            StorageBackend::Object => &self.object,
            StorageBackend::Database => &self.database,
        }
    }
}
