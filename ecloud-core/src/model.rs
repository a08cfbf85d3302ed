//! Data model for records, representations, files, providers and data sets
//!
//! All of these are plain values. Stores hand out clones; mutation only
//! happens through store operations.

use crate::version::VersionId;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Where the bytes of a file live
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum StorageBackend {
    /// Blob/object storage (the default)
    #[default]
    Object,
    /// Database blob table, meant for small files
    Database,
}

impl fmt::Display for StorageBackend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StorageBackend::Object => f.write_str("OBJECT_STORAGE"),
            StorageBackend::Database => f.write_str("DATA_BASE"),
        }
    }
}

/// A named content unit inside one version
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct File {
    pub file_name: String,
    pub mime_type: String,
    /// Lowercase hex MD5 of the content
    pub md5: String,
    pub content_length: u64,
    /// Upload instant
    pub date: Option<DateTime<Utc>>,
    #[serde(default)]
    pub storage: StorageBackend,
}

impl File {
    pub fn new(file_name: impl Into<String>, mime_type: impl Into<String>) -> Self {
        Self {
            file_name: file_name.into(),
            mime_type: mime_type.into(),
            md5: String::new(),
            content_length: 0,
            date: None,
            storage: StorageBackend::default(),
        }
    }

    pub fn with_storage(mut self, storage: StorageBackend) -> Self {
        self.storage = storage;
        self
    }
}

/// One version of a representation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Representation {
    pub cloud_id: String,
    pub representation_name: String,
    pub version: VersionId,
    pub data_provider: String,
    pub files: Vec<File>,
    pub persistent: bool,
    pub creation_date: DateTime<Utc>,
    /// Keys this version's bytes in the content stores. Fixed at creation,
    /// unaffected by persist.
    pub content_id: Uuid,
    /// Processing marks. Not covered by the immutability of persisted versions.
    #[serde(default)]
    pub revisions: Vec<Revision>,
}

impl Representation {
    pub fn file(&self, file_name: &str) -> Option<&File> {
        self.files.iter().find(|f| f.file_name == file_name)
    }

    /// `cloud_id/name/version`, for log lines and error messages
    pub fn path(&self) -> String {
        format!("{}/{}/{}", self.cloud_id, self.representation_name, self.version)
    }
}

/// A named processing mark placed on a version by a provider
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Revision {
    pub revision_name: String,
    pub revision_provider_id: String,
    pub creation_timestamp: DateTime<Utc>,
    #[serde(default)]
    pub deleted: bool,
}

impl Revision {
    pub fn new(revision_name: impl Into<String>, revision_provider_id: impl Into<String>) -> Self {
        Self {
            revision_name: revision_name.into(),
            revision_provider_id: revision_provider_id.into(),
            creation_timestamp: Utc::now(),
            deleted: false,
        }
    }

    pub fn with_timestamp(mut self, creation_timestamp: DateTime<Utc>) -> Self {
        self.creation_timestamp = creation_timestamp;
        self
    }

    pub fn mark_deleted(mut self) -> Self {
        self.deleted = true;
        self
    }

    /// `provider_name`, the lookup key within one version
    pub fn key(&self) -> String {
        format!("{}_{}", self.revision_provider_id, self.revision_name)
    }

    pub fn same_mark(&self, other: &Revision) -> bool {
        self.revision_provider_id == other.revision_provider_id && self.revision_name == other.revision_name
    }
}

/// The version carrying a given revision, with its files
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RepresentationRevision {
    pub cloud_id: String,
    pub representation_name: String,
    pub version: VersionId,
    pub revision: Revision,
    pub files: Vec<File>,
}

/// A record and the latest version of each of its representations
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Record {
    pub cloud_id: String,
    pub representations: Vec<Representation>,
}

/// Descriptive data of a provider
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DataProviderProperties {
    pub organisation_name: Option<String>,
    pub official_address: Option<String>,
    pub organisation_website: Option<String>,
    pub organisation_website_url: Option<String>,
    pub digital_library_website: Option<String>,
    pub digital_library_url: Option<String>,
    pub contact_person: Option<String>,
    pub remarks: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DataProvider {
    pub id: String,
    pub properties: DataProviderProperties,
    pub created_at: DateTime<Utc>,
}

/// Globally unique data set address
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct CompoundDataSetId {
    pub provider_id: String,
    pub data_set_id: String,
}

impl CompoundDataSetId {
    pub fn new(provider_id: impl Into<String>, data_set_id: impl Into<String>) -> Self {
        Self {
            provider_id: provider_id.into(),
            data_set_id: data_set_id.into(),
        }
    }
}

impl fmt::Display for CompoundDataSetId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.provider_id, self.data_set_id)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DataSet {
    pub provider_id: String,
    pub id: String,
    pub description: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl DataSet {
    pub fn compound_id(&self) -> CompoundDataSetId {
        CompoundDataSetId::new(self.provider_id.clone(), self.id.clone())
    }
}

/// One page of a listing plus the token for the next page
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResultSlice<T> {
    pub results: Vec<T>,
    pub next_slice: Option<String>,
}

impl<T> ResultSlice<T> {
    pub fn new(results: Vec<T>, next_slice: Option<String>) -> Self {
        Self { results, next_slice }
    }

    pub fn is_last(&self) -> bool {
        self.next_slice.is_none()
    }
}
