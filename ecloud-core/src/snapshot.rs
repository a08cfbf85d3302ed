//! Metadata snapshots
//!
//! Records, providers and data sets serialized with bincode into a single
//! file. Content bytes are not part of a snapshot; they stay in their
//! content stores.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

use crate::datasets::DataSetSnapshot;
use crate::error::{Result, StoreError};
use crate::model::DataProvider;
use crate::records::RecordSnapshot;

const FORMAT_VERSION: u32 = 2;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreSnapshot {
    pub format_version: u32,
    pub created_at: DateTime<Utc>,
    pub providers: Vec<DataProvider>,
    pub records: Vec<RecordSnapshot>,
    pub data_sets: Vec<DataSetSnapshot>,
}

impl StoreSnapshot {
    pub fn new(
        providers: Vec<DataProvider>,
        records: Vec<RecordSnapshot>,
        data_sets: Vec<DataSetSnapshot>,
    ) -> Self {
        Self {
            format_version: FORMAT_VERSION,
            created_at: Utc::now(),
            providers,
            records,
            data_sets,
        }
    }

    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        Ok(bincode::serialize(self)?)
    }

    pub fn from_bytes(data: &[u8]) -> Result<Self> {
        let snapshot: StoreSnapshot = bincode::deserialize(data)?;
        if snapshot.format_version != FORMAT_VERSION {
            return Err(StoreError::Serialization(format!(
                "Unsupported snapshot format {}",
                snapshot.format_version
            )));
        }
        Ok(snapshot)
    }

    /// Write atomically: readers see either the old or the new snapshot
    pub fn write_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        let tmp_path = path.with_extension("tmp");
        fs::write(&tmp_path, self.to_bytes()?)?;
        fs::rename(&tmp_path, path)?;
        Ok(())
    }

    /// `None` when there is no snapshot yet
    pub fn read_from(path: &Path) -> Result<Option<Self>> {
        if !path.exists() {
            return Ok(None);
        }
        Ok(Some(Self::from_bytes(&fs::read(path)?)?))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::DataProviderProperties;
    use tempfile::TempDir;

    #[test]
    fn test_missing_snapshot() {
        let tmp = TempDir::new().unwrap();
        assert!(StoreSnapshot::read_from(&tmp.path().join("none")).unwrap().is_none());
    }

    #[test]
    fn test_write_and_read() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("metadata.snapshot");
        let provider = DataProvider {
            id: "P1".to_string(),
            properties: DataProviderProperties::default(),
            created_at: Utc::now(),
        };
        StoreSnapshot::new(vec![provider.clone()], Vec::new(), Vec::new())
            .write_to(&path)
            .unwrap();
        let loaded = StoreSnapshot::read_from(&path).unwrap().unwrap();
        assert_eq!(loaded.providers, vec![provider]);
    }

    #[test]
    fn test_garbage_rejected() {
        assert!(StoreSnapshot::from_bytes(b"not a snapshot").is_err());
    }
}
