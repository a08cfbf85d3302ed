//! Store configuration

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

use crate::error::{Result, StoreError};

/// Name of the config file inside a store directory
pub const CONFIG_FILE: &str = "ecloud.toml";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    /// Directory for object-storage content. In memory when unset.
    pub content_root: Option<PathBuf>,
    /// SQLite file for database-backed content. In memory when unset.
    pub database_path: Option<PathBuf>,
    /// Metadata snapshot file. Nothing is loaded or saved when unset.
    pub snapshot_path: Option<PathBuf>,
    /// Capacity of the event broadcast channel
    pub event_buffer: usize,
    pub default_page_size: usize,
    pub max_page_size: usize,
    /// Refuse to persist drafts without files
    pub reject_empty_persist: bool,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            content_root: None,
            database_path: None,
            snapshot_path: None,
            event_buffer: 1024,
            default_page_size: 100,
            max_page_size: 1000,
            reject_empty_persist: false,
        }
    }
}

impl StoreConfig {
    /// Everything kept on disk under `dir`
    pub fn for_directory(dir: &Path) -> Self {
        Self {
            content_root: Some(dir.join("content")),
            database_path: Some(dir.join("content.sqlite")),
            snapshot_path: Some(dir.join("metadata.snapshot")),
            ..Self::default()
        }
    }

    /// Read a TOML config file. A missing file yields the defaults.
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let data = fs::read_to_string(path)?;
        let config: StoreConfig = toml::from_str(&data)
            .map_err(|e| StoreError::Serialization(format!("Invalid config {:?}: {}", path, e)))?;
        config.validate()?;
        Ok(config)
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        let data = toml::to_string_pretty(self)
            .map_err(|e| StoreError::Serialization(format!("Cannot encode config: {}", e)))?;
        let tmp_path = path.with_extension("tmp");
        fs::write(&tmp_path, data)?;
        fs::rename(&tmp_path, path)?;
        Ok(())
    }

    pub fn validate(&self) -> Result<()> {
        if self.default_page_size == 0 || self.max_page_size == 0 {
            return Err(StoreError::InvalidArgument("Page sizes must be positive".to_string()));
        }
        if self.default_page_size > self.max_page_size {
            return Err(StoreError::InvalidArgument(format!(
                "default_page_size {} exceeds max_page_size {}",
                self.default_page_size, self.max_page_size
            )));
        }
        Ok(())
    }
}
