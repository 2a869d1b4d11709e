//! Configuration for a windrow instance.
//!
//! Supports YAML files with full defaults, so an empty document is a valid
//! configuration. Durations use humantime syntax (`1s`, `500ms`).

use crate::core::error::{Result, WindrowError};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// Complete configuration for a windrow instance
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Storage configuration
    pub storage: StorageConfig,
    /// UID width configuration
    pub uid: UidConfig,
    /// Compaction configuration
    pub compaction: CompactionConfig,
}

/// Storage configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// Table in which time series rows are stored
    pub data_table: String,
    /// Table in which UID mappings are stored
    pub uid_table: String,
    /// How often the store client flushes buffered writes
    #[serde(with = "humantime_serde")]
    pub flush_interval: Duration,
}

/// Widths, in bytes, of the three UID kinds.
///
/// Fixed at open time; changing a width on an existing database makes every
/// previously written row key unreadable.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct UidConfig {
    /// Width of metric UIDs
    pub metric_width: usize,
    /// Width of tag-key UIDs
    pub tag_key_width: usize,
    /// Width of tag-value UIDs
    pub tag_value_width: usize,
}

/// Compaction configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CompactionConfig {
    /// Whether written rows are scheduled for background compaction
    pub enabled: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            storage: StorageConfig::default(),
            uid: UidConfig::default(),
            compaction: CompactionConfig::default(),
        }
    }
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            data_table: "tsdb".to_string(),
            uid_table: "tsdb-uid".to_string(),
            flush_interval: Duration::from_secs(1),
        }
    }
}

impl Default for UidConfig {
    fn default() -> Self {
        Self {
            metric_width: 3,
            tag_key_width: 3,
            tag_value_width: 3,
        }
    }
}

impl Default for CompactionConfig {
    fn default() -> Self {
        Self { enabled: true }
    }
}

impl Config {
    /// Loads configuration from a YAML file.
    pub fn load_from_file(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path)
            .map_err(|e| WindrowError::config(format!("failed to read {}: {}", path.display(), e)))?;
        Self::from_yaml(&contents)
    }

    /// Parses configuration from a YAML string.
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        let config: Config = serde_yaml::from_str(yaml)
            .map_err(|e| WindrowError::config(format!("invalid configuration: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    /// Validates the configuration.
    pub fn validate(&self) -> Result<()> {
        for (label, width) in [
            ("uid.metric_width", self.uid.metric_width),
            ("uid.tag_key_width", self.uid.tag_key_width),
            ("uid.tag_value_width", self.uid.tag_value_width),
        ] {
            if !(1..=8).contains(&width) {
                return Err(WindrowError::config(format!(
                    "{} must be between 1 and 8, got {}",
                    label, width
                )));
            }
        }
        if self.storage.data_table.is_empty() || self.storage.uid_table.is_empty() {
            return Err(WindrowError::config("table names must not be empty"));
        }
        if self.storage.data_table == self.storage.uid_table {
            return Err(WindrowError::config(
                "data table and UID table must be distinct",
            ));
        }
        Ok(())
    }
}
