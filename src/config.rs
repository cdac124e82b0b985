//! Store configuration.

use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::rollover::Timezone;

/// Configuration for an observation store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    /// Timezone in which rollover buckets are cut.
    /// Default: "UTC"
    pub timezone: String,

    /// Scan the partitions of a range query on scoped threads.
    /// Default: false
    pub parallel_scans: bool,

    /// Upper bound on scan threads when `parallel_scans` is set.
    /// Default: 4
    pub max_scan_threads: usize,

    /// Sync every appended record to disk (directory store).
    /// Default: true
    pub sync_writes: bool,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            timezone: "UTC".to_string(),
            parallel_scans: false,
            max_scan_threads: 4,
            sync_writes: true,
        }
    }
}

impl StoreConfig {
    /// Load a JSON config file. Missing fields take their defaults.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let json = fs::read_to_string(path)?;
        Ok(serde_json::from_str(&json)?)
    }

    pub fn timezone(&self) -> Result<Timezone> {
        self.timezone.parse()
    }

    pub(crate) fn scan_threads(&self) -> usize {
        self.max_scan_threads.max(1)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_store_config_default() {
        let config = StoreConfig::default();
        assert_eq!(config.timezone, "UTC");
        assert!(!config.parallel_scans);
        assert_eq!(config.max_scan_threads, 4);
        assert!(config.sync_writes);
        assert_eq!(config.timezone().unwrap(), Timezone::UTC);
    }

    #[test]
    fn test_partial_json_uses_defaults() {
        let config: StoreConfig =
            serde_json::from_str(r#"{"timezone": "+0800", "parallel_scans": true}"#).unwrap();
        assert!(config.parallel_scans);
        assert_eq!(config.max_scan_threads, 4);
        assert!(config.sync_writes);
        assert_eq!(config.timezone().unwrap().to_string(), "+0800");
    }

    #[test]
    fn test_load_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, r#"{{"max_scan_threads": 0, "sync_writes": false}}"#).unwrap();

        let config = StoreConfig::load(file.path()).unwrap();
        assert!(!config.sync_writes);
        assert_eq!(config.scan_threads(), 1);
    }

    #[test]
    fn test_bad_timezone_reported() {
        let config = StoreConfig {
            timezone: "Nowhere".to_string(),
            ..StoreConfig::default()
        };
        assert!(config.timezone().is_err());
    }
}
