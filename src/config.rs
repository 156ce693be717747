//! Store configuration
//!
//! Defaults can be overridden from a TOML file or from the environment:
//!
//! ```toml
//! base_dir = "/sdcard/DCIM/.thumbnails"
//! data_version = 4
//! index_version = 1
//! ```

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Current on-disk layout version of the data file
pub const DATA_FILE_VERSION: u32 = 4;

/// Current on-disk layout version of the index file
pub const INDEX_FILE_VERSION: u32 = 1;

/// Configuration for the mini-thumbnail stores
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    /// Thumbnail cache directory holding the data and index files
    pub base_dir: PathBuf,
    /// Data file version; the file at `data_version - 1` is deleted on open
    pub data_version: u32,
    /// Index file version; the file at `index_version - 1` is deleted on open
    pub index_version: u32,
    /// Create `base_dir` when it is missing
    pub create_dirs: bool,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            base_dir: PathBuf::from("data/thumbnails"),
            data_version: DATA_FILE_VERSION,
            index_version: INDEX_FILE_VERSION,
            create_dirs: true,
        }
    }
}

impl StoreConfig {
    /// Config rooted at `base_dir`, everything else default
    pub fn with_base_dir<P: AsRef<Path>>(base_dir: P) -> Self {
        Self {
            base_dir: base_dir.as_ref().to_path_buf(),
            ..Self::default()
        }
    }

    /// Load configuration from a TOML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|e| {
            Error::Config(format!("Failed to read {}: {}", path.display(), e))
        })?;
        Self::from_toml_str(&text)
    }

    /// Parse configuration from TOML text
    pub fn from_toml_str(text: &str) -> Result<Self> {
        let config: Self = toml::from_str(text)
            .map_err(|e| Error::Config(format!("Invalid config: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    /// Defaults with `MINITHUMB_*` environment overrides applied
    pub fn from_env() -> Self {
        let mut config = Self::default();

        if let Ok(dir) = std::env::var("MINITHUMB_BASE_DIR") {
            if !dir.is_empty() {
                config.base_dir = PathBuf::from(dir);
            }
        }

        config.data_version = std::env::var("MINITHUMB_DATA_VERSION")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(config.data_version);

        config.index_version = std::env::var("MINITHUMB_INDEX_VERSION")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(config.index_version);

        config
    }

    /// Reject version constants that leave no room for a legacy predecessor
    pub fn validate(&self) -> Result<()> {
        if self.data_version == 0 {
            return Err(Error::Config("data_version must be at least 1".to_string()));
        }
        if self.index_version == 0 {
            return Err(Error::Config("index_version must be at least 1".to_string()));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = StoreConfig::default();
        assert_eq!(config.data_version, DATA_FILE_VERSION);
        assert_eq!(config.index_version, INDEX_FILE_VERSION);
        assert!(config.create_dirs);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_parse_partial_toml() -> Result<()> {
        let config = StoreConfig::from_toml_str(
            r#"
            base_dir = "/tmp/thumbs"
            data_version = 7
            "#,
        )?;
        assert_eq!(config.base_dir, PathBuf::from("/tmp/thumbs"));
        assert_eq!(config.data_version, 7);
        assert_eq!(config.index_version, INDEX_FILE_VERSION);
        Ok(())
    }

    #[test]
    fn test_rejects_zero_version() {
        let err = StoreConfig::from_toml_str("index_version = 0").unwrap_err();
        assert!(matches!(err, Error::Config(_)));
    }

    #[test]
    fn test_rejects_malformed_toml() {
        assert!(StoreConfig::from_toml_str("base_dir = [").is_err());
    }

    #[test]
    fn test_from_file() -> Result<()> {
        let path = std::env::temp_dir().join(format!("minithumb_cfg_{}.toml", std::process::id()));
        std::fs::write(&path, "base_dir = \"thumbs\"\ncreate_dirs = false\n").unwrap();

        let config = StoreConfig::from_file(&path)?;
        assert_eq!(config.base_dir, PathBuf::from("thumbs"));
        assert!(!config.create_dirs);

        std::fs::remove_file(path).ok();
        Ok(())
    }
}
