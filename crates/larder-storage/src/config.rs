//! Storage configuration

use crate::{Result, SchemaConfig};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

pub const DEFAULT_PATH: &str = "system.db";

/// Where the store lives and which buckets it is provisioned with
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    pub path: PathBuf,
    pub schema: SchemaConfig,
}

impl StorageConfig {
    /// Load from a JSON file; fields left out keep their defaults.
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Ok(serde_json::from_str(&content)?)
    }
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from(DEFAULT_PATH),
            schema: SchemaConfig::default(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_defaults() {
        let config = StorageConfig::default();
        assert_eq!(config.path, PathBuf::from("system.db"));
        assert!(config.schema.buckets.contains("__users"));
    }

    #[test]
    fn test_partial_json() {
        let dir = tempdir().unwrap();
        let file = dir.path().join("larder.json");
        std::fs::write(&file, r#"{ "schema": { "content_types": ["Post", "Song"] } }"#).unwrap();

        let config = StorageConfig::from_json_file(&file).unwrap();
        assert_eq!(config.path, PathBuf::from("system.db"));
        assert_eq!(config.schema.content_types.len(), 2);
        // buckets omitted: falls back to the system buckets
        assert_eq!(config.schema.buckets.len(), 5);
    }

    #[test]
    fn test_invalid_json() {
        let dir = tempdir().unwrap();
        let file = dir.path().join("larder.json");
        std::fs::write(&file, "{ not json").unwrap();

        let err = StorageConfig::from_json_file(&file).unwrap_err();
        assert!(matches!(err, crate::StorageError::Json(_)));
    }
}
