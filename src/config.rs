//! Engine Configuration
//!
//! Process-level settings for the record engine. Loaded once at startup;
//! field ACL rules and schemas are NOT part of configuration and are read
//! fresh from the store on every request.

use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{RecordError, RecordResult};

/// Record engine configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Fields denied to everyone unless a rule explicitly grants them
    #[serde(default = "default_reserved_fields")]
    pub reserved_fields: Vec<String>,

    /// Maximum number of items in a single batch
    #[serde(default = "default_max_batch_size")]
    pub max_batch_size: usize,

    /// Limit applied to queries that do not specify one
    #[serde(default)]
    pub default_query_limit: Option<u64>,

    /// Largest limit a query may request
    #[serde(default = "default_max_query_limit")]
    pub max_query_limit: u64,
}

fn default_reserved_fields() -> Vec<String> {
    vec!["_access".to_string()]
}

fn default_max_batch_size() -> usize {
    1000
}

fn default_max_query_limit() -> u64 {
    1000
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            reserved_fields: default_reserved_fields(),
            max_batch_size: default_max_batch_size(),
            default_query_limit: None,
            max_query_limit: default_max_query_limit(),
        }
    }
}

impl EngineConfig {
    /// Parse configuration from a JSON document
    pub fn from_json_str(json: &str) -> RecordResult<Self> {
        serde_json::from_str(json)
            .map_err(|e| RecordError::bad_request(format!("invalid engine config: {}", e)))
    }

    /// Load configuration from a JSON file
    pub fn load(path: impl AsRef<Path>) -> RecordResult<Self> {
        let path = path.as_ref();
        let contents = fs::read_to_string(path).map_err(|e| {
            RecordError::bad_request(format!("cannot read config '{}': {}", path.display(), e))
        })?;
        Self::from_json_str(&contents)
    }

    /// Check a batch length against `max_batch_size`
    pub fn check_batch_size(&self, len: usize, argument: &str) -> RecordResult<()> {
        if len > self.max_batch_size {
            return Err(RecordError::invalid_argument(
                format!(
                    "batch of {} items exceeds the maximum of {}",
                    len, self.max_batch_size
                ),
                &[argument],
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_default_config() {
        let config = EngineConfig::default();
        assert_eq!(config.reserved_fields, vec!["_access".to_string()]);
        assert_eq!(config.max_batch_size, 1000);
        assert_eq!(config.default_query_limit, None);
    }

    #[test]
    fn test_partial_json_uses_defaults() {
        let config = EngineConfig::from_json_str(r#"{"max_batch_size": 5}"#).unwrap();
        assert_eq!(config.max_batch_size, 5);
        assert_eq!(config.max_query_limit, 1000);
    }

    #[test]
    fn test_load_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, r#"{{"reserved_fields": ["_access", "salary"]}}"#).unwrap();

        let config = EngineConfig::load(file.path()).unwrap();
        assert_eq!(config.reserved_fields.len(), 2);
    }

    #[test]
    fn test_malformed_config_is_bad_request() {
        let err = EngineConfig::from_json_str("{not json").unwrap_err();
        assert_eq!(err.code(), crate::error::ErrorCode::BadRequest);
    }

    #[test]
    fn test_batch_size_limit() {
        let config = EngineConfig {
            max_batch_size: 2,
            ..Default::default()
        };
        assert!(config.check_batch_size(2, "records").is_ok());
        assert!(config.check_batch_size(3, "records").is_err());
    }
}
