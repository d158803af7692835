//! Record identity
//!
//! A record is addressed by `(type, key)`. Two records with equal ids are
//! the same entity. Ids order by type, then key, so error maps and result
//! sets keyed by id iterate deterministically.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::error::RecordError;

/// Composite record identifier
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RecordId {
    record_type: String,
    key: String,
}

impl RecordId {
    pub fn new(record_type: impl Into<String>, key: impl Into<String>) -> Self {
        Self {
            record_type: record_type.into(),
            key: key.into(),
        }
    }

    pub fn record_type(&self) -> &str {
        &self.record_type
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    /// Parse the `type/key` text form.
    ///
    /// Only the first `/` separates type from key; keys may contain `/`.
    pub fn parse(raw: &str) -> Result<Self, RecordError> {
        match raw.split_once('/') {
            Some((record_type, key)) if !record_type.is_empty() && !key.is_empty() => {
                Ok(Self::new(record_type, key))
            }
            _ => Err(RecordError::invalid_argument(
                format!(r#"record: "_id" should be of format '{{type}}/{{id}}', got "{}""#, raw),
                &["_id"],
            )),
        }
    }
}

impl fmt::Display for RecordId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.record_type, self.key)
    }
}

impl FromStr for RecordId {
    type Err = RecordError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl Serialize for RecordId {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for RecordId {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        Self::parse(&raw).map_err(|e| serde::de::Error::custom(e.message().to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_and_display() {
        let id = RecordId::parse("note/EA6A3E68").unwrap();
        assert_eq!(id.record_type(), "note");
        assert_eq!(id.key(), "EA6A3E68");
        assert_eq!(id.to_string(), "note/EA6A3E68");
    }

    #[test]
    fn test_key_may_contain_slash() {
        let id = RecordId::parse("file/a/b").unwrap();
        assert_eq!(id.key(), "a/b");
    }

    #[test]
    fn test_parse_rejects_malformed() {
        assert!(RecordId::parse("note").is_err());
        assert!(RecordId::parse("/1").is_err());
        assert!(RecordId::parse("note/").is_err());
    }

    #[test]
    fn test_ordering_by_type_then_key() {
        let mut ids = vec![
            RecordId::new("user", "a"),
            RecordId::new("note", "b"),
            RecordId::new("note", "a"),
        ];
        ids.sort();
        let rendered: Vec<String> = ids.iter().map(|i| i.to_string()).collect();
        assert_eq!(rendered, vec!["note/a", "note/b", "user/a"]);
    }

    #[test]
    fn test_serde_as_string() {
        let id = RecordId::new("note", "1");
        let json = serde_json::to_value(&id).unwrap();
        assert_eq!(json, serde_json::json!("note/1"));
        let back: RecordId = serde_json::from_value(json).unwrap();
        assert_eq!(back, id);
    }
}
