//! Batch response types

use serde::Serialize;
use serde_json::{Map, Value};

use crate::record::RecordId;

/// Ordered per-item results plus an optional info side channel
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct BatchResponse {
    pub result: Vec<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub info: Option<Map<String, Value>>,
}

impl BatchResponse {
    pub fn new(result: Vec<Value>) -> Self {
        Self { result, info: None }
    }

    pub fn with_info(mut self, key: &str, value: Value) -> Self {
        self.info.get_or_insert_with(Map::new).insert(key.to_string(), value);
        self
    }

    pub fn len(&self) -> usize {
        self.result.len()
    }

    pub fn is_empty(&self) -> bool {
        self.result.is_empty()
    }

    /// Serialize to the wire form
    pub fn to_json(&self) -> Value {
        serde_json::to_value(self).unwrap_or(Value::Null)
    }
}

/// Result entry for a deleted record
pub fn tombstone(id: &RecordId) -> Value {
    let mut m = Map::new();
    m.insert("_id".into(), Value::String(id.to_string()));
    m.insert("_recordID".into(), Value::String(id.key().to_string()));
    m.insert("_recordType".into(), Value::String(id.record_type().to_string()));
    m.insert("_type".into(), Value::String("record".into()));
    Value::Object(m)
}
