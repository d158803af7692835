//! Batch payload decoding
//!
//! Structural validation of incoming payloads. Record-level decode failures
//! in a non-atomic save batch stay positional so the rest of the batch can
//! proceed.

use serde::Deserialize;
use serde_json::{Map, Value};

use crate::config::EngineConfig;
use crate::error::{ErrorCode, RecordError, RecordResult};
use crate::query::FieldPath;
use crate::record::{Record, RecordId};

#[derive(Debug, Deserialize)]
struct RawSave {
    #[serde(default)]
    atomic: bool,
    #[serde(default)]
    records: Option<Value>,
}

#[derive(Debug, Deserialize)]
struct RawDelete {
    #[serde(default)]
    atomic: bool,
    #[serde(default)]
    records: Option<Value>,
    /// Legacy `type/key` list
    #[serde(default)]
    ids: Option<Value>,
}

#[derive(Debug, Deserialize)]
struct RawFetch {
    #[serde(default)]
    ids: Option<Value>,
    #[serde(default)]
    include: Option<Vec<String>>,
}

/// A save item that failed to decode
#[derive(Debug, Clone, PartialEq)]
pub struct DecodeFailure {
    /// Set when the identity parsed even though the rest did not
    pub id: Option<RecordId>,
    pub error: RecordError,
}

impl DecodeFailure {
    fn new(item: &Value, error: RecordError) -> Self {
        let id = item.as_object().and_then(|map| Record::id_from_json(map).ok());
        Self { id, error }
    }

    pub fn to_json(&self) -> Value {
        match &self.id {
            Some(id) => self.error.to_json_for(id),
            None => self.error.to_json(),
        }
    }
}

/// Decoded `record:save` payload
#[derive(Debug, Clone)]
pub struct SaveRequest {
    pub atomic: bool,
    /// One entry per input record, in input order
    pub items: Vec<Result<Record, DecodeFailure>>,
}

impl SaveRequest {
    /// # Errors
    ///
    /// - InvalidArgument if `records` is missing, empty or too long
    /// - AtomicOperationFailure if the batch is atomic and any record fails
    ///   to decode; `info` maps each failed `type/key` (or input position when
    ///   no identity parsed) to its error
    pub fn decode(payload: &Value, config: &EngineConfig) -> RecordResult<Self> {
        let raw: RawSave = serde_json::from_value(payload.clone())?;
        let list = non_empty_list(raw.records, "records", "expected list of record")?;
        config.check_batch_size(list.len(), "records")?;

        let items: Vec<Result<Record, DecodeFailure>> = list
            .iter()
            .map(|item| match item {
                Value::Object(map) => Record::from_json(map).map_err(|e| DecodeFailure::new(item, e)),
                _ => Err(DecodeFailure::new(
                    item,
                    RecordError::invalid_argument("expected record object", &["records"]),
                )),
            })
            .collect();

        if raw.atomic && items.iter().any(Result::is_err) {
            let info: Map<String, Value> = items
                .iter()
                .enumerate()
                .filter_map(|(pos, item)| item.as_ref().err().map(|failure| (pos, failure)))
                .map(|(pos, failure)| {
                    let key = failure.id.as_ref().map_or_else(|| pos.to_string(), RecordId::to_string);
                    (key, failure.to_json())
                })
                .collect();
            return Err(RecordError::with_info(
                ErrorCode::AtomicOperationFailure,
                "Atomic Operation rejected due to records that cannot be decoded",
                info,
            ));
        }

        Ok(Self {
            atomic: raw.atomic,
            items,
        })
    }

    /// Records that decoded successfully, in input order
    pub fn records(&self) -> Vec<Record> {
        self.items.iter().filter_map(|item| item.as_ref().ok().cloned()).collect()
    }
}

/// Decoded `record:delete` payload
#[derive(Debug, Clone, PartialEq)]
pub struct DeleteRequest {
    pub atomic: bool,
    pub ids: Vec<RecordId>,
}

impl DeleteRequest {
    pub fn decode(payload: &Value, config: &EngineConfig) -> RecordResult<Self> {
        let raw: RawDelete = serde_json::from_value(payload.clone())?;

        let ids = match (raw.records, raw.ids) {
            (Some(records), _) => non_empty_list(Some(records), "records", "expected list of record identity")?
                .iter()
                .map(identity)
                .collect::<RecordResult<Vec<_>>>()?,
            (None, ids) => parse_id_list(ids)?,
        };
        config.check_batch_size(ids.len(), "records")?;

        Ok(Self {
            atomic: raw.atomic,
            ids,
        })
    }
}

/// Decoded `record:fetch` payload
#[derive(Debug, Clone, PartialEq)]
pub struct FetchRequest {
    pub ids: Vec<RecordId>,
    /// Reference fields to resolve into nested records
    pub include: Vec<FieldPath>,
}

impl FetchRequest {
    pub fn decode(payload: &Value, config: &EngineConfig) -> RecordResult<Self> {
        let raw: RawFetch = serde_json::from_value(payload.clone())?;
        let ids = parse_id_list(raw.ids)?;
        config.check_batch_size(ids.len(), "ids")?;

        let include = raw
            .include
            .unwrap_or_default()
            .iter()
            .map(|path| include_path(path))
            .collect::<RecordResult<Vec<_>>>()?;

        Ok(Self { ids, include })
    }
}

/// Fetch resolves only direct reference fields
fn include_path(raw: &str) -> RecordResult<FieldPath> {
    let path = FieldPath::parse(raw)?;
    if path.is_nested() {
        return Err(RecordError::invalid_argument(
            format!("include path `{}` must name a field of the fetched record", raw),
            &["include"],
        ));
    }
    Ok(path)
}

fn non_empty_list(value: Option<Value>, argument: &str, message: &str) -> RecordResult<Vec<Value>> {
    match value {
        Some(Value::Array(items)) if !items.is_empty() => Ok(items),
        _ => Err(RecordError::invalid_argument(message, &[argument])),
    }
}

fn parse_id_list(value: Option<Value>) -> RecordResult<Vec<RecordId>> {
    non_empty_list(value, "ids", "expected list of id")?
        .iter()
        .map(|id| match id {
            Value::String(raw) => RecordId::parse(raw),
            _ => Err(RecordError::invalid_argument("expected string id", &["ids"])),
        })
        .collect()
}

/// `{_recordType, _recordID}` or `{_id}`
fn identity(value: &Value) -> RecordResult<RecordId> {
    value
        .as_object()
        .ok_or_else(|| RecordError::invalid_argument("expected record identity", &["records"]))
        .and_then(Record::id_from_json)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_save_keeps_positional_decode_errors() {
        let req = SaveRequest::decode(
            &json!({"records": [{"_id": "note/1"}, {"title": "no id"}, 3]}),
            &EngineConfig::default(),
        )
        .unwrap();

        assert!(!req.atomic);
        assert!(req.items[0].is_ok());
        let failure = req.items[1].as_ref().unwrap_err();
        assert_eq!(failure.error.code(), ErrorCode::InvalidArgument);
        assert_eq!(failure.id, None);
        assert!(req.items[2].is_err());
        assert_eq!(req.records().len(), 1);
    }

    #[test]
    fn test_decode_failure_keeps_parsed_id() {
        let req = SaveRequest::decode(
            &json!({"records": [{"_id": "note/b", "when": {"$type": "date", "$date": "yesterday"}}]}),
            &EngineConfig::default(),
        )
        .unwrap();

        let failure = req.items[0].as_ref().unwrap_err();
        assert_eq!(failure.id, Some(RecordId::new("note", "b")));
        let json = failure.to_json();
        assert_eq!(json["_id"], "note/b");
        assert_eq!(json["_recordID"], "b");
        assert_eq!(json["name"], "InvalidArgument");
    }

    #[test]
    fn test_atomic_save_rejects_any_decode_error() {
        let err = SaveRequest::decode(
            &json!({"atomic": true, "records": [
                {"_id": "note/1"},
                {"_id": "bad"},
                {"_id": "note/3", "when": {"$type": "date", "$date": "yesterday"}}
            ]}),
            &EngineConfig::default(),
        )
        .unwrap_err();

        assert_eq!(err.code(), ErrorCode::AtomicOperationFailure);
        let info = err.info().unwrap();
        assert_eq!(info.len(), 2);
        assert_eq!(info["1"]["name"], "InvalidArgument");
        assert_eq!(info["note/3"]["_id"], "note/3");
        assert!(info.get("note/1").is_none());
    }

    #[test]
    fn test_empty_or_missing_records() {
        let config = EngineConfig::default();
        assert!(SaveRequest::decode(&json!({"records": []}), &config).is_err());
        assert!(SaveRequest::decode(&json!({}), &config).is_err());
        let err = SaveRequest::decode(&json!({"atomic": "yes"}), &config).unwrap_err();
        assert_eq!(err.code(), ErrorCode::BadRequest);
    }

    #[test]
    fn test_delete_formats() {
        let config = EngineConfig::default();
        let split = DeleteRequest::decode(
            &json!({"records": [{"_recordType": "note", "_recordID": "1"}]}),
            &config,
        )
        .unwrap();
        let legacy = DeleteRequest::decode(&json!({"ids": ["note/1"]}), &config).unwrap();
        assert_eq!(split.ids, legacy.ids);
    }

    #[test]
    fn test_batch_size_enforced() {
        let config = EngineConfig {
            max_batch_size: 1,
            ..Default::default()
        };
        let err = FetchRequest::decode(&json!({"ids": ["note/1", "note/2"]}), &config).unwrap_err();
        assert_eq!(err.code(), ErrorCode::InvalidArgument);
    }

    #[test]
    fn test_fetch_include() {
        let req = FetchRequest::decode(
            &json!({"ids": ["note/1"], "include": ["author"]}),
            &EngineConfig::default(),
        )
        .unwrap();
        assert_eq!(req.include, vec![FieldPath::field("author")]);
    }

    #[test]
    fn test_fetch_rejects_nested_include() {
        let err = FetchRequest::decode(
            &json!({"ids": ["note/1"], "include": ["author.name"]}),
            &EngineConfig::default(),
        )
        .unwrap_err();
        assert_eq!(err.code(), ErrorCode::InvalidArgument);
        assert_eq!(err.info().unwrap()["arguments"][0], "include");
    }
}
