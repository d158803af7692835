//! Record document
//!
//! A record is an ordered map of field name to [`FieldValue`] plus system
//! metadata. Metadata is never taken from caller input: every `_`-prefixed
//! key other than `_id`, `_recordType`, `_recordID` and `_access` is
//! stripped on decode.

use std::collections::BTreeMap;

use chrono::{DateTime, SecondsFormat, Utc};
use serde_json::{Map, Value};

use super::access::{AccessLevel, RecordAcl};
use super::id::RecordId;
use super::value::FieldValue;
use crate::acl::Principal;
use crate::error::{RecordError, RecordResult};

/// System field paths, as referenced by queries and field ACL rules,
/// paired with the key they render under.
pub const SYSTEM_FIELDS: &[(&str, &str)] = &[
    ("_id", "_id"),
    ("_owner_id", "_ownerID"),
    ("_created_at", "_created_at"),
    ("_created_by", "_created_by"),
    ("_updated_at", "_updated_at"),
    ("_updated_by", "_updated_by"),
    ("_access", "_access"),
];

/// Returns true if `name` is a system field path
pub fn is_system_field(name: &str) -> bool {
    SYSTEM_FIELDS.iter().any(|(path, _)| *path == name)
}

/// A typed, schema-flexible record
#[derive(Debug, Clone, PartialEq)]
pub struct Record {
    pub id: RecordId,
    pub owner_id: Option<String>,
    pub created_at: Option<DateTime<Utc>>,
    pub created_by: Option<String>,
    pub updated_at: Option<DateTime<Utc>>,
    pub updated_by: Option<String>,
    /// `None` means no restriction: everyone may read and write
    pub access: Option<RecordAcl>,
    pub data: BTreeMap<String, FieldValue>,
}

impl Record {
    pub fn new(id: RecordId) -> Self {
        Self {
            id,
            owner_id: None,
            created_at: None,
            created_by: None,
            updated_at: None,
            updated_by: None,
            access: None,
            data: BTreeMap::new(),
        }
    }

    pub fn with_field(mut self, name: impl Into<String>, value: FieldValue) -> Self {
        self.data.insert(name.into(), value);
        self
    }

    pub fn with_owner(mut self, owner_id: impl Into<String>) -> Self {
        self.owner_id = Some(owner_id.into());
        self
    }

    pub fn with_access(mut self, access: RecordAcl) -> Self {
        self.access = Some(access);
        self
    }

    pub fn get(&self, field: &str) -> Option<&FieldValue> {
        self.data.get(field)
    }

    /// Record-level access check. Owners always have full access.
    pub fn accessible(&self, principal: &Principal, level: AccessLevel) -> bool {
        if let (Some(owner), Some(user)) = (&self.owner_id, principal.user_id()) {
            if owner == user {
                return true;
            }
        }
        match &self.access {
            None => true,
            Some(acl) => acl.accessible(principal, level),
        }
    }

    /// Identity of a record map: `_id`, or `_recordType` with `_recordID`
    pub fn id_from_json(map: &Map<String, Value>) -> RecordResult<RecordId> {
        match map.get("_id") {
            Some(Value::String(raw)) => RecordId::parse(raw),
            Some(_) => Err(RecordError::invalid_argument(
                r#"record: "_id" should be a string"#,
                &["_id"],
            )),
            None => match (
                map.get("_recordType").and_then(Value::as_str),
                map.get("_recordID").and_then(Value::as_str),
            ) {
                (Some(t), Some(k)) if !t.is_empty() && !k.is_empty() => Ok(RecordId::new(t, k)),
                _ => Err(RecordError::invalid_argument(
                    r#"record: required field "_id" not found"#,
                    &["_id"],
                )),
            },
        }
    }

    /// Decode a caller-supplied record map.
    ///
    /// An absent or null `_access` leaves `access` as `None`, which on update
    /// keeps the stored ACL.
    pub fn from_json(map: &Map<String, Value>) -> RecordResult<Self> {
        let id = Self::id_from_json(map)?;

        let access = match map.get("_access") {
            None | Some(Value::Null) => None,
            Some(raw) => Some(serde_json::from_value::<RecordAcl>(raw.clone()).map_err(|e| {
                RecordError::invalid_argument(format!("invalid _access: {}", e), &["_access"])
            })?),
        };

        let mut record = Record::new(id);
        record.access = access;
        for (key, value) in map {
            if key.starts_with('_') {
                continue;
            }
            let value = FieldValue::from_json(value).map_err(|e| {
                RecordError::invalid_argument(
                    format!("field `{}`: {}", key, e.message()),
                    &[key.as_str()],
                )
            })?;
            record.data.insert(key.clone(), value);
        }
        Ok(record)
    }

    /// Render the full record, metadata keys first
    pub fn to_json_map(&self) -> Map<String, Value> {
        let mut m = Map::new();
        m.insert("_id".into(), Value::String(self.id.to_string()));
        m.insert("_type".into(), Value::String("record".into()));
        m.insert("_recordType".into(), Value::String(self.id.record_type().to_string()));
        m.insert("_recordID".into(), Value::String(self.id.key().to_string()));
        m.insert("_ownerID".into(), opt_string(&self.owner_id));
        m.insert("_created_at".into(), opt_time(&self.created_at));
        m.insert("_created_by".into(), opt_string(&self.created_by));
        m.insert("_updated_at".into(), opt_time(&self.updated_at));
        m.insert("_updated_by".into(), opt_string(&self.updated_by));
        m.insert(
            "_access".into(),
            match &self.access {
                Some(acl) => serde_json::to_value(acl).unwrap_or(Value::Null),
                None => Value::Null,
            },
        );
        for (name, value) in &self.data {
            m.insert(name.clone(), value.to_json());
        }
        m
    }
}

fn opt_string(value: &Option<String>) -> Value {
    value.clone().map(Value::String).unwrap_or(Value::Null)
}

fn opt_time(value: &Option<DateTime<Utc>>) -> Value {
    value
        .map(|t| Value::String(t.to_rfc3339_opts(SecondsFormat::AutoSi, true)))
        .unwrap_or(Value::Null)
}
