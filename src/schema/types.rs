//! Schema type definitions
//!
//! Supported field types:
//! - string, integer, number, boolean, datetime
//! - reference: to records of one named type
//! - asset, location, sequence
//! - json: free-form nested object

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::record::{is_system_field, FieldValue};

/// Declared type of a record field
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum FieldType {
    String,
    Integer,
    Number,
    Boolean,
    Datetime,
    Reference {
        /// Record type of the referenced records
        record_type: String,
    },
    Asset,
    Location,
    Sequence,
    Json,
}

impl FieldType {
    /// Returns the type name for error messages
    pub fn type_name(&self) -> String {
        match self {
            FieldType::String => "string".into(),
            FieldType::Integer => "integer".into(),
            FieldType::Number => "number".into(),
            FieldType::Boolean => "boolean".into(),
            FieldType::Datetime => "datetime".into(),
            FieldType::Reference { record_type } => format!("ref({})", record_type),
            FieldType::Asset => "asset".into(),
            FieldType::Location => "location".into(),
            FieldType::Sequence => "sequence".into(),
            FieldType::Json => "json".into(),
        }
    }

    /// Infer the type of a value. Nulls carry no type.
    pub fn infer(value: &FieldValue) -> Option<FieldType> {
        Some(match value {
            FieldValue::Null => return None,
            FieldValue::Boolean(_) => FieldType::Boolean,
            FieldValue::Integer(_) => FieldType::Integer,
            FieldValue::Number(_) => FieldType::Number,
            FieldValue::String(_) => FieldType::String,
            FieldValue::DateTime(_) => FieldType::Datetime,
            FieldValue::Reference(id) => FieldType::Reference {
                record_type: id.record_type().to_string(),
            },
            FieldValue::Asset(_) => FieldType::Asset,
            FieldValue::Location(_) => FieldType::Location,
            FieldValue::Sequence(_) => FieldType::Sequence,
            FieldValue::Object(_) => FieldType::Json,
        })
    }

    /// Whether a value of type `incoming` may be stored in a field declared
    /// as `self`. Integers widen into numbers; nothing narrows.
    pub fn accepts(&self, incoming: &FieldType) -> bool {
        self == incoming || (*self == FieldType::Number && *incoming == FieldType::Integer)
    }

    /// Common type of two inferred types, if any
    pub fn unify(&self, other: &FieldType) -> Option<FieldType> {
        if self.accepts(other) {
            Some(self.clone())
        } else if other.accepts(self) {
            Some(other.clone())
        } else {
            None
        }
    }
}

/// Declared fields of one record type
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecordSchema {
    pub fields: BTreeMap<String, FieldType>,
}

impl RecordSchema {
    pub fn new(fields: impl IntoIterator<Item = (String, FieldType)>) -> Self {
        Self {
            fields: fields.into_iter().collect(),
        }
    }

    pub fn field(&self, name: &str) -> Option<&FieldType> {
        self.fields.get(name)
    }
}

/// Schemas of every record type known to the store
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SchemaCatalog(BTreeMap<String, RecordSchema>);

impl SchemaCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_schema(mut self, record_type: impl Into<String>, schema: RecordSchema) -> Self {
        self.0.insert(record_type.into(), schema);
        self
    }

    pub fn get(&self, record_type: &str) -> Option<&RecordSchema> {
        self.0.get(record_type)
    }

    pub fn record_types(&self) -> impl Iterator<Item = &str> {
        self.0.keys().map(String::as_str)
    }

    /// Declared type of a data field
    pub fn declared(&self, record_type: &str, field: &str) -> Option<&FieldType> {
        self.get(record_type).and_then(|s| s.field(field))
    }

    /// Type of a field path segment, including system fields
    pub fn resolve_field(&self, record_type: &str, field: &str) -> Option<FieldType> {
        if is_system_field(field) {
            return Some(system_field_type(field));
        }
        self.declared(record_type, field).cloned()
    }

    /// Add fields to a record type. Existing fields are never replaced.
    pub fn extend(&mut self, record_type: &str, fields: &BTreeMap<String, FieldType>) {
        let schema = self.0.entry(record_type.to_string()).or_default();
        for (name, field_type) in fields {
            schema
                .fields
                .entry(name.clone())
                .or_insert_with(|| field_type.clone());
        }
    }
}

fn system_field_type(field: &str) -> FieldType {
    match field {
        "_created_at" | "_updated_at" => FieldType::Datetime,
        "_access" => FieldType::Json,
        _ => FieldType::String,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::RecordId;

    #[test]
    fn test_infer_types() {
        assert_eq!(FieldType::infer(&FieldValue::Integer(3)), Some(FieldType::Integer));
        assert_eq!(FieldType::infer(&FieldValue::Null), None);
        assert_eq!(
            FieldType::infer(&FieldValue::Reference(RecordId::new("user", "1"))),
            Some(FieldType::Reference {
                record_type: "user".into()
            })
        );
    }

    #[test]
    fn test_integer_widens_into_number_only() {
        assert!(FieldType::Number.accepts(&FieldType::Integer));
        assert!(!FieldType::Integer.accepts(&FieldType::Number));
        assert!(!FieldType::Integer.accepts(&FieldType::String));
        assert_eq!(
            FieldType::Integer.unify(&FieldType::Number),
            Some(FieldType::Number)
        );
    }

    #[test]
    fn test_reference_targets_must_match() {
        let to_user = FieldType::Reference {
            record_type: "user".into(),
        };
        let to_note = FieldType::Reference {
            record_type: "note".into(),
        };
        assert!(!to_user.accepts(&to_note));
    }

    #[test]
    fn test_extend_never_replaces() {
        let mut catalog = SchemaCatalog::new().with_schema(
            "note",
            RecordSchema::new([("age".to_string(), FieldType::Integer)]),
        );
        let mut fields = BTreeMap::new();
        fields.insert("age".to_string(), FieldType::String);
        fields.insert("title".to_string(), FieldType::String);
        catalog.extend("note", &fields);

        assert_eq!(catalog.declared("note", "age"), Some(&FieldType::Integer));
        assert_eq!(catalog.declared("note", "title"), Some(&FieldType::String));
    }

    #[test]
    fn test_system_fields_resolve() {
        let catalog = SchemaCatalog::new();
        assert_eq!(
            catalog.resolve_field("note", "_created_at"),
            Some(FieldType::Datetime)
        );
        assert_eq!(catalog.resolve_field("note", "content"), None);
    }

    #[test]
    fn test_serde_shape() {
        let json = serde_json::to_value(FieldType::Reference {
            record_type: "user".into(),
        })
        .unwrap();
        assert_eq!(json, serde_json::json!({"type": "reference", "record_type": "user"}));
    }
}
