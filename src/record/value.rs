//! Typed field values and their wire encoding
//!
//! Plain JSON scalars map directly. Typed values use `$type`-tagged objects:
//!
//! - `{"$type": "date", "$date": "2016-01-02T03:04:05Z"}`
//! - `{"$type": "ref", "$id": "user/1"}`
//! - `{"$type": "asset", "$name": "photo.png"}`
//! - `{"$type": "geo", "$lat": 22.3, "$lng": 114.2}`

use std::collections::BTreeMap;

use chrono::{DateTime, SecondsFormat, Utc};
use serde_json::{Map, Number, Value};

use super::id::RecordId;
use crate::error::{RecordError, RecordResult};

/// Asset descriptor. A bare asset only carries its name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Asset {
    pub name: String,
    pub content_type: Option<String>,
    pub size: Option<u64>,
    pub url: Option<String>,
}

impl Asset {
    pub fn bare(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            content_type: None,
            size: None,
            url: None,
        }
    }

    /// Returns true if only the name is known
    pub fn is_bare(&self) -> bool {
        self.content_type.is_none() && self.size.is_none() && self.url.is_none()
    }
}

/// Geographic point in degrees
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GeoPoint {
    pub lat: f64,
    pub lng: f64,
}

impl GeoPoint {
    const EARTH_RADIUS_M: f64 = 6_371_000.0;

    /// Great-circle distance in meters
    pub fn distance_to(&self, other: &GeoPoint) -> f64 {
        let (lat1, lat2) = (self.lat.to_radians(), other.lat.to_radians());
        let dlat = lat2 - lat1;
        let dlng = (other.lng - self.lng).to_radians();
        let a = (dlat / 2.0).sin().powi(2) + lat1.cos() * lat2.cos() * (dlng / 2.0).sin().powi(2);
        2.0 * Self::EARTH_RADIUS_M * a.sqrt().asin()
    }
}

/// Value stored in a record field
#[derive(Debug, Clone, PartialEq)]
pub enum FieldValue {
    Null,
    Boolean(bool),
    Integer(i64),
    Number(f64),
    String(String),
    DateTime(DateTime<Utc>),
    Reference(RecordId),
    Asset(Asset),
    Location(GeoPoint),
    Sequence(Vec<FieldValue>),
    Object(BTreeMap<String, FieldValue>),
}

impl FieldValue {
    /// Returns the referenced id if this is a reference
    pub fn as_reference(&self) -> Option<&RecordId> {
        match self {
            FieldValue::Reference(id) => Some(id),
            _ => None,
        }
    }

    /// Returns the numeric value for integer and number values
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            FieldValue::Integer(i) => Some(*i as f64),
            FieldValue::Number(n) => Some(*n),
            _ => None,
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, FieldValue::Null)
    }

    /// Decode a wire value
    pub fn from_json(value: &Value) -> RecordResult<Self> {
        Ok(match value {
            Value::Null => FieldValue::Null,
            Value::Bool(b) => FieldValue::Boolean(*b),
            Value::Number(n) => match n.as_i64() {
                Some(i) => FieldValue::Integer(i),
                None => FieldValue::Number(n.as_f64().unwrap_or(f64::NAN)),
            },
            Value::String(s) => FieldValue::String(s.clone()),
            Value::Array(items) => FieldValue::Sequence(
                items
                    .iter()
                    .map(FieldValue::from_json)
                    .collect::<RecordResult<Vec<_>>>()?,
            ),
            Value::Object(map) => match map.get("$type").and_then(Value::as_str) {
                Some(tag) => decode_tagged(tag, map)?,
                None => FieldValue::Object(
                    map.iter()
                        .map(|(k, v)| Ok((k.clone(), FieldValue::from_json(v)?)))
                        .collect::<RecordResult<BTreeMap<_, _>>>()?,
                ),
            },
        })
    }

    /// Encode to the wire form
    pub fn to_json(&self) -> Value {
        match self {
            FieldValue::Null => Value::Null,
            FieldValue::Boolean(b) => Value::Bool(*b),
            FieldValue::Integer(i) => Value::from(*i),
            FieldValue::Number(n) => Number::from_f64(*n).map(Value::Number).unwrap_or(Value::Null),
            FieldValue::String(s) => Value::String(s.clone()),
            FieldValue::DateTime(dt) => {
                let mut m = Map::new();
                m.insert("$type".into(), Value::String("date".into()));
                m.insert(
                    "$date".into(),
                    Value::String(dt.to_rfc3339_opts(SecondsFormat::AutoSi, true)),
                );
                Value::Object(m)
            }
            FieldValue::Reference(id) => reference_json(id),
            FieldValue::Asset(asset) => {
                let mut m = Map::new();
                m.insert("$type".into(), Value::String("asset".into()));
                m.insert("$name".into(), Value::String(asset.name.clone()));
                if let Some(ct) = &asset.content_type {
                    m.insert("$content_type".into(), Value::String(ct.clone()));
                }
                if let Some(size) = asset.size {
                    m.insert("$size".into(), Value::from(size));
                }
                if let Some(url) = &asset.url {
                    m.insert("$url".into(), Value::String(url.clone()));
                }
                Value::Object(m)
            }
            FieldValue::Location(point) => {
                let mut m = Map::new();
                m.insert("$type".into(), Value::String("geo".into()));
                m.insert("$lat".into(), Number::from_f64(point.lat).map(Value::Number).unwrap_or(Value::Null));
                m.insert("$lng".into(), Number::from_f64(point.lng).map(Value::Number).unwrap_or(Value::Null));
                Value::Object(m)
            }
            FieldValue::Sequence(items) => Value::Array(items.iter().map(FieldValue::to_json).collect()),
            FieldValue::Object(map) => {
                Value::Object(map.iter().map(|(k, v)| (k.clone(), v.to_json())).collect())
            }
        }
    }
}

/// Wire form of a reference, including the split identity keys
pub fn reference_json(id: &RecordId) -> Value {
    let mut m = Map::new();
    m.insert("$type".into(), Value::String("ref".into()));
    m.insert("$id".into(), Value::String(id.to_string()));
    m.insert("$recordType".into(), Value::String(id.record_type().to_string()));
    m.insert("$recordID".into(), Value::String(id.key().to_string()));
    Value::Object(m)
}

fn decode_tagged(tag: &str, map: &Map<String, Value>) -> RecordResult<FieldValue> {
    match tag {
        "date" => {
            let raw = required_str(map, "$date", tag)?;
            let dt = DateTime::parse_from_rfc3339(raw).map_err(|e| {
                RecordError::invalid_argument(format!("invalid date `{}`: {}", raw, e), &["$date"])
            })?;
            Ok(FieldValue::DateTime(dt.with_timezone(&Utc)))
        }
        "ref" => {
            if let Some(raw) = map.get("$id").and_then(Value::as_str) {
                return Ok(FieldValue::Reference(RecordId::parse(raw)?));
            }
            let record_type = required_str(map, "$recordType", tag)?;
            let key = required_str(map, "$recordID", tag)?;
            Ok(FieldValue::Reference(RecordId::new(record_type, key)))
        }
        "asset" => Ok(FieldValue::Asset(Asset {
            name: required_str(map, "$name", tag)?.to_string(),
            content_type: map.get("$content_type").and_then(Value::as_str).map(str::to_string),
            size: map.get("$size").and_then(Value::as_u64),
            url: map.get("$url").and_then(Value::as_str).map(str::to_string),
        })),
        "geo" => {
            let lat = map.get("$lat").and_then(Value::as_f64);
            let lng = map.get("$lng").and_then(Value::as_f64);
            match (lat, lng) {
                (Some(lat), Some(lng)) => Ok(FieldValue::Location(GeoPoint { lat, lng })),
                _ => Err(RecordError::invalid_argument(
                    "geo value requires numeric $lat and $lng",
                    &["$lat", "$lng"],
                )),
            }
        }
        other => Err(RecordError::invalid_argument(
            format!("unsupported value type `{}`", other),
            &["$type"],
        )),
    }
}

fn required_str<'a>(map: &'a Map<String, Value>, key: &str, tag: &str) -> RecordResult<&'a str> {
    map.get(key).and_then(Value::as_str).ok_or_else(|| {
        RecordError::invalid_argument(format!("{} value requires string {}", tag, key), &[key])
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_scalars() {
        assert_eq!(FieldValue::from_json(&json!(12)).unwrap(), FieldValue::Integer(12));
        assert_eq!(FieldValue::from_json(&json!(1.5)).unwrap(), FieldValue::Number(1.5));
        assert_eq!(
            FieldValue::from_json(&json!("twelve")).unwrap(),
            FieldValue::String("twelve".into())
        );
    }

    #[test]
    fn test_reference_output_splits_identity() {
        let value = FieldValue::from_json(&json!({"$type": "ref", "$id": "user/1"})).unwrap();
        assert_eq!(value.as_reference(), Some(&RecordId::new("user", "1")));

        let out = value.to_json();
        assert_eq!(out["$recordType"], "user");
        assert_eq!(out["$recordID"], "1");
    }

    #[test]
    fn test_date_decodes_to_utc() {
        let value =
            FieldValue::from_json(&json!({"$type": "date", "$date": "2016-01-02T11:04:05+08:00"}))
                .unwrap();
        assert_eq!(
            value.to_json(),
            json!({"$type": "date", "$date": "2016-01-02T03:04:05Z"})
        );
    }

    #[test]
    fn test_bare_asset() {
        let value = FieldValue::from_json(&json!({"$type": "asset", "$name": "a.png"})).unwrap();
        match value {
            FieldValue::Asset(asset) => assert!(asset.is_bare()),
            other => panic!("expected asset, got {:?}", other),
        }
    }

    #[test]
    fn test_unknown_type_tag_rejected() {
        let err = FieldValue::from_json(&json!({"$type": "blob"})).unwrap_err();
        assert_eq!(err.code(), crate::error::ErrorCode::InvalidArgument);
    }

    #[test]
    fn test_distance() {
        let a = GeoPoint { lat: 0.0, lng: 0.0 };
        let b = GeoPoint { lat: 0.0, lng: 1.0 };
        let d = a.distance_to(&b);
        assert!((d - 111_195.0).abs() < 100.0);
    }
}
