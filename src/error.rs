//! # Record Errors
//!
//! Unified error taxonomy for batch record operations.
//!
//! Every error carries a machine-readable code, a human message and
//! optional structured info. Errors serialize to the wire error object:
//!
//! ```text
//! {"_type": "error", "name": ..., "code": ..., "message": ..., "info"?: {...}}
//! ```

use std::fmt;

use serde_json::{Map, Value};
use thiserror::Error;

use crate::record::RecordId;

/// Result type for record operations
pub type RecordResult<T> = Result<T, RecordError>;

/// Machine-readable error codes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCode {
    NotAuthenticated,
    PermissionDenied,
    BadRequest,
    InvalidArgument,
    ResourceNotFound,
    NotSupported,
    IncompatibleSchema,
    AtomicOperationFailure,
    UndefinedOperation,
    RecordQueryInvalid,
    RequestTimeout,
    UnexpectedError,
}

impl ErrorCode {
    /// Returns the stable error name
    pub fn name(&self) -> &'static str {
        match self {
            ErrorCode::NotAuthenticated => "NotAuthenticated",
            ErrorCode::PermissionDenied => "PermissionDenied",
            ErrorCode::BadRequest => "BadRequest",
            ErrorCode::InvalidArgument => "InvalidArgument",
            ErrorCode::ResourceNotFound => "ResourceNotFound",
            ErrorCode::NotSupported => "NotSupported",
            ErrorCode::IncompatibleSchema => "IncompatibleSchema",
            ErrorCode::AtomicOperationFailure => "AtomicOperationFailure",
            ErrorCode::UndefinedOperation => "UndefinedOperation",
            ErrorCode::RecordQueryInvalid => "RecordQueryInvalid",
            ErrorCode::RequestTimeout => "RequestTimeout",
            ErrorCode::UnexpectedError => "UnexpectedError",
        }
    }

    /// Returns the numeric wire code
    pub fn code(&self) -> u32 {
        match self {
            ErrorCode::NotAuthenticated => 101,
            ErrorCode::PermissionDenied => 102,
            ErrorCode::BadRequest => 107,
            ErrorCode::InvalidArgument => 108,
            ErrorCode::ResourceNotFound => 110,
            ErrorCode::NotSupported => 111,
            ErrorCode::IncompatibleSchema => 114,
            ErrorCode::AtomicOperationFailure => 115,
            ErrorCode::UndefinedOperation => 117,
            ErrorCode::RecordQueryInvalid => 120,
            ErrorCode::RequestTimeout => 122,
            ErrorCode::UnexpectedError => 10000,
        }
    }

    /// Returns whether the caller must change the request before retrying
    pub fn is_client_error(&self) -> bool {
        !matches!(
            self,
            ErrorCode::UnexpectedError | ErrorCode::RequestTimeout
        )
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}

/// Error produced by any stage of a record batch
#[derive(Debug, Clone, PartialEq, Error)]
#[error("{code}: {message}")]
pub struct RecordError {
    code: ErrorCode,
    message: String,
    info: Option<Map<String, Value>>,
}

impl RecordError {
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            info: None,
        }
    }

    pub fn with_info(code: ErrorCode, message: impl Into<String>, info: Map<String, Value>) -> Self {
        Self {
            code,
            message: message.into(),
            info: Some(info),
        }
    }

    /// Malformed payload that could not be decoded at all
    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::BadRequest, message)
    }

    /// Structurally valid payload carrying an invalid argument
    pub fn invalid_argument(message: impl Into<String>, arguments: &[&str]) -> Self {
        let mut info = Map::new();
        info.insert(
            "arguments".into(),
            Value::Array(arguments.iter().map(|a| Value::String(a.to_string())).collect()),
        );
        Self::with_info(ErrorCode::InvalidArgument, message, info)
    }

    pub fn permission_denied(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::PermissionDenied, message)
    }

    /// Field-level denial naming the record type and field
    pub fn field_denied(record_type: &str, field: &str, message: impl Into<String>) -> Self {
        let mut info = Map::new();
        info.insert("record_type".into(), Value::String(record_type.to_string()));
        info.insert("field".into(), Value::String(field.to_string()));
        Self::with_info(ErrorCode::PermissionDenied, message, info)
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::ResourceNotFound, message)
    }

    pub fn not_supported(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::NotSupported, message)
    }

    pub fn incompatible_schema(record_type: &str, field: &str, message: impl Into<String>) -> Self {
        let mut info = Map::new();
        info.insert("record_type".into(), Value::String(record_type.to_string()));
        info.insert("field".into(), Value::String(field.to_string()));
        Self::with_info(ErrorCode::IncompatibleSchema, message, info)
    }

    pub fn query_invalid(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::RecordQueryInvalid, message)
    }

    pub fn undefined_operation(action: &str) -> Self {
        Self::new(
            ErrorCode::UndefinedOperation,
            format!("undefined operation: {}", action),
        )
    }

    pub fn timeout(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::RequestTimeout, message)
    }

    pub fn unexpected(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::UnexpectedError, message)
    }

    pub fn code(&self) -> ErrorCode {
        self.code
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    pub fn info(&self) -> Option<&Map<String, Value>> {
        self.info.as_ref()
    }

    /// Serializes to the wire error object without record identity
    pub fn to_json(&self) -> Value {
        let mut m = Map::new();
        m.insert("_type".into(), Value::String("error".into()));
        m.insert("name".into(), Value::String(self.code.name().into()));
        m.insert("code".into(), Value::from(self.code.code()));
        m.insert("message".into(), Value::String(self.message.clone()));
        if let Some(info) = &self.info {
            m.insert("info".into(), Value::Object(info.clone()));
        }
        Value::Object(m)
    }

    /// Serializes to the wire error object correlated with a record
    pub fn to_json_for(&self, id: &RecordId) -> Value {
        let mut value = self.to_json();
        if let Value::Object(m) = &mut value {
            m.insert("_id".into(), Value::String(id.to_string()));
            m.insert("_recordType".into(), Value::String(id.record_type().to_string()));
            m.insert("_recordID".into(), Value::String(id.key().to_string()));
        }
        value
    }
}

impl From<serde_json::Error> for RecordError {
    fn from(e: serde_json::Error) -> Self {
        Self::bad_request(format!("fails to decode the request payload: {}", e))
    }
}
