//! recordcore - Access-controlled batch record engine
//!
//! Executes batches of typed record operations (save, fetch, query, delete)
//! against a pluggable record store, enforcing per-field and per-record
//! access control and all-or-nothing semantics for atomic batches.
//!
//! Subsystems, leaves first:
//!
//! - `record`: identity, typed values and record documents
//! - `acl`: principals and the field access evaluator
//! - `query`: predicate trees, parsing and the pre-execution ACL walk
//! - `schema`: field types and additive schema evolution
//! - `store`: store capabilities and an in-memory store
//! - `mutation`: per-item mutations and the atomic coordinator
//! - `filter`: output redaction and eager reference resolution
//! - `api`: payload decoding and action dispatch

pub mod acl;
pub mod api;
pub mod config;
pub mod context;
pub mod error;
pub mod filter;
pub mod mutation;
pub mod observability;
pub mod query;
pub mod record;
pub mod schema;
pub mod store;

pub use api::{BatchResponse, RecordService};
pub use config::EngineConfig;
pub use context::RequestContext;
pub use error::{ErrorCode, RecordError, RecordResult};
