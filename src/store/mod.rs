//! # Store Capabilities
//!
//! Abstract collaborators consumed by the record engine. The engine owns no
//! persisted state; everything goes through these traits.
//!
//! Every store call receives the [`RequestContext`] so implementations can
//! honour the deadline and cancellation state. Isolation between concurrent
//! batches is the store's responsibility.

mod memory;

use std::collections::BTreeMap;

pub use memory::{InMemoryStore, MemoryAssetStore, RecordingEventSender};

use crate::acl::FieldAcl;
use crate::context::RequestContext;
use crate::error::RecordResult;
use crate::query::Query;
use crate::record::{Asset, Record, RecordId};
use crate::schema::{FieldType, SchemaCatalog};

/// Records matched by a query
#[derive(Debug, Clone, Default, PartialEq)]
pub struct QueryResults {
    pub records: Vec<Record>,
    /// Total matches before pagination, when the query asked for it
    pub total_count: Option<u64>,
}

/// Transaction control for stores that support it
pub trait Transactional: Send + Sync {
    fn begin(&self, ctx: &RequestContext) -> RecordResult<()>;

    fn commit(&self, ctx: &RequestContext) -> RecordResult<()>;

    /// Must succeed even when the context is already cancelled
    fn rollback(&self, ctx: &RequestContext) -> RecordResult<()>;
}

/// Record storage backend
pub trait RecordStore: Send + Sync {
    /// Read one record by id
    fn get(&self, ctx: &RequestContext, id: &RecordId) -> RecordResult<Option<Record>>;

    /// Read many records in one round trip. Missing ids are omitted.
    fn get_many(&self, ctx: &RequestContext, ids: &[RecordId]) -> RecordResult<Vec<Record>>;

    /// Insert or replace a record
    fn save(&self, ctx: &RequestContext, record: &Record) -> RecordResult<()>;

    /// Delete a record. Fails with ResourceNotFound if absent.
    fn delete(&self, ctx: &RequestContext, id: &RecordId) -> RecordResult<()>;

    /// Run a query, applying record-level access control unless the
    /// context bypasses it
    fn query(&self, ctx: &RequestContext, query: &Query) -> RecordResult<QueryResults>;

    /// Current field ACL table
    fn field_acl(&self, ctx: &RequestContext) -> RecordResult<FieldAcl>;

    /// Current schemas of all record types
    fn schemas(&self, ctx: &RequestContext) -> RecordResult<SchemaCatalog>;

    /// Add fields to a record type's schema
    fn extend_schema(
        &self,
        ctx: &RequestContext,
        record_type: &str,
        fields: &BTreeMap<String, FieldType>,
    ) -> RecordResult<()>;

    fn is_read_only(&self) -> bool {
        false
    }

    /// Transaction capability, if the backend has one
    fn transactional(&self) -> Option<&dyn Transactional> {
        None
    }
}

/// Asset metadata lookup
pub trait AssetStore: Send + Sync {
    /// Complete a bare asset name into a full descriptor
    fn complete(&self, name: &str) -> RecordResult<Asset>;
}

/// Events emitted to external listeners
#[derive(Debug, Clone, PartialEq)]
pub enum StoreEvent {
    SchemaChanged {
        record_types: Vec<String>,
        schemas: SchemaCatalog,
    },
}

impl StoreEvent {
    pub fn name(&self) -> &'static str {
        match self {
            StoreEvent::SchemaChanged { .. } => "schema-changed",
        }
    }
}

/// Fire-and-forget event delivery
pub trait EventSender: Send + Sync {
    fn notify(&self, event: &StoreEvent) -> RecordResult<()>;
}
