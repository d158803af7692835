//! Schema evolution guard
//!
//! Before a save batch applies, infer types for previously unseen fields and
//! additively extend the stored schema.
//!
//! # Rules
//!
//! - Extension only adds fields; declared types are never narrowed or removed
//! - A value conflicting with a declared type rejects the whole batch, and
//!   nothing is extended
//! - Runs outside any atomic-batch transaction. Schema DDL inside the
//!   transaction deadlocks against row locks, so an extension survives a
//!   later rollback of the batch that triggered it
//! - The schema-changed notification is best-effort

use std::collections::BTreeMap;

use tracing::{info, warn};

use super::types::{FieldType, SchemaCatalog};
use crate::context::RequestContext;
use crate::error::{RecordError, RecordResult};
use crate::observability::Event;
use crate::record::Record;
use crate::store::{EventSender, RecordStore, StoreEvent};

/// Fields to add, per record type
pub type SchemaExtension = BTreeMap<String, BTreeMap<String, FieldType>>;

/// Infers and applies additive schema extensions for a save batch
pub struct SchemaGuard<'a> {
    store: &'a dyn RecordStore,
    events: Option<&'a dyn EventSender>,
}

impl<'a> SchemaGuard<'a> {
    pub fn new(store: &'a dyn RecordStore) -> Self {
        Self {
            store,
            events: None,
        }
    }

    pub fn with_event_sender(mut self, events: Option<&'a dyn EventSender>) -> Self {
        self.events = events;
        self
    }

    /// Compute the extension a batch needs without applying it.
    ///
    /// # Errors
    ///
    /// IncompatibleSchema naming the first conflicting field, either against
    /// the stored schema or between two records of the same batch.
    pub fn plan(catalog: &SchemaCatalog, records: &[Record]) -> RecordResult<SchemaExtension> {
        let mut pending = SchemaExtension::new();

        for record in records {
            let record_type = record.id.record_type();
            for (name, value) in &record.data {
                let Some(incoming) = FieldType::infer(value) else {
                    continue;
                };

                if let Some(declared) = catalog.declared(record_type, name) {
                    if !declared.accepts(&incoming) {
                        return Err(conflict(record_type, name, declared, &incoming));
                    }
                    continue;
                }

                let fields = pending.entry(record_type.to_string()).or_default();
                let unified = match fields.get(name) {
                    None => incoming,
                    Some(seen) => seen
                        .unify(&incoming)
                        .ok_or_else(|| conflict(record_type, name, seen, &incoming))?,
                };
                fields.insert(name.clone(), unified);
            }
        }

        pending.retain(|_, fields| !fields.is_empty());
        Ok(pending)
    }

    /// Extend the stored schema for a batch.
    ///
    /// Returns true if the schema changed.
    pub fn extend(&self, ctx: &RequestContext, records: &[Record]) -> RecordResult<bool> {
        ctx.ensure_active()?;
        let mut catalog = self.store.schemas(ctx)?;

        let extension = Self::plan(&catalog, records).map_err(|err| {
            warn!(event = %Event::SchemaConflict, request_id = %ctx.request_id, error = %err, "schema extension rejected");
            err
        })?;
        if extension.is_empty() {
            return Ok(false);
        }

        for (record_type, fields) in &extension {
            ctx.ensure_active()?;
            self.store.extend_schema(ctx, record_type, fields)?;
            catalog.extend(record_type, fields);
            info!(
                event = %Event::SchemaExtended,
                request_id = %ctx.request_id,
                record_type = %record_type,
                fields = fields.len(),
                "record schema extended"
            );
        }

        self.notify(ctx, extension.keys().cloned().collect(), catalog);
        Ok(true)
    }

    fn notify(&self, ctx: &RequestContext, record_types: Vec<String>, schemas: SchemaCatalog) {
        let Some(events) = self.events else {
            return;
        };
        let event = StoreEvent::SchemaChanged {
            record_types,
            schemas,
        };
        if let Err(err) = events.notify(&event) {
            warn!(
                event = %Event::SchemaEventFailed,
                request_id = %ctx.request_id,
                error = %err,
                "fail to send schema changed event"
            );
        }
    }
}

fn conflict(record_type: &str, field: &str, declared: &FieldType, incoming: &FieldType) -> RecordError {
    RecordError::incompatible_schema(
        record_type,
        field,
        format!(
            "field `{}` of `{}` is {}, got {}",
            field,
            record_type,
            declared.type_name(),
            incoming.type_name()
        ),
    )
}
