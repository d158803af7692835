//! Per-item save and delete
//!
//! Each item loads the stored original, checks record-level write access
//! and field-level write access, then writes. Failures are recorded against
//! the item's input position and never stop sibling items.

use tracing::debug;

use super::request::{RecordModifyRequest, RecordModifyResponse};
use crate::acl::FieldAcl;
use crate::context::RequestContext;
use crate::error::{RecordError, RecordResult};
use crate::observability::Event;
use crate::record::{AccessLevel, Record, RecordId};
use crate::store::RecordStore;

/// Applies batch items to the store
pub struct RecordMutator<'a> {
    store: &'a dyn RecordStore,
    field_acl: &'a FieldAcl,
}

impl<'a> RecordMutator<'a> {
    pub fn new(store: &'a dyn RecordStore, field_acl: &'a FieldAcl) -> Self {
        Self { store, field_acl }
    }

    /// Save every record of the request, in order
    pub fn save_records(
        &self,
        ctx: &RequestContext,
        req: &RecordModifyRequest,
        resp: &mut RecordModifyResponse,
    ) -> RecordResult<()> {
        for record in &req.records_to_save {
            match self.save_one(ctx, record, req) {
                Ok(saved) => resp.push_saved(saved),
                Err(err) => {
                    debug!(event = %Event::ItemFailed, request_id = %ctx.request_id, record_id = %record.id, error = %err, "save failed");
                    resp.push_failure(&record.id, err);
                }
            }
        }
        Ok(())
    }

    /// Delete every id of the request, in order
    pub fn delete_records(
        &self,
        ctx: &RequestContext,
        req: &RecordModifyRequest,
        resp: &mut RecordModifyResponse,
    ) -> RecordResult<()> {
        for id in &req.ids_to_delete {
            match self.delete_one(ctx, id) {
                Ok(()) => resp.push_deleted(id.clone()),
                Err(err) => {
                    debug!(event = %Event::ItemFailed, request_id = %ctx.request_id, record_id = %id, error = %err, "delete failed");
                    resp.push_failure(id, err);
                }
            }
        }
        Ok(())
    }

    fn save_one(
        &self,
        ctx: &RequestContext,
        incoming: &Record,
        req: &RecordModifyRequest,
    ) -> RecordResult<Record> {
        ctx.ensure_active()?;
        let original = self.store.get(ctx, &incoming.id)?;
        let options = ctx.access();
        let bypass = options.bypass_access_control();
        let record_type = incoming.id.record_type();

        if let Some(original) = &original {
            if !bypass && !original.accessible(options.principal(), AccessLevel::Write) {
                return Err(RecordError::permission_denied(format!(
                    "no permission to modify record {}",
                    incoming.id
                )));
            }
        }

        if !bypass {
            for (name, value) in &incoming.data {
                let changed = original
                    .as_ref()
                    .map_or(true, |o| o.get(name) != Some(value));
                if changed && !self.field_acl.can_write(record_type, name, options) {
                    return Err(RecordError::field_denied(
                        record_type,
                        name,
                        format!("no write access to `{}` of `{}`", name, record_type),
                    ));
                }
            }
            let access_changed = incoming.access.is_some()
                && original.as_ref().map_or(true, |o| o.access != incoming.access);
            if access_changed && !self.field_acl.can_write(record_type, "_access", options) {
                return Err(RecordError::field_denied(
                    record_type,
                    "_access",
                    format!("no write access to `_access` of `{}`", record_type),
                ));
            }
        }

        let actor = options.principal().user_id().map(str::to_string);
        let mut merged = match original {
            Some(original) => original,
            None => {
                let mut created = Record::new(incoming.id.clone());
                created.owner_id = actor.clone();
                created.created_at = Some(req.modified_at);
                created.created_by = actor.clone();
                created
            }
        };
        for (name, value) in &incoming.data {
            merged.data.insert(name.clone(), value.clone());
        }
        if incoming.access.is_some() {
            merged.access = incoming.access.clone();
        }
        merged.updated_at = Some(req.modified_at);
        merged.updated_by = actor;

        ctx.ensure_active()?;
        self.store.save(ctx, &merged)?;
        Ok(merged)
    }

    fn delete_one(&self, ctx: &RequestContext, id: &RecordId) -> RecordResult<()> {
        ctx.ensure_active()?;
        let original = self
            .store
            .get(ctx, id)?
            .ok_or_else(|| RecordError::not_found(format!("record {} not found", id)))?;

        let options = ctx.access();
        if !options.bypass_access_control()
            && !original.accessible(options.principal(), AccessLevel::Write)
        {
            return Err(RecordError::permission_denied(format!(
                "no permission to delete record {}",
                id
            )));
        }

        ctx.ensure_active()?;
        self.store.delete(ctx, id)
    }
}
