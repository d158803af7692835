//! Record service
//!
//! Entry point for the four record actions. Collaborators are wired in
//! explicitly at construction; the acting principal, privilege flag and
//! deadline arrive with every call in the [`RequestContext`].

use std::collections::BTreeMap;
use std::sync::Arc;

use serde_json::Value;
use tracing::{debug, info, warn};

use super::request::{DeleteRequest, FetchRequest, SaveRequest};
use super::response::{tombstone, BatchResponse};
use crate::acl::FieldAcl;
use crate::config::EngineConfig;
use crate::context::RequestContext;
use crate::error::{RecordError, RecordResult};
use crate::filter::{EagerLoader, RecordResultFilter};
use crate::mutation::{AtomicCoordinator, RecordModifyRequest, RecordModifyResponse, RecordMutator};
use crate::observability::Event;
use crate::query::{FieldPath, QueryAccessVisitor, QueryParser};
use crate::record::{AccessLevel, Record, RecordId};
use crate::schema::SchemaGuard;
use crate::store::{AssetStore, EventSender, RecordStore};

type ActionHandler = fn(&RecordService, &Value, &RequestContext) -> RecordResult<BatchResponse>;

/// Action tag to handler
const ACTIONS: &[(&str, ActionHandler)] = &[
    ("record:save", RecordService::save),
    ("record:fetch", RecordService::fetch),
    ("record:query", RecordService::query),
    ("record:delete", RecordService::delete),
];

pub struct RecordService {
    store: Arc<dyn RecordStore>,
    assets: Arc<dyn AssetStore>,
    events: Option<Arc<dyn EventSender>>,
    config: EngineConfig,
}

impl RecordService {
    pub fn new(store: Arc<dyn RecordStore>, assets: Arc<dyn AssetStore>, config: EngineConfig) -> Self {
        Self {
            store,
            assets,
            events: None,
            config,
        }
    }

    /// Receiver of schema-changed notifications
    pub fn with_event_sender(mut self, events: Arc<dyn EventSender>) -> Self {
        self.events = Some(events);
        self
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Actions this service answers to
    pub fn actions() -> impl Iterator<Item = &'static str> {
        ACTIONS.iter().map(|(tag, _)| *tag)
    }

    /// Dispatch a payload by action tag.
    ///
    /// # Errors
    ///
    /// UndefinedOperation naming the tag if no handler is registered for it.
    pub fn handle(&self, action: &str, payload: &Value, ctx: &RequestContext) -> RecordResult<BatchResponse> {
        let handler = ACTIONS
            .iter()
            .find(|(tag, _)| *tag == action)
            .map(|(_, handler)| *handler)
            .ok_or_else(|| RecordError::undefined_operation(action))?;
        handler(self, payload, ctx)
    }

    /// `record:save`
    pub fn save(&self, payload: &Value, ctx: &RequestContext) -> RecordResult<BatchResponse> {
        if self.store.is_read_only() {
            return Err(RecordError::not_supported("cannot save records to a read-only store"));
        }
        let request = SaveRequest::decode(payload, &self.config)?;
        info!(
            event = %Event::BatchReceived,
            request_id = %ctx.request_id,
            action = "record:save",
            items = request.items.len(),
            atomic = request.atomic,
            "batch received"
        );

        if request.atomic && self.store.transactional().is_none() {
            return Err(RecordError::not_supported("store does not support atomic operation"));
        }

        let records = request.records();
        let field_acl = self.load_field_acl(ctx)?;
        if !records.is_empty() {
            SchemaGuard::new(self.store.as_ref())
                .with_event_sender(self.events.as_deref())
                .extend(ctx, &records)?;
        }

        let req = RecordModifyRequest::save(records).atomic(request.atomic);
        let mut resp = RecordModifyResponse::new();
        let mutator = RecordMutator::new(self.store.as_ref(), &field_acl);
        AtomicCoordinator::new(self.store.as_ref()).run(ctx, &req, &mut resp, |ctx, req, resp| {
            mutator.save_records(ctx, req, resp)
        })?;
        ctx.ensure_active()?;

        let filter = self.result_filter(&field_acl, ctx);
        let mut saved = resp.saved_records.iter();
        // Position among the decoded records handed to the mutator
        let mut pos = 0;
        let result = request
            .items
            .iter()
            .map(|item| match item {
                Err(failure) => failure.to_json(),
                Ok(record) => {
                    let outcome = resp.item_error(pos);
                    pos += 1;
                    match outcome {
                        Some(err) => err.to_json_for(&record.id),
                        None => saved
                            .next()
                            .map(|r| Value::Object(filter.filter(ctx, r)))
                            .unwrap_or(Value::Null),
                    }
                }
            })
            .collect();
        Ok(self.finish(ctx, "record:save", BatchResponse::new(result)))
    }

    /// `record:fetch`
    pub fn fetch(&self, payload: &Value, ctx: &RequestContext) -> RecordResult<BatchResponse> {
        let request = FetchRequest::decode(payload, &self.config)?;
        info!(
            event = %Event::BatchReceived,
            request_id = %ctx.request_id,
            action = "record:fetch",
            items = request.ids.len(),
            "batch received"
        );

        let field_acl = self.load_field_acl(ctx)?;
        let by_id: BTreeMap<RecordId, Record> = self
            .store
            .get_many(ctx, &request.ids)?
            .into_iter()
            .map(|r| (r.id.clone(), r))
            .collect();

        let options = ctx.access();
        let outcomes: Vec<RecordResult<&Record>> = request
            .ids
            .iter()
            .map(|id| match by_id.get(id) {
                None => Err(RecordError::not_found(format!("record {} not found", id))),
                Some(record)
                    if !options.bypass_access_control()
                        && !record.accessible(options.principal(), AccessLevel::Read) =>
                {
                    Err(RecordError::permission_denied(format!("no permission to read record {}", id)))
                }
                Some(record) => Ok(record),
            })
            .collect();

        let found: Vec<Record> = outcomes
            .iter()
            .filter_map(|o| o.as_ref().ok().map(|r| (*r).clone()))
            .collect();
        let rendered = self.render(ctx, &field_acl, &found, &request.include);
        ctx.ensure_active()?;

        let mut rendered = rendered.into_iter();
        let result = request
            .ids
            .iter()
            .zip(&outcomes)
            .map(|(id, outcome)| match outcome {
                Err(err) => err.to_json_for(id),
                Ok(_) => rendered.next().unwrap_or(Value::Null),
            })
            .collect();
        Ok(self.finish(ctx, "record:fetch", BatchResponse::new(result)))
    }

    /// `record:query`
    pub fn query(&self, payload: &Value, ctx: &RequestContext) -> RecordResult<BatchResponse> {
        let query = QueryParser::new(&self.config).parse(payload)?;
        info!(
            event = %Event::BatchReceived,
            request_id = %ctx.request_id,
            action = "record:query",
            record_type = %query.record_type,
            "batch received"
        );

        let field_acl = self.load_field_acl(ctx)?;
        let catalog = self.store.schemas(ctx)?;
        if let Err(err) = QueryAccessVisitor::new(&field_acl, &catalog, ctx.access()).check(&query) {
            warn!(
                event = %Event::QueryDenied,
                request_id = %ctx.request_id,
                record_type = %query.record_type,
                error = %err,
                "query rejected before execution"
            );
            return Err(err);
        }

        let results = self.store.query(ctx, &query)?;
        debug!(
            event = %Event::QueryExecuted,
            request_id = %ctx.request_id,
            matched = results.records.len(),
            "query executed"
        );
        let rendered = self.render(ctx, &field_acl, &results.records, &query.eager_load);
        ctx.ensure_active()?;

        let mut response = BatchResponse::new(rendered);
        if let Some(count) = results.total_count {
            response = response.with_info("count", Value::from(count));
        }
        Ok(self.finish(ctx, "record:query", response))
    }

    /// `record:delete`
    pub fn delete(&self, payload: &Value, ctx: &RequestContext) -> RecordResult<BatchResponse> {
        if self.store.is_read_only() {
            return Err(RecordError::not_supported("cannot delete records from a read-only store"));
        }
        let request = DeleteRequest::decode(payload, &self.config)?;
        info!(
            event = %Event::BatchReceived,
            request_id = %ctx.request_id,
            action = "record:delete",
            items = request.ids.len(),
            atomic = request.atomic,
            "batch received"
        );

        let field_acl = self.load_field_acl(ctx)?;
        let req = RecordModifyRequest::delete(request.ids.clone()).atomic(request.atomic);
        let mut resp = RecordModifyResponse::new();
        let mutator = RecordMutator::new(self.store.as_ref(), &field_acl);
        AtomicCoordinator::new(self.store.as_ref()).run(ctx, &req, &mut resp, |ctx, req, resp| {
            mutator.delete_records(ctx, req, resp)
        })?;
        ctx.ensure_active()?;

        let result = request
            .ids
            .iter()
            .enumerate()
            .map(|(pos, id)| match resp.item_error(pos) {
                Some(err) => err.to_json_for(id),
                None => tombstone(id),
            })
            .collect();
        Ok(self.finish(ctx, "record:delete", BatchResponse::new(result)))
    }

    /// Field ACL read fresh for this request, with configured reserved fields
    fn load_field_acl(&self, ctx: &RequestContext) -> RecordResult<FieldAcl> {
        Ok(self
            .store
            .field_acl(ctx)?
            .with_reserved(self.config.reserved_fields.iter().cloned()))
    }

    fn result_filter<'a>(&'a self, field_acl: &'a FieldAcl, ctx: &'a RequestContext) -> RecordResultFilter<'a> {
        RecordResultFilter::new(field_acl, ctx.access()).with_asset_store(Some(self.assets.as_ref()))
    }

    /// Filter records and resolve eager paths, preserving order
    fn render(
        &self,
        ctx: &RequestContext,
        field_acl: &FieldAcl,
        records: &[Record],
        eager: &[FieldPath],
    ) -> Vec<Value> {
        let filter = self.result_filter(field_acl, ctx);
        let mut rendered: Vec<_> = records.iter().map(|r| filter.filter(ctx, r)).collect();
        EagerLoader::new(self.store.as_ref(), &filter).embed(ctx, records, &mut rendered, eager);
        rendered.into_iter().map(Value::Object).collect()
    }

    fn finish(&self, ctx: &RequestContext, action: &str, response: BatchResponse) -> BatchResponse {
        let errors = response
            .result
            .iter()
            .filter(|item| item.get("_type").and_then(Value::as_str) == Some("error"))
            .count();
        info!(
            event = %Event::BatchComplete,
            request_id = %ctx.request_id,
            action = action,
            items = response.len(),
            errors = errors,
            "batch complete"
        );
        response
    }
}
