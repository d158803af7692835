//! In-memory store
//!
//! Reference implementation of the store capabilities, used by tests and
//! embedders that need no persistence. A transaction belongs to the request
//! that began it and keeps an undo log of the ids that request wrote; rollback
//! restores only those. One atomic batch may be open at a time, while other
//! requests keep writing directly.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Mutex, PoisonError, RwLock};

use uuid::Uuid;

use super::{AssetStore, EventSender, QueryResults, RecordStore, StoreEvent, Transactional};
use crate::acl::{FieldAcl, Principal};
use crate::context::RequestContext;
use crate::error::{RecordError, RecordResult};
use crate::query::{sort_records, EvalContext, PredicateFilter, Query};
use crate::record::{AccessLevel, Asset, Record, RecordId};
use crate::schema::{FieldType, SchemaCatalog};

type RecordMap = BTreeMap<RecordId, Record>;

/// Open transaction: owning request and the prior value of every id it wrote
struct OpenTransaction {
    owner: Uuid,
    undo: BTreeMap<RecordId, Option<Record>>,
}

fn owns(transaction: &Option<OpenTransaction>, ctx: &RequestContext) -> bool {
    transaction.as_ref().map_or(false, |tx| tx.owner == ctx.request_id)
}

fn poisoned<T>(_: PoisonError<T>) -> RecordError {
    RecordError::unexpected("store lock poisoned")
}

/// Record store held in process memory
pub struct InMemoryStore {
    records: RwLock<RecordMap>,
    transaction: Mutex<Option<OpenTransaction>>,
    field_acl: RwLock<FieldAcl>,
    schemas: RwLock<SchemaCatalog>,
    transactions: bool,
    read_only: bool,
    failing_saves: RwLock<BTreeSet<RecordId>>,
    fail_commit: AtomicBool,
    fail_batch_reads: AtomicBool,
    record_reads: AtomicUsize,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self {
            records: RwLock::new(RecordMap::new()),
            transaction: Mutex::new(None),
            field_acl: RwLock::new(FieldAcl::default()),
            schemas: RwLock::new(SchemaCatalog::new()),
            transactions: true,
            read_only: false,
            failing_saves: RwLock::new(BTreeSet::new()),
            fail_commit: AtomicBool::new(false),
            fail_batch_reads: AtomicBool::new(false),
            record_reads: AtomicUsize::new(0),
        }
    }

    /// Drop the transaction capability
    pub fn without_transactions(mut self) -> Self {
        self.transactions = false;
        self
    }

    pub fn read_only(mut self) -> Self {
        self.read_only = true;
        self
    }

    pub fn with_field_acl(self, acl: FieldAcl) -> Self {
        self.set_field_acl(acl);
        self
    }

    pub fn with_schemas(mut self, schemas: SchemaCatalog) -> Self {
        self.schemas = RwLock::new(schemas);
        self
    }

    /// Seed records directly, bypassing access control and schema checks
    pub fn with_records(self, records: impl IntoIterator<Item = Record>) -> Self {
        if let Ok(mut map) = self.records.write() {
            for record in records {
                map.insert(record.id.clone(), record);
            }
        }
        self
    }

    /// Replace the field ACL table, as an administrator would
    pub fn set_field_acl(&self, acl: FieldAcl) {
        if let Ok(mut current) = self.field_acl.write() {
            *current = acl;
        }
    }

    /// Make every later save of `id` fail
    pub fn fail_saves_of(&self, id: RecordId) {
        if let Ok(mut failing) = self.failing_saves.write() {
            failing.insert(id);
        }
    }

    /// Make the next commit fail
    pub fn fail_next_commit(&self) {
        self.fail_commit.store(true, Ordering::SeqCst);
    }

    /// Make batched reads fail
    pub fn fail_batch_reads(&self, fail: bool) {
        self.fail_batch_reads.store(fail, Ordering::SeqCst);
    }

    /// Number of record reads (get, get_many, query) served so far.
    /// Schema and field ACL loads are not counted.
    pub fn record_reads(&self) -> usize {
        self.record_reads.load(Ordering::SeqCst)
    }

    /// Inspect a stored record without counting a read
    pub fn peek(&self, id: &RecordId) -> Option<Record> {
        self.records.read().ok().and_then(|map| map.get(id).cloned())
    }

    /// Current schemas without a request context
    pub fn peek_schemas(&self) -> SchemaCatalog {
        self.schemas.read().map(|s| s.clone()).unwrap_or_default()
    }

    pub fn len(&self) -> usize {
        self.records.read().map(|map| map.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn in_transaction(&self) -> bool {
        self.transaction.lock().map(|t| t.is_some()).unwrap_or(false)
    }

    /// Remember the prior value of `id` if `ctx` owns the open transaction
    fn log_undo(&self, ctx: &RequestContext, records: &RecordMap, id: &RecordId) -> RecordResult<()> {
        let mut transaction = self.transaction.lock().map_err(poisoned)?;
        if let Some(tx) = transaction.as_mut().filter(|tx| tx.owner == ctx.request_id) {
            tx.undo.entry(id.clone()).or_insert_with(|| records.get(id).cloned());
        }
        Ok(())
    }

    fn begin_read(&self, ctx: &RequestContext) -> RecordResult<()> {
        ctx.ensure_active()?;
        self.record_reads.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn begin_write(&self, ctx: &RequestContext) -> RecordResult<()> {
        ctx.ensure_active()?;
        if self.read_only {
            return Err(RecordError::not_supported("store is read only"));
        }
        Ok(())
    }
}

impl Default for InMemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

/// Evaluation view over a locked record map
struct MemoryView<'a> {
    records: &'a RecordMap,
    principal: &'a Principal,
    bypass: bool,
}

impl MemoryView<'_> {
    fn run(&self, query: &Query) -> Vec<Record> {
        self.records
            .values()
            .filter(|r| r.id.record_type() == query.record_type)
            .filter(|r| self.bypass || r.accessible(self.principal, AccessLevel::Read))
            .filter(|r| {
                query
                    .predicate
                    .as_ref()
                    .map_or(true, |p| PredicateFilter::matches(r, p, self))
            })
            .cloned()
            .collect()
    }
}

impl EvalContext for MemoryView<'_> {
    fn lookup(&self, id: &RecordId) -> Option<Record> {
        self.records.get(id).cloned()
    }

    fn subquery_ids(&self, query: &Query) -> BTreeSet<RecordId> {
        self.run(query).into_iter().map(|r| r.id).collect()
    }
}

impl RecordStore for InMemoryStore {
    fn get(&self, ctx: &RequestContext, id: &RecordId) -> RecordResult<Option<Record>> {
        self.begin_read(ctx)?;
        let records = self.records.read().map_err(poisoned)?;
        Ok(records.get(id).cloned())
    }

    fn get_many(&self, ctx: &RequestContext, ids: &[RecordId]) -> RecordResult<Vec<Record>> {
        self.begin_read(ctx)?;
        if self.fail_batch_reads.load(Ordering::SeqCst) {
            return Err(RecordError::unexpected("batched read failed"));
        }
        let records = self.records.read().map_err(poisoned)?;
        Ok(ids.iter().filter_map(|id| records.get(id).cloned()).collect())
    }

    fn save(&self, ctx: &RequestContext, record: &Record) -> RecordResult<()> {
        self.begin_write(ctx)?;
        if self.failing_saves.read().map_err(poisoned)?.contains(&record.id) {
            return Err(RecordError::unexpected(format!("fail to save record {}", record.id)));
        }
        let mut records = self.records.write().map_err(poisoned)?;
        self.log_undo(ctx, &records, &record.id)?;
        records.insert(record.id.clone(), record.clone());
        Ok(())
    }

    fn delete(&self, ctx: &RequestContext, id: &RecordId) -> RecordResult<()> {
        self.begin_write(ctx)?;
        let mut records = self.records.write().map_err(poisoned)?;
        self.log_undo(ctx, &records, id)?;
        match records.remove(id) {
            Some(_) => Ok(()),
            None => Err(RecordError::not_found(format!("record {} not found", id))),
        }
    }

    fn query(&self, ctx: &RequestContext, query: &Query) -> RecordResult<QueryResults> {
        self.begin_read(ctx)?;
        let records = self.records.read().map_err(poisoned)?;
        let view = MemoryView {
            records: &*records,
            principal: ctx.principal(),
            bypass: ctx.access().bypass_access_control(),
        };

        let mut matched = view.run(query);
        let total_count = query.get_count.then(|| matched.len() as u64);
        sort_records(&mut matched, &query.sorts, &view);

        let offset = usize::try_from(query.offset).unwrap_or(usize::MAX);
        let limit = query
            .limit
            .map(|l| usize::try_from(l).unwrap_or(usize::MAX))
            .unwrap_or(usize::MAX);
        Ok(QueryResults {
            records: matched.into_iter().skip(offset).take(limit).collect(),
            total_count,
        })
    }

    fn field_acl(&self, ctx: &RequestContext) -> RecordResult<FieldAcl> {
        ctx.ensure_active()?;
        Ok(self.field_acl.read().map_err(poisoned)?.clone())
    }

    fn schemas(&self, ctx: &RequestContext) -> RecordResult<SchemaCatalog> {
        ctx.ensure_active()?;
        Ok(self.schemas.read().map_err(poisoned)?.clone())
    }

    fn extend_schema(
        &self,
        ctx: &RequestContext,
        record_type: &str,
        fields: &BTreeMap<String, FieldType>,
    ) -> RecordResult<()> {
        self.begin_write(ctx)?;
        self.schemas.write().map_err(poisoned)?.extend(record_type, fields);
        Ok(())
    }

    fn is_read_only(&self) -> bool {
        self.read_only
    }

    fn transactional(&self) -> Option<&dyn Transactional> {
        if self.transactions {
            Some(self)
        } else {
            None
        }
    }
}

impl Transactional for InMemoryStore {
    fn begin(&self, ctx: &RequestContext) -> RecordResult<()> {
        ctx.ensure_active()?;
        let mut transaction = self.transaction.lock().map_err(poisoned)?;
        if transaction.is_some() {
            return Err(RecordError::unexpected("transaction already in progress"));
        }
        *transaction = Some(OpenTransaction {
            owner: ctx.request_id,
            undo: BTreeMap::new(),
        });
        Ok(())
    }

    fn commit(&self, ctx: &RequestContext) -> RecordResult<()> {
        ctx.ensure_active()?;
        if self.fail_commit.swap(false, Ordering::SeqCst) {
            return Err(RecordError::unexpected("commit failed"));
        }
        let mut transaction = self.transaction.lock().map_err(poisoned)?;
        if !owns(&transaction, ctx) {
            return Err(RecordError::unexpected("no transaction in progress"));
        }
        *transaction = None;
        Ok(())
    }

    fn rollback(&self, ctx: &RequestContext) -> RecordResult<()> {
        // Released before taking the record lock; writers lock records first
        let undo = {
            let mut transaction = self.transaction.lock().map_err(poisoned)?;
            if owns(&transaction, ctx) {
                transaction.take().map(|tx| tx.undo)
            } else {
                None
            }
        };
        let Some(undo) = undo else {
            return Ok(());
        };

        let mut records = self.records.write().map_err(poisoned)?;
        for (id, prior) in undo {
            match prior {
                Some(record) => records.insert(id, record),
                None => records.remove(&id),
            };
        }
        Ok(())
    }
}

/// Asset store backed by a fixed table of descriptors
#[derive(Debug, Default)]
pub struct MemoryAssetStore {
    assets: BTreeMap<String, Asset>,
}

impl MemoryAssetStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_asset(mut self, asset: Asset) -> Self {
        self.assets.insert(asset.name.clone(), asset);
        self
    }
}

impl AssetStore for MemoryAssetStore {
    fn complete(&self, name: &str) -> RecordResult<Asset> {
        self.assets
            .get(name)
            .cloned()
            .ok_or_else(|| RecordError::not_found(format!("asset `{}` not found", name)))
    }
}

/// Event sender that keeps every event it is given
#[derive(Debug, Default)]
pub struct RecordingEventSender {
    events: Mutex<Vec<StoreEvent>>,
    failing: bool,
}

impl RecordingEventSender {
    pub fn new() -> Self {
        Self::default()
    }

    /// Sender whose every delivery fails
    pub fn failing() -> Self {
        Self {
            events: Mutex::new(Vec::new()),
            failing: true,
        }
    }

    pub fn events(&self) -> Vec<StoreEvent> {
        self.events.lock().map(|e| e.clone()).unwrap_or_default()
    }
}

impl EventSender for RecordingEventSender {
    fn notify(&self, event: &StoreEvent) -> RecordResult<()> {
        if self.failing {
            return Err(RecordError::unexpected("event delivery failed"));
        }
        self.events.lock().map_err(poisoned)?.push(event.clone());
        Ok(())
    }
}
