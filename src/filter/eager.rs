//! Eager reference resolution
//!
//! Replaces reference fields named by eager paths with the referenced
//! record, loaded through one deduplicated batched read. A target that is
//! missing or not readable becomes a stub carrying the reference and an
//! `$error` marker; the surrounding result is never failed.

use std::collections::{BTreeMap, BTreeSet};

use serde_json::{Map, Value};
use tracing::warn;

use super::result::RecordResultFilter;
use crate::context::RequestContext;
use crate::error::RecordError;
use crate::observability::Event;
use crate::query::FieldPath;
use crate::record::{reference_json, AccessLevel, FieldValue, Record, RecordId};
use crate::store::RecordStore;

/// Resolved target of one reference
type Resolved = Result<Map<String, Value>, RecordError>;

pub struct EagerLoader<'a> {
    store: &'a dyn RecordStore,
    filter: &'a RecordResultFilter<'a>,
}

impl<'a> EagerLoader<'a> {
    pub fn new(store: &'a dyn RecordStore, filter: &'a RecordResultFilter<'a>) -> Self {
        Self { store, filter }
    }

    /// Embed referenced records into already rendered outputs.
    ///
    /// `records[i]` is the source of `rendered[i]`. Only fields still
    /// present in the rendered output are resolved.
    pub fn embed(
        &self,
        ctx: &RequestContext,
        records: &[Record],
        rendered: &mut [Map<String, Value>],
        paths: &[FieldPath],
    ) {
        if paths.is_empty() {
            return;
        }

        let mut targets = BTreeSet::new();
        for (record, output) in records.iter().zip(rendered.iter()) {
            for path in paths {
                let field = path.head();
                if !output.contains_key(field) {
                    continue;
                }
                if let Some(value) = record.get(field) {
                    collect_references(value, &mut targets);
                }
            }
        }
        if targets.is_empty() {
            return;
        }

        let resolved = self.resolve(ctx, targets);
        for (record, output) in records.iter().zip(rendered.iter_mut()) {
            for path in paths {
                let field = path.head();
                if !output.contains_key(field) {
                    continue;
                }
                if let Some(value) = record.get(field) {
                    output.insert(field.to_string(), embed_value(value, &resolved));
                }
            }
        }
    }

    fn resolve(&self, ctx: &RequestContext, targets: BTreeSet<RecordId>) -> BTreeMap<RecordId, Resolved> {
        let ids: Vec<RecordId> = targets.into_iter().collect();
        let loaded = match self.store.get_many(ctx, &ids) {
            Ok(records) => records,
            Err(err) => {
                warn!(
                    event = %Event::EagerLoadDegraded,
                    request_id = %ctx.request_id,
                    targets = ids.len(),
                    error = %err,
                    "fail to eager load references"
                );
                return ids.into_iter().map(|id| (id, Err(err.clone()))).collect();
            }
        };

        let mut by_id: BTreeMap<RecordId, Record> =
            loaded.into_iter().map(|r| (r.id.clone(), r)).collect();
        let options = ctx.access();

        ids.into_iter()
            .map(|id| {
                let outcome = match by_id.remove(&id) {
                    None => Err(RecordError::not_found(format!("record {} not found", id))),
                    Some(target)
                        if !options.bypass_access_control()
                            && !target.accessible(options.principal(), AccessLevel::Read) =>
                    {
                        Err(RecordError::permission_denied(format!(
                            "no permission to read record {}",
                            id
                        )))
                    }
                    Some(target) => Ok(self.filter.filter(ctx, &target)),
                };
                (id, outcome)
            })
            .collect()
    }
}

fn collect_references(value: &FieldValue, targets: &mut BTreeSet<RecordId>) {
    match value {
        FieldValue::Reference(id) => {
            targets.insert(id.clone());
        }
        FieldValue::Sequence(items) => {
            for item in items {
                if let FieldValue::Reference(id) = item {
                    targets.insert(id.clone());
                }
            }
        }
        _ => {}
    }
}

fn embed_value(value: &FieldValue, resolved: &BTreeMap<RecordId, Resolved>) -> Value {
    match value {
        FieldValue::Reference(id) => embed_reference(id, resolved.get(id)),
        FieldValue::Sequence(items) => Value::Array(
            items
                .iter()
                .map(|item| match item {
                    FieldValue::Reference(id) => embed_reference(id, resolved.get(id)),
                    other => other.to_json(),
                })
                .collect(),
        ),
        other => other.to_json(),
    }
}

fn embed_reference(id: &RecordId, outcome: Option<&Resolved>) -> Value {
    let mut stub = reference_json(id);
    if let Value::Object(m) = &mut stub {
        match outcome {
            Some(Ok(record)) => {
                m.insert("$record".into(), Value::Object(record.clone()));
            }
            Some(Err(err)) => {
                m.insert("$error".into(), error_marker(err));
            }
            None => {}
        }
    }
    stub
}

fn error_marker(err: &RecordError) -> Value {
    let mut m = Map::new();
    m.insert("name".into(), Value::String(err.code().name().into()));
    m.insert("code".into(), Value::from(err.code().code()));
    m.insert("message".into(), Value::String(err.message().to_string()));
    Value::Object(m)
}
