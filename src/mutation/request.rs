//! Batch mutation request and response

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};

use crate::error::RecordError;
use crate::record::{Record, RecordId};

/// One batch of saves or deletes. Created per request, consumed once.
#[derive(Debug, Clone, PartialEq)]
pub struct RecordModifyRequest {
    pub atomic: bool,
    pub records_to_save: Vec<Record>,
    pub ids_to_delete: Vec<RecordId>,
    /// Single instant stamped on every record the batch touches
    pub modified_at: DateTime<Utc>,
}

impl RecordModifyRequest {
    pub fn save(records: Vec<Record>) -> Self {
        Self {
            atomic: false,
            records_to_save: records,
            ids_to_delete: Vec::new(),
            modified_at: Utc::now(),
        }
    }

    pub fn delete(ids: Vec<RecordId>) -> Self {
        Self {
            atomic: false,
            records_to_save: Vec::new(),
            ids_to_delete: ids,
            modified_at: Utc::now(),
        }
    }

    pub fn atomic(mut self, atomic: bool) -> Self {
        self.atomic = atomic;
        self
    }

    pub fn modified_at(mut self, at: DateTime<Utc>) -> Self {
        self.modified_at = at;
        self
    }

    /// Number of items in the batch
    pub fn len(&self) -> usize {
        self.records_to_save.len() + self.ids_to_delete.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Per-item outcome of a batch.
///
/// `item_errors` holds one entry per input item, in input order; `None`
/// marks a success. Successful items also appear in `saved_records` /
/// `deleted_ids` in input order. `err_map` keys the first failure of each id.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RecordModifyResponse {
    pub err_map: BTreeMap<RecordId, RecordError>,
    pub saved_records: Vec<Record>,
    pub deleted_ids: Vec<RecordId>,
    pub item_errors: Vec<Option<RecordError>>,
}

impl RecordModifyResponse {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push_saved(&mut self, record: Record) {
        self.saved_records.push(record);
        self.item_errors.push(None);
    }

    pub fn push_deleted(&mut self, id: RecordId) {
        self.deleted_ids.push(id);
        self.item_errors.push(None);
    }

    pub fn push_failure(&mut self, id: &RecordId, err: RecordError) {
        self.err_map.entry(id.clone()).or_insert_with(|| err.clone());
        self.item_errors.push(Some(err));
    }

    /// Error of the item at input position `pos`, if it failed
    pub fn item_error(&self, pos: usize) -> Option<&RecordError> {
        self.item_errors.get(pos).and_then(Option::as_ref)
    }

    pub fn error_for(&self, id: &RecordId) -> Option<&RecordError> {
        self.err_map.get(id)
    }

    pub fn has_errors(&self) -> bool {
        !self.err_map.is_empty()
    }

    /// Forget every success; used when a transaction rolls back
    pub fn clear_successes(&mut self) {
        self.saved_records.clear();
        self.deleted_ids.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_repeated_id_keeps_positions() {
        let id = RecordId::new("note", "a");
        let mut resp = RecordModifyResponse::new();
        resp.push_failure(&id, RecordError::permission_denied("first"));
        resp.push_saved(Record::new(id.clone()));
        resp.push_failure(&id, RecordError::not_found("second"));

        assert_eq!(resp.item_error(0).unwrap().message(), "first");
        assert!(resp.item_error(1).is_none());
        assert_eq!(resp.item_error(2).unwrap().message(), "second");
        assert_eq!(resp.error_for(&id).unwrap().message(), "first");
        assert_eq!(resp.saved_records.len(), 1);
    }
}
