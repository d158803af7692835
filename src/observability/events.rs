//! Observability events for the record engine
//!
//! Every notable step of a batch is an explicit, typed event. Events are
//! attached to `tracing` records as the `event` field so log pipelines can
//! filter on a stable name.

use std::fmt;

/// Observable events in the record engine
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Event {
    // Batch lifecycle
    /// Batch decoded and dispatched
    BatchReceived,
    /// Batch finished and results assembled
    BatchComplete,

    // Query
    /// Query rejected by the predicate ACL walk
    QueryDenied,
    /// Query executed against the store
    QueryExecuted,

    // Mutation
    /// Single item of a batch failed
    ItemFailed,
    /// Atomic batch committed
    AtomicCommit,
    /// Atomic batch rolled back
    AtomicRollback,

    // Schema
    /// Stored schema extended with new fields
    SchemaExtended,
    /// Schema change rejected (type conflict)
    SchemaConflict,
    /// Schema-changed notification could not be delivered
    SchemaEventFailed,

    // Result filtering
    /// Asset descriptor could not be completed
    AssetCompletionFailed,
    /// Batched reference fetch failed, stubs emitted
    EagerLoadDegraded,
}

impl Event {
    /// Returns the string representation of the event
    pub fn as_str(&self) -> &'static str {
        match self {
            Event::BatchReceived => "BATCH_RECEIVED",
            Event::BatchComplete => "BATCH_COMPLETE",

            Event::QueryDenied => "QUERY_DENIED",
            Event::QueryExecuted => "QUERY_EXECUTED",

            Event::ItemFailed => "ITEM_FAILED",
            Event::AtomicCommit => "ATOMIC_COMMIT",
            Event::AtomicRollback => "ATOMIC_ROLLBACK",

            Event::SchemaExtended => "SCHEMA_EXTENDED",
            Event::SchemaConflict => "SCHEMA_CONFLICT",
            Event::SchemaEventFailed => "SCHEMA_EVENT_FAILED",

            Event::AssetCompletionFailed => "ASSET_COMPLETION_FAILED",
            Event::EagerLoadDegraded => "EAGER_LOAD_DEGRADED",
        }
    }

    /// Returns true if this event reports a degraded but non-failing path
    pub fn is_degraded(&self) -> bool {
        matches!(
            self,
            Event::SchemaEventFailed | Event::AssetCompletionFailed | Event::EagerLoadDegraded
        )
    }
}

impl fmt::Display for Event {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_names_are_stable() {
        assert_eq!(Event::AtomicRollback.as_str(), "ATOMIC_ROLLBACK");
        assert_eq!(Event::SchemaExtended.to_string(), "SCHEMA_EXTENDED");
    }

    #[test]
    fn test_degraded_events() {
        assert!(Event::SchemaEventFailed.is_degraded());
        assert!(!Event::AtomicCommit.is_degraded());
    }
}
