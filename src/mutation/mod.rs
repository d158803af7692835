//! Mutation Subsystem
//!
//! Batch saves and deletes with per-item isolation, or all-or-nothing
//! semantics when the batch is atomic.

mod coordinator;
mod handlers;
mod request;

pub use coordinator::AtomicCoordinator;
pub use handlers::RecordMutator;
pub use request::{RecordModifyRequest, RecordModifyResponse};
