//! Observability for the record engine
//!
//! Structured logging goes through `tracing`; the library never installs a
//! subscriber. Call sites tag each record with a typed [`Event`]:
//!
//! ```ignore
//! tracing::info!(event = %Event::SchemaExtended, record_type = "note", "schema extended");
//! ```
//!
//! Observability is read-only: a logging failure never changes the outcome
//! of a batch.

mod events;

pub use events::Event;
