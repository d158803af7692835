//! Result Filter Subsystem
//!
//! Post-processing applied to every record leaving the engine: field
//! redaction, asset completion and eager reference resolution.

mod eager;
mod result;

pub use eager::EagerLoader;
pub use result::RecordResultFilter;
