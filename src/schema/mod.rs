//! Schema subsystem
//!
//! Record schemas are inferred from saved data and only ever grow. The
//! catalog is read fresh from the store for every batch and never cached
//! across requests.

mod evolution;
mod types;

pub use evolution::{SchemaExtension, SchemaGuard};
pub use types::{FieldType, RecordSchema, SchemaCatalog};
