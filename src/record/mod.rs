//! Record identity and field model
//!
//! Records are copied value types: every layer receives its own copy and
//! nothing here holds shared state.

mod access;
mod id;
#[allow(clippy::module_inception)]
mod record;
mod value;

pub use access::{AccessEntry, AccessLevel, AccessTarget, RecordAcl};
pub use id::RecordId;
pub use record::{is_system_field, Record, SYSTEM_FIELDS};
pub use value::{reference_json, Asset, FieldValue, GeoPoint};
