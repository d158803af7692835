//! API Layer
//!
//! Batch payload decoding, action dispatch and result serialization for the
//! record actions:
//!
//! - `record:save`
//! - `record:fetch`
//! - `record:query`
//! - `record:delete`
//!
//! Every result array has one entry per input item, in input order. Each
//! entry is either a success object or a serialized error.

mod handler;
mod request;
mod response;

pub use handler::RecordService;
pub use request::{DecodeFailure, DeleteRequest, FetchRequest, SaveRequest};
pub use response::{tombstone, BatchResponse};
