//! # Access Control
//!
//! Principals, request access options and the field ACL evaluator.
//! Record-level ACLs live with the record model in [`crate::record`].

mod field;
mod principal;

pub use field::{FieldAccessRule, FieldAccessTarget, FieldAcl};
pub use principal::{AccessControlOptions, Principal};
