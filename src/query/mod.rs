//! Query Subsystem
//!
//! Ad-hoc predicate queries over one record type:
//!
//! - `ast`: predicate tree with a single short-circuiting fold
//! - `parser`: wire JSON to AST
//! - `access`: pre-execution path resolution and field ACL walk
//! - `eval`: predicate matching and sorting for in-process stores

mod access;
mod ast;
mod eval;
mod parser;

pub use access::QueryAccessVisitor;
pub use ast::{
    ComparisonOp, FieldPath, FunctionKind, LogicalOp, Operand, Predicate, Query, Sort, SortOrder,
};
pub use eval::{sort_records, EvalContext, PredicateFilter};
pub use parser::QueryParser;
