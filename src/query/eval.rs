//! Predicate evaluation for in-process stores
//!
//! Strict matching, no coercion beyond integer/number comparison. A missing
//! or null field never matches.

use std::cmp::Ordering;
use std::collections::BTreeSet;

use chrono::{DateTime, Utc};
use regex::RegexBuilder;

use super::ast::{
    ComparisonOp, FieldPath, FunctionKind, LogicalOp, Operand, Predicate, Query, Sort, SortOrder,
};
use crate::record::{FieldValue, Record, RecordId};

/// Lookups needed to evaluate multi-hop paths and subqueries
pub trait EvalContext {
    /// Load a referenced record
    fn lookup(&self, id: &RecordId) -> Option<Record>;

    /// Ids of the records matched by a subquery
    fn subquery_ids(&self, query: &Query) -> BTreeSet<RecordId>;
}

/// Evaluates predicates against records
pub struct PredicateFilter;

impl PredicateFilter {
    pub fn matches(record: &Record, predicate: &Predicate, cx: &dyn EvalContext) -> bool {
        match predicate {
            Predicate::Logical { op, children } => match op {
                LogicalOp::And => children.iter().all(|c| Self::matches(record, c, cx)),
                LogicalOp::Or => children.iter().any(|c| Self::matches(record, c, cx)),
                LogicalOp::Not => !children.iter().all(|c| Self::matches(record, c, cx)),
            },
            Predicate::Comparison { path, op, operand } => {
                let Some(actual) = resolve(record, path, cx).filter(|v| !v.is_null()) else {
                    return false;
                };
                match operand {
                    Operand::Literal(expected) => compare_op(&actual, *op, expected),
                    Operand::KeyPath(other) => match resolve(record, other, cx) {
                        Some(expected) if !expected.is_null() => compare_op(&actual, *op, &expected),
                        _ => false,
                    },
                    Operand::SubQuery(sub) => match (op, actual.as_reference()) {
                        (ComparisonOp::In, Some(id)) => cx.subquery_ids(sub).contains(id),
                        _ => false,
                    },
                }
            }
            Predicate::Function { function, path, args } => {
                let Some(actual) = resolve(record, path, cx) else {
                    return false;
                };
                match function {
                    FunctionKind::WithinDistance => match (&actual, args.first(), args.get(1).and_then(FieldValue::as_f64)) {
                        (FieldValue::Location(point), Some(FieldValue::Location(center)), Some(distance)) => {
                            point.distance_to(center) <= distance
                        }
                        _ => false,
                    },
                    FunctionKind::Contains => match (&actual, args.first()) {
                        (FieldValue::Sequence(items), Some(needle)) => {
                            items.iter().any(|item| compare(item, needle) == Some(Ordering::Equal))
                        }
                        (FieldValue::String(s), Some(FieldValue::String(needle))) => s.contains(needle.as_str()),
                        _ => false,
                    },
                }
            }
        }
    }
}

/// Sort records by the given keys. Stable; missing values sort first.
pub fn sort_records(records: &mut [Record], sorts: &[Sort], cx: &dyn EvalContext) {
    if sorts.is_empty() {
        return;
    }
    records.sort_by(|a, b| {
        for sort in sorts {
            let ordering = match (resolve(a, &sort.path, cx), resolve(b, &sort.path, cx)) {
                (None, None) => Ordering::Equal,
                (None, Some(_)) => Ordering::Less,
                (Some(_), None) => Ordering::Greater,
                (Some(x), Some(y)) => compare(&x, &y).unwrap_or(Ordering::Equal),
            };
            let ordering = match sort.order {
                SortOrder::Asc => ordering,
                SortOrder::Desc => ordering.reverse(),
            };
            if ordering != Ordering::Equal {
                return ordering;
            }
        }
        Ordering::Equal
    });
}

/// Value at `path`, following references for multi-hop paths
fn resolve(record: &Record, path: &FieldPath, cx: &dyn EvalContext) -> Option<FieldValue> {
    let (head, rest) = path.segments().split_first()?;
    let value = system_value(record, head).or_else(|| record.get(head).cloned())?;
    if rest.is_empty() {
        return Some(value);
    }
    let target = cx.lookup(value.as_reference()?)?;
    let rest = FieldPath::parse(&rest.join(".")).ok()?;
    resolve(&target, &rest, cx)
}

fn system_value(record: &Record, field: &str) -> Option<FieldValue> {
    let text = |v: &Option<String>| Some(v.clone().map(FieldValue::String).unwrap_or(FieldValue::Null));
    let time = |v: &Option<DateTime<Utc>>| Some(v.map(FieldValue::DateTime).unwrap_or(FieldValue::Null));
    match field {
        "_id" => Some(FieldValue::String(record.id.key().to_string())),
        "_owner_id" => text(&record.owner_id),
        "_created_by" => text(&record.created_by),
        "_updated_by" => text(&record.updated_by),
        "_created_at" => time(&record.created_at),
        "_updated_at" => time(&record.updated_at),
        _ => None,
    }
}

fn compare_op(actual: &FieldValue, op: ComparisonOp, expected: &FieldValue) -> bool {
    let ordering = compare(actual, expected);
    match op {
        ComparisonOp::Eq => ordering == Some(Ordering::Equal),
        ComparisonOp::Neq => ordering != Some(Ordering::Equal),
        ComparisonOp::Gt => ordering == Some(Ordering::Greater),
        ComparisonOp::Gte => matches!(ordering, Some(Ordering::Greater | Ordering::Equal)),
        ComparisonOp::Lt => ordering == Some(Ordering::Less),
        ComparisonOp::Lte => matches!(ordering, Some(Ordering::Less | Ordering::Equal)),
        ComparisonOp::Like | ComparisonOp::ILike => match (actual, expected) {
            (FieldValue::String(s), FieldValue::String(pattern)) => {
                like_match(s, pattern, op == ComparisonOp::ILike)
            }
            _ => false,
        },
        ComparisonOp::In => match expected {
            FieldValue::Sequence(items) => items
                .iter()
                .any(|item| compare(actual, item) == Some(Ordering::Equal)),
            _ => false,
        },
    }
}

/// Ordering of two values of compatible types, `None` otherwise
fn compare(a: &FieldValue, b: &FieldValue) -> Option<Ordering> {
    match (a, b) {
        (FieldValue::String(x), FieldValue::String(y)) => Some(x.cmp(y)),
        (FieldValue::Boolean(x), FieldValue::Boolean(y)) => Some(x.cmp(y)),
        (FieldValue::DateTime(x), FieldValue::DateTime(y)) => Some(x.cmp(y)),
        (FieldValue::Reference(x), FieldValue::Reference(y)) => Some(x.cmp(y)),
        (FieldValue::Integer(x), FieldValue::Integer(y)) => Some(x.cmp(y)),
        _ => match (a.as_f64(), b.as_f64()) {
            (Some(x), Some(y)) => x.partial_cmp(&y),
            _ if a == b => Some(Ordering::Equal),
            _ => None,
        },
    }
}

/// SQL LIKE: `%` any run, `_` one character
fn like_match(value: &str, pattern: &str, case_insensitive: bool) -> bool {
    let mut regex = String::from("^");
    for c in pattern.chars() {
        match c {
            '%' => regex.push_str(".*"),
            '_' => regex.push('.'),
            other => regex.push_str(&regex::escape(&other.to_string())),
        }
    }
    regex.push('$');

    RegexBuilder::new(&regex)
        .case_insensitive(case_insensitive)
        .dot_matches_new_line(true)
        .build()
        .map(|re| re.is_match(value))
        .unwrap_or(false)
}
