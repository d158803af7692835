//! Query AST
//!
//! A predicate is a tagged-union tree. All traversal goes through a single
//! depth-first [`Predicate::visit`] fold whose callback can short-circuit
//! with [`ControlFlow::Break`].

use std::fmt;
use std::ops::ControlFlow;

use crate::error::{RecordError, RecordResult};
use crate::record::FieldValue;

/// Dotted path to a field, hopping through reference fields
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct FieldPath(Vec<String>);

impl FieldPath {
    pub fn parse(raw: &str) -> RecordResult<Self> {
        let segments: Vec<String> = raw.split('.').map(str::to_string).collect();
        if segments.iter().any(String::is_empty) {
            return Err(RecordError::query_invalid(format!("invalid key path `{}`", raw)));
        }
        Ok(Self(segments))
    }

    /// Single-segment path. Panics on nothing; dots are not split.
    pub fn field(name: impl Into<String>) -> Self {
        Self(vec![name.into()])
    }

    pub fn segments(&self) -> &[String] {
        &self.0
    }

    /// First segment, the field on the query's own record type
    pub fn head(&self) -> &str {
        &self.0[0]
    }

    pub fn is_nested(&self) -> bool {
        self.0.len() > 1
    }
}

impl fmt::Display for FieldPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.join("."))
    }
}

/// Comparison operators
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ComparisonOp {
    Eq,
    Neq,
    Gt,
    Gte,
    Lt,
    Lte,
    Like,
    ILike,
    In,
}

impl ComparisonOp {
    pub fn from_name(name: &str) -> Option<Self> {
        Some(match name {
            "eq" => ComparisonOp::Eq,
            "neq" => ComparisonOp::Neq,
            "gt" => ComparisonOp::Gt,
            "gte" => ComparisonOp::Gte,
            "lt" => ComparisonOp::Lt,
            "lte" => ComparisonOp::Lte,
            "like" => ComparisonOp::Like,
            "ilike" => ComparisonOp::ILike,
            "in" => ComparisonOp::In,
            _ => return None,
        })
    }

    pub fn op_name(&self) -> &'static str {
        match self {
            ComparisonOp::Eq => "eq",
            ComparisonOp::Neq => "neq",
            ComparisonOp::Gt => "gt",
            ComparisonOp::Gte => "gte",
            ComparisonOp::Lt => "lt",
            ComparisonOp::Lte => "lte",
            ComparisonOp::Like => "like",
            ComparisonOp::ILike => "ilike",
            ComparisonOp::In => "in",
        }
    }

    /// Operator with operands swapped (`a < b` is `b > a`)
    pub fn mirrored(&self) -> Option<Self> {
        Some(match self {
            ComparisonOp::Eq | ComparisonOp::Neq => *self,
            ComparisonOp::Gt => ComparisonOp::Lt,
            ComparisonOp::Gte => ComparisonOp::Lte,
            ComparisonOp::Lt => ComparisonOp::Gt,
            ComparisonOp::Lte => ComparisonOp::Gte,
            ComparisonOp::Like | ComparisonOp::ILike | ComparisonOp::In => return None,
        })
    }
}

/// Right-hand side of a comparison
#[derive(Debug, Clone, PartialEq)]
pub enum Operand {
    Literal(FieldValue),
    KeyPath(FieldPath),
    /// Ids of the records matched by another query
    SubQuery(Box<Query>),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogicalOp {
    And,
    Or,
    Not,
}

/// Predicate functions
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FunctionKind {
    /// `within(path, geo, meters)`
    WithinDistance,
    /// `contains(path, value)`
    Contains,
}

impl FunctionKind {
    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "within" => Some(FunctionKind::WithinDistance),
            "contains" => Some(FunctionKind::Contains),
            _ => None,
        }
    }

    pub fn arity(&self) -> usize {
        match self {
            FunctionKind::WithinDistance => 2,
            FunctionKind::Contains => 1,
        }
    }
}

/// Predicate tree node
#[derive(Debug, Clone, PartialEq)]
pub enum Predicate {
    Comparison {
        path: FieldPath,
        op: ComparisonOp,
        operand: Operand,
    },
    Logical {
        op: LogicalOp,
        children: Vec<Predicate>,
    },
    Function {
        function: FunctionKind,
        path: FieldPath,
        args: Vec<FieldValue>,
    },
}

impl Predicate {
    pub fn compare(path: FieldPath, op: ComparisonOp, value: FieldValue) -> Self {
        Predicate::Comparison {
            path,
            op,
            operand: Operand::Literal(value),
        }
    }

    pub fn eq(field: &str, value: FieldValue) -> Self {
        Self::compare(FieldPath::field(field), ComparisonOp::Eq, value)
    }

    pub fn and(children: Vec<Predicate>) -> Self {
        Predicate::Logical {
            op: LogicalOp::And,
            children,
        }
    }

    pub fn or(children: Vec<Predicate>) -> Self {
        Predicate::Logical {
            op: LogicalOp::Or,
            children,
        }
    }

    pub fn not(child: Predicate) -> Self {
        Predicate::Logical {
            op: LogicalOp::Not,
            children: vec![child],
        }
    }

    /// Depth-first, pre-order fold over the tree. Stops at the first
    /// `Break` and returns it.
    pub fn visit<B, F>(&self, f: &mut F) -> ControlFlow<B>
    where
        F: FnMut(&Predicate) -> ControlFlow<B>,
    {
        if let ControlFlow::Break(b) = f(self) {
            return ControlFlow::Break(b);
        }
        if let Predicate::Logical { children, .. } = self {
            for child in children {
                if let ControlFlow::Break(b) = child.visit(f) {
                    return ControlFlow::Break(b);
                }
            }
        }
        ControlFlow::Continue(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortOrder {
    Asc,
    Desc,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Sort {
    pub path: FieldPath,
    pub order: SortOrder,
}

/// Ad-hoc query over one record type
#[derive(Debug, Clone, PartialEq)]
pub struct Query {
    pub record_type: String,
    pub predicate: Option<Predicate>,
    pub sorts: Vec<Sort>,
    pub limit: Option<u64>,
    pub offset: u64,
    /// Reference fields resolved into nested records in the output
    pub eager_load: Vec<FieldPath>,
    /// Report the total match count in the response info
    pub get_count: bool,
}

impl Query {
    pub fn new(record_type: impl Into<String>) -> Self {
        Self {
            record_type: record_type.into(),
            predicate: None,
            sorts: Vec::new(),
            limit: None,
            offset: 0,
            eager_load: Vec::new(),
            get_count: false,
        }
    }

    pub fn with_predicate(mut self, predicate: Predicate) -> Self {
        self.predicate = Some(predicate);
        self
    }

    pub fn with_sort(mut self, field: &str, order: SortOrder) -> Self {
        self.sorts.push(Sort {
            path: FieldPath::field(field),
            order,
        });
        self
    }

    pub fn with_eager_load(mut self, field: &str) -> Self {
        self.eager_load.push(FieldPath::field(field));
        self
    }

    /// Visit every field path the query reads, paired with the record type
    /// it starts from: predicate paths depth-first (descending into
    /// subqueries with their own record type), then sort paths.
    pub fn visit_field_paths<B, F>(&self, f: &mut F) -> ControlFlow<B>
    where
        F: FnMut(&str, &FieldPath) -> ControlFlow<B>,
    {
        if let Some(predicate) = &self.predicate {
            let flow = predicate.visit(&mut |node: &Predicate| self.visit_node(node, f));
            if flow.is_break() {
                return flow;
            }
        }
        for sort in &self.sorts {
            if let ControlFlow::Break(b) = f(&self.record_type, &sort.path) {
                return ControlFlow::Break(b);
            }
        }
        ControlFlow::Continue(())
    }

    fn visit_node<B, F>(&self, node: &Predicate, f: &mut F) -> ControlFlow<B>
    where
        F: FnMut(&str, &FieldPath) -> ControlFlow<B>,
    {
        match node {
            Predicate::Comparison { path, operand, .. } => {
                if let ControlFlow::Break(b) = f(&self.record_type, path) {
                    return ControlFlow::Break(b);
                }
                match operand {
                    Operand::Literal(_) => ControlFlow::Continue(()),
                    Operand::KeyPath(other) => f(&self.record_type, other),
                    Operand::SubQuery(sub) => sub.visit_field_paths(f),
                }
            }
            Predicate::Function { path, .. } => f(&self.record_type, path),
            Predicate::Logical { .. } => ControlFlow::Continue(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn collect_paths(query: &Query) -> Vec<String> {
        let mut seen = Vec::new();
        let _ = query.visit_field_paths(&mut |record_type: &str, path: &FieldPath| {
            seen.push(format!("{}:{}", record_type, path));
            ControlFlow::<()>::Continue(())
        });
        seen
    }

    #[test]
    fn test_field_path_parse() {
        let path = FieldPath::parse("author.name").unwrap();
        assert_eq!(path.head(), "author");
        assert!(path.is_nested());
        assert_eq!(path.to_string(), "author.name");
        assert!(FieldPath::parse("author..name").is_err());
    }

    #[test]
    fn test_visit_order_is_depth_first() {
        let sub = Query::new("user").with_predicate(Predicate::eq("name", FieldValue::String("a".into())));
        let query = Query::new("note")
            .with_predicate(Predicate::and(vec![
                Predicate::eq("title", FieldValue::String("x".into())),
                Predicate::or(vec![
                    Predicate::Comparison {
                        path: FieldPath::field("author"),
                        op: ComparisonOp::In,
                        operand: Operand::SubQuery(Box::new(sub)),
                    },
                    Predicate::eq("body", FieldValue::Null),
                ]),
            ]))
            .with_sort("order", SortOrder::Asc);

        assert_eq!(
            collect_paths(&query),
            vec!["note:title", "note:author", "user:name", "note:body", "note:order"]
        );
    }

    #[test]
    fn test_visit_short_circuits() {
        let query = Query::new("note").with_predicate(Predicate::and(vec![
            Predicate::eq("a", FieldValue::Null),
            Predicate::eq("b", FieldValue::Null),
            Predicate::eq("c", FieldValue::Null),
        ]));

        let mut visited = 0;
        let flow = query.visit_field_paths(&mut |_: &str, path: &FieldPath| {
            visited += 1;
            if path.head() == "b" {
                ControlFlow::Break(path.to_string())
            } else {
                ControlFlow::Continue(())
            }
        });

        assert_eq!(flow, ControlFlow::Break("b".to_string()));
        assert_eq!(visited, 2);
    }

    #[test]
    fn test_mirrored_ops() {
        assert_eq!(ComparisonOp::Gt.mirrored(), Some(ComparisonOp::Lt));
        assert_eq!(ComparisonOp::Like.mirrored(), None);
    }
}
