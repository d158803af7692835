//! Query predicate ACL visitor
//!
//! Walks a query before execution. Every field path (predicate leaves,
//! keypath operands, subqueries and sort keys) must resolve to a declared
//! field, hop by hop through reference fields, and every hop must be
//! readable by the principal. The first failure in traversal order ends the
//! walk and is the only error reported.

use std::ops::ControlFlow;

use super::ast::{FieldPath, Query};
use crate::acl::{AccessControlOptions, FieldAcl};
use crate::error::{RecordError, RecordResult};
use crate::schema::{FieldType, SchemaCatalog};

pub struct QueryAccessVisitor<'a> {
    field_acl: &'a FieldAcl,
    catalog: &'a SchemaCatalog,
    options: &'a AccessControlOptions,
}

impl<'a> QueryAccessVisitor<'a> {
    pub fn new(
        field_acl: &'a FieldAcl,
        catalog: &'a SchemaCatalog,
        options: &'a AccessControlOptions,
    ) -> Self {
        Self {
            field_acl,
            catalog,
            options,
        }
    }

    /// Check a whole query. Performs no store access.
    ///
    /// # Errors
    ///
    /// - RecordQueryInvalid if a path does not resolve
    /// - PermissionDenied naming the first unreadable field
    pub fn check(&self, query: &Query) -> RecordResult<()> {
        let flow = query.visit_field_paths(&mut |record_type: &str, path: &FieldPath| {
            match self.walk(record_type, path) {
                Ok(_) => ControlFlow::Continue(()),
                Err(err) => ControlFlow::Break(err),
            }
        });
        if let ControlFlow::Break(err) = flow {
            return Err(err);
        }

        for path in &query.eager_load {
            self.check_eager_path(&query.record_type, path)?;
        }
        Ok(())
    }

    /// Resolve a path hop by hop, read-checking each hop unless access
    /// control is bypassed. Returns the type of the last hop.
    pub fn walk(&self, record_type: &str, path: &FieldPath) -> RecordResult<FieldType> {
        let bypass = self.options.bypass_access_control();
        let mut current = record_type.to_string();
        let segments = path.segments();

        for (i, field) in segments.iter().enumerate() {
            let field_type = self.catalog.resolve_field(&current, field).ok_or_else(|| {
                RecordError::query_invalid(format!(
                    "field `{}` is not declared on `{}` (in `{}`)",
                    field, current, path
                ))
            })?;

            if !bypass && !self.field_acl.can_read(&current, field, self.options) {
                return Err(RecordError::field_denied(
                    &current,
                    field,
                    format!("no read access to `{}` of `{}`", field, current),
                ));
            }

            if i + 1 == segments.len() {
                return Ok(field_type);
            }
            match field_type {
                FieldType::Reference { record_type } => current = record_type,
                _ => {
                    return Err(RecordError::query_invalid(format!(
                        "field `{}` of `{}` is not a reference (in `{}`)",
                        field, current, path
                    )))
                }
            }
        }
        Err(RecordError::query_invalid("empty key path"))
    }

    /// Eager paths name one reference field on the queried type. Readability
    /// is not required: an unreadable field is omitted from the output.
    fn check_eager_path(&self, record_type: &str, path: &FieldPath) -> RecordResult<()> {
        if path.is_nested() {
            return Err(RecordError::query_invalid(format!(
                "eager load path `{}` must name a single field",
                path
            )));
        }
        match self.catalog.resolve_field(record_type, path.head()) {
            Some(FieldType::Reference { .. }) | Some(FieldType::Sequence) => Ok(()),
            Some(other) => Err(RecordError::query_invalid(format!(
                "cannot eager load `{}` of type {}",
                path,
                other.type_name()
            ))),
            None => Err(RecordError::query_invalid(format!(
                "field `{}` is not declared on `{}`",
                path, record_type
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::acl::{FieldAccessRule, FieldAccessTarget, Principal};
    use crate::error::ErrorCode;
    use crate::query::{ComparisonOp, Operand, Predicate, SortOrder};
    use crate::record::FieldValue;
    use crate::schema::RecordSchema;

    fn catalog() -> SchemaCatalog {
        SchemaCatalog::new()
            .with_schema(
                "note",
                RecordSchema::new([
                    ("title".to_string(), FieldType::String),
                    ("secret".to_string(), FieldType::String),
                    ("author".to_string(), FieldType::Reference { record_type: "user".into() }),
                ]),
            )
            .with_schema(
                "user",
                RecordSchema::new([
                    ("name".to_string(), FieldType::String),
                    ("email".to_string(), FieldType::String),
                ]),
            )
    }

    fn acl() -> FieldAcl {
        FieldAcl::new([
            FieldAccessRule::new("note", "secret", FieldAccessTarget::Public).readable(false),
            FieldAccessRule::new("note", "secret", FieldAccessTarget::Role("admin".into())).readable(true),
            FieldAccessRule::new("user", "email", FieldAccessTarget::Public).readable(false),
        ])
    }

    fn check(query: &Query, options: &AccessControlOptions) -> RecordResult<()> {
        let (acl, catalog) = (acl(), catalog());
        QueryAccessVisitor::new(&acl, &catalog, options).check(query)
    }

    fn viewer() -> AccessControlOptions {
        AccessControlOptions::view_as(Principal::user("u1").with_roles(["staff"]))
    }

    #[test]
    fn test_denied_field() {
        let query = Query::new("note").with_predicate(Predicate::eq("secret", FieldValue::String("x".into())));
        let err = check(&query, &viewer()).unwrap_err();
        assert_eq!(err.code(), ErrorCode::PermissionDenied);
        assert_eq!(err.info().unwrap()["field"], "secret");
    }

    #[test]
    fn test_role_grant() {
        let query = Query::new("note").with_predicate(Predicate::eq("secret", FieldValue::String("x".into())));
        let admin = AccessControlOptions::view_as(Principal::user("u2").with_roles(["admin"]));
        assert!(check(&query, &admin).is_ok());
    }

    #[test]
    fn test_first_denial_wins() {
        let query = Query::new("note")
            .with_predicate(Predicate::and(vec![
                Predicate::compare(
                    FieldPath::parse("author.email").unwrap(),
                    ComparisonOp::Eq,
                    FieldValue::String("a@b".into()),
                ),
                Predicate::eq("secret", FieldValue::Null),
            ]));
        for _ in 0..3 {
            let err = check(&query, &viewer()).unwrap_err();
            assert_eq!(err.info().unwrap()["record_type"], "user");
            assert_eq!(err.info().unwrap()["field"], "email");
        }
    }

    #[test]
    fn test_sort_and_keypath_operands_checked() {
        let sorted = Query::new("note").with_sort("secret", SortOrder::Asc);
        assert!(check(&sorted, &viewer()).is_err());

        let cross = Query::new("note").with_predicate(Predicate::Comparison {
            path: FieldPath::field("title"),
            op: ComparisonOp::Eq,
            operand: Operand::KeyPath(FieldPath::field("secret")),
        });
        assert!(check(&cross, &viewer()).is_err());
    }

    #[test]
    fn test_subquery_checked_on_own_type() {
        let sub = Query::new("user").with_predicate(Predicate::eq("email", FieldValue::Null));
        let query = Query::new("note").with_predicate(Predicate::Comparison {
            path: FieldPath::field("author"),
            op: ComparisonOp::In,
            operand: Operand::SubQuery(Box::new(sub)),
        });
        let err = check(&query, &viewer()).unwrap_err();
        assert_eq!(err.info().unwrap()["record_type"], "user");
    }

    #[test]
    fn test_bypass_skips_acl_but_not_resolution() {
        let privileged = AccessControlOptions::privileged(Principal::anonymous());
        let query = Query::new("note").with_predicate(Predicate::eq("secret", FieldValue::Null));
        assert!(check(&query, &privileged).is_ok());

        let undeclared = Query::new("note").with_predicate(Predicate::eq("missing", FieldValue::Null));
        let err = check(&undeclared, &privileged).unwrap_err();
        assert_eq!(err.code(), ErrorCode::RecordQueryInvalid);
    }

    #[test]
    fn test_hop_through_non_reference() {
        let query = Query::new("note").with_predicate(Predicate::compare(
            FieldPath::parse("title.length").unwrap(),
            ComparisonOp::Eq,
            FieldValue::Integer(1),
        ));
        assert_eq!(check(&query, &viewer()).unwrap_err().code(), ErrorCode::RecordQueryInvalid);
    }

    #[test]
    fn test_system_fields_resolve() {
        let query = Query::new("note").with_sort("_created_at", SortOrder::Desc);
        assert!(check(&query, &viewer()).is_ok());
    }

    #[test]
    fn test_eager_paths() {
        assert!(check(&Query::new("note").with_eager_load("author"), &viewer()).is_ok());
        let err = check(&Query::new("note").with_eager_load("title"), &viewer()).unwrap_err();
        assert_eq!(err.code(), ErrorCode::RecordQueryInvalid);
    }
}
