//! Query JSON parsing
//!
//! Decodes the wire query into the [`Query`] AST. Predicates use the array
//! form `[op, lhs, rhs]`; field references are keypath objects
//! `{"$type": "keypath", "$val": "a.b"}`.

use serde_json::{Map, Value};

use super::ast::{
    ComparisonOp, FieldPath, FunctionKind, LogicalOp, Operand, Predicate, Query, Sort, SortOrder,
};
use crate::config::EngineConfig;
use crate::error::{RecordError, RecordResult};
use crate::record::FieldValue;

/// Parses wire queries, applying configured limits
pub struct QueryParser<'a> {
    config: &'a EngineConfig,
}

impl<'a> QueryParser<'a> {
    pub fn new(config: &'a EngineConfig) -> Self {
        Self { config }
    }

    /// Parse a top-level query object
    pub fn parse(&self, value: &Value) -> RecordResult<Query> {
        let map = value.as_object().ok_or_else(|| {
            RecordError::invalid_argument("query must be an object", &["query"])
        })?;
        let mut query = self.parse_object(map)?;

        query.limit = match query.limit {
            Some(limit) if limit > self.config.max_query_limit => {
                return Err(RecordError::invalid_argument(
                    format!(
                        "limit {} exceeds the maximum of {}",
                        limit, self.config.max_query_limit
                    ),
                    &["limit"],
                ))
            }
            Some(limit) => Some(limit),
            None => self.config.default_query_limit,
        };
        Ok(query)
    }

    fn parse_object(&self, map: &Map<String, Value>) -> RecordResult<Query> {
        let record_type = match map.get("record_type").and_then(Value::as_str) {
            Some(t) if !t.is_empty() => t,
            _ => {
                return Err(RecordError::invalid_argument(
                    "query: required field `record_type` not found",
                    &["record_type"],
                ))
            }
        };

        let mut query = Query::new(record_type);

        if let Some(raw) = map.get("predicate").filter(|v| !v.is_null()) {
            query.predicate = Some(self.parse_predicate(raw)?);
        }
        if let Some(raw) = map.get("sort").filter(|v| !v.is_null()) {
            query.sorts = parse_sorts(raw)?;
        }
        query.limit = optional_u64(map, "limit")?;
        query.offset = optional_u64(map, "offset")?.unwrap_or(0);
        if let Some(raw) = map.get("include").filter(|v| !v.is_null()) {
            query.eager_load = parse_include(raw)?;
        }
        query.get_count = match map.get("count") {
            None | Some(Value::Null) => false,
            Some(Value::Bool(b)) => *b,
            Some(_) => return Err(RecordError::invalid_argument("count must be a boolean", &["count"])),
        };
        Ok(query)
    }

    /// Parse one predicate node
    pub fn parse_predicate(&self, value: &Value) -> RecordResult<Predicate> {
        let items = value
            .as_array()
            .filter(|items| !items.is_empty())
            .ok_or_else(|| RecordError::query_invalid("predicate must be a non-empty array"))?;
        let op = items[0]
            .as_str()
            .ok_or_else(|| RecordError::query_invalid("predicate operator must be a string"))?;
        let args = &items[1..];

        match op {
            "and" | "or" => {
                if args.is_empty() {
                    return Err(RecordError::query_invalid(format!("`{}` needs operands", op)));
                }
                let children = args
                    .iter()
                    .map(|child| self.parse_predicate(child))
                    .collect::<RecordResult<Vec<_>>>()?;
                Ok(Predicate::Logical {
                    op: if op == "and" { LogicalOp::And } else { LogicalOp::Or },
                    children,
                })
            }
            "not" => match args {
                [child] => Ok(Predicate::not(self.parse_predicate(child)?)),
                _ => Err(RecordError::query_invalid("`not` takes exactly one operand")),
            },
            "func" => parse_function(args),
            _ => {
                let op = ComparisonOp::from_name(op)
                    .ok_or_else(|| RecordError::query_invalid(format!("unknown operator `{}`", op)))?;
                self.parse_comparison(op, args)
            }
        }
    }

    fn parse_comparison(&self, op: ComparisonOp, args: &[Value]) -> RecordResult<Predicate> {
        let [lhs, rhs] = args else {
            return Err(RecordError::query_invalid(format!(
                "`{}` takes exactly two operands",
                op.op_name()
            )));
        };

        // keypath on the right only: swap sides
        let (path, op, rhs) = match (keypath(lhs)?, keypath(rhs)?) {
            (Some(path), _) => (path, op, rhs),
            (None, Some(path)) => {
                let mirrored = op.mirrored().ok_or_else(|| {
                    RecordError::query_invalid(format!(
                        "`{}` needs a keypath as its first operand",
                        op.op_name()
                    ))
                })?;
                (path, mirrored, lhs)
            }
            (None, None) => {
                return Err(RecordError::query_invalid(format!(
                    "`{}` needs a keypath operand",
                    op.op_name()
                )))
            }
        };

        let operand = if let Some(other) = keypath(rhs)? {
            Operand::KeyPath(other)
        } else if is_tagged(rhs, "query") {
            let map = rhs
                .as_object()
                .ok_or_else(|| RecordError::query_invalid("subquery must be an object"))?;
            Operand::SubQuery(Box::new(self.parse_object(map)?))
        } else {
            Operand::Literal(FieldValue::from_json(rhs)?)
        };

        match (&op, &operand) {
            (ComparisonOp::In, Operand::Literal(FieldValue::Sequence(_)))
            | (ComparisonOp::In, Operand::SubQuery(_)) => {}
            (ComparisonOp::In, _) => {
                return Err(RecordError::query_invalid(
                    "`in` needs a list or a subquery operand",
                ))
            }
            (_, Operand::SubQuery(_)) => {
                return Err(RecordError::query_invalid("subqueries are only allowed with `in`"))
            }
            (ComparisonOp::Like | ComparisonOp::ILike, Operand::Literal(FieldValue::String(_))) => {}
            (ComparisonOp::Like | ComparisonOp::ILike, _) => {
                return Err(RecordError::query_invalid(format!(
                    "`{}` needs a string pattern",
                    op.op_name()
                )))
            }
            _ => {}
        }

        Ok(Predicate::Comparison { path, op, operand })
    }
}

fn parse_function(args: &[Value]) -> RecordResult<Predicate> {
    let name = args
        .first()
        .and_then(Value::as_str)
        .ok_or_else(|| RecordError::query_invalid("function name must be a string"))?;
    let function = FunctionKind::from_name(name)
        .ok_or_else(|| RecordError::query_invalid(format!("unknown function `{}`", name)))?;

    let path = args
        .get(1)
        .map(keypath)
        .transpose()?
        .flatten()
        .ok_or_else(|| RecordError::query_invalid(format!("`{}` needs a keypath", name)))?;

    let rest = &args[2..];
    if rest.len() != function.arity() {
        return Err(RecordError::query_invalid(format!(
            "`{}` takes {} arguments after the keypath",
            name,
            function.arity()
        )));
    }
    let args = rest
        .iter()
        .map(FieldValue::from_json)
        .collect::<RecordResult<Vec<_>>>()?;

    if function == FunctionKind::WithinDistance {
        match (&args[0], args[1].as_f64()) {
            (FieldValue::Location(_), Some(distance)) if distance >= 0.0 => {}
            _ => {
                return Err(RecordError::query_invalid(
                    "`within` needs a geo point and a non-negative distance",
                ))
            }
        }
    }

    Ok(Predicate::Function {
        function,
        path,
        args,
    })
}

fn parse_sorts(value: &Value) -> RecordResult<Vec<Sort>> {
    let items = value
        .as_array()
        .ok_or_else(|| RecordError::query_invalid("sort must be an array"))?;
    items
        .iter()
        .map(|item| {
            let pair = item.as_array().map(Vec::as_slice).unwrap_or_default();
            let [path, order] = pair else {
                return Err(RecordError::query_invalid("sort entry must be [keypath, order]"));
            };
            let path = keypath(path)?
                .ok_or_else(|| RecordError::query_invalid("sort entry must start with a keypath"))?;
            let order = match order.as_str() {
                Some("asc") => SortOrder::Asc,
                Some("desc") => SortOrder::Desc,
                _ => return Err(RecordError::query_invalid("sort order must be `asc` or `desc`")),
            };
            Ok(Sort { path, order })
        })
        .collect()
}

/// Eager paths as plain strings or keypath objects
fn parse_include(value: &Value) -> RecordResult<Vec<FieldPath>> {
    let items = value
        .as_array()
        .ok_or_else(|| RecordError::invalid_argument("include must be an array", &["include"]))?;
    items
        .iter()
        .map(|item| match item {
            Value::String(raw) => FieldPath::parse(raw),
            other => keypath(other)?.ok_or_else(|| {
                RecordError::invalid_argument("include entries must be keypaths", &["include"])
            }),
        })
        .collect()
}

fn is_tagged(value: &Value, tag: &str) -> bool {
    value.get("$type").and_then(Value::as_str) == Some(tag)
}

/// Returns the path if `value` is a keypath object
fn keypath(value: &Value) -> RecordResult<Option<FieldPath>> {
    if !is_tagged(value, "keypath") {
        return Ok(None);
    }
    let raw = value
        .get("$val")
        .and_then(Value::as_str)
        .ok_or_else(|| RecordError::query_invalid("keypath needs a string `$val`"))?;
    FieldPath::parse(raw).map(Some)
}

fn optional_u64(map: &Map<String, Value>, key: &str) -> RecordResult<Option<u64>> {
    match map.get(key) {
        None | Some(Value::Null) => Ok(None),
        Some(v) => v.as_u64().map(Some).ok_or_else(|| {
            RecordError::invalid_argument(format!("{} must be a non-negative integer", key), &[key])
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorCode;
    use serde_json::json;

    fn parse(value: Value) -> RecordResult<Query> {
        QueryParser::new(&EngineConfig::default()).parse(&value)
    }

    #[test]
    fn test_parse_full_query() {
        let query = parse(json!({
            "record_type": "note",
            "predicate": ["and",
                ["eq", {"$type": "keypath", "$val": "title"}, "hello"],
                ["gt", {"$type": "keypath", "$val": "order"}, 3]
            ],
            "sort": [[{"$type": "keypath", "$val": "order"}, "desc"]],
            "limit": 10,
            "offset": 5,
            "include": ["author"],
            "count": true
        }))
        .unwrap();

        assert_eq!(query.record_type, "note");
        assert_eq!(query.limit, Some(10));
        assert_eq!(query.offset, 5);
        assert_eq!(query.sorts[0].order, SortOrder::Desc);
        assert_eq!(query.eager_load, vec![FieldPath::field("author")]);
        assert!(query.get_count);
        match query.predicate.unwrap() {
            Predicate::Logical { op, children } => {
                assert_eq!(op, LogicalOp::And);
                assert_eq!(children.len(), 2);
            }
            other => panic!("unexpected predicate {:?}", other),
        }
    }

    #[test]
    fn test_literal_on_left_is_mirrored() {
        let query = parse(json!({
            "record_type": "note",
            "predicate": ["lt", 3, {"$type": "keypath", "$val": "order"}]
        }))
        .unwrap();

        assert_eq!(
            query.predicate,
            Some(Predicate::compare(
                FieldPath::field("order"),
                ComparisonOp::Gt,
                FieldValue::Integer(3)
            ))
        );
    }

    #[test]
    fn test_subquery_operand() {
        let query = parse(json!({
            "record_type": "note",
            "predicate": ["in", {"$type": "keypath", "$val": "author"}, {
                "$type": "query",
                "record_type": "user",
                "predicate": ["eq", {"$type": "keypath", "$val": "name"}, "alice"]
            }]
        }))
        .unwrap();

        match query.predicate.unwrap() {
            Predicate::Comparison {
                operand: Operand::SubQuery(sub),
                ..
            } => assert_eq!(sub.record_type, "user"),
            other => panic!("unexpected predicate {:?}", other),
        }
    }

    #[test]
    fn test_function_predicate() {
        let query = parse(json!({
            "record_type": "shop",
            "predicate": ["func", "within", {"$type": "keypath", "$val": "location"},
                {"$type": "geo", "$lat": 1.0, "$lng": 2.0}, 500]
        }))
        .unwrap();
        assert!(matches!(
            query.predicate,
            Some(Predicate::Function {
                function: FunctionKind::WithinDistance,
                ..
            })
        ));
    }

    #[test]
    fn test_malformed_predicates() {
        let bad = [
            json!(["eq", "title", "x"]),
            json!(["between", {"$type": "keypath", "$val": "a"}, 1]),
            json!(["not"]),
            json!(["in", {"$type": "keypath", "$val": "a"}, 1]),
            json!(["func", "within", {"$type": "keypath", "$val": "a"}, 1]),
            json!([]),
        ];
        for predicate in bad {
            let err = parse(json!({"record_type": "note", "predicate": predicate})).unwrap_err();
            assert_eq!(err.code(), ErrorCode::RecordQueryInvalid);
        }
    }

    #[test]
    fn test_limits() {
        let config = EngineConfig {
            default_query_limit: Some(50),
            max_query_limit: 100,
            ..Default::default()
        };
        let parser = QueryParser::new(&config);

        let query = parser.parse(&json!({"record_type": "note"})).unwrap();
        assert_eq!(query.limit, Some(50));

        let err = parser.parse(&json!({"record_type": "note", "limit": 101})).unwrap_err();
        assert_eq!(err.code(), ErrorCode::InvalidArgument);
    }

    #[test]
    fn test_missing_record_type() {
        let err = parse(json!({"predicate": null})).unwrap_err();
        assert_eq!(err.code(), ErrorCode::InvalidArgument);
    }
}
