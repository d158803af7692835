//! Access Control Invariant Tests
//!
//! - Field denial is deterministic for a fixed ACL table
//! - Denied queries fail before any record read
//! - Fields omitted by ACL are absent keys, never null
//! - ACL changes are observed by the next request

use std::sync::Arc;

use recordcore::acl::{AccessControlOptions, FieldAccessRule, FieldAccessTarget, FieldAcl, Principal};
use recordcore::record::{FieldValue, Record, RecordId};
use recordcore::schema::{FieldType, RecordSchema, SchemaCatalog};
use recordcore::store::{InMemoryStore, MemoryAssetStore};
use recordcore::{EngineConfig, ErrorCode, RecordService, RequestContext};
use serde_json::json;

// =============================================================================
// Helper Functions
// =============================================================================

fn secret_rules() -> FieldAcl {
    FieldAcl::new([
        FieldAccessRule::new("note", "secret", FieldAccessTarget::Public),
        FieldAccessRule::new("note", "secret", FieldAccessTarget::Role("admin".into()))
            .readable(true)
            .writable(true),
    ])
}

fn catalog() -> SchemaCatalog {
    SchemaCatalog::new().with_schema(
        "note",
        RecordSchema::new([
            ("title".to_string(), FieldType::String),
            ("secret".to_string(), FieldType::String),
        ]),
    )
}

fn seeded() -> (Arc<InMemoryStore>, RecordService) {
    let store = Arc::new(
        InMemoryStore::new()
            .with_field_acl(secret_rules())
            .with_schemas(catalog())
            .with_records([Record::new(RecordId::new("note", "1"))
                .with_field("title", FieldValue::String("hello".into()))
                .with_field("secret", FieldValue::String("42".into()))]),
    );
    let service = RecordService::new(
        store.clone(),
        Arc::new(MemoryAssetStore::new()),
        EngineConfig::default(),
    );
    (store, service)
}

fn staff() -> RequestContext {
    RequestContext::new(Principal::user("sam").with_roles(["staff"]))
}

fn admin() -> RequestContext {
    RequestContext::new(Principal::user("ada").with_roles(["admin"]))
}

// =============================================================================
// Evaluator Determinism Tests
// =============================================================================

/// Same (principal, field, permission) always yields the same verdict.
#[test]
fn test_field_denial_is_deterministic() {
    let acl = secret_rules().with_reserved(["_access"]);
    let staff = AccessControlOptions::view_as(Principal::user("sam").with_roles(["staff"]));
    let admin = AccessControlOptions::view_as(Principal::user("ada").with_roles(["admin"]));

    for _ in 0..100 {
        assert!(!acl.can_read("note", "secret", &staff));
        assert!(acl.can_read("note", "secret", &admin));
        assert!(acl.can_read("note", "title", &staff));
        assert!(!acl.can_write("note", "_access", &staff));
    }
}

/// Saving a denied field fails the same way every time.
#[test]
fn test_write_denial_is_deterministic() {
    let (_store, service) = seeded();
    let payload = json!({"records": [{"_id": "note/2", "secret": "x"}]});

    for _ in 0..10 {
        let response = service.save(&payload, &staff()).unwrap();
        assert_eq!(response.result[0]["name"], "PermissionDenied");
        assert_eq!(response.result[0]["info"]["field"], "secret");
    }
}

// =============================================================================
// Query Denial Tests
// =============================================================================

/// A query on `note.secret` by a role without a read rule is denied with
/// zero record reads.
#[test]
fn test_denied_query_issues_no_reads() {
    let (store, service) = seeded();
    let before = store.record_reads();

    let err = service
        .query(
            &json!({
                "record_type": "note",
                "predicate": ["eq", {"$type": "keypath", "$val": "secret"}, "42"]
            }),
            &staff(),
        )
        .unwrap_err();

    assert_eq!(err.code(), ErrorCode::PermissionDenied);
    assert_eq!(err.info().unwrap()["field"], "secret");
    assert_eq!(store.record_reads(), before);
}

/// Denied sort keys are rejected too.
#[test]
fn test_denied_sort_key() {
    let (store, service) = seeded();
    let err = service
        .query(
            &json!({
                "record_type": "note",
                "sort": [[{"$type": "keypath", "$val": "secret"}, "asc"]]
            }),
            &staff(),
        )
        .unwrap_err();
    assert_eq!(err.code(), ErrorCode::PermissionDenied);
    assert_eq!(store.record_reads(), 0);
}

/// Privileged contexts skip the ACL walk.
#[test]
fn test_privileged_query() {
    let (_store, service) = seeded();
    let ctx = RequestContext::privileged(Principal::anonymous());

    let response = service
        .query(
            &json!({
                "record_type": "note",
                "predicate": ["eq", {"$type": "keypath", "$val": "secret"}, "42"],
                "count": true
            }),
            &ctx,
        )
        .unwrap();
    assert_eq!(response.len(), 1);
    assert_eq!(response.info.unwrap()["count"], 1);
}

/// Undeclared fields are invalid regardless of privilege.
#[test]
fn test_undeclared_field_query() {
    let (_store, service) = seeded();
    let err = service
        .query(
            &json!({
                "record_type": "note",
                "predicate": ["eq", {"$type": "keypath", "$val": "missing"}, 1]
            }),
            &admin(),
        )
        .unwrap_err();
    assert_eq!(err.code(), ErrorCode::RecordQueryInvalid);
}

// =============================================================================
// Redaction Tests
// =============================================================================

/// Omitted fields are absent keys in every output path.
#[test]
fn test_omitted_fields_are_absent() {
    let (_store, service) = seeded();

    let fetched = service.fetch(&json!({"ids": ["note/1"]}), &staff()).unwrap();
    let queried = service.query(&json!({"record_type": "note"}), &staff()).unwrap();

    for output in [&fetched.result[0], &queried.result[0]] {
        let map = output.as_object().unwrap();
        assert_eq!(map["title"], "hello");
        assert!(!map.contains_key("secret"));
        assert!(!map.contains_key("_access"));
    }

    let fetched = service.fetch(&json!({"ids": ["note/1"]}), &admin()).unwrap();
    assert_eq!(fetched.result[0]["secret"], "42");
}

/// An ACL change is visible on the very next request.
#[test]
fn test_acl_changes_are_not_cached() {
    let (store, service) = seeded();
    let payload = json!({"ids": ["note/1"]});

    let before = service.fetch(&payload, &staff()).unwrap();
    assert!(before.result[0].get("secret").is_none());

    store.set_field_acl(FieldAcl::default());
    let after = service.fetch(&payload, &staff()).unwrap();
    assert_eq!(after.result[0]["secret"], "42");
}
