//! Output filtering for records
//!
//! Runs after a mutation or query has committed. Denied fields are removed
//! from the output map entirely; they are never rendered as null.

use serde_json::{Map, Value};
use tracing::warn;

use crate::acl::{AccessControlOptions, FieldAcl};
use crate::context::RequestContext;
use crate::observability::Event;
use crate::record::{FieldValue, Record, SYSTEM_FIELDS};
use crate::store::AssetStore;

/// Renders records for one principal
pub struct RecordResultFilter<'a> {
    field_acl: &'a FieldAcl,
    options: &'a AccessControlOptions,
    assets: Option<&'a dyn AssetStore>,
}

impl<'a> RecordResultFilter<'a> {
    pub fn new(field_acl: &'a FieldAcl, options: &'a AccessControlOptions) -> Self {
        Self {
            field_acl,
            options,
            assets: None,
        }
    }

    pub fn with_asset_store(mut self, assets: Option<&'a dyn AssetStore>) -> Self {
        self.assets = assets;
        self
    }

    /// Whether the principal may see `field` of `record_type`
    pub fn can_read(&self, record_type: &str, field: &str) -> bool {
        self.field_acl.can_read(record_type, field, self.options)
    }

    /// Render one record: drop unreadable fields, complete bare assets
    pub fn filter(&self, ctx: &RequestContext, record: &Record) -> Map<String, Value> {
        let record_type = record.id.record_type();

        let mut visible = record.clone();
        visible.data.retain(|name, _| self.can_read(record_type, name));
        for value in visible.data.values_mut() {
            self.complete_asset(ctx, value);
        }

        let mut map = visible.to_json_map();
        for (path, key) in SYSTEM_FIELDS {
            if *path != "_id" && !self.can_read(record_type, path) {
                map.remove(*key);
            }
        }
        map
    }

    fn complete_asset(&self, ctx: &RequestContext, value: &mut FieldValue) {
        let (Some(assets), FieldValue::Asset(asset)) = (self.assets, &mut *value) else {
            return;
        };
        if !asset.is_bare() {
            return;
        }
        match assets.complete(&asset.name) {
            Ok(full) => *asset = full,
            Err(err) => warn!(
                event = %Event::AssetCompletionFailed,
                request_id = %ctx.request_id,
                asset = %asset.name,
                error = %err,
                "fail to complete asset"
            ),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::acl::{FieldAccessRule, FieldAccessTarget, Principal};
    use crate::record::{Asset, RecordId};
    use crate::store::MemoryAssetStore;

    fn record() -> Record {
        Record::new(RecordId::new("note", "1"))
            .with_owner("alice")
            .with_field("title", FieldValue::String("hi".into()))
            .with_field("secret", FieldValue::String("s".into()))
            .with_field("photo", FieldValue::Asset(Asset::bare("cat.png")))
    }

    fn acl() -> FieldAcl {
        FieldAcl::new([
            FieldAccessRule::new("note", "secret", FieldAccessTarget::Public),
            FieldAccessRule::new("note", "secret", FieldAccessTarget::User("alice".into())).readable(true),
        ])
        .with_reserved(["_access"])
    }

    #[test]
    fn test_denied_fields_are_absent() {
        let acl = acl();
        let options = AccessControlOptions::view_as(Principal::user("bob"));
        let ctx = RequestContext::with_options(options.clone());
        let map = RecordResultFilter::new(&acl, &options).filter(&ctx, &record());

        assert!(!map.contains_key("secret"));
        assert!(!map.contains_key("_access"));
        assert_eq!(map["title"], "hi");
        assert_eq!(map["_ownerID"], "alice");
    }

    #[test]
    fn test_user_rule_grants() {
        let acl = acl();
        let options = AccessControlOptions::view_as(Principal::user("alice"));
        let ctx = RequestContext::with_options(options.clone());
        let map = RecordResultFilter::new(&acl, &options).filter(&ctx, &record());
        assert_eq!(map["secret"], "s");
    }

    #[test]
    fn test_privileged_sees_everything() {
        let acl = acl();
        let options = AccessControlOptions::privileged(Principal::anonymous());
        let ctx = RequestContext::with_options(options.clone());
        let map = RecordResultFilter::new(&acl, &options).filter(&ctx, &record());
        assert!(map.contains_key("secret"));
        assert!(map.contains_key("_access"));
    }

    #[test]
    fn test_asset_completion() {
        let acl = FieldAcl::default();
        let options = AccessControlOptions::view_as(Principal::anonymous());
        let ctx = RequestContext::with_options(options.clone());
        let assets = MemoryAssetStore::new().with_asset(Asset {
            name: "cat.png".into(),
            content_type: Some("image/png".into()),
            size: Some(42),
            url: Some("https://assets.example/cat.png".into()),
        });

        let map = RecordResultFilter::new(&acl, &options)
            .with_asset_store(Some(&assets))
            .filter(&ctx, &record());
        assert_eq!(map["photo"]["$content_type"], "image/png");
        assert_eq!(map["photo"]["$size"], 42);

        let missing = RecordResultFilter::new(&acl, &options)
            .with_asset_store(Some(&MemoryAssetStore::new()))
            .filter(&ctx, &record());
        assert_eq!(missing["photo"]["$name"], "cat.png");
        assert!(missing["photo"].get("$url").is_none());
    }
}
