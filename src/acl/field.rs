//! # Field Access Control
//!
//! Pure decision function: may a principal read or write field F of record
//! type T?
//!
//! ## Rules
//! - Privileged requests are always allowed
//! - Among the rules matching the principal, the most specific wins
//!   (user > role > public); ties go to the rule listed first
//! - Without a matching rule, ordinary fields are allowed and reserved
//!   fields are denied
//!
//! Evaluation never fails and has no side effects.

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};

use super::principal::{AccessControlOptions, Principal};
use crate::record::AccessLevel;

/// Who a field rule applies to
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FieldAccessTarget {
    Public,
    Role(String),
    User(String),
}

impl FieldAccessTarget {
    /// Higher is more specific
    fn specificity(&self) -> u8 {
        match self {
            FieldAccessTarget::Public => 0,
            FieldAccessTarget::Role(_) => 1,
            FieldAccessTarget::User(_) => 2,
        }
    }

    fn matches(&self, principal: &Principal) -> bool {
        match self {
            FieldAccessTarget::Public => true,
            FieldAccessTarget::Role(role) => principal.has_role(role),
            FieldAccessTarget::User(user_id) => principal.user_id() == Some(user_id.as_str()),
        }
    }
}

/// One rule of the field ACL table
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldAccessRule {
    pub record_type: String,
    pub field: String,
    pub target: FieldAccessTarget,
    pub readable: bool,
    pub writable: bool,
}

impl FieldAccessRule {
    pub fn new(
        record_type: impl Into<String>,
        field: impl Into<String>,
        target: FieldAccessTarget,
    ) -> Self {
        Self {
            record_type: record_type.into(),
            field: field.into(),
            target,
            readable: false,
            writable: false,
        }
    }

    pub fn readable(mut self, readable: bool) -> Self {
        self.readable = readable;
        self
    }

    pub fn writable(mut self, writable: bool) -> Self {
        self.writable = writable;
        self
    }

    fn allows(&self, level: AccessLevel) -> bool {
        match level {
            AccessLevel::Read => self.readable,
            AccessLevel::Write => self.writable,
        }
    }
}

/// Field ACL table keyed by (record type, field)
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FieldAcl {
    rules: BTreeMap<(String, String), Vec<FieldAccessRule>>,
    reserved: BTreeSet<String>,
}

impl FieldAcl {
    /// Build the table, keeping rule order per field
    pub fn new(rules: impl IntoIterator<Item = FieldAccessRule>) -> Self {
        let mut table: BTreeMap<(String, String), Vec<FieldAccessRule>> = BTreeMap::new();
        for rule in rules {
            table
                .entry((rule.record_type.clone(), rule.field.clone()))
                .or_default()
                .push(rule);
        }
        Self {
            rules: table,
            reserved: BTreeSet::new(),
        }
    }

    /// Mark fields as reserved (denied unless explicitly granted)
    pub fn with_reserved<I, S>(mut self, fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.reserved.extend(fields.into_iter().map(Into::into));
        self
    }

    pub fn is_reserved(&self, field: &str) -> bool {
        self.reserved.contains(field)
    }

    /// All rules, in table order
    pub fn rules(&self) -> impl Iterator<Item = &FieldAccessRule> {
        self.rules.values().flatten()
    }

    /// Decide whether `level` access to the field is allowed
    pub fn allows(
        &self,
        record_type: &str,
        field: &str,
        options: &AccessControlOptions,
        level: AccessLevel,
    ) -> bool {
        if options.bypass_access_control() {
            return true;
        }

        let principal = options.principal();
        let winner = self
            .rules
            .get(&(record_type.to_string(), field.to_string()))
            .into_iter()
            .flatten()
            .filter(|rule| rule.target.matches(principal))
            .fold(None::<&FieldAccessRule>, |best, rule| match best {
                Some(b) if b.target.specificity() >= rule.target.specificity() => Some(b),
                _ => Some(rule),
            });

        match winner {
            Some(rule) => rule.allows(level),
            None => !self.is_reserved(field),
        }
    }

    pub fn can_read(&self, record_type: &str, field: &str, options: &AccessControlOptions) -> bool {
        self.allows(record_type, field, options, AccessLevel::Read)
    }

    pub fn can_write(&self, record_type: &str, field: &str, options: &AccessControlOptions) -> bool {
        self.allows(record_type, field, options, AccessLevel::Write)
    }
}
