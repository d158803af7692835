//! # Principals
//!
//! The acting identity of a request and the access-control options derived
//! from it.
//!
//! ## Invariants
//! - No silent bypass: only an explicit privileged flag skips access control
//! - Options are read-only after construction and scoped to one request

use std::collections::BTreeSet;

/// Acting identity for a request (possibly anonymous)
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Principal {
    user_id: Option<String>,
    roles: BTreeSet<String>,
}

impl Principal {
    /// Create a principal for an authenticated user
    pub fn user(user_id: impl Into<String>) -> Self {
        Self {
            user_id: Some(user_id.into()),
            roles: BTreeSet::new(),
        }
    }

    /// Create an anonymous principal
    pub fn anonymous() -> Self {
        Self::default()
    }

    pub fn with_roles<I, S>(mut self, roles: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.roles.extend(roles.into_iter().map(Into::into));
        self
    }

    pub fn user_id(&self) -> Option<&str> {
        self.user_id.as_deref()
    }

    pub fn is_authenticated(&self) -> bool {
        self.user_id.is_some()
    }

    pub fn has_role(&self, role: &str) -> bool {
        self.roles.contains(role)
    }

    pub fn roles(&self) -> impl Iterator<Item = &str> {
        self.roles.iter().map(String::as_str)
    }
}

/// Access-control options for one request
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AccessControlOptions {
    view_as: Principal,
    bypass: bool,
}

impl AccessControlOptions {
    /// Options evaluated as the given principal
    pub fn view_as(principal: Principal) -> Self {
        Self {
            view_as: principal,
            bypass: false,
        }
    }

    /// Privileged options (master key). Access control is skipped entirely.
    pub fn privileged(principal: Principal) -> Self {
        Self {
            view_as: principal,
            bypass: true,
        }
    }

    pub fn principal(&self) -> &Principal {
        &self.view_as
    }

    pub fn bypass_access_control(&self) -> bool {
        self.bypass
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_authenticated_principal() {
        let p = Principal::user("u1").with_roles(["admin", "editor"]);
        assert!(p.is_authenticated());
        assert!(p.has_role("admin"));
        assert!(!p.has_role("owner"));
        assert_eq!(p.user_id(), Some("u1"));
    }

    #[test]
    fn test_anonymous_principal() {
        let p = Principal::anonymous();
        assert!(!p.is_authenticated());
        assert_eq!(p.roles().count(), 0);
    }

    #[test]
    fn test_privileged_options_bypass() {
        let opts = AccessControlOptions::privileged(Principal::anonymous());
        assert!(opts.bypass_access_control());
        assert!(!AccessControlOptions::view_as(Principal::anonymous()).bypass_access_control());
    }
}
