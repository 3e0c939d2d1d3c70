//! Role-based access control.
//!
//! A principal may see a chunk when it shares at least one role with the
//! chunk, or when the chunk carries the universal role. A chunk with no
//! roles is closed to everyone except holders of an optional admin override
//! role. The override opens untagged chunks only; it never widens access to
//! chunks that name roles.

use std::collections::BTreeSet;

use tracing::debug;

use crate::models::Principal;

pub const DEFAULT_UNIVERSAL_ROLE: &str = "all_staff";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AccessPolicy {
    pub universal_role: String,
    pub admin_override_role: Option<String>,
}

impl Default for AccessPolicy {
    fn default() -> Self {
        Self {
            universal_role: DEFAULT_UNIVERSAL_ROLE.to_string(),
            admin_override_role: None,
        }
    }
}

impl AccessPolicy {
    pub fn new(universal_role: impl Into<String>) -> Self {
        Self {
            universal_role: universal_role.into(),
            admin_override_role: None,
        }
    }

    pub fn with_admin_override(mut self, role: impl Into<String>) -> Self {
        self.admin_override_role = Some(role.into());
        self
    }

    fn is_admin(&self, principal: &Principal) -> bool {
        self.admin_override_role
            .as_deref()
            .is_some_and(|r| principal.has_role(r))
    }

    pub fn is_permitted(&self, principal: &Principal, chunk_roles: &BTreeSet<String>) -> bool {
        if chunk_roles.is_empty() {
            return self.is_admin(principal);
        }
        chunk_roles.contains(&self.universal_role)
            || chunk_roles.iter().any(|r| principal.roles.contains(r))
    }

    /// Keep the items `principal` may see, preserving order.
    pub fn filter<'a, T, F>(&self, principal: &Principal, items: &'a [T], roles_of: F) -> Vec<&'a T>
    where
        F: Fn(&T) -> &BTreeSet<String>,
    {
        let kept: Vec<&T> = items
            .iter()
            .filter(|item| self.is_permitted(principal, roles_of(item)))
            .collect();
        debug!(
            total = items.len(),
            permitted = kept.len(),
            "rbac filter applied"
        );
        kept
    }

    /// Build an index-side prefilter for `principal`.
    pub fn role_filter(&self, principal: &Principal) -> RoleFilter {
        RoleFilter {
            roles: principal.roles.clone(),
            universal_role: self.universal_role.clone(),
            admit_untagged: self.is_admin(principal),
        }
    }
}

/// Role predicate pushed down to a [`VectorIndex`](crate::store::VectorIndex).
///
/// Admits exactly the entries [`AccessPolicy::is_permitted`] would admit for
/// the same principal, so the retriever's own check stays authoritative.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RoleFilter {
    pub roles: BTreeSet<String>,
    pub universal_role: String,
    /// Set for admin override holders: entries with no roles pass.
    pub admit_untagged: bool,
}

impl RoleFilter {
    pub fn admits(&self, entry_roles: &BTreeSet<String>) -> bool {
        if entry_roles.is_empty() {
            return self.admit_untagged;
        }
        entry_roles.contains(&self.universal_role)
            || entry_roles.iter().any(|r| self.roles.contains(r))
    }
}
