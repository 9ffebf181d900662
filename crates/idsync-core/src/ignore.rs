//! Ignore lists for users and groups.
//!
//! Adapters apply these when reading a population so that ignored accounts
//! and groups never show up in a diff and are therefore never touched.

use std::collections::HashSet;

/// Users and groups an adapter must leave alone.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IgnoreRules {
    users: HashSet<String>,
    groups: HashSet<String>,
}

impl IgnoreRules {
    /// Build rules from user and group identifier lists.
    pub fn new<U, G>(users: U, groups: G) -> Self
    where
        U: IntoIterator,
        U::Item: Into<String>,
        G: IntoIterator,
        G::Item: Into<String>,
    {
        Self {
            users: users.into_iter().map(Into::into).collect(),
            groups: groups.into_iter().map(Into::into).collect(),
        }
    }

    /// Check if a user is ignored.
    pub fn is_user_ignored(&self, user_id: &str) -> bool {
        self.users.contains(user_id)
    }

    /// Check if a group is ignored.
    pub fn is_group_ignored(&self, group_id: &str) -> bool {
        self.groups.contains(group_id)
    }

    /// Drop ignored groups from a membership list, keeping order.
    pub fn retain_groups(&self, groups: Vec<String>) -> Vec<String> {
        if self.groups.is_empty() {
            return groups;
        }
        groups
            .into_iter()
            .filter(|g| !self.is_group_ignored(g))
            .collect()
    }

    /// Check if no rules are configured.
    pub fn is_empty(&self) -> bool {
        self.users.is_empty() && self.groups.is_empty()
    }
}
