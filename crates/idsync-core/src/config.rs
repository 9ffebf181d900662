//! Per-target sync configuration.

use serde::{Deserialize, Serialize};

use crate::adapter::ListOptions;
use crate::error::ConfigError;
use crate::ignore::IgnoreRules;
use crate::mapping::FieldMapping;
use crate::orchestrator::ApplyPolicy;
use crate::reconcile::DuplicateKeyPolicy;

fn default_membership_concurrency() -> usize {
    8
}

/// Configuration for syncing one target.
///
/// ```yaml
/// identity_key: id
/// mapping:
///   id: userId
///   email: mail
/// group_field: groups
/// ignore_users: [svc-backup]
/// user_filters: ['department eq "eng"']
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SyncConfig {
    /// Canonical attribute that identifies a user.
    pub identity_key: String,

    /// Canonical to native attribute names.
    pub mapping: FieldMapping,

    /// Canonical attribute holding the group membership list.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub group_field: Option<String>,

    /// Users the adapter must never read or write.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub ignore_users: Vec<String>,

    /// Groups the adapter must never report or change.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub ignore_groups: Vec<String>,

    /// Filter expressions narrowing the population read; all must match.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub user_filters: Vec<String>,

    /// Filter expressions narrowing the groups read.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub group_filters: Vec<String>,

    /// Maximum membership reads in flight.
    #[serde(default = "default_membership_concurrency")]
    pub membership_concurrency: usize,

    #[serde(default)]
    pub apply_policy: ApplyPolicy,

    #[serde(default)]
    pub duplicate_keys: DuplicateKeyPolicy,
}

impl SyncConfig {
    /// Create a configuration with defaults for everything but the key and mapping.
    pub fn new(identity_key: impl Into<String>, mapping: FieldMapping) -> Self {
        Self {
            identity_key: identity_key.into(),
            mapping,
            group_field: None,
            ignore_users: Vec::new(),
            ignore_groups: Vec::new(),
            user_filters: Vec::new(),
            group_filters: Vec::new(),
            membership_concurrency: default_membership_concurrency(),
            apply_policy: ApplyPolicy::default(),
            duplicate_keys: DuplicateKeyPolicy::default(),
        }
    }

    /// Set the Group Field.
    #[must_use]
    pub fn with_group_field(mut self, field: impl Into<String>) -> Self {
        self.group_field = Some(field.into());
        self
    }

    /// Set the apply policy.
    #[must_use]
    pub fn with_apply_policy(mut self, policy: ApplyPolicy) -> Self {
        self.apply_policy = policy;
        self
    }

    /// Set the membership read concurrency.
    #[must_use]
    pub fn with_membership_concurrency(mut self, limit: usize) -> Self {
        self.membership_concurrency = limit;
        self
    }

    /// Check the configuration can drive a sync.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.identity_key.trim().is_empty() {
            return Err(ConfigError::invalid("identity_key", "must not be empty"));
        }
        if self.mapping.is_empty() {
            return Err(ConfigError::invalid("mapping", "must map at least one attribute"));
        }
        if !self.mapping.maps(&self.identity_key) {
            return Err(ConfigError::invalid(
                "identity_key",
                format!("'{}' is not mapped", self.identity_key),
            ));
        }
        self.mapping.validate()?;

        if let Some(field) = &self.group_field {
            if field.trim().is_empty() {
                return Err(ConfigError::invalid("group_field", "must not be empty"));
            }
            if *field == self.identity_key {
                return Err(ConfigError::invalid(
                    "group_field",
                    "must differ from identity_key",
                ));
            }
        }
        if self.membership_concurrency == 0 {
            return Err(ConfigError::invalid(
                "membership_concurrency",
                "must be at least 1",
            ));
        }
        Ok(())
    }

    /// Ignore lists as lookup sets.
    pub fn ignore_rules(&self) -> IgnoreRules {
        IgnoreRules::new(self.ignore_users.iter().cloned(), self.ignore_groups.iter().cloned())
    }

    /// All user filters joined into one conjunction.
    pub fn combined_user_filter(&self) -> Option<String> {
        match self.user_filters.as_slice() {
            [] => None,
            [single] => Some(single.clone()),
            filters => Some(
                filters
                    .iter()
                    .map(|f| format!("({f})"))
                    .collect::<Vec<_>>()
                    .join(" and "),
            ),
        }
    }

    /// List options for population reads during a sync.
    pub fn list_options(&self) -> ListOptions {
        ListOptions {
            filter: self.combined_user_filter(),
        }
    }
}
