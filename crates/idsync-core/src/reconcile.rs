//! Population reconciliation.
//!
//! Computes what must change in the current (target) population so that it
//! matches the desired population. Records are matched by the value of one
//! identity-key attribute and compared structurally.
//!
//! Output order is stable: `to_add` and `to_update` follow the order of the
//! desired population, `to_remove` follows the order of the current
//! population.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use thiserror::Error;
use tracing::{debug, warn};

use crate::record::{AttributeValue, CanonicalRecord};

/// Errors that abort a diff.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ReconcileError {
    /// The identity key is missing, not a string, or empty on a record.
    #[error("invalid identity key '{key}' ({reason}) on record {record}")]
    InvalidKey {
        key: String,
        reason: &'static str,
        record: String,
    },

    /// Two current records share an identity value and duplicates are rejected.
    #[error("duplicate identity '{value}' for key '{key}' in current population")]
    DuplicateKey { key: String, value: String },
}

impl ReconcileError {
    /// Get an error code for classification.
    pub fn error_code(&self) -> &'static str {
        match self {
            ReconcileError::InvalidKey { .. } => "INVALID_KEY",
            ReconcileError::DuplicateKey { .. } => "DUPLICATE_KEY",
        }
    }
}

/// What to do when two current records share an identity value.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DuplicateKeyPolicy {
    /// The later record replaces the earlier one in the index; the earlier
    /// record takes no part in reconciliation.
    #[default]
    Overwrite,
    /// Fail the diff with [`ReconcileError::DuplicateKey`].
    Reject,
}

/// The three disjoint change sets of a diff.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DiffResult {
    /// Records only in the desired population.
    pub to_add: Vec<CanonicalRecord>,
    /// Desired records whose current counterpart differs.
    pub to_update: Vec<CanonicalRecord>,
    /// Current records with no desired counterpart.
    pub to_remove: Vec<CanonicalRecord>,
}

impl DiffResult {
    /// Check if nothing needs to change.
    pub fn is_empty(&self) -> bool {
        self.to_add.is_empty() && self.to_update.is_empty() && self.to_remove.is_empty()
    }

    /// Total number of changes.
    pub fn total(&self) -> usize {
        self.to_add.len() + self.to_update.len() + self.to_remove.len()
    }
}

/// Read the identity value of a record.
pub fn identity_of<'a>(record: &'a CanonicalRecord, key: &str) -> Result<&'a str, ReconcileError> {
    let reason = match record.get(key) {
        Some(AttributeValue::String(value)) if !value.is_empty() => return Ok(value.as_str()),
        Some(AttributeValue::String(_)) => "empty",
        Some(_) => "not a string",
        None => "missing",
    };
    Err(ReconcileError::InvalidKey {
        key: key.to_string(),
        reason,
        record: record.to_string(),
    })
}

/// Diff engine bound to one identity key.
#[derive(Debug, Clone)]
pub struct ReconciliationEngine {
    identity_key: String,
    duplicate_keys: DuplicateKeyPolicy,
}

impl ReconciliationEngine {
    /// Create an engine keyed by `identity_key`.
    pub fn new(identity_key: impl Into<String>) -> Self {
        Self {
            identity_key: identity_key.into(),
            duplicate_keys: DuplicateKeyPolicy::default(),
        }
    }

    /// Set the duplicate key policy.
    #[must_use]
    pub fn with_duplicate_keys(mut self, policy: DuplicateKeyPolicy) -> Self {
        self.duplicate_keys = policy;
        self
    }

    /// The identity key.
    pub fn identity_key(&self) -> &str {
        &self.identity_key
    }

    /// Compute the changes that turn `current` into `desired`.
    ///
    /// A desired identity that appears twice is matched only once; the second
    /// occurrence lands in `to_add`.
    pub fn diff(
        &self,
        current: &[CanonicalRecord],
        desired: &[CanonicalRecord],
    ) -> Result<DiffResult, ReconcileError> {
        let key = self.identity_key.as_str();

        let mut index: HashMap<&str, usize> = HashMap::with_capacity(current.len());
        for (position, record) in current.iter().enumerate() {
            let value = identity_of(record, key)?;
            if index.insert(value, position).is_some() {
                match self.duplicate_keys {
                    DuplicateKeyPolicy::Reject => {
                        return Err(ReconcileError::DuplicateKey {
                            key: key.to_string(),
                            value: value.to_string(),
                        });
                    }
                    DuplicateKeyPolicy::Overwrite => {
                        warn!(
                            key = %key,
                            value = %value,
                            "Duplicate identity in current population, keeping the later record"
                        );
                    }
                }
            }
        }

        let mut result = DiffResult::default();
        for record in desired {
            let value = identity_of(record, key)?;
            match index.remove(value) {
                None => result.to_add.push(record.clone()),
                Some(position) if current[position] != *record => {
                    result.to_update.push(record.clone());
                }
                Some(_) => {}
            }
        }

        let mut residual: Vec<usize> = index.into_values().collect();
        residual.sort_unstable();
        result.to_remove = residual
            .into_iter()
            .map(|position| current[position].clone())
            .collect();

        debug!(
            current = current.len(),
            desired = desired.len(),
            to_add = result.to_add.len(),
            to_update = result.to_update.len(),
            to_remove = result.to_remove.len(),
            "Computed population diff"
        );

        Ok(result)
    }
}

/// Diff two populations by `identity_key` with the default duplicate policy.
pub fn diff(
    current: &[CanonicalRecord],
    desired: &[CanonicalRecord],
    identity_key: &str,
) -> Result<DiffResult, ReconcileError> {
    ReconciliationEngine::new(identity_key).diff(current, desired)
}
