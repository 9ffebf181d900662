//! Provider adapter contract
//!
//! The capability set every identity system implements to take part in a
//! sync. Adapters receive their credentials and configuration through their
//! own constructors; the core only ever sees this trait.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::AdapterResult;
use crate::record::NativeRecord;

/// Options for a population read.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ListOptions {
    /// Provider-specific filter expression, passed through uninterpreted.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub filter: Option<String>,
}

impl ListOptions {
    /// Options with a filter expression.
    pub fn filtered(filter: impl Into<String>) -> Self {
        Self {
            filter: Some(filter.into()),
        }
    }
}

/// A target identity system.
///
/// Implementations are responsible for their own network timeouts and
/// retries; the orchestrator treats every error as final.
#[async_trait]
pub trait ProviderAdapter: Send + Sync {
    /// Display name for this adapter instance, used in logs.
    fn name(&self) -> &str;

    /// Read the user population, optionally narrowed by a filter.
    async fn fetch_population(&self, options: &ListOptions) -> AdapterResult<Vec<NativeRecord>>;

    /// Read the group identifiers of one user.
    ///
    /// # Arguments
    /// * `user_id` - The user's identifier in the target system
    async fn fetch_memberships(&self, user_id: &str) -> AdapterResult<Vec<String>>;

    /// Read a single user.
    async fn fetch_one(&self, user_id: &str) -> AdapterResult<NativeRecord>;

    /// Create a user from a full native payload.
    async fn create_record(&self, record: NativeRecord) -> AdapterResult<()>;

    /// Replace the user identified by `user_id` with `record`.
    async fn update_record(&self, user_id: &str, record: NativeRecord) -> AdapterResult<()>;

    /// Delete the user identified by `user_id`.
    async fn delete_record(&self, user_id: &str) -> AdapterResult<()>;

    /// Whether a native payload falls inside the population that
    /// `fetch_population(options)` would return.
    ///
    /// Desired users outside it are left out of the diff, the same way
    /// target users outside it are never read. The default treats every
    /// record as in scope.
    fn in_scope(&self, record: &NativeRecord, options: &ListOptions) -> AdapterResult<bool> {
        let _ = (record, options);
        Ok(true)
    }
}
