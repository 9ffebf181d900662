//! Error types
//!
//! Adapter failures with transient/permanent classification, configuration
//! errors, and the sync-run error that names the failing phase and item.

use thiserror::Error;

use crate::mapping::MappingError;
use crate::orchestrator::{ApplySummary, ItemFailure, SyncPhase};
use crate::reconcile::ReconcileError;

/// Error reported by a provider adapter.
///
/// The core treats every variant as opaque and never retries; the
/// classification exists for callers that schedule their own retries.
#[derive(Debug, Error)]
pub enum AdapterError {
    // Connectivity (usually transient)
    /// Failed to reach the target system.
    #[error("connection failed: {message}")]
    ConnectionFailed {
        message: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// Request timed out.
    #[error("request timed out after {timeout_secs} seconds")]
    Timeout { timeout_secs: u64 },

    /// Target system is temporarily unavailable.
    #[error("target system unavailable: {message}")]
    Unavailable { message: String },

    /// Target system throttled the request.
    #[error("rate limited by target system")]
    RateLimited { retry_after_secs: Option<u64> },

    // Configuration (permanent)
    /// The adapter was configured with invalid settings.
    #[error("invalid configuration: {message}")]
    InvalidConfiguration { message: String },

    // Credentials (permanent)
    /// Credentials were rejected.
    #[error("authentication failed: {message}")]
    AuthenticationFailed { message: String },

    /// Credentials lack the permission for the operation.
    #[error("authorization failed: insufficient permissions for {operation}")]
    AuthorizationFailed { operation: String },

    // Objects (permanent)
    /// Object does not exist in the target system.
    #[error("object not found: {identifier}")]
    NotFound { identifier: String },

    /// Object already exists in the target system.
    #[error("object already exists: {identifier}")]
    AlreadyExists { identifier: String },

    /// Payload rejected by the target system or the adapter.
    #[error("invalid data: {message}")]
    InvalidData { message: String },

    /// The adapter does not support the requested operation.
    #[error("unsupported operation: {operation}")]
    Unsupported { operation: String },

    /// Any other failure.
    #[error("operation failed: {message}")]
    OperationFailed {
        message: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },
}

impl AdapterError {
    /// Check if this error is transient and a caller may retry.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            AdapterError::ConnectionFailed { .. }
                | AdapterError::Timeout { .. }
                | AdapterError::Unavailable { .. }
                | AdapterError::RateLimited { .. }
        )
    }

    /// Check if this error is permanent and retry won't help.
    pub fn is_permanent(&self) -> bool {
        !self.is_transient()
    }

    /// Get an error code for classification.
    pub fn error_code(&self) -> &'static str {
        match self {
            AdapterError::ConnectionFailed { .. } => "CONNECTION_FAILED",
            AdapterError::Timeout { .. } => "TIMEOUT",
            AdapterError::Unavailable { .. } => "TARGET_UNAVAILABLE",
            AdapterError::RateLimited { .. } => "RATE_LIMITED",
            AdapterError::InvalidConfiguration { .. } => "INVALID_CONFIGURATION",
            AdapterError::AuthenticationFailed { .. } => "AUTH_FAILED",
            AdapterError::AuthorizationFailed { .. } => "AUTHORIZATION_FAILED",
            AdapterError::NotFound { .. } => "OBJECT_NOT_FOUND",
            AdapterError::AlreadyExists { .. } => "OBJECT_EXISTS",
            AdapterError::InvalidData { .. } => "INVALID_DATA",
            AdapterError::Unsupported { .. } => "UNSUPPORTED",
            AdapterError::OperationFailed { .. } => "OPERATION_FAILED",
        }
    }

    // Convenience constructors

    /// Create a connection failed error.
    pub fn connection_failed(message: impl Into<String>) -> Self {
        AdapterError::ConnectionFailed {
            message: message.into(),
            source: None,
        }
    }

    /// Create a connection failed error with source.
    pub fn connection_failed_with_source(
        message: impl Into<String>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        AdapterError::ConnectionFailed {
            message: message.into(),
            source: Some(Box::new(source)),
        }
    }

    /// Create an invalid configuration error.
    pub fn invalid_configuration(message: impl Into<String>) -> Self {
        AdapterError::InvalidConfiguration {
            message: message.into(),
        }
    }

    /// Create a not found error.
    pub fn not_found(identifier: impl Into<String>) -> Self {
        AdapterError::NotFound {
            identifier: identifier.into(),
        }
    }

    /// Create an already exists error.
    pub fn already_exists(identifier: impl Into<String>) -> Self {
        AdapterError::AlreadyExists {
            identifier: identifier.into(),
        }
    }

    /// Create an invalid data error.
    pub fn invalid_data(message: impl Into<String>) -> Self {
        AdapterError::InvalidData {
            message: message.into(),
        }
    }

    /// Create an unsupported operation error.
    pub fn unsupported(operation: impl Into<String>) -> Self {
        AdapterError::Unsupported {
            operation: operation.into(),
        }
    }

    /// Create an operation failed error.
    pub fn operation_failed(message: impl Into<String>) -> Self {
        AdapterError::OperationFailed {
            message: message.into(),
            source: None,
        }
    }

    /// Create an operation failed error with source.
    pub fn operation_failed_with_source(
        message: impl Into<String>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        AdapterError::OperationFailed {
            message: message.into(),
            source: Some(Box::new(source)),
        }
    }
}

/// Result type for adapter operations.
pub type AdapterResult<T> = Result<T, AdapterError>;

/// Invalid sync configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// A field has an invalid value.
    #[error("invalid configuration for '{field}': {message}")]
    Invalid { field: String, message: String },

    /// The field mapping is not usable in both directions.
    #[error("invalid mapping: {0}")]
    Mapping(#[from] MappingError),
}

impl ConfigError {
    /// Create an invalid field error.
    pub fn invalid(field: impl Into<String>, message: impl Into<String>) -> Self {
        ConfigError::Invalid {
            field: field.into(),
            message: message.into(),
        }
    }
}

/// Error from a sync run.
///
/// Every variant identifies the phase it came from; apply-phase variants
/// also carry what had already been written to the target.
#[derive(Debug, Error)]
pub enum SyncError {
    /// The orchestrator was given an invalid configuration.
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// A read from the adapter failed.
    #[error("{phase} failed{}: {source}", describe_identity(.identity))]
    Adapter {
        phase: SyncPhase,
        identity: Option<String>,
        #[source]
        source: AdapterError,
    },

    /// Converting between native and canonical form failed.
    #[error("{phase} failed: {source}")]
    Mapping {
        phase: SyncPhase,
        #[source]
        source: MappingError,
    },

    /// The population diff failed.
    #[error("diff failed: {0}")]
    Reconcile(#[from] ReconcileError),

    /// A mutation failed and the run stopped (fail-fast).
    #[error("{phase} failed for '{identity}' after {summary}: {source}")]
    Apply {
        phase: SyncPhase,
        identity: String,
        #[source]
        source: AdapterError,
        summary: ApplySummary,
    },

    /// One or more mutations failed while applying every item.
    #[error("{} item(s) failed after {summary}", .failures.len())]
    PartialApply {
        failures: Vec<ItemFailure>,
        summary: ApplySummary,
    },

    /// A background task failed unexpectedly.
    #[error("internal error: {0}")]
    Internal(String),
}

impl SyncError {
    /// Create an adapter read error.
    pub fn adapter(phase: SyncPhase, identity: Option<String>, source: AdapterError) -> Self {
        SyncError::Adapter {
            phase,
            identity,
            source,
        }
    }

    /// Create a mapping error for a phase.
    pub fn mapping(phase: SyncPhase, source: MappingError) -> Self {
        SyncError::Mapping { phase, source }
    }

    /// The phase that failed, if the error belongs to one.
    pub fn phase(&self) -> Option<SyncPhase> {
        match self {
            SyncError::Adapter { phase, .. }
            | SyncError::Mapping { phase, .. }
            | SyncError::Apply { phase, .. } => Some(*phase),
            SyncError::Reconcile(_) => Some(SyncPhase::Diff),
            SyncError::PartialApply { failures, .. } => failures.first().map(|f| f.phase),
            SyncError::Config(_) | SyncError::Internal(_) => None,
        }
    }

    /// Summary of mutations already applied before the run stopped.
    pub fn applied(&self) -> Option<&ApplySummary> {
        match self {
            SyncError::Apply { summary, .. } | SyncError::PartialApply { summary, .. } => {
                Some(summary)
            }
            _ => None,
        }
    }

    /// Check if the target may have been left partially updated.
    pub fn is_partial(&self) -> bool {
        self.applied().is_some_and(|summary| !summary.is_empty())
    }

    /// Get an error code for classification.
    pub fn error_code(&self) -> &'static str {
        match self {
            SyncError::Config(_) => "INVALID_CONFIG",
            SyncError::Adapter { source, .. } => source.error_code(),
            SyncError::Mapping { source, .. } => source.error_code(),
            SyncError::Reconcile(source) => source.error_code(),
            SyncError::Apply { .. } => "APPLY_FAILED",
            SyncError::PartialApply { .. } => "PARTIAL_APPLY",
            SyncError::Internal(_) => "INTERNAL_ERROR",
        }
    }
}

fn describe_identity(identity: &Option<String>) -> String {
    identity
        .as_ref()
        .map(|id| format!(" for '{id}'"))
        .unwrap_or_default()
}

/// Result type for sync runs.
pub type SyncResult<T> = Result<T, SyncError>;
