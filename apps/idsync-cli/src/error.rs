//! CLI error types and exit codes

use idsync_core::error::{ConfigError, SyncError};
use thiserror::Error;

/// Exit codes for the CLI
/// - 0: Success
/// - 1: General error
/// - 3: Target unreachable or rejected a request
/// - 4: Invalid configuration or data
/// - 5: Target left partially updated
pub type CliResult<T> = Result<T, CliError>;

#[derive(Debug, Error)]
pub enum CliError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Invalid input: {0}")]
    Validation(String),

    #[error("I/O error: {0}")]
    Io(String),

    #[error("Target error: {0}")]
    Target(String),

    #[error("Partial apply: {0}")]
    PartialApply(String),

    #[error("Sync failed: {0}")]
    Sync(String),

    #[error("{failed} of {total} target(s) failed")]
    TargetsFailed {
        failed: usize,
        total: usize,
        exit_code: i32,
    },
}

impl CliError {
    /// Get the exit code for this error
    pub fn exit_code(&self) -> i32 {
        match self {
            CliError::Config(_) | CliError::Validation(_) => 4,
            CliError::Target(_) => 3,
            CliError::PartialApply(_) => 5,
            CliError::Io(_) | CliError::Sync(_) => 1,
            CliError::TargetsFailed { exit_code, .. } => *exit_code,
        }
    }

    /// Prefix the message with the target it belongs to.
    pub fn for_target(self, target: &str) -> Self {
        match self {
            CliError::Config(m) => CliError::Config(format!("[{target}] {m}")),
            CliError::Validation(m) => CliError::Validation(format!("[{target}] {m}")),
            CliError::Io(m) => CliError::Io(format!("[{target}] {m}")),
            CliError::Target(m) => CliError::Target(format!("[{target}] {m}")),
            CliError::PartialApply(m) => CliError::PartialApply(format!("[{target}] {m}")),
            CliError::Sync(m) => CliError::Sync(format!("[{target}] {m}")),
            other => other,
        }
    }

    /// Print the error to stderr with appropriate formatting
    pub fn print(&self) {
        let use_color = std::env::var("NO_COLOR").is_err();

        if use_color {
            eprintln!("\x1b[31mError:\x1b[0m {self}");
        } else {
            eprintln!("Error: {self}");
        }

        if let Some(suggestion) = self.suggestion() {
            if use_color {
                eprintln!("\n\x1b[33mSuggestion:\x1b[0m {suggestion}");
            } else {
                eprintln!("\nSuggestion: {suggestion}");
            }
        }
    }

    /// Get a suggested action for this error
    fn suggestion(&self) -> Option<&'static str> {
        match self {
            CliError::PartialApply(_) => {
                Some("Run 'idsync plan' to see what remains, then 'idsync apply' again.")
            }
            CliError::Config(_) => Some("Run 'idsync validate' to check the configuration."),
            _ => None,
        }
    }
}

impl From<std::io::Error> for CliError {
    fn from(err: std::io::Error) -> Self {
        CliError::Io(err.to_string())
    }
}

impl From<serde_json::Error> for CliError {
    fn from(err: serde_json::Error) -> Self {
        CliError::Io(format!("JSON error: {err}"))
    }
}

impl From<ConfigError> for CliError {
    fn from(err: ConfigError) -> Self {
        CliError::Config(err.to_string())
    }
}

impl From<SyncError> for CliError {
    fn from(err: SyncError) -> Self {
        let message = err.to_string();
        match err {
            SyncError::Config(_) => CliError::Config(message),
            SyncError::Mapping { .. } | SyncError::Reconcile(_) => CliError::Validation(message),
            SyncError::Adapter { .. } => CliError::Target(message),
            SyncError::Apply { .. } | SyncError::PartialApply { .. } if err.is_partial() => {
                CliError::PartialApply(message)
            }
            SyncError::Apply { .. } | SyncError::PartialApply { .. } => CliError::Target(message),
            SyncError::Internal(_) => CliError::Sync(message),
        }
    }
}
