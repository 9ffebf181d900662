//! Tracing subscriber setup.
//!
//! Logs go to stderr so that `--json` output on stdout stays machine-readable.

use clap::ValueEnum;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::error::{CliError, CliResult};

/// Log line format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum)]
pub enum LogFormat {
    #[default]
    Text,
    Json,
}

/// Initialize the tracing subscriber.
///
/// `RUST_LOG` takes precedence over `filter` when set.
pub fn init_logging(filter: &str, format: LogFormat) -> CliResult<()> {
    let filter_layer = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(filter))
        .map_err(|e| CliError::Config(format!("invalid log filter '{filter}': {e}")))?;

    let registry = tracing_subscriber::registry().with(filter_layer);
    let result = match format {
        LogFormat::Text => registry
            .with(fmt::layer().with_writer(std::io::stderr).with_target(false))
            .try_init(),
        LogFormat::Json => registry
            .with(
                fmt::layer()
                    .json()
                    .with_writer(std::io::stderr)
                    .with_target(true)
                    .flatten_event(true),
            )
            .try_init(),
    };
    result.map_err(|e| CliError::Config(format!("failed to initialize logging: {e}")))?;

    tracing::debug!(filter = %filter, ?format, "Logging initialized");
    Ok(())
}

/// Expand a bare level into a filter directive for this workspace's crates.
pub fn directive_for(level: &str) -> String {
    if level.contains('=') || level.contains(',') {
        return level.to_string();
    }
    format!("warn,idsync_core={level},idsync_connector_file={level},idsync_cli={level}")
}
