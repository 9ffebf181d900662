//! idsync - reconcile user populations across identity systems
//!
//! - `plan` computes what each target would change
//! - `apply` writes those changes
//! - `validate` checks the configuration and desired population

use std::path::PathBuf;

use clap::{Parser, Subcommand};

use idsync_cli::commands;
use idsync_cli::error::CliResult;
use idsync_cli::logging::{directive_for, init_logging, LogFormat};

/// idsync - Identity population sync
#[derive(Parser)]
#[command(name = "idsync")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    /// Path to the sync configuration file
    #[arg(
        long,
        short = 'c',
        env = "IDSYNC_CONFIG",
        default_value = "idsync.yaml",
        global = true
    )]
    config: PathBuf,

    /// Log level or filter directive (overridden by RUST_LOG)
    #[arg(long, default_value = "info", global = true)]
    log_level: String,

    /// Log line format
    #[arg(long, value_enum, default_value_t = LogFormat::Text, global = true)]
    log_format: LogFormat,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Show the changes a sync would make
    Plan(commands::plan::PlanArgs),

    /// Sync targets to the desired population
    Apply(commands::apply::ApplyArgs),

    /// Check the configuration and desired population
    Validate(commands::validate::ValidateArgs),
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    if let Err(e) = init_logging(&directive_for(&cli.log_level), cli.log_format) {
        e.print();
        std::process::exit(e.exit_code());
    }

    match run(cli).await {
        Ok(()) => std::process::exit(0),
        Err(e) => {
            e.print();
            std::process::exit(e.exit_code());
        }
    }
}

async fn run(cli: Cli) -> CliResult<()> {
    match cli.command {
        Commands::Plan(args) => commands::plan::execute(args, &cli.config).await,
        Commands::Apply(args) => commands::apply::execute(args, &cli.config).await,
        Commands::Validate(args) => commands::validate::execute(args, &cli.config).await,
    }
}
