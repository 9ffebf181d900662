//! Apply the planned changes to each target

use std::io::IsTerminal;
use std::path::Path;

use clap::Args;
use dialoguer::Confirm;
use idsync_core::orchestrator::SyncReport;

use super::{finish, orchestrator, print_plan, Workspace};
use crate::config::TargetConfig;
use crate::error::{CliError, CliResult};

/// Sync each target to the desired population
#[derive(Args, Debug)]
pub struct ApplyArgs {
    /// Only apply to this target
    #[arg(long, short = 't')]
    pub target: Option<String>,

    /// Skip confirmation prompt
    #[arg(long, short = 'y')]
    pub yes: bool,

    /// List every affected identity
    #[arg(long, short = 'v')]
    pub verbose: bool,

    /// Output as JSON
    #[arg(long)]
    pub json: bool,
}

/// Execute the apply command
pub async fn execute(args: ApplyArgs, config_path: &Path) -> CliResult<()> {
    let workspace = Workspace::load(config_path)?;
    let targets = workspace.config.select(args.target.as_deref())?;

    if !args.yes && !std::io::stdin().is_terminal() {
        return Err(CliError::Validation(
            "Cannot confirm in non-interactive mode. Use --yes to skip confirmation.".to_string(),
        ));
    }

    let mut reports = Vec::with_capacity(targets.len());
    let mut failures = Vec::new();

    for target in &targets {
        match apply_target(target, &workspace, &args).await {
            Ok(Some(report)) => {
                if !args.json {
                    println!("{}: {}", report.target, report.applied);
                }
                reports.push(report);
            }
            Ok(None) => {}
            Err(e) => failures.push(e.for_target(&target.name)),
        }
    }

    if args.json {
        println!("{}", serde_json::to_string_pretty(&reports)?);
    }

    finish(failures, targets.len())
}

/// Plan, confirm and apply one target. `None` when nothing was applied.
async fn apply_target(
    target: &TargetConfig,
    workspace: &Workspace,
    args: &ApplyArgs,
) -> CliResult<Option<SyncReport>> {
    let orchestrator = orchestrator(target)?;
    let plan = orchestrator.plan(&workspace.desired_for(target)).await?;

    if plan.is_noop() {
        if !args.json {
            println!("{}: no changes required", target.name);
        }
        return Ok(None);
    }

    if !args.json {
        print_plan(&plan, &target.sync.identity_key, args.verbose);
    }

    if !args.yes {
        let confirm = Confirm::new()
            .with_prompt(format!(
                "Apply {} change(s) to '{}'?",
                plan.diff.total(),
                target.name
            ))
            .default(false)
            .interact()
            .map_err(|e| CliError::Io(e.to_string()))?;

        if !confirm {
            println!("Skipped '{}'.", target.name);
            return Ok(None);
        }
    }

    let report = orchestrator.apply(&plan).await?;
    Ok(Some(report))
}
