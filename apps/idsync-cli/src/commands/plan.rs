//! Show what a sync would change

use std::path::Path;

use clap::Args;

use super::{finish, orchestrator, print_plan, Workspace};
use crate::error::{CliError, CliResult};

/// Compute the changes for each target without applying them
#[derive(Args, Debug)]
pub struct PlanArgs {
    /// Only plan this target
    #[arg(long, short = 't')]
    pub target: Option<String>,

    /// List every affected identity
    #[arg(long, short = 'v')]
    pub verbose: bool,

    /// Output as JSON
    #[arg(long)]
    pub json: bool,
}

/// Execute the plan command
pub async fn execute(args: PlanArgs, config_path: &Path) -> CliResult<()> {
    let workspace = Workspace::load(config_path)?;
    let targets = workspace.config.select(args.target.as_deref())?;

    let mut plans = Vec::with_capacity(targets.len());
    let mut failures = Vec::new();

    for target in &targets {
        let result = async {
            let orchestrator = orchestrator(target)?;
            let plan = orchestrator.plan(&workspace.desired_for(target)).await?;
            Ok::<_, CliError>(plan)
        }
        .await;

        match result {
            Ok(plan) => {
                if !args.json {
                    print_plan(&plan, &target.sync.identity_key, args.verbose);
                }
                plans.push(plan);
            }
            Err(e) => failures.push(e.for_target(&target.name)),
        }
    }

    if args.json {
        println!("{}", serde_json::to_string_pretty(&plans)?);
    }

    finish(failures, targets.len())
}
