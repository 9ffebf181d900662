//! Check configuration and desired population

use std::collections::HashSet;
use std::path::Path;

use clap::Args;
use idsync_core::mapping::AttributeMapper;
use idsync_core::reconcile::identity_of;
use idsync_core::record::CanonicalRecord;

use super::{orchestrator, Workspace};
use crate::config::TargetConfig;
use crate::error::{CliError, CliResult};

/// Problems reported per target before the rest are elided.
const MAX_REPORTED: usize = 10;

/// Validate the configuration file and the desired population
#[derive(Args, Debug)]
pub struct ValidateArgs {
    /// Also read each target to confirm it is reachable and mappable
    #[arg(long)]
    pub check_targets: bool,
}

/// Execute the validate command
pub async fn execute(args: ValidateArgs, config_path: &Path) -> CliResult<()> {
    let workspace = Workspace::load(config_path)?;

    let mut problem_count = 0;
    for target in &workspace.config.targets {
        let orchestrator = orchestrator(target)?;

        let problems = check_desired(target, &workspace.desired);
        for problem in problems.iter().take(MAX_REPORTED) {
            println!("{}: {problem}", target.name);
        }
        if problems.len() > MAX_REPORTED {
            println!(
                "{}: ... and {} more",
                target.name,
                problems.len() - MAX_REPORTED
            );
        }
        problem_count += problems.len();

        if args.check_targets {
            let current = orchestrator
                .fetch_canonical(&target.sync.list_options())
                .await
                .map_err(|e| CliError::from(e).for_target(&target.name))?;
            println!("{}: reachable, {} current record(s)", target.name, current.len());
        }
    }

    if problem_count > 0 {
        return Err(CliError::Validation(format!(
            "{problem_count} problem(s) in the desired population"
        )));
    }

    println!(
        "Configuration is valid: {} target(s), {} desired record(s)",
        workspace.config.targets.len(),
        workspace.desired.len()
    );
    Ok(())
}

/// Records a target could not create or match.
fn check_desired(target: &TargetConfig, desired: &[CanonicalRecord]) -> Vec<String> {
    let key = target.sync.identity_key.as_str();
    let mapper = AttributeMapper::new(target.sync.mapping.clone());
    // A mapped Group Field is already covered by the mapping check.
    let group_field = target
        .sync
        .group_field
        .as_deref()
        .filter(|field| !target.sync.mapping.maps(field));
    let mut seen = HashSet::new();
    let mut problems = Vec::new();

    for (position, record) in desired.iter().enumerate() {
        match identity_of(record, key) {
            Ok(id) => {
                if !seen.insert(id) {
                    problems.push(format!("record #{position}: duplicate identity '{id}'"));
                }
            }
            Err(e) => problems.push(format!("record #{position}: {e}")),
        }
        if let Err(e) = mapper.to_native(record) {
            problems.push(format!("record #{position}: {e}"));
        }
        if let Some(field) = group_field.filter(|field| !record.contains(field)) {
            problems.push(format!(
                "record #{position}: missing group field '{field}'"
            ));
        }
    }
    problems
}
