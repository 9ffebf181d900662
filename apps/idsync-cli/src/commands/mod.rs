//! CLI command implementations

pub mod apply;
pub mod plan;
pub mod validate;

use std::path::Path;

use idsync_core::adapter::ProviderAdapter;
use idsync_core::orchestrator::{SyncOrchestrator, SyncPlan};
use idsync_core::reconcile::identity_of;
use idsync_core::record::CanonicalRecord;

use crate::config::{CliConfig, TargetConfig};
use crate::error::{CliError, CliResult};

/// Orchestrator over whichever adapter a target is configured with.
pub type TargetOrchestrator = SyncOrchestrator<dyn ProviderAdapter>;

/// Configuration plus the desired population it points at.
pub struct Workspace {
    pub config: CliConfig,
    pub desired: Vec<CanonicalRecord>,
}

impl Workspace {
    pub fn load(config_path: &Path) -> CliResult<Self> {
        let config = CliConfig::load(config_path)?;
        let desired = config.load_desired()?;
        tracing::debug!(
            targets = config.targets.len(),
            desired = desired.len(),
            "Loaded configuration"
        );
        Ok(Self { config, desired })
    }

    /// The desired population as a target sees it: mapped attributes and
    /// the Group Field only, so attributes another target uses do not show
    /// up as differences.
    pub fn desired_for(&self, target: &TargetConfig) -> Vec<CanonicalRecord> {
        let sync = &target.sync;
        self.desired
            .iter()
            .map(|record| {
                record
                    .iter()
                    .filter(|(name, _)| {
                        sync.mapping.maps(name) || sync.group_field.as_deref() == Some(name.as_str())
                    })
                    .map(|(name, value)| (name.clone(), value.clone()))
                    .collect::<CanonicalRecord>()
            })
            .collect()
    }
}

/// Build the orchestrator for a target.
pub fn orchestrator(target: &TargetConfig) -> CliResult<TargetOrchestrator> {
    let adapter = target.adapter()?;
    SyncOrchestrator::new(adapter, target.sync.clone())
        .map_err(|e| CliError::Config(format!("target '{}': {e}", target.name)))
}

/// Turn per-target failures into the command result.
///
/// A single failure is returned as is; several collapse into one error
/// carrying the most severe exit code.
pub fn finish(mut failures: Vec<CliError>, total: usize) -> CliResult<()> {
    match failures.len() {
        0 => Ok(()),
        1 if total == 1 => Err(failures.remove(0)),
        failed => {
            let exit_code = failures
                .iter()
                .map(CliError::exit_code)
                .max()
                .unwrap_or(1);
            for failure in &failures {
                failure.print();
            }
            Err(CliError::TargetsFailed {
                failed,
                total,
                exit_code,
            })
        }
    }
}

/// Print a plan in human-readable form.
pub fn print_plan(plan: &SyncPlan, identity_key: &str, verbose: bool) {
    let diff = &plan.diff;
    println!(
        "{}: {} to create, {} to update, {} to delete (current {}, desired {})",
        plan.target,
        diff.to_add.len(),
        diff.to_update.len(),
        diff.to_remove.len(),
        plan.current_count,
        plan.desired_count
    );
    if plan.out_of_scope > 0 {
        println!(
            "{}: {} desired record(s) ignored or outside the user filters",
            plan.target, plan.out_of_scope
        );
    }

    if !verbose {
        return;
    }
    let sections = [("+", &diff.to_add), ("~", &diff.to_update), ("-", &diff.to_remove)];
    for (marker, records) in sections {
        for record in records.iter() {
            let id = identity_of(record, identity_key).unwrap_or("?");
            println!("  {marker} {id}");
        }
    }
}
