//! Sync orchestration.
//!
//! The generic control loop that runs against any [`ProviderAdapter`]:
//!
//! 1. Read the target population and convert it to canonical form
//! 2. Overlay each user's group memberships (when a Group Field is set)
//! 3. Diff against the desired population
//! 4. Create, then delete, then update
//!
//! Steps 1 to 3 form a [`SyncPlan`], which can be inspected before it is
//! applied. Phases run strictly in sequence; only membership reads run
//! concurrently.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

use crate::adapter::{ListOptions, ProviderAdapter};
use crate::config::SyncConfig;
use crate::error::{AdapterError, ConfigError, SyncError, SyncResult};
use crate::ignore::IgnoreRules;
use crate::mapping::AttributeMapper;
use crate::membership::MembershipOverlay;
use crate::reconcile::{identity_of, DiffResult, ReconciliationEngine};
use crate::record::{CanonicalRecord, NativeRecord};

/// How the apply step reacts to a failed mutation.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ApplyPolicy {
    /// Stop at the first failure.
    #[default]
    FailFast,
    /// Attempt every mutation and report all failures at the end.
    ContinueOnError,
}

/// Stage of a sync run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncPhase {
    Fetch,
    Memberships,
    Convert,
    Diff,
    Create,
    Delete,
    Update,
}

impl SyncPhase {
    pub fn as_str(&self) -> &'static str {
        match self {
            SyncPhase::Fetch => "fetch",
            SyncPhase::Memberships => "memberships",
            SyncPhase::Convert => "convert",
            SyncPhase::Diff => "diff",
            SyncPhase::Create => "create",
            SyncPhase::Delete => "delete",
            SyncPhase::Update => "update",
        }
    }
}

impl fmt::Display for SyncPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Identities written to the target, per mutation kind.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApplySummary {
    pub created: Vec<String>,
    pub updated: Vec<String>,
    pub deleted: Vec<String>,
}

impl ApplySummary {
    /// Check if nothing was written.
    pub fn is_empty(&self) -> bool {
        self.created.is_empty() && self.updated.is_empty() && self.deleted.is_empty()
    }

    /// Total number of writes.
    pub fn total(&self) -> usize {
        self.created.len() + self.updated.len() + self.deleted.len()
    }

    fn record(&mut self, phase: SyncPhase, identity: String) {
        match phase {
            SyncPhase::Create => self.created.push(identity),
            SyncPhase::Update => self.updated.push(identity),
            SyncPhase::Delete => self.deleted.push(identity),
            _ => {}
        }
    }
}

impl fmt::Display for ApplySummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} created, {} updated, {} deleted",
            self.created.len(),
            self.updated.len(),
            self.deleted.len()
        )
    }
}

/// A mutation that failed under [`ApplyPolicy::ContinueOnError`].
#[derive(Debug)]
pub struct ItemFailure {
    pub phase: SyncPhase,
    pub identity: String,
    pub error: AdapterError,
}

impl fmt::Display for ItemFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} '{}': {}", self.phase, self.identity, self.error)
    }
}

/// The changes one run would make, computed without writing anything.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncPlan {
    pub run_id: Uuid,
    pub target: String,
    pub created_at: DateTime<Utc>,
    pub current_count: usize,
    /// Desired users inside the sync scope.
    pub desired_count: usize,
    /// Desired users left out as ignored or outside the user filters.
    #[serde(default)]
    pub out_of_scope: usize,
    pub diff: DiffResult,
}

impl SyncPlan {
    /// Check if the target already matches.
    pub fn is_noop(&self) -> bool {
        self.diff.is_empty()
    }
}

/// Outcome of a completed run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncReport {
    pub run_id: Uuid,
    pub target: String,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub current_count: usize,
    pub desired_count: usize,
    pub applied: ApplySummary,
}

enum Mutation {
    Create(NativeRecord),
    Delete,
    Update(NativeRecord),
}

impl Mutation {
    fn phase(&self) -> SyncPhase {
        match self {
            Mutation::Create(_) => SyncPhase::Create,
            Mutation::Delete => SyncPhase::Delete,
            Mutation::Update(_) => SyncPhase::Update,
        }
    }
}

/// Runs syncs against one target.
///
/// Holds only immutable configuration and a shared handle to the adapter;
/// no state carries over between runs.
pub struct SyncOrchestrator<A: ProviderAdapter + ?Sized + 'static> {
    adapter: Arc<A>,
    config: SyncConfig,
    mapper: AttributeMapper,
    overlay: MembershipOverlay,
    engine: ReconciliationEngine,
    ignore: IgnoreRules,
}

impl<A: ProviderAdapter + ?Sized + 'static> SyncOrchestrator<A> {
    /// Create an orchestrator after validating `config`.
    pub fn new(adapter: Arc<A>, config: SyncConfig) -> Result<Self, ConfigError> {
        config.validate()?;

        let mapper = AttributeMapper::new(config.mapping.clone());
        let overlay = MembershipOverlay::new(config.group_field.clone());
        let engine = ReconciliationEngine::new(config.identity_key.clone())
            .with_duplicate_keys(config.duplicate_keys);
        let ignore = config.ignore_rules();

        Ok(Self {
            adapter,
            config,
            mapper,
            overlay,
            engine,
            ignore,
        })
    }

    /// The adapter this orchestrator drives.
    pub fn adapter(&self) -> &Arc<A> {
        &self.adapter
    }

    pub fn config(&self) -> &SyncConfig {
        &self.config
    }

    /// Read the target population in canonical form, memberships attached.
    #[instrument(skip(self), fields(adapter = %self.adapter.name()))]
    pub async fn fetch_canonical(&self, options: &ListOptions) -> SyncResult<Vec<CanonicalRecord>> {
        let natives = self
            .adapter
            .fetch_population(options)
            .await
            .map_err(|e| SyncError::adapter(SyncPhase::Fetch, None, e))?;
        debug!(count = natives.len(), "Fetched target population");

        let mut records = self
            .mapper
            .to_canonical_all(&natives)
            .map_err(|e| SyncError::mapping(SyncPhase::Convert, e))?;

        if !self.ignore.is_empty() {
            let key = self.engine.identity_key();
            records.retain(|r| {
                identity_of(r, key).map_or(true, |id| !self.ignore.is_user_ignored(id))
            });
        }

        self.attach_memberships(records).await
    }

    /// Read one user in canonical form, memberships attached.
    #[instrument(skip(self), fields(adapter = %self.adapter.name()))]
    pub async fn fetch_canonical_one(&self, user_id: &str) -> SyncResult<CanonicalRecord> {
        let native = self
            .adapter
            .fetch_one(user_id)
            .await
            .map_err(|e| SyncError::adapter(SyncPhase::Fetch, Some(user_id.to_string()), e))?;

        let record = self
            .mapper
            .to_canonical(&native)
            .map_err(|e| SyncError::mapping(SyncPhase::Convert, e))?;

        if !self.overlay.is_enabled() {
            return Ok(record);
        }
        let groups = self
            .adapter
            .fetch_memberships(user_id)
            .await
            .map_err(|e| {
                SyncError::adapter(SyncPhase::Memberships, Some(user_id.to_string()), e)
            })?;
        Ok(self.overlay.attach(record, groups))
    }

    /// Compute what a sync would change, without writing.
    #[instrument(skip(self, desired), fields(adapter = %self.adapter.name(), desired = desired.len()))]
    pub async fn plan(&self, desired: &[CanonicalRecord]) -> SyncResult<SyncPlan> {
        let options = self.config.list_options();
        let current = self.fetch_canonical(&options).await?;
        let scoped = self.scope_desired(desired, &options)?;
        let diff = self.engine.diff(&current, &scoped)?;

        info!(
            current = current.len(),
            desired = scoped.len(),
            out_of_scope = desired.len() - scoped.len(),
            to_add = diff.to_add.len(),
            to_update = diff.to_update.len(),
            to_remove = diff.to_remove.len(),
            "Sync plan computed"
        );

        Ok(SyncPlan {
            run_id: Uuid::new_v4(),
            target: self.adapter.name().to_string(),
            created_at: Utc::now(),
            current_count: current.len(),
            desired_count: scoped.len(),
            out_of_scope: desired.len() - scoped.len(),
            diff,
        })
    }

    /// Apply a plan: creates, then deletes, then updates.
    ///
    /// Every outbound payload is mapped before the first write, so a mapping
    /// failure leaves the target untouched.
    #[instrument(skip(self, plan), fields(adapter = %self.adapter.name(), run_id = %plan.run_id))]
    pub async fn apply(&self, plan: &SyncPlan) -> SyncResult<SyncReport> {
        let started_at = Utc::now();
        let mutations = self.prepare_mutations(&plan.diff)?;

        let mut summary = ApplySummary::default();
        let mut failures = Vec::new();

        for (identity, mutation) in mutations {
            let phase = mutation.phase();
            let result = match mutation {
                Mutation::Create(native) => self.adapter.create_record(native).await,
                Mutation::Delete => self.adapter.delete_record(&identity).await,
                Mutation::Update(native) => self.adapter.update_record(&identity, native).await,
            };

            match result {
                Ok(()) => {
                    debug!(%phase, identity = %identity, "Applied");
                    summary.record(phase, identity);
                }
                Err(source) => match self.config.apply_policy {
                    ApplyPolicy::FailFast => {
                        warn!(%phase, identity = %identity, error = %source, applied = %summary, "Apply stopped");
                        return Err(SyncError::Apply {
                            phase,
                            identity,
                            source,
                            summary,
                        });
                    }
                    ApplyPolicy::ContinueOnError => {
                        warn!(%phase, identity = %identity, error = %source, "Apply failed, continuing");
                        failures.push(ItemFailure {
                            phase,
                            identity,
                            error: source,
                        });
                    }
                },
            }
        }

        if !failures.is_empty() {
            return Err(SyncError::PartialApply { failures, summary });
        }

        info!(applied = %summary, "Sync applied");

        Ok(SyncReport {
            run_id: plan.run_id,
            target: plan.target.clone(),
            started_at,
            finished_at: Utc::now(),
            current_count: plan.current_count,
            desired_count: plan.desired_count,
            applied: summary,
        })
    }

    /// Plan and apply in one step.
    pub async fn sync(&self, desired: &[CanonicalRecord]) -> SyncResult<SyncReport> {
        let started_at = Utc::now();
        let plan = self.plan(desired).await?;
        let mut report = self.apply(&plan).await?;
        report.started_at = started_at;
        Ok(report)
    }

    /// Drop desired users the target never shows: ignored identities and,
    /// when user filters are set, records the adapter places outside them.
    ///
    /// Records without a usable identity are kept so the diff reports them.
    fn scope_desired(
        &self,
        desired: &[CanonicalRecord],
        options: &ListOptions,
    ) -> SyncResult<Vec<CanonicalRecord>> {
        let key = self.engine.identity_key();
        let mut scoped = Vec::with_capacity(desired.len());

        for record in desired {
            let Ok(identity) = identity_of(record, key) else {
                scoped.push(record.clone());
                continue;
            };
            if self.ignore.is_user_ignored(identity) {
                debug!(identity = %identity, "Ignored user left out of the plan");
                continue;
            }
            if options.filter.is_some() {
                let native = self.outbound(record, SyncPhase::Convert)?;
                let in_scope = self.adapter.in_scope(&native, options).map_err(|e| {
                    SyncError::adapter(SyncPhase::Diff, Some(identity.to_string()), e)
                })?;
                if !in_scope {
                    debug!(identity = %identity, "User outside the filter left out of the plan");
                    continue;
                }
            }
            scoped.push(record.clone());
        }

        Ok(scoped)
    }

    fn prepare_mutations(&self, diff: &DiffResult) -> SyncResult<Vec<(String, Mutation)>> {
        let key = self.engine.identity_key();
        let mut mutations = Vec::with_capacity(diff.total());

        for record in &diff.to_add {
            let identity = identity_of(record, key)?.to_string();
            let native = self.outbound(record, SyncPhase::Create)?;
            mutations.push((identity, Mutation::Create(native)));
        }
        for record in &diff.to_remove {
            let identity = identity_of(record, key)?.to_string();
            mutations.push((identity, Mutation::Delete));
        }
        for record in &diff.to_update {
            let identity = identity_of(record, key)?.to_string();
            let native = self.outbound(record, SyncPhase::Update)?;
            mutations.push((identity, Mutation::Update(native)));
        }

        Ok(mutations)
    }

    fn outbound(&self, record: &CanonicalRecord, phase: SyncPhase) -> SyncResult<NativeRecord> {
        let native = self
            .mapper
            .to_native(record)
            .map_err(|e| SyncError::mapping(phase, e))?;
        Ok(self.overlay.project(record, native, self.mapper.mapping()))
    }

    async fn attach_memberships(
        &self,
        records: Vec<CanonicalRecord>,
    ) -> SyncResult<Vec<CanonicalRecord>> {
        if !self.overlay.is_enabled() || records.is_empty() {
            return Ok(records);
        }

        let key = self.engine.identity_key();
        let ids = records
            .iter()
            .map(|r| identity_of(r, key).map(str::to_string))
            .collect::<Result<Vec<_>, _>>()?;

        let semaphore = Arc::new(Semaphore::new(self.config.membership_concurrency));
        let mut join_set = JoinSet::new();

        for (position, id) in ids.into_iter().enumerate() {
            let adapter = Arc::clone(&self.adapter);
            let semaphore = Arc::clone(&semaphore);
            join_set.spawn(async move {
                let _permit = semaphore.acquire_owned().await;
                let result = adapter.fetch_memberships(&id).await;
                (position, id, result)
            });
        }

        let mut slots: Vec<Option<Vec<String>>> = vec![None; records.len()];
        while let Some(join_result) = join_set.join_next().await {
            match join_result {
                Ok((position, _, Ok(groups))) => slots[position] = Some(groups),
                Ok((_, id, Err(e))) => {
                    join_set.abort_all();
                    return Err(SyncError::adapter(SyncPhase::Memberships, Some(id), e));
                }
                Err(e) => {
                    join_set.abort_all();
                    return Err(SyncError::Internal(format!("membership task failed: {e}")));
                }
            }
        }

        records
            .into_iter()
            .zip(slots)
            .map(|(record, groups)| match groups {
                Some(groups) => Ok(self.overlay.attach(record, groups)),
                None => Err(SyncError::Internal(
                    "membership task finished without a result".to_string(),
                )),
            })
            .collect()
    }
}
