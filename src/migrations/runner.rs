//! # Migration Runner
//!
//! Drives a run from the current version to a target:
//!
//! `Idle -> PlanningComputed -> Executing -> Completed | Failed`
//!
//! - the current version is re-read from the store on every run
//! - the plan is computed before anything is touched
//! - the backup (when enabled) finishes before the first unit starts
//! - units run one at a time; the store is updated after each one
//! - the first failure stops the run; applied units stay applied

use super::errors::{MigrationError, MigrationResult};
use super::plan::{PlannedStep, RunPlan};
use super::registry::MigrationRegistry;
use super::state::VersionStore;
use super::version::{MigrationTarget, MigrationVersion};
use super::{Direction, Migration};
use crate::backup::{BackupArchive, BackupError, BackupOrchestrator};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use std::time::Instant;
use tracing::Instrument;
use uuid::Uuid;

/// Runner options, fixed at construction
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunnerConfig {
    /// Name of the version store collection
    pub collection_name: String,

    /// Take a backup before any run that executes units
    pub backup: bool,

    /// Log a notice when the target is already reached
    pub log_if_latest: bool,
}

impl Default for RunnerConfig {
    fn default() -> Self {
        Self {
            collection_name: "migrations".to_string(),
            backup: false,
            log_if_latest: true,
        }
    }
}

/// Where a run is in its lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RunState {
    Idle,
    PlanningComputed,
    Executing,
    Completed,
    Failed,
}

impl fmt::Display for RunState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            RunState::Idle => "idle",
            RunState::PlanningComputed => "planning_computed",
            RunState::Executing => "executing",
            RunState::Completed => "completed",
            RunState::Failed => "failed",
        };
        f.write_str(name)
    }
}

fn transition(state: &mut RunState, next: RunState) {
    tracing::debug!(from = %state, to = %next, "Run state transition");
    *state = next;
}

/// Successfully executed step
#[derive(Debug, Clone, Serialize)]
pub struct AppliedStep {
    pub version: MigrationVersion,
    pub name: String,
    pub direction: Direction,
    /// Version recorded after the step
    pub resulting_version: MigrationVersion,
    pub duration_ms: u64,
}

/// Report from a completed run
#[derive(Debug, Clone, Serialize)]
pub struct MigrationRunReport {
    pub run_id: Uuid,
    pub from_version: MigrationVersion,
    pub to_version: MigrationVersion,
    pub state: RunState,
    /// True when nothing needed to run
    pub already_at_target: bool,
    pub applied: Vec<AppliedStep>,
    pub backup: Option<BackupArchive>,
}

/// Status report for migrations
#[derive(Debug, Clone, Serialize)]
pub struct MigrationStatusReport {
    pub current_version: MigrationVersion,
    pub latest_version: MigrationVersion,
    pub total_migrations: usize,
    pub applied: Vec<MigrationVersion>,
    pub pending: Vec<MigrationVersion>,
    /// Current version is not 0 and names no registered unit
    pub current_unregistered: bool,
}

/// Migration runner
///
/// `D` is the database handle units execute against.
pub struct MigrationRunner<D: ?Sized + Sync> {
    config: RunnerConfig,
    registry: MigrationRegistry<D>,
    store: Arc<dyn VersionStore>,
    backup: Option<Arc<dyn BackupOrchestrator>>,
    database: Arc<D>,
}

impl<D: ?Sized + Send + Sync> MigrationRunner<D> {
    /// Create a runner with an empty registry
    pub fn new(config: RunnerConfig, store: Arc<dyn VersionStore>, database: Arc<D>) -> Self {
        Self {
            config,
            registry: MigrationRegistry::new(),
            store,
            backup: None,
            database,
        }
    }

    pub fn with_registry(mut self, registry: MigrationRegistry<D>) -> Self {
        self.registry = registry;
        self
    }

    /// Attach the orchestrator used when `config.backup` is set.
    pub fn with_backup(mut self, orchestrator: Arc<dyn BackupOrchestrator>) -> Self {
        self.backup = Some(orchestrator);
        self
    }

    /// Register one more unit.
    pub fn register(&mut self, migration: Migration<D>) -> MigrationResult<()> {
        self.registry.add(migration)
    }

    pub fn registry(&self) -> &MigrationRegistry<D> {
        &self.registry
    }

    pub fn config(&self) -> &RunnerConfig {
        &self.config
    }

    /// Version currently recorded in the store
    pub async fn current_version(&self) -> MigrationResult<MigrationVersion> {
        Ok(self.store.get_version().await?)
    }

    /// Migrate using the `<version>` / `<version>,rerun` grammar.
    pub async fn migrate_to(&self, input: &str) -> MigrationResult<MigrationRunReport> {
        let target: MigrationTarget = input.parse()?;
        self.migrate(target).await
    }

    /// Migrate to the highest registered version.
    pub async fn migrate_latest(&self) -> MigrationResult<MigrationRunReport> {
        let latest = self.registry.latest().unwrap_or(MigrationVersion::ZERO);
        self.migrate(MigrationTarget::to(latest)).await
    }

    /// Migrate to `target`.
    pub async fn migrate(&self, target: MigrationTarget) -> MigrationResult<MigrationRunReport> {
        let run_id = Uuid::new_v4();
        let span = tracing::info_span!(
            "migrate",
            run_id = %run_id,
            collection = %self.config.collection_name,
            target = %target.version,
            rerun = target.rerun
        );
        self.run(run_id, target).instrument(span).await
    }

    async fn run(&self, run_id: Uuid, target: MigrationTarget) -> MigrationResult<MigrationRunReport> {
        let mut state = RunState::Idle;

        let current = self.store.get_version().await?;
        let plan = RunPlan::compute(&self.registry.versions(), current, target)?;
        transition(&mut state, RunState::PlanningComputed);

        if plan.is_empty() {
            if self.config.log_if_latest {
                tracing::info!(version = %current, "Already at version {}, nothing to migrate", current);
            }
            transition(&mut state, RunState::Completed);
            return Ok(MigrationRunReport {
                run_id,
                from_version: current,
                to_version: current,
                state,
                already_at_target: true,
                applied: Vec::new(),
                backup: None,
            });
        }

        if !current.is_zero() && !self.registry.has(current) {
            tracing::warn!(version = %current, "Current version has no registered migration");
        }

        tracing::info!(
            from = %plan.from,
            to = %plan.to,
            steps = plan.len(),
            "Computed migration plan"
        );

        let backup = if self.config.backup {
            Some(self.run_backup(current).await?)
        } else {
            None
        };

        transition(&mut state, RunState::Executing);

        let mut reached = current;
        let mut applied = Vec::with_capacity(plan.len());
        for step in plan.steps() {
            match self.execute_step(step, reached).await {
                Ok(done) => {
                    reached = done.resulting_version;
                    applied.push(done);
                }
                Err(e) => {
                    transition(&mut state, RunState::Failed);
                    tracing::error!(
                        version = %step.version,
                        direction = %step.direction,
                        last_version = %reached,
                        error = %e,
                        "Migration run failed"
                    );
                    return Err(e);
                }
            }
        }

        transition(&mut state, RunState::Completed);
        tracing::info!(version = %reached, applied = applied.len(), "Migration run completed");

        Ok(MigrationRunReport {
            run_id,
            from_version: current,
            to_version: reached,
            state,
            already_at_target: false,
            applied,
            backup,
        })
    }

    async fn run_backup(&self, before: MigrationVersion) -> MigrationResult<BackupArchive> {
        let orchestrator = self.backup.as_ref().ok_or_else(|| MigrationError::Backup {
            before,
            source: BackupError::not_configured(),
        })?;

        orchestrator
            .create_backup(before)
            .await
            .map_err(|source| MigrationError::Backup { before, source })
    }

    /// Run one step and record its resulting version.
    async fn execute_step(
        &self,
        step: &PlannedStep,
        last_version: MigrationVersion,
    ) -> MigrationResult<AppliedStep> {
        let migration = self
            .registry
            .get(step.version)
            .ok_or(MigrationError::UnknownVersion {
                version: step.version,
            })?;

        tracing::info!(
            version = %step.version,
            direction = %step.direction,
            name = %migration.name,
            "Running migration"
        );

        let start = Instant::now();
        migration
            .step(step.direction)
            .execute(self.database.as_ref())
            .await
            .map_err(|source| MigrationError::UnitExecution {
                version: step.version,
                direction: step.direction,
                last_version,
                source,
            })?;

        self.store
            .set_version(step.resulting_version)
            .await
            .map_err(|source| MigrationError::Persistence {
                version: step.version,
                direction: step.direction,
                attempted: step.resulting_version,
                last_version,
                source,
            })?;

        let duration_ms = start.elapsed().as_millis() as u64;
        tracing::debug!(version = %step.resulting_version, duration_ms, "Recorded version");

        Ok(AppliedStep {
            version: step.version,
            name: migration.name.clone(),
            direction: step.direction,
            resulting_version: step.resulting_version,
            duration_ms,
        })
    }

    /// Current, applied and pending versions.
    pub async fn status(&self) -> MigrationResult<MigrationStatusReport> {
        let current = self.store.get_version().await?;
        let versions = self.registry.versions();
        let (applied, pending): (Vec<_>, Vec<_>) =
            versions.iter().copied().partition(|v| *v <= current);

        Ok(MigrationStatusReport {
            current_version: current,
            latest_version: self.registry.latest().unwrap_or(MigrationVersion::ZERO),
            total_migrations: versions.len(),
            applied,
            pending,
            current_unregistered: !current.is_zero() && !self.registry.has(current),
        })
    }
}
