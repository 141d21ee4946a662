//! # Database Migrations Module
//!
//! Ordered, reversible, version-tracked migrations.
//!
//! # Design Principles
//!
//! 1. **Ordered**: units run by ascending version forward, descending backward
//! 2. **Tracked**: the version store records the last version reached after every step
//! 3. **Reversible**: every unit carries an explicit `up` and `down`
//! 4. **Fail-fast**: the first failing step halts the run; nothing is compensated
//! 5. **Idempotent**: migrating to the current version does nothing unless a rerun is forced
//!
//! # Migrations Directory
//!
//! Entries named `d.d` are units; everything else is ignored:
//!
//! ```text
//! migrations/
//!   1.0/migration.yaml
//!   1.1/migration.yaml
//!   README.md            <- ignored
//! ```
//!
//! A script looks like:
//!
//! ```yaml
//! name: create_users
//! checksum: "crc32:ABC12345"
//! up:
//!   - create_collection:
//!       name: users
//! down:
//!   - drop_collection:
//!       name: users
//! ```

pub mod checksum;
pub mod errors;
pub mod generator;
pub mod loader;
pub mod operations;
pub mod plan;
pub mod registry;
pub mod runner;
pub mod state;
pub mod version;

pub use errors::{MigrationError, MigrationResult, StepError, StoreError, StoreResult};
pub use loader::{DirectorySource, MigrationSource};
pub use operations::{CatalogExecutor, MigrationOperation, OperationExecutor, OperationScript};
pub use plan::{PlannedStep, RunPlan};
pub use registry::MigrationRegistry;
pub use runner::{
    AppliedStep, MigrationRunReport, MigrationRunner, MigrationStatusReport, RunState, RunnerConfig,
};
pub use state::{FileVersionStore, MemoryVersionStore, VersionRecord, VersionStore};
pub use version::{MigrationTarget, MigrationVersion};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;

/// Which half of a unit runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    Up,
    Down,
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Direction::Up => write!(f, "up"),
            Direction::Down => write!(f, "down"),
        }
    }
}

/// One direction of a migration unit, run against the database handle `D`.
///
/// The runner treats a step as all-or-nothing: it either resolves `Ok` and
/// the version advances, or it fails and the run stops.
#[async_trait]
pub trait MigrationStep<D: ?Sized + Sync>: Send + Sync {
    async fn execute(&self, db: &D) -> Result<(), StepError>;
}

/// Adapts a synchronous closure into a [`MigrationStep`].
pub struct FnStep<F>(F);

impl<F> FnStep<F> {
    pub fn new(f: F) -> Self {
        Self(f)
    }
}

#[async_trait]
impl<D, F> MigrationStep<D> for FnStep<F>
where
    D: ?Sized + Sync,
    F: Fn(&D) -> Result<(), StepError> + Send + Sync,
{
    async fn execute(&self, db: &D) -> Result<(), StepError> {
        (self.0)(db)
    }
}

/// A migration unit: a version paired with its `up` and `down` steps.
pub struct Migration<D: ?Sized + Sync> {
    /// Sort key and directory name
    pub version: MigrationVersion,

    /// Human-readable label, advisory only
    pub name: String,

    /// Checksum declared by the script, if any
    pub checksum: Option<String>,

    /// Where the unit was loaded from
    pub source: Option<PathBuf>,

    up: Arc<dyn MigrationStep<D>>,
    down: Arc<dyn MigrationStep<D>>,
}

impl<D: ?Sized + Sync> Migration<D> {
    pub fn new(
        version: MigrationVersion,
        name: impl Into<String>,
        up: impl MigrationStep<D> + 'static,
        down: impl MigrationStep<D> + 'static,
    ) -> Self {
        Self {
            version,
            name: name.into(),
            checksum: None,
            source: None,
            up: Arc::new(up),
            down: Arc::new(down),
        }
    }

    pub fn with_checksum(mut self, checksum: impl Into<String>) -> Self {
        self.checksum = Some(checksum.into());
        self
    }

    pub fn with_source(mut self, path: impl Into<PathBuf>) -> Self {
        self.source = Some(path.into());
        self
    }

    pub fn up(&self) -> &dyn MigrationStep<D> {
        self.up.as_ref()
    }

    pub fn down(&self) -> &dyn MigrationStep<D> {
        self.down.as_ref()
    }

    /// The step to run for `direction`.
    pub fn step(&self, direction: Direction) -> &dyn MigrationStep<D> {
        match direction {
            Direction::Up => self.up(),
            Direction::Down => self.down(),
        }
    }
}

impl<D: ?Sized + Sync> Clone for Migration<D> {
    fn clone(&self) -> Self {
        Self {
            version: self.version,
            name: self.name.clone(),
            checksum: self.checksum.clone(),
            source: self.source.clone(),
            up: Arc::clone(&self.up),
            down: Arc::clone(&self.down),
        }
    }
}

impl<D: ?Sized + Sync> fmt::Debug for Migration<D> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Migration")
            .field("version", &self.version)
            .field("name", &self.name)
            .field("checksum", &self.checksum)
            .field("source", &self.source)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[derive(Default)]
    struct Counter {
        ups: AtomicUsize,
        downs: AtomicUsize,
    }

    fn counting_migration(version: &str) -> Migration<Counter> {
        Migration::new(
            version.parse().unwrap(),
            "counter",
            FnStep::new(|db: &Counter| {
                db.ups.fetch_add(1, Ordering::SeqCst);
                Ok(())
            }),
            FnStep::new(|db: &Counter| {
                db.downs.fetch_add(1, Ordering::SeqCst);
                Ok(())
            }),
        )
    }

    #[tokio::test]
    async fn test_step_selects_direction() {
        let db = Counter::default();
        let migration = counting_migration("1.0");

        migration.step(Direction::Up).execute(&db).await.unwrap();
        migration.step(Direction::Up).execute(&db).await.unwrap();
        migration.step(Direction::Down).execute(&db).await.unwrap();

        assert_eq!(db.ups.load(Ordering::SeqCst), 2);
        assert_eq!(db.downs.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_fn_step_propagates_failure() {
        let step = FnStep::new(|_: &Counter| Err(StepError::new("boom")));
        let err = step.execute(&Counter::default()).await.unwrap_err();
        assert_eq!(err.message(), "boom");
    }

    #[test]
    fn test_direction_display() {
        assert_eq!(Direction::Up.to_string(), "up");
        assert_eq!(Direction::Down.to_string(), "down");
        assert_eq!(serde_json::to_string(&Direction::Down).unwrap(), "\"down\"");
    }

    #[test]
    fn test_clone_shares_steps() {
        let migration = counting_migration("1.1").with_checksum("crc32:00000000");
        let cloned = migration.clone();
        assert_eq!(cloned.version, migration.version);
        assert_eq!(cloned.checksum.as_deref(), Some("crc32:00000000"));
        assert!(format!("{:?}", cloned).contains("counter"));
    }
}
