//! # Migration Registry
//!
//! Holds the known migration units ordered by version and enforces that
//! versions are unique. Where units come from is a [`MigrationSource`]'s
//! concern; the registry only guards its invariants.

use super::errors::{MigrationError, MigrationResult};
use super::loader::MigrationSource;
use super::version::MigrationVersion;
use super::Migration;
use std::collections::BTreeMap;

/// Ordered, duplicate-free collection of migration units
pub struct MigrationRegistry<D: ?Sized + Sync> {
    migrations: BTreeMap<MigrationVersion, Migration<D>>,
}

impl<D: ?Sized + Sync> MigrationRegistry<D> {
    pub fn new() -> Self {
        Self {
            migrations: BTreeMap::new(),
        }
    }

    /// Build a registry from every unit `source` yields.
    ///
    /// Fails on the first duplicate, before anything can run.
    pub fn load(source: &dyn MigrationSource<D>) -> MigrationResult<Self> {
        let mut registry = Self::new();
        for migration in source.load()? {
            registry.add(migration)?;
        }
        Ok(registry)
    }

    /// Register a unit.
    pub fn add(&mut self, migration: Migration<D>) -> MigrationResult<()> {
        if migration.version.is_zero() {
            return Err(MigrationError::InvalidMigration {
                reason: format!(
                    "'{}' uses version 0, which is reserved for \"nothing applied\"",
                    migration.name
                ),
            });
        }

        if self.migrations.contains_key(&migration.version) {
            return Err(MigrationError::DuplicateVersion {
                version: migration.version,
            });
        }

        tracing::debug!(version = %migration.version, name = %migration.name, "Registered migration");
        self.migrations.insert(migration.version, migration);
        Ok(())
    }

    /// All units, ascending by version
    pub fn all(&self) -> Vec<&Migration<D>> {
        self.migrations.values().collect()
    }

    pub fn has(&self, version: MigrationVersion) -> bool {
        self.migrations.contains_key(&version)
    }

    pub fn get(&self, version: MigrationVersion) -> Option<&Migration<D>> {
        self.migrations.get(&version)
    }

    /// Registered versions, ascending
    pub fn versions(&self) -> Vec<MigrationVersion> {
        self.migrations.keys().copied().collect()
    }

    /// Highest registered version
    pub fn latest(&self) -> Option<MigrationVersion> {
        self.migrations.keys().next_back().copied()
    }

    pub fn len(&self) -> usize {
        self.migrations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.migrations.is_empty()
    }
}

impl<D: ?Sized + Sync> Default for MigrationRegistry<D> {
    fn default() -> Self {
        Self::new()
    }
}
