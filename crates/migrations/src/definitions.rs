//! Migration Definitions - Core types and structures for migrations
//!
//! Defines the fundamental types used throughout the migration system including
//! MigrationDefinition, AppliedMigration, MigrationConfig and BatchOutcome.

use chrono::{DateTime, Utc};
use std::path::{Path, PathBuf};
use strata_core::{Client, MigrationSettings, RollbackBoundary, SeedSettings};

/// A named schema change discovered from the migration source
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MigrationDefinition {
    /// Sortable identifier, typically timestamp-prefixed
    pub name: String,
    /// SQL statements to apply the migration
    pub up: String,
    /// SQL statements to reverse it; `None` means irreversible
    pub down: Option<String>,
}

impl MigrationDefinition {
    pub fn new(name: impl Into<String>, up: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            up: up.into(),
            down: None,
        }
    }

    pub fn with_down(mut self, down: impl Into<String>) -> Self {
        self.down = Some(down.into());
        self
    }

    pub fn is_reversible(&self) -> bool {
        self.down.is_some()
    }
}

/// Persisted fact that a migration was applied
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AppliedMigration {
    pub name: String,
    /// Batch number (for grouping migrations)
    pub batch: i64,
    pub applied_at: DateTime<Utc>,
}

/// Direction a migration is executed in
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MigrationDirection {
    /// Apply the migration (run UP statements)
    Up,
    /// Rollback the migration (run DOWN statements)
    Down,
}

/// Configuration for the migration system
#[derive(Debug, Clone)]
pub struct MigrationConfig {
    /// Directory where migration files are stored
    pub migrations_dir: PathBuf,
    /// Table name for tracking migrations
    pub migrations_table: String,
    /// File extensions treated as migrations
    pub extensions: Vec<String>,
    /// Run each migration outside a transaction
    pub disable_transactions: bool,
    /// Boundary policy for `rollback` with a named migration
    pub rollback_boundary: RollbackBoundary,
    /// SQL dialect used to split statements
    pub client: Client,
}

impl Default for MigrationConfig {
    fn default() -> Self {
        Self::from_settings(&MigrationSettings::default(), Path::new("."), Client::Postgres)
    }
}

impl MigrationConfig {
    /// Build from the project settings, resolving the directory against `base_dir`
    pub fn from_settings(settings: &MigrationSettings, base_dir: &Path, client: Client) -> Self {
        Self {
            migrations_dir: base_dir.join(&settings.directory),
            migrations_table: settings.table_name.clone(),
            extensions: settings.extensions.clone(),
            disable_transactions: settings.disable_transactions,
            rollback_boundary: settings.rollback_boundary,
            client,
        }
    }
}

/// Configuration for seed discovery
#[derive(Debug, Clone)]
pub struct SeedConfig {
    pub seeds_dir: PathBuf,
    pub extensions: Vec<String>,
}

impl SeedConfig {
    pub fn from_settings(settings: &SeedSettings, base_dir: &Path) -> Self {
        Self {
            seeds_dir: base_dir.join(&settings.directory),
            extensions: settings.extensions.clone(),
        }
    }
}

/// Result of one orchestration call
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BatchOutcome {
    /// Batch created or rolled back; `None` when nothing ran
    pub batch: Option<i64>,
    /// Migration names in the order they were executed
    pub migrations: Vec<String>,
    /// Total execution time in milliseconds
    pub execution_time_ms: u128,
}

impl BatchOutcome {
    pub(crate) fn noop(execution_time_ms: u128) -> Self {
        Self {
            batch: None,
            migrations: Vec::new(),
            execution_time_ms,
        }
    }

    /// Nothing was pending (or applied, for rollbacks)
    pub fn is_noop(&self) -> bool {
        self.migrations.is_empty()
    }

    pub fn count(&self) -> usize {
        self.migrations.len()
    }
}
