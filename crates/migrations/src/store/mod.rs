//! Migration State Store
//!
//! Persisted record of which migrations are applied and in which batch.
//! Exclusive access per orchestration call is assumed: the store does not
//! lock against concurrent runners in other processes.

use async_trait::async_trait;

use crate::definitions::{AppliedMigration, MigrationDefinition};
use crate::error::MigrationResult;

pub mod memory;
pub mod sql;

pub use memory::MemoryStore;
pub use sql::SqlStore;

#[async_trait]
pub trait MigrationStore: Send + Sync {
    /// Create the tracking table if it does not exist
    async fn ensure_schema(&self) -> MigrationResult<()>;

    /// Whether the tracking table exists; read paths use this instead of
    /// creating it
    async fn has_schema(&self) -> MigrationResult<bool>;

    /// Applied records ordered by batch, then apply order
    async fn list_applied(&self) -> MigrationResult<Vec<AppliedMigration>>;

    /// Name of the most recently applied migration
    async fn current_version(&self) -> MigrationResult<Option<String>> {
        Ok(self.list_applied().await?.pop().map(|record| record.name))
    }

    /// One greater than the highest batch, or 1 for an empty store
    async fn next_batch_number(&self) -> MigrationResult<i64> {
        let applied = self.list_applied().await?;
        Ok(applied.iter().map(|record| record.batch).max().unwrap_or(0) + 1)
    }

    /// Record a migration without running it; fails on an existing record
    async fn record_applied(&self, name: &str, batch: i64) -> MigrationResult<()>;

    /// Delete a record without running anything; fails if none exists
    async fn remove_applied(&self, name: &str) -> MigrationResult<()>;

    /// Run `up` and record the migration as one durable unit
    async fn apply(&self, migration: &MigrationDefinition, batch: i64) -> MigrationResult<()>;

    /// Run `down` and remove the record as one durable unit
    async fn revert(&self, migration: &MigrationDefinition) -> MigrationResult<()>;
}

/// Runs a free-standing SQL script, used for seeds
#[async_trait]
pub trait ScriptExecutor: Send + Sync {
    async fn run_script(&self, name: &str, sql: &str) -> MigrationResult<()>;
}
