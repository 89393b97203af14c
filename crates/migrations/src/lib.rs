//! Batch-based schema migrations for strata.
//!
//! - [`MigrationManager`] discovers migration files
//! - [`MigrationStore`] persists which migrations ran and in which batch
//! - [`MigrationRunner`] and [`MigrationRollback`] apply and revert them
//! - [`SeedRunner`] runs seed scripts

pub mod database;
pub mod definitions;
pub mod error;
pub mod ledger;
pub mod manager;
pub mod rollback;
pub mod runner;
pub mod seeding;
pub mod store;

pub use definitions::{
    AppliedMigration, BatchOutcome, MigrationConfig, MigrationDefinition, MigrationDirection,
    SeedConfig,
};
pub use error::{MigrationError, MigrationResult};
pub use ledger::MigrationLedger;
pub use manager::{split_sql_statements, MigrationManager, MigrationSource};
pub use rollback::MigrationRollback;
pub use runner::MigrationRunner;
pub use seeding::{SeedDefinition, SeedRunResult, SeedRunner};
pub use store::{MemoryStore, MigrationStore, ScriptExecutor, SqlStore};
