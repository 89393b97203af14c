//! Error types for migration orchestration
//!
//! Every failure is local to one migration step; callers get the step that
//! failed and the migrations that completed before it.

use strata_core::CoreError;
use thiserror::Error;

/// Result type alias for migration operations
pub type MigrationResult<T> = Result<T, MigrationError>;

/// Error types for migration and seed operations
#[derive(Debug, Error)]
pub enum MigrationError {
    /// Migration directory or file could not be read or parsed
    #[error("Discovery error: {0}")]
    Discovery(String),

    /// A record for this migration already exists in the state store
    #[error("Migration {0} is already recorded as applied")]
    DuplicateApplication(String),

    /// No applied record exists for this migration
    #[error("Migration {0} is not applied")]
    NotApplied(String),

    /// No migration definition has this name
    #[error("Migration {0} not found")]
    NotFound(String),

    /// Migration was asked to run but is already applied
    #[error("Migration {0} is already applied")]
    AlreadyApplied(String),

    /// Migration has no down section and cannot be rolled back
    #[error("Migration {0} has no down migration and cannot be rolled back")]
    NotApplicable(String),

    /// State store or database failure
    #[error("Storage error: {0}")]
    Storage(String),

    /// Applied records whose migration files no longer exist
    #[error(
        "The migration directory is corrupt, the following files are missing: {}",
        .0.join(", ")
    )]
    Corrupt(Vec<String>),

    /// A batch stopped at its first failing migration
    #[error("Batch {batch} stopped at migration {failed}: {source}")]
    Interrupted {
        batch: i64,
        failed: String,
        /// Migrations that completed, and stay committed, before the failure
        completed: Vec<String>,
        #[source]
        source: Box<MigrationError>,
    },

    /// Seed file failure
    #[error("Seed error: {0}")]
    Seed(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Configuration(String),
}

impl MigrationError {
    pub(crate) fn interrupted(
        batch: i64,
        failed: &str,
        completed: Vec<String>,
        source: MigrationError,
    ) -> Self {
        MigrationError::Interrupted {
            batch,
            failed: failed.to_string(),
            completed,
            source: Box::new(source),
        }
    }

    /// The underlying failure, looking through `Interrupted`
    pub fn root_cause(&self) -> &MigrationError {
        match self {
            MigrationError::Interrupted { source, .. } => source.root_cause(),
            other => other,
        }
    }

    /// Migrations that completed before the failure, if any ran
    pub fn completed(&self) -> &[String] {
        match self {
            MigrationError::Interrupted { completed, .. } => completed,
            _ => &[],
        }
    }
}

impl From<sqlx::Error> for MigrationError {
    fn from(err: sqlx::Error) -> Self {
        MigrationError::Storage(err.to_string())
    }
}

impl From<CoreError> for MigrationError {
    fn from(err: CoreError) -> Self {
        MigrationError::Configuration(err.to_string())
    }
}
