//! Configuration foundation for strata.
//!
//! Holds the project configuration file model, the environment model used to
//! gate destructive operations, and the error type shared by both.

pub mod config;
pub mod errors;

pub use config::{
    Client, ConnectionConfig, Environment, MigrationSettings, ProjectConfig, ResolvedConnection,
    RollbackBoundary, SeedSettings,
};
pub use errors::{CoreError, CoreResult};

/// Release version reported by the CLI
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Default configuration file name
pub const DEFAULT_CONFIG_FILE: &str = "strata.yaml";
