use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use strata_core::{Environment, ProjectConfig, ResolvedConnection};
use strata_migrations::database::masked_url;
use strata_migrations::{
    MigrationConfig, MigrationManager, MigrationRunner, SeedConfig, SeedRunner, SqlStore,
};

/// Global flags shared by every command
#[derive(Debug, Clone)]
pub struct GlobalOptions {
    pub config: PathBuf,
    pub cwd: Option<PathBuf>,
    pub env: String,
}

impl GlobalOptions {
    /// Configuration file path, relative paths resolved against `--cwd`
    pub fn config_path(&self) -> PathBuf {
        match &self.cwd {
            Some(cwd) if self.config.is_relative() => cwd.join(&self.config),
            _ => self.config.clone(),
        }
    }

    /// Directory that migration, seed and sqlite paths are relative to
    pub fn base_dir(&self) -> PathBuf {
        if let Some(cwd) = &self.cwd {
            return cwd.clone();
        }
        match self.config.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
            _ => PathBuf::from("."),
        }
    }
}

/// Loaded configuration plus the connection for the selected environment
pub struct ProjectContext {
    pub config: ProjectConfig,
    pub base_dir: PathBuf,
    pub environment: Environment,
    pub connection: ResolvedConnection,
}

impl ProjectContext {
    pub fn load(options: &GlobalOptions) -> Result<Self> {
        let config_path = options.config_path();
        if !config_path.exists() {
            bail!(
                "No configuration file found at {}. Run `strata init` to create one",
                config_path.display()
            );
        }

        let config = ProjectConfig::load(&config_path)
            .with_context(|| format!("Failed to load {}", config_path.display()))?;
        let environment = Environment::from(options.env.as_str());
        let base_dir = options.base_dir();
        let connection = config.connection_for(&environment)?.resolve(&base_dir)?;

        tracing::debug!(
            environment = %environment,
            client = connection.client.as_str(),
            url = %masked_url(&connection.url),
            "resolved project context"
        );

        Ok(Self {
            config,
            base_dir,
            environment,
            connection,
        })
    }

    pub fn migration_config(&self) -> MigrationConfig {
        MigrationConfig::from_settings(&self.config.migrations, &self.base_dir, self.connection.client)
    }

    pub fn seed_config(&self) -> SeedConfig {
        SeedConfig::from_settings(&self.config.seeds, &self.base_dir)
    }

    async fn store(&self) -> Result<Arc<SqlStore>> {
        let store = SqlStore::connect(&self.connection, &self.migration_config())
            .await
            .with_context(|| format!("Could not connect to {}", masked_url(&self.connection.url)))?;
        Ok(Arc::new(store))
    }

    /// Open the database and build a runner over the migrations directory
    pub async fn migration_runner(&self) -> Result<MigrationRunner> {
        let store = self.store().await?;
        let manager = MigrationManager::with_config(self.migration_config());
        Ok(MigrationRunner::from_manager(manager, store))
    }

    pub async fn seed_runner(&self) -> Result<SeedRunner> {
        let store = self.store().await?;
        Ok(SeedRunner::new(
            self.seed_config(),
            store,
            self.environment.clone(),
        ))
    }
}
