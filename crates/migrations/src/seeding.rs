//! Database seeding
//!
//! Seed files are plain SQL scripts run in name order. Unlike migrations they
//! are not recorded and have no batch or rollback semantics, so running them
//! twice runs them twice.

use std::sync::Arc;
use std::time::Instant;
use strata_core::Environment;

use crate::definitions::SeedConfig;
use crate::error::{MigrationError, MigrationResult};
use crate::manager::read_sql_files;
use crate::store::ScriptExecutor;

/// A seed script discovered in the seeds directory
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SeedDefinition {
    pub name: String,
    pub sql: String,
}

/// Result of running seeds
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SeedRunResult {
    /// Seed names in the order they ran
    pub seeds: Vec<String>,
    /// Total execution time in milliseconds
    pub execution_time_ms: u128,
}

pub struct SeedRunner {
    config: SeedConfig,
    executor: Arc<dyn ScriptExecutor>,
    environment: Environment,
}

impl SeedRunner {
    pub fn new(
        config: SeedConfig,
        executor: Arc<dyn ScriptExecutor>,
        environment: Environment,
    ) -> Self {
        Self {
            config,
            executor,
            environment,
        }
    }

    /// Load seed files sorted by name
    pub fn load_seeds(&self) -> MigrationResult<Vec<SeedDefinition>> {
        let files = read_sql_files(&self.config.seeds_dir, &self.config.extensions)?;
        Ok(files
            .into_iter()
            .map(|file| SeedDefinition {
                name: file.name,
                sql: file.content,
            })
            .collect())
    }

    /// Run every seed, or only `specific`.
    ///
    /// Environments not marked safe for seeding require `force`.
    pub async fn run(
        &self,
        specific: Option<&str>,
        force: bool,
    ) -> MigrationResult<SeedRunResult> {
        let start_time = Instant::now();

        if !self.environment.is_safe_for_seeding() && !force {
            return Err(MigrationError::Seed(format!(
                "refusing to run seeds in the {} environment without --force",
                self.environment
            )));
        }

        let mut seeds = self.load_seeds()?;
        if let Some(name) = specific {
            seeds.retain(|seed| seed.name == name);
            if seeds.is_empty() {
                return Err(MigrationError::NotFound(name.to_string()));
            }
        }

        let mut completed = Vec::with_capacity(seeds.len());
        for seed in &seeds {
            tracing::info!(seed = %seed.name, environment = %self.environment, "running seed");

            if let Err(e) = self.executor.run_script(&seed.name, &seed.sql).await {
                return Err(MigrationError::Seed(format!(
                    "seed {} failed after running [{}]: {}",
                    seed.name,
                    completed.join(", "),
                    e
                )));
            }
            completed.push(seed.name.clone());
        }

        Ok(SeedRunResult {
            seeds: completed,
            execution_time_ms: start_time.elapsed().as_millis(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;
    use std::fs;
    use tempfile::TempDir;

    fn seed_dir() -> TempDir {
        let temp_dir = TempDir::new().unwrap();
        fs::write(temp_dir.path().join("02_posts.sql"), "INSERT INTO posts VALUES (1);").unwrap();
        fs::write(temp_dir.path().join("01_users.sql"), "INSERT INTO users VALUES (1);").unwrap();
        temp_dir
    }

    fn seed_runner(dir: &TempDir, store: Arc<MemoryStore>, env: Environment) -> SeedRunner {
        let config = SeedConfig {
            seeds_dir: dir.path().to_path_buf(),
            extensions: vec!["sql".to_string()],
        };
        SeedRunner::new(config, store, env)
    }

    #[tokio::test]
    async fn test_runs_seeds_in_name_order() {
        let dir = seed_dir();
        let store = Arc::new(MemoryStore::new());
        let runner = seed_runner(&dir, store.clone(), Environment::Development);

        let result = runner.run(None, false).await.unwrap();
        assert_eq!(result.seeds, vec!["01_users", "02_posts"]);
        assert_eq!(store.scripts().await, vec!["01_users", "02_posts"]);
    }

    #[tokio::test]
    async fn test_specific_seed() {
        let dir = seed_dir();
        let store = Arc::new(MemoryStore::new());
        let runner = seed_runner(&dir, store.clone(), Environment::Development);

        let result = runner.run(Some("02_posts"), false).await.unwrap();
        assert_eq!(result.seeds, vec!["02_posts"]);

        assert!(matches!(
            runner.run(Some("03_missing"), false).await,
            Err(MigrationError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_production_requires_force() {
        let dir = seed_dir();
        let store = Arc::new(MemoryStore::new());
        let runner = seed_runner(&dir, store.clone(), Environment::Production);

        assert!(matches!(runner.run(None, false).await, Err(MigrationError::Seed(_))));
        assert!(store.scripts().await.is_empty());

        assert_eq!(runner.run(None, true).await.unwrap().seeds.len(), 2);
    }

    #[tokio::test]
    async fn test_seed_failure_stops_run() {
        let dir = seed_dir();
        let store = Arc::new(MemoryStore::new().fail_on("02_posts"));
        let runner = seed_runner(&dir, store.clone(), Environment::Testing);

        let err = runner.run(None, false).await.unwrap_err();
        assert!(err.to_string().contains("[01_users]"));
        assert_eq!(store.scripts().await, vec!["01_users"]);
    }
}
