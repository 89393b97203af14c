//! Migration Runner - Applies migrations in batches
//!
//! Builds the ledger from the source and the state store on every call, then
//! executes migrations one at a time. Each migration commits on its own; the
//! first failure stops the batch and is returned with the migrations that
//! completed before it.
//!
//! Concurrent runners against the same store are not supported. Callers that
//! need cross-process exclusivity must arrange it at the database level.

use std::sync::Arc;
use std::time::Instant;

use crate::definitions::{AppliedMigration, BatchOutcome, MigrationConfig, MigrationDefinition};
use crate::error::{MigrationError, MigrationResult};
use crate::ledger::MigrationLedger;
use crate::manager::{MigrationManager, MigrationSource};
use crate::store::MigrationStore;

/// Batch orchestrator over a migration source and a state store
pub struct MigrationRunner {
    source: Box<dyn MigrationSource>,
    store: Arc<dyn MigrationStore>,
    config: MigrationConfig,
}

impl MigrationRunner {
    /// Create a new migration runner
    pub fn new(
        source: impl MigrationSource + 'static,
        store: Arc<dyn MigrationStore>,
        config: MigrationConfig,
    ) -> Self {
        Self {
            source: Box::new(source),
            store,
            config,
        }
    }

    /// Create a runner reading migration files through `manager`
    pub fn from_manager(manager: MigrationManager, store: Arc<dyn MigrationStore>) -> Self {
        let config = manager.config().clone();
        Self::new(manager, store, config)
    }

    pub fn config(&self) -> &MigrationConfig {
        &self.config
    }

    pub fn store(&self) -> &Arc<dyn MigrationStore> {
        &self.store
    }

    /// Discover definitions and merge them with the applied records,
    /// creating the tracking table first
    pub(crate) async fn load_ledger(&self) -> MigrationResult<MigrationLedger> {
        self.store.ensure_schema().await?;
        let applied = self.store.list_applied().await?;
        self.build_ledger(applied).await
    }

    /// Applied records, or none when the tracking table was never created
    async fn read_applied(&self) -> MigrationResult<Vec<AppliedMigration>> {
        if !self.store.has_schema().await? {
            return Ok(Vec::new());
        }
        self.store.list_applied().await
    }

    async fn build_ledger(&self, applied: Vec<AppliedMigration>) -> MigrationResult<MigrationLedger> {
        let definitions = self.source.load_migrations().await?;
        let ledger = MigrationLedger::build(definitions, applied);
        tracing::debug!(
            completed = ledger.completed.len(),
            pending = ledger.pending.len(),
            missing = ledger.missing.len(),
            "computed migration ledger"
        );
        Ok(ledger)
    }

    /// Run all pending migrations under one new batch
    pub async fn latest(&self) -> MigrationResult<BatchOutcome> {
        let start_time = Instant::now();
        let ledger = self.load_ledger().await?;
        ledger.ensure_consistent()?;

        if ledger.pending.is_empty() {
            tracing::info!("already up to date");
            return Ok(BatchOutcome::noop(start_time.elapsed().as_millis()));
        }

        let batch = self.store.next_batch_number().await?;
        let pending: Vec<&MigrationDefinition> = ledger.pending.iter().collect();
        self.apply_batch(batch, &pending, start_time).await
    }

    /// Run one migration under a new batch.
    ///
    /// With a target, exactly that migration runs even when earlier
    /// migrations are still pending; ordering is only enforced for the
    /// untargeted form, which picks the smallest pending name.
    pub async fn up(&self, target: Option<&str>) -> MigrationResult<BatchOutcome> {
        let start_time = Instant::now();
        let ledger = self.load_ledger().await?;
        ledger.ensure_consistent()?;

        let migration = match target {
            Some(name) => {
                if ledger.applied(name).is_some() {
                    return Err(MigrationError::AlreadyApplied(name.to_string()));
                }
                ledger
                    .pending
                    .iter()
                    .find(|definition| definition.name == name)
                    .ok_or_else(|| MigrationError::NotFound(name.to_string()))?
            }
            None => match ledger.pending.first() {
                Some(next) => next,
                None => {
                    tracing::info!("already up to date");
                    return Ok(BatchOutcome::noop(start_time.elapsed().as_millis()));
                }
            },
        };

        let batch = self.store.next_batch_number().await?;
        self.apply_batch(batch, &[migration], start_time).await
    }

    /// Completed and pending migrations. Writes nothing, not even the
    /// tracking table.
    pub async fn list(&self) -> MigrationResult<MigrationLedger> {
        let applied = self.read_applied().await?;
        self.build_ledger(applied).await
    }

    /// Name of the most recently applied migration
    pub async fn current_version(&self) -> MigrationResult<Option<String>> {
        if !self.store.has_schema().await? {
            return Ok(None);
        }
        self.store.current_version().await
    }

    async fn apply_batch(
        &self,
        batch: i64,
        migrations: &[&MigrationDefinition],
        start_time: Instant,
    ) -> MigrationResult<BatchOutcome> {
        let mut applied = Vec::with_capacity(migrations.len());

        for migration in migrations {
            tracing::info!(migration = %migration.name, batch, "applying migration");

            if let Err(source) = self.store.apply(migration, batch).await {
                tracing::error!(migration = %migration.name, batch, error = %source, "migration failed");
                return Err(MigrationError::interrupted(batch, &migration.name, applied, source));
            }
            applied.push(migration.name.clone());
        }

        Ok(BatchOutcome {
            batch: Some(batch),
            migrations: applied,
            execution_time_ms: start_time.elapsed().as_millis(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::definitions::MigrationDirection;
    use crate::store::MemoryStore;

    fn definitions(names: &[&str]) -> Vec<MigrationDefinition> {
        names
            .iter()
            .map(|name| {
                MigrationDefinition::new(*name, format!("CREATE TABLE t_{} (id INTEGER)", name))
                    .with_down(format!("DROP TABLE t_{}", name))
            })
            .collect()
    }

    fn runner(names: &[&str], store: Arc<MemoryStore>) -> MigrationRunner {
        MigrationRunner::new(definitions(names), store, MigrationConfig::default())
    }

    #[tokio::test]
    async fn test_latest_applies_pending_in_one_batch() {
        let store = Arc::new(MemoryStore::new());
        let runner = runner(&["20230102_b", "20230101_a"], store.clone());

        let expected_batch = store.next_batch_number().await.unwrap();
        let outcome = runner.latest().await.unwrap();

        assert_eq!(outcome.batch, Some(expected_batch));
        assert_eq!(outcome.migrations, vec!["20230101_a", "20230102_b"]);

        let applied = store.list_applied().await.unwrap();
        let names: Vec<_> = applied.iter().map(|r| r.name.as_str()).collect();
        assert_eq!(names, vec!["20230101_a", "20230102_b"]);
        assert!(applied.iter().all(|r| r.batch == expected_batch));
    }

    #[tokio::test]
    async fn test_latest_twice_is_noop() {
        let store = Arc::new(MemoryStore::new());
        let runner = runner(&["001_a", "002_b"], store.clone());

        runner.latest().await.unwrap();
        let second = runner.latest().await.unwrap();

        assert!(second.is_noop());
        assert_eq!(second.batch, None);
        assert_eq!(store.next_batch_number().await.unwrap(), 2);
    }

    #[tokio::test]
    async fn test_latest_allocates_increasing_batches() {
        let store = Arc::new(MemoryStore::new());
        runner(&["001_a"], store.clone()).latest().await.unwrap();

        let outcome = runner(&["001_a", "002_b", "003_c"], store.clone())
            .latest()
            .await
            .unwrap();

        assert_eq!(outcome.batch, Some(2));
        assert_eq!(outcome.migrations, vec!["002_b", "003_c"]);
    }

    #[tokio::test]
    async fn test_latest_stops_at_first_failure() {
        let store = Arc::new(MemoryStore::new().fail_on("002_b"));
        let runner = runner(&["001_a", "002_b", "003_c"], store.clone());

        let err = runner.latest().await.unwrap_err();
        match &err {
            MigrationError::Interrupted {
                batch,
                failed,
                completed,
                ..
            } => {
                assert_eq!(*batch, 1);
                assert_eq!(failed, "002_b");
                assert_eq!(completed, &vec!["001_a".to_string()]);
            }
            other => panic!("unexpected error: {other:?}"),
        }
        assert!(matches!(err.root_cause(), MigrationError::Storage(_)));

        // 001_a stays committed, 003_c was never attempted
        let journal = store.journal().await;
        assert_eq!(journal, vec![(MigrationDirection::Up, "001_a".to_string())]);
        assert_eq!(store.list_applied().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_up_without_target_applies_smallest_pending() {
        let store = Arc::new(MemoryStore::new());
        let runner = runner(&["003_c", "001_a", "002_b"], store.clone());

        let outcome = runner.up(None).await.unwrap();
        assert_eq!(outcome.migrations, vec!["001_a"]);
        assert_eq!(outcome.batch, Some(1));

        let outcome = runner.up(None).await.unwrap();
        assert_eq!(outcome.migrations, vec!["002_b"]);
        assert_eq!(outcome.batch, Some(2));
    }

    #[tokio::test]
    async fn test_up_with_target_bypasses_ordering() {
        let store = Arc::new(MemoryStore::new());
        let runner = runner(&["20230101_a", "20230102_b"], store.clone());

        let outcome = runner.up(Some("20230102_b")).await.unwrap();
        assert_eq!(outcome.migrations, vec!["20230102_b"]);

        let ledger = runner.list().await.unwrap();
        assert_eq!(ledger.pending.len(), 1);
        assert_eq!(ledger.pending[0].name, "20230101_a");
    }

    #[tokio::test]
    async fn test_up_with_target_validates_name() {
        let store = Arc::new(MemoryStore::new());
        let runner = runner(&["001_a"], store.clone());

        assert!(matches!(
            runner.up(Some("999_missing")).await,
            Err(MigrationError::NotFound(_))
        ));

        runner.up(Some("001_a")).await.unwrap();
        assert!(matches!(
            runner.up(Some("001_a")).await,
            Err(MigrationError::AlreadyApplied(_))
        ));
    }

    #[tokio::test]
    async fn test_up_with_nothing_pending_is_noop() {
        let store = Arc::new(MemoryStore::new());
        let runner = runner(&[], store);
        assert!(runner.up(None).await.unwrap().is_noop());
    }

    #[tokio::test]
    async fn test_current_version_and_list() {
        let store = Arc::new(MemoryStore::new());
        let runner = runner(&["20230101_a", "20230102_b", "20230103_c"], store.clone());

        assert_eq!(runner.current_version().await.unwrap(), None);

        runner.up(None).await.unwrap();
        runner.up(None).await.unwrap();
        assert_eq!(
            runner.current_version().await.unwrap().as_deref(),
            Some("20230102_b")
        );

        let ledger = runner.list().await.unwrap();
        assert_eq!(ledger.completed.len(), 2);
        assert_eq!(ledger.pending.len(), 1);
        assert_eq!(ledger.completed[1].batch, 2);
    }

    #[tokio::test]
    async fn test_read_paths_do_not_create_tracking_table() {
        let store = Arc::new(MemoryStore::new());
        let runner = runner(&["001_a"], store.clone());

        let ledger = runner.list().await.unwrap();
        assert!(ledger.completed.is_empty());
        assert_eq!(ledger.pending.len(), 1);
        assert_eq!(runner.current_version().await.unwrap(), None);
        assert!(!store.has_schema().await.unwrap());

        runner.latest().await.unwrap();
        assert!(store.has_schema().await.unwrap());
    }

    #[tokio::test]
    async fn test_missing_definition_blocks_latest_but_not_list() {
        let store = Arc::new(MemoryStore::new());
        store.record_applied("000_deleted", 1).await.unwrap();
        let runner = runner(&["001_a"], store.clone());

        assert!(matches!(
            runner.latest().await,
            Err(MigrationError::Corrupt(_))
        ));
        assert!(store.journal().await.is_empty());

        let ledger = runner.list().await.unwrap();
        assert_eq!(ledger.missing.len(), 1);
        assert_eq!(ledger.pending.len(), 1);
    }
}
