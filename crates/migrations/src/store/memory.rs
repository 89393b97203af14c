use async_trait::async_trait;
use chrono::Utc;
use std::collections::HashSet;
use tokio::sync::Mutex;

use super::{MigrationStore, ScriptExecutor};
use crate::definitions::{AppliedMigration, MigrationDefinition, MigrationDirection};
use crate::error::{MigrationError, MigrationResult};

/// In-process state store.
///
/// Executes nothing; it records what would have run. Used in tests, where
/// `fail_on` simulates a migration whose SQL errors.
#[derive(Debug, Default)]
pub struct MemoryStore {
    state: Mutex<MemoryState>,
    failing: HashSet<String>,
}

#[derive(Debug, Default)]
struct MemoryState {
    records: Vec<AppliedMigration>,
    journal: Vec<(MigrationDirection, String)>,
    scripts: Vec<String>,
    schema_created: bool,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make `apply`, `revert` and `run_script` fail for this name
    pub fn fail_on(mut self, name: impl Into<String>) -> Self {
        self.failing.insert(name.into());
        self
    }

    /// Migrations executed so far, in order
    pub async fn journal(&self) -> Vec<(MigrationDirection, String)> {
        self.state.lock().await.journal.clone()
    }

    /// Scripts run so far, in order
    pub async fn scripts(&self) -> Vec<String> {
        self.state.lock().await.scripts.clone()
    }

    fn check_failure(&self, name: &str) -> MigrationResult<()> {
        if self.failing.contains(name) {
            return Err(MigrationError::Storage(format!(
                "Failed to execute {}: injected failure",
                name
            )));
        }
        Ok(())
    }
}

impl MemoryState {
    fn insert(&mut self, name: &str, batch: i64) -> MigrationResult<()> {
        if self.records.iter().any(|record| record.name == name) {
            return Err(MigrationError::DuplicateApplication(name.to_string()));
        }
        self.schema_created = true;
        self.records.push(AppliedMigration {
            name: name.to_string(),
            batch,
            applied_at: Utc::now(),
        });
        Ok(())
    }

    fn remove(&mut self, name: &str) -> MigrationResult<()> {
        let position = self
            .records
            .iter()
            .position(|record| record.name == name)
            .ok_or_else(|| MigrationError::NotApplied(name.to_string()))?;
        self.records.remove(position);
        Ok(())
    }
}

#[async_trait]
impl MigrationStore for MemoryStore {
    async fn ensure_schema(&self) -> MigrationResult<()> {
        self.state.lock().await.schema_created = true;
        Ok(())
    }

    async fn has_schema(&self) -> MigrationResult<bool> {
        Ok(self.state.lock().await.schema_created)
    }

    async fn list_applied(&self) -> MigrationResult<Vec<AppliedMigration>> {
        let mut records = self.state.lock().await.records.clone();
        // Stable sort keeps insertion order within a batch
        records.sort_by_key(|record| record.batch);
        Ok(records)
    }

    async fn record_applied(&self, name: &str, batch: i64) -> MigrationResult<()> {
        self.state.lock().await.insert(name, batch)
    }

    async fn remove_applied(&self, name: &str) -> MigrationResult<()> {
        self.state.lock().await.remove(name)
    }

    async fn apply(&self, migration: &MigrationDefinition, batch: i64) -> MigrationResult<()> {
        self.check_failure(&migration.name)?;

        let mut state = self.state.lock().await;
        state.insert(&migration.name, batch)?;
        state
            .journal
            .push((MigrationDirection::Up, migration.name.clone()));
        Ok(())
    }

    async fn revert(&self, migration: &MigrationDefinition) -> MigrationResult<()> {
        if !migration.is_reversible() {
            return Err(MigrationError::NotApplicable(migration.name.clone()));
        }
        self.check_failure(&migration.name)?;

        let mut state = self.state.lock().await;
        state.remove(&migration.name)?;
        state
            .journal
            .push((MigrationDirection::Down, migration.name.clone()));
        Ok(())
    }
}

#[async_trait]
impl ScriptExecutor for MemoryStore {
    async fn run_script(&self, name: &str, _sql: &str) -> MigrationResult<()> {
        self.check_failure(name)?;
        self.state.lock().await.scripts.push(name.to_string());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_record_applied_is_unique_per_name() {
        let store = MemoryStore::new();
        store.record_applied("001_a", 1).await.unwrap();

        assert!(matches!(
            store.record_applied("001_a", 2).await,
            Err(MigrationError::DuplicateApplication(_))
        ));
        assert_eq!(store.list_applied().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_remove_applied_requires_record() {
        let store = MemoryStore::new();
        assert!(matches!(
            store.remove_applied("001_a").await,
            Err(MigrationError::NotApplied(_))
        ));
    }

    #[tokio::test]
    async fn test_batch_numbers_and_current_version() {
        let store = MemoryStore::new();
        assert_eq!(store.next_batch_number().await.unwrap(), 1);
        assert_eq!(store.current_version().await.unwrap(), None);

        store.record_applied("002_b", 1).await.unwrap();
        store.record_applied("001_a", 1).await.unwrap();
        store.record_applied("003_c", 2).await.unwrap();

        assert_eq!(store.next_batch_number().await.unwrap(), 3);
        assert_eq!(store.current_version().await.unwrap().as_deref(), Some("003_c"));

        let order: Vec<_> = store
            .list_applied()
            .await
            .unwrap()
            .into_iter()
            .map(|r| r.name)
            .collect();
        assert_eq!(order, vec!["002_b", "001_a", "003_c"]);
    }

    #[tokio::test]
    async fn test_schema_created_by_ensure_or_first_record() {
        let store = MemoryStore::new();
        assert!(!store.has_schema().await.unwrap());
        store.ensure_schema().await.unwrap();
        assert!(store.has_schema().await.unwrap());

        let store = MemoryStore::new();
        store.record_applied("001_a", 1).await.unwrap();
        assert!(store.has_schema().await.unwrap());
    }

    #[tokio::test]
    async fn test_injected_failure_leaves_no_record() {
        let store = MemoryStore::new().fail_on("001_a");
        let migration = MigrationDefinition::new("001_a", "SELECT 1");

        assert!(store.apply(&migration, 1).await.is_err());
        assert!(store.list_applied().await.unwrap().is_empty());
        assert!(store.journal().await.is_empty());
    }
}
