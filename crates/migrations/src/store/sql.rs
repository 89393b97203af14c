use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::any::AnyRow;
use sqlx::{AnyConnection, AnyPool, Executor, Row};
use strata_core::{Client, ResolvedConnection};

use super::{MigrationStore, ScriptExecutor};
use crate::database;
use crate::definitions::{AppliedMigration, MigrationConfig, MigrationDefinition};
use crate::error::{MigrationError, MigrationResult};
use crate::manager::split_sql_statements;

/// State store backed by a SQL tracking table.
///
/// Each migration's statements and its record change commit together unless
/// transactions are disabled, in which case the record is written after the
/// statements succeed.
pub struct SqlStore {
    pool: AnyPool,
    client: Client,
    table: String,
    transactional: bool,
}

impl SqlStore {
    pub fn new(pool: AnyPool, config: &MigrationConfig) -> Self {
        Self {
            pool,
            client: config.client,
            table: config.migrations_table.clone(),
            transactional: !config.disable_transactions,
        }
    }

    /// Open a pool for the resolved connection
    pub async fn connect(
        connection: &ResolvedConnection,
        config: &MigrationConfig,
    ) -> MigrationResult<Self> {
        let pool = database::connect(connection).await?;
        Ok(Self::new(pool, config))
    }

    /// Get the database pool
    pub fn pool(&self) -> &AnyPool {
        &self.pool
    }

    /// SQL to create the migrations tracking table
    pub fn create_migrations_table_sql(&self) -> String {
        let id_column = match self.client {
            Client::Postgres => "id BIGSERIAL PRIMARY KEY",
            Client::Sqlite => "id INTEGER PRIMARY KEY AUTOINCREMENT",
        };
        format!(
            "CREATE TABLE IF NOT EXISTS {} (\n    \
                {},\n    \
                name VARCHAR(255) NOT NULL UNIQUE,\n    \
                batch BIGINT NOT NULL,\n    \
                applied_at VARCHAR(64) NOT NULL\n\
            )",
            self.table, id_column
        )
    }

    /// SQL returning a row when the tracking table exists
    pub fn migrations_table_exists_sql(&self) -> &'static str {
        match self.client {
            Client::Postgres => {
                "SELECT 1 FROM information_schema.tables \
                 WHERE table_schema = current_schema() AND table_name = $1"
            }
            Client::Sqlite => "SELECT 1 FROM sqlite_master WHERE type = 'table' AND name = $1",
        }
    }

    /// SQL to get applied migrations in apply order
    pub fn get_applied_migrations_sql(&self) -> String {
        format!(
            "SELECT name, batch, applied_at FROM {} ORDER BY batch ASC, id ASC",
            self.table
        )
    }

    /// SQL to check if a migration has been applied
    pub fn check_migration_sql(&self) -> String {
        format!("SELECT name FROM {} WHERE name = $1", self.table)
    }

    /// SQL to record a migration as applied
    pub fn record_migration_sql(&self) -> String {
        format!(
            "INSERT INTO {} (name, batch, applied_at) VALUES ($1, $2, $3)",
            self.table
        )
    }

    /// SQL to remove a migration record (for rollback)
    pub fn remove_migration_sql(&self) -> String {
        format!("DELETE FROM {} WHERE name = $1", self.table)
    }

    /// SQL to get the most recent record
    pub fn get_latest_migration_sql(&self) -> String {
        format!(
            "SELECT name, batch, applied_at FROM {} ORDER BY batch DESC, id DESC LIMIT 1",
            self.table
        )
    }

    async fn latest_record(&self) -> MigrationResult<Option<AppliedMigration>> {
        let row = sqlx::query(&self.get_latest_migration_sql())
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| MigrationError::Storage(format!("Failed to get latest batch: {}", e)))?;
        row.as_ref().map(record_from_row).transpose()
    }

    async fn run_statements(
        &self,
        conn: &mut AnyConnection,
        name: &str,
        sql: &str,
    ) -> MigrationResult<()> {
        // Unprepared execution, so a statement may itself be a multi-statement script
        for statement in split_sql_statements(sql, self.client) {
            (&mut *conn)
                .execute(statement.as_str())
                .await
                .map_err(|e| MigrationError::Storage(format!("Failed to execute {}: {}", name, e)))?;
        }
        Ok(())
    }

    async fn insert_record(
        &self,
        conn: &mut AnyConnection,
        name: &str,
        batch: i64,
    ) -> MigrationResult<()> {
        let existing = sqlx::query(&self.check_migration_sql())
            .bind(name.to_string())
            .fetch_optional(&mut *conn)
            .await
            .map_err(|e| MigrationError::Storage(format!("Failed to check migration status: {}", e)))?;
        if existing.is_some() {
            return Err(MigrationError::DuplicateApplication(name.to_string()));
        }

        sqlx::query(&self.record_migration_sql())
            .bind(name.to_string())
            .bind(batch)
            .bind(Utc::now().to_rfc3339())
            .execute(&mut *conn)
            .await
            .map_err(|e| MigrationError::Storage(format!("Failed to record migration: {}", e)))?;
        Ok(())
    }

    async fn delete_record(&self, conn: &mut AnyConnection, name: &str) -> MigrationResult<()> {
        let result = sqlx::query(&self.remove_migration_sql())
            .bind(name.to_string())
            .execute(&mut *conn)
            .await
            .map_err(|e| MigrationError::Storage(format!("Failed to remove migration record: {}", e)))?;
        if result.rows_affected() == 0 {
            return Err(MigrationError::NotApplied(name.to_string()));
        }
        Ok(())
    }

    /// Run `sql` and the step's bookkeeping on one connection, inside a single
    /// transaction unless transactions are disabled
    async fn execute_step(&self, name: &str, sql: &str, step: Step) -> MigrationResult<()> {
        if self.transactional {
            let mut transaction = self.pool.begin().await.map_err(|e| {
                MigrationError::Storage(format!("Failed to start transaction: {}", e))
            })?;

            self.run_statements(&mut transaction, name, sql).await?;
            self.finish_step(&mut transaction, name, step).await?;

            transaction
                .commit()
                .await
                .map_err(|e| MigrationError::Storage(format!("Failed to commit {}: {}", name, e)))?;
        } else {
            let mut conn = self.pool.acquire().await.map_err(|e| {
                MigrationError::Storage(format!("Failed to acquire connection: {}", e))
            })?;

            self.run_statements(&mut conn, name, sql).await?;
            self.finish_step(&mut conn, name, step).await?;
        }
        Ok(())
    }

    async fn finish_step(
        &self,
        conn: &mut AnyConnection,
        name: &str,
        step: Step,
    ) -> MigrationResult<()> {
        match step {
            Step::Record(batch) => self.insert_record(conn, name, batch).await,
            Step::Remove => self.delete_record(conn, name).await,
            Step::Script => Ok(()),
        }
    }
}

/// Bookkeeping that follows a script in the same unit of work
#[derive(Debug, Clone, Copy)]
enum Step {
    Record(i64),
    Remove,
    Script,
}

fn record_from_row(row: &AnyRow) -> MigrationResult<AppliedMigration> {
    let name: String = row
        .try_get("name")
        .map_err(|e| MigrationError::Storage(format!("Failed to get migration name: {}", e)))?;
    let batch: i64 = row
        .try_get("batch")
        .map_err(|e| MigrationError::Storage(format!("Failed to get batch: {}", e)))?;
    let applied_at: String = row
        .try_get("applied_at")
        .map_err(|e| MigrationError::Storage(format!("Failed to get applied_at: {}", e)))?;
    let applied_at = DateTime::parse_from_rfc3339(&applied_at)
        .map_err(|e| MigrationError::Storage(format!("Invalid applied_at for {}: {}", name, e)))?
        .with_timezone(&Utc);

    Ok(AppliedMigration {
        name,
        batch,
        applied_at,
    })
}

#[async_trait]
impl MigrationStore for SqlStore {
    async fn ensure_schema(&self) -> MigrationResult<()> {
        sqlx::query(&self.create_migrations_table_sql())
            .execute(&self.pool)
            .await
            .map_err(|e| {
                MigrationError::Storage(format!("Failed to create migrations table: {}", e))
            })?;
        Ok(())
    }

    async fn has_schema(&self) -> MigrationResult<bool> {
        let row = sqlx::query(self.migrations_table_exists_sql())
            .bind(self.table.clone())
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| {
                MigrationError::Storage(format!("Failed to look up migrations table: {}", e))
            })?;
        Ok(row.is_some())
    }

    async fn list_applied(&self) -> MigrationResult<Vec<AppliedMigration>> {
        let rows = sqlx::query(&self.get_applied_migrations_sql())
            .fetch_all(&self.pool)
            .await
            .map_err(|e| {
                MigrationError::Storage(format!("Failed to query applied migrations: {}", e))
            })?;

        rows.iter().map(record_from_row).collect()
    }

    async fn current_version(&self) -> MigrationResult<Option<String>> {
        let latest = self.latest_record().await?;
        Ok(latest.map(|record| record.name))
    }

    async fn next_batch_number(&self) -> MigrationResult<i64> {
        let latest = self.latest_record().await?;
        Ok(latest.map_or(1, |record| record.batch + 1))
    }

    async fn record_applied(&self, name: &str, batch: i64) -> MigrationResult<()> {
        let mut conn = self.pool.acquire().await?;
        self.insert_record(&mut conn, name, batch).await
    }

    async fn remove_applied(&self, name: &str) -> MigrationResult<()> {
        let mut conn = self.pool.acquire().await?;
        self.delete_record(&mut conn, name).await
    }

    async fn apply(&self, migration: &MigrationDefinition, batch: i64) -> MigrationResult<()> {
        self.execute_step(&migration.name, &migration.up, Step::Record(batch))
            .await
    }

    async fn revert(&self, migration: &MigrationDefinition) -> MigrationResult<()> {
        let down = migration
            .down
            .as_deref()
            .ok_or_else(|| MigrationError::NotApplicable(migration.name.clone()))?;
        self.execute_step(&migration.name, down, Step::Remove).await
    }
}

#[async_trait]
impl ScriptExecutor for SqlStore {
    async fn run_script(&self, name: &str, sql: &str) -> MigrationResult<()> {
        self.execute_step(name, sql, Step::Script).await
    }
}
