//! Migration Rollback - Handles rolling back applied migrations
//!
//! Provides functionality to rollback migrations by batch or individually,
//! executing DOWN statements to reverse schema changes.

use std::time::Instant;
use strata_core::RollbackBoundary;

use crate::definitions::{AppliedMigration, BatchOutcome, MigrationDefinition};
use crate::error::{MigrationError, MigrationResult};
use crate::ledger::MigrationLedger;
use crate::runner::MigrationRunner;

/// Extension trait for MigrationRunner to add rollback functionality
#[allow(async_fn_in_trait)]
pub trait MigrationRollback {
    /// Roll back one migration: the named one, or the most recently applied
    async fn down(&self, target: Option<&str>) -> MigrationResult<BatchOutcome>;

    /// Roll back the latest batch, or every batch when `all` is set.
    ///
    /// `name` narrows the selection to migrations applied at or after it,
    /// per the configured boundary policy.
    async fn rollback(&self, name: Option<&str>, all: bool) -> MigrationResult<BatchOutcome>;
}

impl MigrationRollback for MigrationRunner {
    async fn down(&self, target: Option<&str>) -> MigrationResult<BatchOutcome> {
        let start_time = Instant::now();
        let ledger = self.load_ledger().await?;
        ledger.ensure_consistent()?;

        let record = match target {
            Some(name) => ledger
                .applied(name)
                .ok_or_else(|| ledger.not_applied_error(name))?,
            None => match ledger.last_applied() {
                Some(record) => record,
                None => {
                    tracing::info!("already at the base migration");
                    return Ok(BatchOutcome::noop(start_time.elapsed().as_millis()));
                }
            },
        };

        let plan = reversal_plan(&ledger, std::slice::from_ref(record))?;
        self.revert_batch(&plan, start_time).await
    }

    async fn rollback(&self, name: Option<&str>, all: bool) -> MigrationResult<BatchOutcome> {
        let start_time = Instant::now();
        let ledger = self.load_ledger().await?;
        ledger.ensure_consistent()?;

        let mut selection = if all {
            ledger.completed.clone()
        } else {
            ledger.latest_batch()
        };

        if let Some(name) = name {
            let position = selection
                .iter()
                .position(|record| record.name == name)
                .ok_or_else(|| ledger.not_applied_error(name))?;
            let start = match self.config().rollback_boundary {
                RollbackBoundary::Inclusive => position,
                RollbackBoundary::Exclusive => position + 1,
            };
            selection = selection.split_off(start);
        }

        if selection.is_empty() {
            tracing::info!("already at the base migration");
            return Ok(BatchOutcome::noop(start_time.elapsed().as_millis()));
        }

        selection.reverse();
        let plan = reversal_plan(&ledger, &selection)?;
        self.revert_batch(&plan, start_time).await
    }
}

/// Pair records with their definitions, refusing irreversible ones before
/// anything is executed
fn reversal_plan<'a>(
    ledger: &'a MigrationLedger,
    records: &[AppliedMigration],
) -> MigrationResult<Vec<(i64, &'a MigrationDefinition)>> {
    records
        .iter()
        .map(|record| {
            let definition = ledger
                .definition(&record.name)
                .ok_or_else(|| MigrationError::Corrupt(vec![record.name.clone()]))?;
            if !definition.is_reversible() {
                return Err(MigrationError::NotApplicable(record.name.clone()));
            }
            Ok((record.batch, definition))
        })
        .collect()
}

impl MigrationRunner {
    /// Revert in the given order; the reported batch is the highest one touched
    async fn revert_batch(
        &self,
        plan: &[(i64, &MigrationDefinition)],
        start_time: Instant,
    ) -> MigrationResult<BatchOutcome> {
        let mut rolled_back = Vec::with_capacity(plan.len());

        for (batch, migration) in plan {
            tracing::info!(migration = %migration.name, batch, "rolling back migration");

            if let Err(source) = self.store().revert(migration).await {
                tracing::error!(migration = %migration.name, batch, error = %source, "rollback failed");
                return Err(MigrationError::interrupted(*batch, &migration.name, rolled_back, source));
            }
            rolled_back.push(migration.name.clone());
        }

        Ok(BatchOutcome {
            batch: plan.iter().map(|(batch, _)| *batch).max(),
            migrations: rolled_back,
            execution_time_ms: start_time.elapsed().as_millis(),
        })
    }
}
