use anyhow::Result;
use strata_migrations::{BatchOutcome, MigrationLedger, MigrationRollback};

use super::context::ProjectContext;

pub async fn latest(context: &ProjectContext) -> Result<()> {
    let runner = context.migration_runner().await?;
    let outcome = runner.latest().await?;
    println!("{}", format_latest(&outcome));
    Ok(())
}

pub async fn up(context: &ProjectContext, name: Option<&str>) -> Result<()> {
    let runner = context.migration_runner().await?;
    let outcome = runner.up(name).await?;
    println!("{}", format_up(&outcome));
    Ok(())
}

pub async fn down(context: &ProjectContext, name: Option<&str>) -> Result<()> {
    let runner = context.migration_runner().await?;
    let outcome = runner.down(name).await?;
    println!("{}", format_down(&outcome));
    Ok(())
}

pub async fn rollback(context: &ProjectContext, name: Option<&str>, all: bool) -> Result<()> {
    let runner = context.migration_runner().await?;
    let outcome = runner.rollback(name, all).await?;
    println!("{}", format_rollback(&outcome));
    Ok(())
}

pub async fn list(context: &ProjectContext) -> Result<()> {
    let runner = context.migration_runner().await?;
    let ledger = runner.list().await?;
    println!("{}", format_list(&ledger));
    Ok(())
}

pub async fn current_version(context: &ProjectContext) -> Result<()> {
    let runner = context.migration_runner().await?;
    let version = runner.current_version().await?;
    println!("{}", format_current_version(version.as_deref()));
    Ok(())
}

fn with_names(header: String, outcome: &BatchOutcome) -> String {
    let mut lines = vec![header];
    lines.extend(outcome.migrations.iter().cloned());
    lines.join("\n")
}

fn batch_number(outcome: &BatchOutcome) -> i64 {
    outcome.batch.unwrap_or_default()
}

fn plural(count: usize) -> &'static str {
    if count == 1 {
        "migration"
    } else {
        "migrations"
    }
}

pub(crate) fn format_latest(outcome: &BatchOutcome) -> String {
    if outcome.is_noop() {
        return "Already up to date".to_string();
    }
    with_names(
        format!(
            "Batch {} run: {} {}",
            batch_number(outcome),
            outcome.count(),
            plural(outcome.count())
        ),
        outcome,
    )
}

pub(crate) fn format_up(outcome: &BatchOutcome) -> String {
    if outcome.is_noop() {
        return "Already up to date".to_string();
    }
    with_names(
        format!("Batch {} ran the following migrations:", batch_number(outcome)),
        outcome,
    )
}

pub(crate) fn format_down(outcome: &BatchOutcome) -> String {
    if outcome.is_noop() {
        return "Already at the base migration".to_string();
    }
    with_names(
        format!(
            "Batch {} rolled back the following migrations:",
            batch_number(outcome)
        ),
        outcome,
    )
}

pub(crate) fn format_rollback(outcome: &BatchOutcome) -> String {
    if outcome.is_noop() {
        return "Already at the base migration".to_string();
    }
    with_names(
        format!(
            "Batch {} rolled back: {} {}",
            batch_number(outcome),
            outcome.count(),
            plural(outcome.count())
        ),
        outcome,
    )
}

pub(crate) fn format_list(ledger: &MigrationLedger) -> String {
    let mut lines = Vec::new();

    if ledger.completed.is_empty() {
        lines.push("No Completed Migration files Found.".to_string());
    } else {
        lines.push(format!(
            "Found {} Completed Migration file/files.",
            ledger.completed.len()
        ));
        for record in &ledger.completed {
            lines.push(format!("{} (batch {})", record.name, record.batch));
        }
    }

    if ledger.pending.is_empty() {
        lines.push("No Pending Migration files Found.".to_string());
    } else {
        lines.push(format!(
            "Found {} Pending Migration file/files.",
            ledger.pending.len()
        ));
        lines.extend(ledger.pending.iter().map(|definition| definition.name.clone()));
    }

    for record in &ledger.missing {
        lines.push(format!(
            "Warning: {} (batch {}) is recorded as applied but its file is missing",
            record.name, record.batch
        ));
    }

    lines.join("\n")
}

pub(crate) fn format_current_version(version: Option<&str>) -> String {
    format!("Current Version: {}", version.unwrap_or("none"))
}
