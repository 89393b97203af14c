//! The merged view of migration definitions and applied records

use std::collections::{BTreeMap, HashSet};

use crate::definitions::{AppliedMigration, MigrationDefinition};
use crate::error::{MigrationError, MigrationResult};

/// Ordered merge of discovered definitions and applied records.
///
/// Derived on every orchestration call and never persisted.
#[derive(Debug, Clone, Default)]
pub struct MigrationLedger {
    /// Applied records with a matching definition, in apply order
    pub completed: Vec<AppliedMigration>,
    /// Definitions without a record, ascending by name
    pub pending: Vec<MigrationDefinition>,
    /// Applied records whose definition no longer exists
    pub missing: Vec<AppliedMigration>,
    definitions: BTreeMap<String, MigrationDefinition>,
}

impl MigrationLedger {
    /// Merge definitions with records ordered by batch then apply order
    pub fn build(definitions: Vec<MigrationDefinition>, applied: Vec<AppliedMigration>) -> Self {
        let definitions: BTreeMap<String, MigrationDefinition> = definitions
            .into_iter()
            .map(|definition| (definition.name.clone(), definition))
            .collect();

        let applied_names: HashSet<&str> = applied.iter().map(|r| r.name.as_str()).collect();
        let pending = definitions
            .values()
            .filter(|definition| !applied_names.contains(definition.name.as_str()))
            .cloned()
            .collect();

        let (completed, missing): (Vec<_>, Vec<_>) = applied
            .into_iter()
            .partition(|record| definitions.contains_key(&record.name));

        if !missing.is_empty() {
            tracing::warn!(
                missing = ?missing.iter().map(|r| r.name.as_str()).collect::<Vec<_>>(),
                "applied migrations have no matching definition"
            );
        }

        Self {
            completed,
            pending,
            missing,
            definitions,
        }
    }

    /// Fail if any applied record lost its definition
    pub fn ensure_consistent(&self) -> MigrationResult<()> {
        if self.missing.is_empty() {
            return Ok(());
        }
        Err(MigrationError::Corrupt(
            self.missing.iter().map(|r| r.name.clone()).collect(),
        ))
    }

    pub fn definition(&self, name: &str) -> Option<&MigrationDefinition> {
        self.definitions.get(name)
    }

    pub fn applied(&self, name: &str) -> Option<&AppliedMigration> {
        self.completed.iter().find(|record| record.name == name)
    }

    /// The most recently applied migration
    pub fn last_applied(&self) -> Option<&AppliedMigration> {
        self.completed.last()
    }

    /// Records of the highest batch, in apply order
    pub fn latest_batch(&self) -> Vec<AppliedMigration> {
        match self.completed.last() {
            Some(last) => self
                .completed
                .iter()
                .filter(|record| record.batch == last.batch)
                .cloned()
                .collect(),
            None => Vec::new(),
        }
    }

    /// Error for a name that is not applied: unknown names are `NotFound`
    pub(crate) fn not_applied_error(&self, name: &str) -> MigrationError {
        if self.definition(name).is_some() {
            MigrationError::NotApplied(name.to_string())
        } else {
            MigrationError::NotFound(name.to_string())
        }
    }
}
