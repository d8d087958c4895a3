//! Copy-based table alteration.
//!
//! SQLite cannot change most column definitions in place, so an altered table
//! is rebuilt: a `<table>_copy` table receives the new definition and the
//! surviving data, the original is dropped and the copy renamed over it. The
//! whole sequence runs in one immediate transaction with foreign keys
//! disabled.

use super::TableDefinition;
use crate::config::SyncConfig;
use crate::exec::Executor;
use crate::{Result, SyncError};
use rusqlite::{Transaction, TransactionBehavior};
use tracing::{debug, error, warn};

/// Disables foreign-key enforcement until dropped.
struct ForeignKeysOff<'a> {
    exec: &'a Executor,
}

impl<'a> ForeignKeysOff<'a> {
    fn engage(exec: &'a Executor) -> Result<Self> {
        exec.execute_batch("PRAGMA foreign_keys = OFF")?;
        Ok(Self { exec })
    }
}

impl Drop for ForeignKeysOff<'_> {
    fn drop(&mut self) {
        if let Err(err) = self.exec.execute_batch("PRAGMA foreign_keys = ON") {
            warn!("Failed to re-enable foreign keys: {}", err);
        }
    }
}

/// Rebuild `definition.name` with the new definition, carrying data across.
///
/// `known_indexes` are dropped inside the transaction, so a rollback keeps
/// them. On failure nothing is changed and a [`SyncError::Migration`] is
/// returned.
pub(super) fn alter(
    exec: &Executor,
    definition: &TableDefinition,
    renames: &[(&str, &str)],
    known_indexes: &[String],
) -> Result<()> {
    let table = definition.name.as_str();
    let existing = sample_columns(exec, table).map_err(|e| SyncError::migration(table, e))?;
    let mapping = column_mapping(&existing, &definition.field_names(), renames);
    debug!("Migrating {} with column mapping {:?}", table, mapping);

    copy_and_swap(exec, definition, &mapping, known_indexes).map_err(|err| {
        error!("Migration of {} failed, rolled back: {}", table, err);
        SyncError::migration(table, err)
    })
}

/// Column names of the table as seen through one stored row.
///
/// An empty table yields no names: there is nothing to carry over.
fn sample_columns(exec: &Executor, table: &str) -> Result<Vec<String>> {
    let mut stmt = exec.prepare(&format!("SELECT * FROM {} LIMIT 1", table))?;
    let names: Vec<String> = stmt
        .column_names()
        .into_iter()
        .map(str::to_string)
        .collect();
    let has_row = stmt.exists([]).map_err(|e| exec.record(e))?;

    Ok(if has_row { names } else { Vec::new() })
}

/// Pair existing columns with new ones as `(old, new)`.
///
/// Explicit renames count only when `old` exists and `new` is declared.
/// Columns present on both sides map to themselves unless an explicit rename
/// already uses them. Anything else is dropped from the copy.
pub(super) fn column_mapping(
    existing: &[String],
    new_names: &[&str],
    renames: &[(&str, &str)],
) -> Vec<(String, String)> {
    let mut mapping: Vec<(String, String)> = Vec::new();

    for (old, new) in renames {
        let valid = new_names.contains(new) && existing.iter().any(|c| c == old);
        let target_taken = mapping.iter().any(|(_, n)| n == new);
        if valid && !target_taken {
            mapping.push((old.to_string(), new.to_string()));
        }
    }

    for column in existing {
        let used = mapping
            .iter()
            .any(|(old, new)| old == column || new == column);
        if !used && new_names.contains(&column.as_str()) {
            mapping.push((column.clone(), column.clone()));
        }
    }

    mapping
}

fn copy_and_swap(
    exec: &Executor,
    definition: &TableDefinition,
    mapping: &[(String, String)],
    known_indexes: &[String],
) -> Result<()> {
    let table = definition.name.as_str();
    let shadow = format!("{}{}", table, SyncConfig::SHADOW_TABLE_SUFFIX);

    // Declared first so it is released after the transaction ends.
    let _foreign_keys = ForeignKeysOff::engage(exec)?;
    let tx = Transaction::new_unchecked(exec.connection(), TransactionBehavior::Immediate)
        .map_err(|e| exec.record(e))?;

    for index in known_indexes {
        exec.execute_batch(&format!("DROP INDEX IF EXISTS {}", index))?;
    }
    // An existing table of that name belongs to the caller; the CREATE fails
    // and the migration rolls back.
    exec.execute_batch(&format!("CREATE TABLE {} ({})", shadow, definition.columns_sql()))?;

    if !mapping.is_empty() {
        let (old, new): (Vec<&str>, Vec<&str>) = mapping
            .iter()
            .map(|(old, new)| (old.as_str(), new.as_str()))
            .unzip();
        exec.execute_batch(&format!(
            "INSERT INTO {} ({}) SELECT {} FROM {}",
            shadow,
            new.join(", "),
            old.join(", "),
            table
        ))?;
    }

    exec.execute_batch(&format!("DROP TABLE {}", table))?;
    exec.execute_batch(&format!("ALTER TABLE {} RENAME TO {}", shadow, table))?;

    tx.commit().map_err(|e| exec.record(e))
}
