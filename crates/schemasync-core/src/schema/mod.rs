//! Declarative table synchronization.
//!
//! This module provides:
//! - Canonical table definitions built from field lists
//! - Drift detection against the catalog snapshot
//! - Index reconciliation ([`index`]) and copy-based migration ([`migrate`])

mod index;
mod migrate;

pub use index::{IndexDefinition, Indexes};

use crate::catalog::{is_virtual_table, same_definition};
use crate::database::Database;
use crate::{Result, SyncError};
use regex::Regex;
use std::collections::BTreeMap;
use std::sync::LazyLock;
use tracing::info;

/// Plain SQL identifiers accepted for tables, indexed columns and FTS fields.
static IDENTIFIER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[A-Za-z_][A-Za-z0-9_]*$").unwrap());

/// Reject names that would need quoting to be spliced into SQL.
pub(crate) fn validate_identifier(name: &str) -> Result<()> {
    if IDENTIFIER.is_match(name) {
        Ok(())
    } else {
        Err(SyncError::InvalidIdentifier(name.to_string()))
    }
}

/// One entry of a table's column list.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Field {
    /// A column: rendered as `name declaration`.
    Named { name: String, declaration: String },
    /// A verbatim fragment such as `UNIQUE (first, last)`.
    Raw(String),
}

impl Field {
    pub fn new(name: impl Into<String>, declaration: impl Into<String>) -> Self {
        Field::Named {
            name: name.into(),
            declaration: declaration.into(),
        }
    }

    pub fn raw(fragment: impl Into<String>) -> Self {
        Field::Raw(fragment.into())
    }

    /// Column name, or `None` for raw fragments.
    pub fn name(&self) -> Option<&str> {
        match self {
            Field::Named { name, .. } => Some(name),
            Field::Raw(_) => None,
        }
    }

    fn render(&self) -> String {
        match self {
            Field::Named { name, declaration } if declaration.trim().is_empty() => name.clone(),
            Field::Named { name, declaration } => format!("{} {}", name, declaration.trim()),
            Field::Raw(fragment) => fragment.trim().to_string(),
        }
    }
}

/// The canonical shape of an ordinary table.
#[derive(Debug, Clone)]
pub struct TableDefinition {
    pub name: String,
    pub fields: Vec<Field>,
    /// `CREATE TABLE <name> (<columns>)`, the text compared against the catalog.
    pub sql: String,
}

impl TableDefinition {
    pub fn new(name: &str, fields: &[Field]) -> Self {
        let sql = format!("CREATE TABLE {} ({})", name, render_columns(fields));
        Self {
            name: name.to_string(),
            fields: fields.to_vec(),
            sql,
        }
    }

    /// The parenthesized part of the definition.
    pub fn columns_sql(&self) -> String {
        render_columns(&self.fields)
    }

    /// Names of the declared columns, in order.
    pub fn field_names(&self) -> Vec<&str> {
        self.fields.iter().filter_map(Field::name).collect()
    }
}

fn render_columns(fields: &[Field]) -> String {
    fields
        .iter()
        .map(Field::render)
        .collect::<Vec<_>>()
        .join(", ")
}

impl Database {
    /// Create `table` or bring it to the requested shape.
    ///
    /// Returns `true` when the table was created or migrated, `false` when the
    /// catalog already matched (only the index set is reconciled then).
    /// `renames` maps old column names to new ones for the data copy.
    pub fn create(
        &mut self,
        table: &str,
        fields: &[Field],
        indexes: &Indexes,
        renames: &[(&str, &str)],
    ) -> Result<bool> {
        validate_identifier(table)?;
        for name in fields.iter().filter_map(Field::name) {
            validate_identifier(name)?;
        }

        let definition = TableDefinition::new(table, fields);
        self.catalog.ensure_loaded(&self.exec)?;

        let previous = self.catalog.table(table).map(str::to_string);
        if let Some(current) = previous.as_deref() {
            if same_definition(current, &definition.sql) {
                self.reconcile_indexes(table, indexes)?;
                return Ok(false);
            }
        }

        // Visible to nested calls before the statements run.
        self.catalog.set_table(table, definition.sql.clone());

        let applied = match previous.as_deref() {
            Some(old_sql) => {
                let known: Vec<String> = self.catalog.indexes(table).into_keys().collect();
                let result = migrate::alter(&self.exec, &definition, renames, &known);
                if result.is_ok() {
                    self.catalog.set_indexes(table, BTreeMap::new());
                    // Dropping a full-text table took its storage tables with it.
                    if is_virtual_table(old_sql) {
                        self.catalog.forget_fts_shadows(table);
                    }
                    info!("Migrated table {}", table);
                }
                result
            }
            None => {
                let result = self.exec.execute_batch(&definition.sql);
                if result.is_ok() {
                    info!("Created table {}", table);
                }
                result
            }
        };

        if let Err(err) = applied {
            self.catalog.restore_table(table, previous);
            return Err(err);
        }

        self.reconcile_indexes(table, indexes)?;
        Ok(true)
    }

    /// Stored definition of `table`, as the snapshot knows it.
    pub fn table_definition(&mut self, table: &str) -> Result<Option<String>> {
        self.catalog.ensure_loaded(&self.exec)?;
        Ok(self.catalog.table(table).map(str::to_string))
    }

    /// Names of the indexes the snapshot tracks for `table`.
    pub fn index_names(&mut self, table: &str) -> Result<Vec<String>> {
        self.catalog.ensure_loaded(&self.exec)?;
        Ok(self.catalog.indexes(table).into_keys().collect())
    }
}
