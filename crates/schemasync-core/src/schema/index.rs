//! Index reconciliation for a single table.

use super::validate_identifier;
use crate::catalog::same_definition;
use crate::database::Database;
use crate::exec::Executor;
use crate::{Result, SyncError};
use std::collections::{BTreeMap, BTreeSet};
use tracing::debug;

/// Requested index set for a table.
///
/// Each group is a comma-delimited column list: `"last, first"` is one index
/// over two columns.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum Indexes {
    /// Leave existing indexes alone.
    #[default]
    None,
    Simple(Vec<String>),
    Unique(Vec<String>),
    /// `(is_unique, group)` pairs.
    Mixed(Vec<(bool, String)>),
}

impl Indexes {
    pub fn is_empty(&self) -> bool {
        match self {
            Indexes::None => true,
            Indexes::Simple(groups) | Indexes::Unique(groups) => groups.is_empty(),
            Indexes::Mixed(entries) => entries.is_empty(),
        }
    }

    fn entries(&self) -> Vec<(bool, &str)> {
        match self {
            Indexes::None => Vec::new(),
            Indexes::Simple(groups) => groups.iter().map(|g| (false, g.as_str())).collect(),
            Indexes::Unique(groups) => groups.iter().map(|g| (true, g.as_str())).collect(),
            Indexes::Mixed(entries) => entries.iter().map(|(u, g)| (*u, g.as_str())).collect(),
        }
    }

    /// Build the definitions for `table`, validating every column name.
    pub fn definitions(&self, table: &str) -> Result<Vec<IndexDefinition>> {
        self.entries()
            .into_iter()
            .map(|(unique, group)| IndexDefinition::new(table, unique, group))
            .collect()
    }
}

impl From<&str> for Indexes {
    fn from(group: &str) -> Self {
        if group.trim().is_empty() {
            Indexes::None
        } else {
            Indexes::Simple(vec![group.to_string()])
        }
    }
}

/// A derived `CREATE [UNIQUE] INDEX` statement.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexDefinition {
    /// `<table>_<col>_<col>...`
    pub name: String,
    pub table: String,
    pub columns: Vec<String>,
    pub unique: bool,
    pub sql: String,
}

impl IndexDefinition {
    pub fn new(table: &str, unique: bool, group: &str) -> Result<Self> {
        let columns: Vec<String> = group
            .split(',')
            .map(str::trim)
            .filter(|c| !c.is_empty())
            .map(str::to_string)
            .collect();
        if columns.is_empty() {
            return Err(SyncError::InvalidIdentifier(group.to_string()));
        }
        for column in &columns {
            validate_identifier(column)?;
        }

        let name = format!("{}_{}", table, columns.join("_"));
        let sql = format!(
            "CREATE {}INDEX {} ON {} ({})",
            if unique { "UNIQUE " } else { "" },
            name,
            table,
            columns.join(", ")
        );

        Ok(Self {
            name,
            table: table.to_string(),
            columns,
            unique,
            sql,
        })
    }
}

impl Database {
    /// Converge the indexes of `table` on `indexes`.
    ///
    /// An empty request is a no-op. Otherwise changed indexes are rebuilt and
    /// indexes no longer requested are dropped.
    pub fn reconcile_indexes(&mut self, table: &str, indexes: &Indexes) -> Result<()> {
        if indexes.is_empty() {
            return Ok(());
        }
        validate_identifier(table)?;
        let definitions = indexes.definitions(table)?;
        self.catalog.ensure_loaded(&self.exec)?;

        let known = self.catalog.indexes(table);
        let mut current = known.clone();
        let outcome = apply(&self.exec, &definitions, &known, &mut current);
        // Persist what actually ran, even after a partial failure.
        self.catalog.set_indexes(table, current);
        outcome
    }
}

fn apply(
    exec: &Executor,
    definitions: &[IndexDefinition],
    known: &BTreeMap<String, String>,
    current: &mut BTreeMap<String, String>,
) -> Result<()> {
    let mut requested = BTreeSet::new();

    for definition in definitions {
        requested.insert(definition.name.clone());
        match current.get(&definition.name) {
            Some(existing) if same_definition(existing, &definition.sql) => continue,
            Some(_) => {
                exec.execute_batch(&format!("DROP INDEX IF EXISTS {}", definition.name))?;
                current.remove(&definition.name);
                debug!("Dropped changed index {}", definition.name);
            }
            None => {}
        }
        exec.execute_batch(&definition.sql)?;
        current.insert(definition.name.clone(), definition.sql.clone());
        debug!("Created index {}", definition.name);
    }

    for name in known.keys().filter(|name| !requested.contains(*name)) {
        exec.execute_batch(&format!("DROP INDEX IF EXISTS {}", name))?;
        current.remove(name);
        debug!("Dropped obsolete index {}", name);
    }

    Ok(())
}
