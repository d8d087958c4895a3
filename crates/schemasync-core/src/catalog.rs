//! In-memory snapshot of the SQLite catalog.
//!
//! The snapshot is loaded lazily per category: table and index definitions on
//! the first schema operation, settings on the first settings access. Every
//! write made by this crate updates the snapshot in place, so after the first
//! load no catalog query is needed to detect drift.

use crate::config::SyncConfig;
use crate::exec::Executor;
use crate::Result;
use serde_json::{Map, Value};
use std::collections::{BTreeMap, HashMap};
use tracing::debug;

/// One row of `sqlite_master`.
#[derive(Debug, Clone)]
pub(crate) struct CatalogEntry {
    pub kind: String,
    pub name: String,
    pub table: String,
    pub sql: String,
}

/// Read every catalog entry that carries a definition.
///
/// Tables come first so that a replay creates them before their indexes.
pub(crate) fn read_entries(exec: &Executor) -> Result<Vec<CatalogEntry>> {
    exec.query_collect(
        "SELECT type, name, tbl_name, sql FROM sqlite_master
         WHERE sql IS NOT NULL
         ORDER BY CASE type WHEN 'table' THEN 0 ELSE 1 END, rowid",
        [],
        |row| {
            Ok(CatalogEntry {
                kind: row.get(0)?,
                name: row.get(1)?,
                table: row.get(2)?,
                sql: row.get(3)?,
            })
        },
    )
}

/// Compare two definitions, ignoring quoting differences.
///
/// SQLite rewrites a renamed table's name as `"name"`, so quoting alone never
/// counts as drift.
pub(crate) fn same_definition(a: &str, b: &str) -> bool {
    strip_quotes(a) == strip_quotes(b)
}

fn strip_quotes(sql: &str) -> String {
    sql.chars()
        .filter(|c| !matches!(c, '"' | '\'' | '`' | '[' | ']'))
        .collect()
}

/// True when `sql` defines a virtual table.
pub(crate) fn is_virtual_table(sql: &str) -> bool {
    sql.trim_start()
        .get(..20)
        .is_some_and(|head| head.eq_ignore_ascii_case("CREATE VIRTUAL TABLE"))
}

/// True when `name` is a storage table owned by one of `virtual_tables`.
pub(crate) fn is_fts_shadow<'a>(
    name: &str,
    mut virtual_tables: impl Iterator<Item = &'a str>,
) -> bool {
    virtual_tables.any(|vt| {
        name.strip_prefix(vt)
            .and_then(|rest| rest.strip_prefix('_'))
            .is_some_and(|suffix| SyncConfig::FTS_SHADOW_SUFFIXES.contains(&suffix))
    })
}

/// Cached view of table definitions, index definitions and settings.
#[derive(Debug, Default)]
pub struct CatalogSnapshot {
    tables: Option<HashMap<String, String>>,
    indexes: HashMap<String, BTreeMap<String, String>>,
    settings: Option<Map<String, Value>>,
}

impl CatalogSnapshot {
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether the table/index category has been loaded.
    pub fn is_loaded(&self) -> bool {
        self.tables.is_some()
    }

    /// Populate tables and indexes from the engine if not loaded yet.
    pub(crate) fn ensure_loaded(&mut self, exec: &Executor) -> Result<()> {
        if self.tables.is_some() {
            return Ok(());
        }

        let mut tables = HashMap::new();
        let mut indexes: HashMap<String, BTreeMap<String, String>> = HashMap::new();
        for entry in read_entries(exec)? {
            match entry.kind.as_str() {
                "table" => {
                    tables.insert(entry.name, entry.sql);
                }
                "index" => {
                    indexes
                        .entry(entry.table)
                        .or_default()
                        .insert(entry.name, entry.sql);
                }
                _ => {}
            }
        }

        debug!(
            "Loaded catalog snapshot: {} tables, {} indexed tables",
            tables.len(),
            indexes.len()
        );
        self.tables = Some(tables);
        self.indexes = indexes;
        Ok(())
    }

    /// Drop everything cached; the next access reloads from the engine.
    pub fn invalidate(&mut self) {
        self.tables = None;
        self.indexes.clear();
        self.settings = None;
    }

    pub fn table(&self, name: &str) -> Option<&str> {
        self.tables.as_ref()?.get(name).map(String::as_str)
    }

    /// Record a definition. Ignored until the category has been loaded, since
    /// the load reads the engine's state anyway.
    pub(crate) fn set_table(&mut self, name: &str, sql: String) {
        if let Some(tables) = self.tables.as_mut() {
            tables.insert(name.to_string(), sql);
        }
    }

    pub(crate) fn remove_table(&mut self, name: &str) {
        if let Some(tables) = self.tables.as_mut() {
            tables.remove(name);
        }
        self.indexes.remove(name);
    }

    /// Forget the storage tables of full-text table `table`.
    pub(crate) fn forget_fts_shadows(&mut self, table: &str) {
        for suffix in SyncConfig::FTS_SHADOW_SUFFIXES {
            self.remove_table(&format!("{}_{}", table, suffix));
        }
    }

    /// Restore a table entry to a previously observed value.
    pub(crate) fn restore_table(&mut self, name: &str, previous: Option<String>) {
        match previous {
            Some(sql) => self.set_table(name, sql),
            None => {
                if let Some(tables) = self.tables.as_mut() {
                    tables.remove(name);
                }
            }
        }
    }

    /// Index name → definition for `table` (empty when none are known).
    pub fn indexes(&self, table: &str) -> BTreeMap<String, String> {
        self.indexes.get(table).cloned().unwrap_or_default()
    }

    pub(crate) fn set_indexes(&mut self, table: &str, indexes: BTreeMap<String, String>) {
        if indexes.is_empty() {
            self.indexes.remove(table);
        } else {
            self.indexes.insert(table.to_string(), indexes);
        }
    }

    pub(crate) fn settings(&self) -> Option<&Map<String, Value>> {
        self.settings.as_ref()
    }

    /// The settings map, empty if it was never loaded.
    pub(crate) fn settings_entry(&mut self) -> &mut Map<String, Value> {
        self.settings.get_or_insert_with(Map::new)
    }

    pub(crate) fn set_settings(&mut self, settings: Map<String, Value>) {
        self.settings = Some(settings);
    }
}
