//! Rebuild a database into a fresh file, table by table.
//!
//! Used when the file is damaged: whatever can still be read is copied, and
//! anything that fails is logged and reported instead of aborting the run.

use crate::catalog::{is_fts_shadow, is_virtual_table, read_entries};
use crate::database::Database;
use crate::exec::Executor;
use crate::{Result, SyncError};
use rusqlite::types::Value;
use rusqlite::{params_from_iter, Transaction, TransactionBehavior};
use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::{debug, info, warn};

/// Outcome of [`Database::recover_into`].
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RecoveryReport {
    /// Tables recreated in the destination.
    pub tables: Vec<String>,
    pub indexes: Vec<String>,
    pub rows_copied: u64,
    /// `name: reason` for every table, index or row set left behind.
    pub skipped: Vec<String>,
}

impl RecoveryReport {
    fn skip(&mut self, name: &str, err: &SyncError) {
        warn!("Recovery skipped {}: {}", name, err);
        self.skipped.push(format!("{}: {}", name, err));
    }
}

fn quote(identifier: &str) -> String {
    format!("\"{}\"", identifier.replace('"', "\"\""))
}

impl Database {
    /// Copy every recoverable table, its rows and its indexes into a new
    /// database at `dest`.
    ///
    /// `dest` must not exist yet. The catalog is read from the engine, not
    /// from the snapshot.
    pub fn recover_into(&self, dest: impl AsRef<Path>) -> Result<RecoveryReport> {
        let dest = dest.as_ref();
        if dest.exists() {
            return Err(SyncError::DestinationExists(dest.to_path_buf()));
        }

        info!("Recovering database into {}", dest.display());
        let target = Database::with_config(dest, self.fts_config.clone())?;
        let entries = read_entries(&self.exec)?;

        let virtual_tables: Vec<&str> = entries
            .iter()
            .filter(|e| e.kind == "table" && is_virtual_table(&e.sql))
            .map(|e| e.name.as_str())
            .collect();

        let mut report = RecoveryReport::default();

        for entry in entries.iter().filter(|e| e.kind == "table") {
            if entry.name.starts_with("sqlite_")
                || is_fts_shadow(&entry.name, virtual_tables.iter().copied())
            {
                continue;
            }
            if let Err(err) = target.exec.execute_batch(&entry.sql) {
                report.skip(&entry.name, &err);
                continue;
            }
            report.tables.push(entry.name.clone());

            let with_docid = virtual_tables.contains(&entry.name.as_str());
            match copy_rows(&self.exec, &target.exec, &entry.name, with_docid) {
                Ok(rows) => {
                    debug!("Recovered {} rows of {}", rows, entry.name);
                    report.rows_copied += rows;
                }
                Err(err) => report.skip(&format!("{} rows", entry.name), &err),
            }
        }

        for entry in entries.iter().filter(|e| e.kind == "index") {
            if !report.tables.contains(&entry.table) {
                continue;
            }
            match target.exec.execute_batch(&entry.sql) {
                Ok(()) => report.indexes.push(entry.name.clone()),
                Err(err) => report.skip(&entry.name, &err),
            }
        }

        target
            .exec
            .query_row("PRAGMA wal_checkpoint(TRUNCATE)", [], |_| Ok(()))?;

        info!(
            "Recovered {} tables, {} indexes, {} rows ({} skipped)",
            report.tables.len(),
            report.indexes.len(),
            report.rows_copied,
            report.skipped.len()
        );
        Ok(report)
    }
}

/// Copy all rows of `table` in one transaction on the target.
///
/// Full-text tables are copied with their `docid` so row identities survive.
fn copy_rows(source: &Executor, target: &Executor, table: &str, with_docid: bool) -> Result<u64> {
    let select = if with_docid {
        format!("SELECT docid, * FROM {}", quote(table))
    } else {
        format!("SELECT * FROM {}", quote(table))
    };
    let mut stmt = source.prepare(&select)?;
    let columns: Vec<String> = stmt.column_names().into_iter().map(quote).collect();
    let placeholders: Vec<String> = (1..=columns.len()).map(|i| format!("?{}", i)).collect();
    let insert_sql = format!(
        "INSERT INTO {} ({}) VALUES ({})",
        quote(table),
        columns.join(", "),
        placeholders.join(", ")
    );

    let tx = Transaction::new_unchecked(target.connection(), TransactionBehavior::Immediate)
        .map_err(|e| target.record(e))?;
    let mut insert = target.prepare_cached(&insert_sql)?;
    let mut rows = stmt.query([]).map_err(|e| source.record(e))?;

    let mut copied = 0;
    while let Some(row) = rows.next().map_err(|e| source.record(e))? {
        let values = (0..columns.len())
            .map(|i| row.get::<_, Value>(i))
            .collect::<rusqlite::Result<Vec<Value>>>()
            .map_err(|e| source.record(e))?;
        insert
            .execute(params_from_iter(values.iter()))
            .map_err(|e| target.record(e))?;
        copied += 1;
    }

    drop(insert);
    tx.commit().map_err(|e| target.record(e))?;
    Ok(copied)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fts::SearchRequest;
    use crate::schema::{Field, Indexes};
    use tempfile::TempDir;

    fn populated(path: &Path) -> Database {
        let mut db = Database::open(path).unwrap();
        db.create(
            "people",
            &[Field::new("id", "INTEGER PRIMARY KEY"), Field::new("name", "TEXT")],
            &Indexes::from("name"),
            &[],
        )
        .unwrap();
        db.create_fts("notes", &["body"], None).unwrap();
        db.connection()
            .execute_batch(
                "INSERT INTO people (id, name) VALUES (1, 'Ada'), (7, 'Grace');
                 INSERT INTO notes (docid, body) VALUES (42, 'fishing trip');",
            )
            .unwrap();
        db
    }

    #[test]
    fn test_recover_copies_tables_rows_and_indexes() {
        let temp_dir = TempDir::new().unwrap();
        let source = populated(&temp_dir.path().join("source.db"));
        let dest = temp_dir.path().join("out").join("recovered.db");

        let report = source.recover_into(&dest).unwrap();
        assert!(report.skipped.is_empty(), "{:?}", report.skipped);
        assert_eq!(report.tables, vec!["people", "notes"]);
        assert_eq!(report.indexes, vec!["people_name"]);
        assert_eq!(report.rows_copied, 3);

        let mut recovered = Database::open(&dest).unwrap();
        let ids: Vec<i64> = recovered
            .connection()
            .prepare("SELECT id FROM people ORDER BY id")
            .unwrap()
            .query_map([], |row| row.get(0))
            .unwrap()
            .collect::<rusqlite::Result<_>>()
            .unwrap();
        assert_eq!(ids, vec![1, 7]);
        assert_eq!(recovered.index_names("people").unwrap(), vec!["people_name"]);

        let hits = recovered.search("notes", "fishing", &SearchRequest::new()).unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].docid, 42);
    }

    #[test]
    fn test_recover_refuses_existing_destination() {
        let temp_dir = TempDir::new().unwrap();
        let source = populated(&temp_dir.path().join("source.db"));
        let dest = temp_dir.path().join("taken.db");
        std::fs::write(&dest, b"").unwrap();

        let err = source.recover_into(&dest).unwrap_err();
        assert!(matches!(err, SyncError::DestinationExists(_)));
    }

    #[test]
    fn test_unrecreatable_table_is_skipped() {
        let temp_dir = TempDir::new().unwrap();
        let source = populated(&temp_dir.path().join("source.db"));
        source
            .connection()
            .create_collation("reversed", |a: &str, b: &str| b.cmp(a))
            .unwrap();
        source
            .connection()
            .execute_batch(
                "CREATE TABLE tags (label TEXT COLLATE reversed);
                 INSERT INTO tags (label) VALUES ('x'), ('y');",
            )
            .unwrap();

        let dest = temp_dir.path().join("recovered.db");
        let report = source.recover_into(&dest).unwrap();

        assert_eq!(report.skipped.len(), 1, "{:?}", report.skipped);
        assert!(report.skipped[0].starts_with("tags: "));
        assert!(report.skipped[0].contains("reversed"));
        assert_eq!(report.tables, vec!["people", "notes"]);
        assert_eq!(report.indexes, vec!["people_name"]);
        assert_eq!(report.rows_copied, 3);

        let recovered = Database::open(&dest).unwrap();
        let people: i64 = recovered
            .connection()
            .query_row("SELECT COUNT(*) FROM people", [], |row| row.get(0))
            .unwrap();
        assert_eq!(people, 2);
    }
}
