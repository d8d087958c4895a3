//! Key/value settings stored as one JSON document in a single-row table.

use crate::config::SyncConfig;
use crate::database::Database;
use crate::schema::{Field, Indexes};
use crate::Result;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::{Map, Value};
use tracing::{debug, warn};

fn settings_fields() -> [Field; 2] {
    [
        Field::new("id", "INTEGER PRIMARY KEY CHECK (id = 1)"),
        Field::new("data", "TEXT NOT NULL"),
    ]
}

impl Database {
    /// All settings. Read from the database once per session.
    pub fn settings(&mut self) -> Result<&Map<String, Value>> {
        self.load_settings()?;
        Ok(self.catalog.settings_entry())
    }

    pub fn setting(&mut self, key: &str) -> Result<Option<Value>> {
        Ok(self.settings()?.get(key).cloned())
    }

    /// A setting deserialized into `T`; `None` when absent.
    pub fn setting_as<T: DeserializeOwned>(&mut self, key: &str) -> Result<Option<T>> {
        match self.setting(key)? {
            Some(value) => Ok(Some(serde_json::from_value(value)?)),
            None => Ok(None),
        }
    }

    /// Store `value` under `key` and write the document back.
    pub fn set_setting(&mut self, key: &str, value: impl Serialize) -> Result<()> {
        let value = serde_json::to_value(value)?;
        self.load_settings()?;
        self.catalog.settings_entry().insert(key.to_string(), value);
        self.write_settings()?;
        debug!("Saved setting {}", key);
        Ok(())
    }

    /// Remove `key`. Returns whether it was present.
    pub fn remove_setting(&mut self, key: &str) -> Result<bool> {
        self.load_settings()?;
        let removed = self.catalog.settings_entry().remove(key).is_some();
        if removed {
            self.write_settings()?;
            debug!("Removed setting {}", key);
        }
        Ok(removed)
    }

    fn load_settings(&mut self) -> Result<()> {
        if self.catalog.settings().is_some() {
            return Ok(());
        }

        self.create(SyncConfig::SETTINGS_TABLE, &settings_fields(), &Indexes::None, &[])?;
        let stored: Option<String> = self.exec.query_row_optional(
            &format!("SELECT data FROM {} WHERE id = 1", SyncConfig::SETTINGS_TABLE),
            [],
            |row| row.get(0),
        )?;

        let settings = match stored {
            None => Map::new(),
            Some(text) => match serde_json::from_str::<Map<String, Value>>(&text) {
                Ok(map) => map,
                Err(err) => {
                    warn!("Ignoring unreadable settings: {}", err);
                    Map::new()
                }
            },
        };
        self.catalog.set_settings(settings);
        Ok(())
    }

    fn write_settings(&mut self) -> Result<()> {
        let text = serde_json::to_string(self.catalog.settings_entry())?;
        self.exec.execute(
            &format!(
                "INSERT INTO {} (id, data) VALUES (1, ?1)
                 ON CONFLICT(id) DO UPDATE SET data = excluded.data",
                SyncConfig::SETTINGS_TABLE
            ),
            [text],
        )?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;
    use tempfile::TempDir;

    #[derive(Debug, PartialEq, Serialize, Deserialize)]
    struct Window {
        width: u32,
        height: u32,
    }

    #[test]
    fn test_set_and_get() {
        let mut db = Database::open_in_memory().unwrap();
        assert!(db.settings().unwrap().is_empty());

        db.set_setting("theme", "dark").unwrap();
        db.set_setting("window", Window { width: 800, height: 600 }).unwrap();

        assert_eq!(db.setting("theme").unwrap(), Some(Value::from("dark")));
        assert_eq!(
            db.setting_as::<Window>("window").unwrap(),
            Some(Window { width: 800, height: 600 })
        );
        assert!(db.setting("missing").unwrap().is_none());
    }

    #[test]
    fn test_loaded_once() {
        let mut db = Database::open_in_memory().unwrap();
        db.settings().unwrap();
        let statements = db.executed_statements();
        db.setting("a").unwrap();
        db.settings().unwrap();
        assert_eq!(db.executed_statements(), statements);
    }

    #[test]
    fn test_remove_setting() {
        let mut db = Database::open_in_memory().unwrap();
        db.set_setting("a", 1).unwrap();
        assert!(db.remove_setting("a").unwrap());
        assert!(!db.remove_setting("a").unwrap());
        assert!(db.setting("a").unwrap().is_none());
    }

    #[test]
    fn test_persists_across_sessions() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("app.db");
        {
            let mut db = Database::open(&path).unwrap();
            db.set_setting("volume", 7).unwrap();
        }
        let mut db = Database::open(&path).unwrap();
        assert_eq!(db.setting_as::<u32>("volume").unwrap(), Some(7));
    }

    #[test]
    fn test_corrupt_blob_reads_empty() {
        let mut db = Database::open_in_memory().unwrap();
        db.connection()
            .execute_batch(
                "CREATE TABLE settings (id INTEGER PRIMARY KEY CHECK (id = 1), data TEXT NOT NULL);
                 INSERT INTO settings VALUES (1, '{not json');",
            )
            .unwrap();
        assert!(db.settings().unwrap().is_empty());

        db.set_setting("fixed", true).unwrap();
        let stored: String = db
            .connection()
            .query_row("SELECT data FROM settings", [], |row| row.get(0))
            .unwrap();
        assert_eq!(stored, r#"{"fixed":true}"#);
    }
}
