//! The database handle every synchronizer hangs off.

use crate::catalog::CatalogSnapshot;
use crate::config::{FtsConfig, SyncConfig};
use crate::exec::Executor;
use crate::{Result, SyncError};
use rusqlite::Connection;
use std::path::{Path, PathBuf};
use tracing::debug;

/// One SQLite database with its catalog snapshot.
pub struct Database {
    path: Option<PathBuf>,
    pub(crate) exec: Executor,
    pub(crate) catalog: CatalogSnapshot,
    pub(crate) fts_config: FtsConfig,
    pub(crate) rank_registered: bool,
}

impl Database {
    /// Open or create the database at `path` with the default FTS settings.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self> {
        Self::with_config(path, FtsConfig::default())
    }

    /// Open or create the database at `path`.
    pub fn with_config(path: impl Into<PathBuf>, fts_config: FtsConfig) -> Result<Self> {
        let path = path.into();

        // Ensure parent directory exists
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() && !parent.exists() {
                std::fs::create_dir_all(parent).map_err(|e| SyncError::Io {
                    message: format!("Failed to create directory {}", parent.display()),
                    path: Some(parent.to_path_buf()),
                    source: Some(e),
                })?;
            }
        }

        let conn = Connection::open(&path)?;
        Self::configure_connection(&conn)?;
        debug!("Opened database {}", path.display());

        Ok(Self::from_connection(conn, Some(path), fts_config))
    }

    /// A private in-memory database.
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        Self::configure_connection(&conn)?;
        Ok(Self::from_connection(conn, None, FtsConfig::default()))
    }

    fn from_connection(conn: Connection, path: Option<PathBuf>, fts_config: FtsConfig) -> Self {
        Self {
            path,
            exec: Executor::new(conn),
            catalog: CatalogSnapshot::new(),
            fts_config,
            rank_registered: false,
        }
    }

    /// Configure connection with the layer's settings.
    fn configure_connection(conn: &Connection) -> Result<()> {
        conn.execute_batch(&format!(
            "
            PRAGMA journal_mode=WAL;
            PRAGMA busy_timeout={};
            PRAGMA synchronous=NORMAL;
            PRAGMA temp_store=MEMORY;
            PRAGMA foreign_keys=ON;
            ",
            SyncConfig::BUSY_TIMEOUT_MS
        ))?;
        Ok(())
    }

    /// The underlying connection, for reading and writing rows.
    pub fn connection(&self) -> &Connection {
        self.exec.connection()
    }

    /// File backing this database, `None` when in memory.
    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    pub fn fts_config(&self) -> &FtsConfig {
        &self.fts_config
    }

    /// Text of the most recent engine error.
    pub fn last_error(&self) -> Option<String> {
        self.exec.last_error()
    }

    /// Statements executed by this layer since opening.
    pub fn executed_statements(&self) -> u64 {
        self.exec.executed_statements()
    }

    /// The catalog snapshot, as currently cached.
    pub fn catalog(&self) -> &CatalogSnapshot {
        &self.catalog
    }

    /// Forget the cached catalog, e.g. after schema changes made directly
    /// through [`Database::connection`].
    pub fn refresh_catalog(&mut self) {
        self.catalog.invalidate();
    }
}
