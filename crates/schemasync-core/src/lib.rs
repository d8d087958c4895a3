//! schemasync - declarative schema reconciliation for embedded SQLite.
//!
//! Callers describe the tables, indexes and full-text tables they want; the
//! crate compares that against the live catalog and applies only the changes
//! needed, carrying existing rows across migrations. Full-text tables get a
//! relevance-ranked search built on FTS4 `matchinfo()`.
//!
//! # Example
//!
//! ```rust,no_run
//! use schemasync::{Database, Field, Indexes, SearchRequest};
//!
//! fn main() -> schemasync::Result<()> {
//!     let mut db = Database::open("/path/to/app.db")?;
//!
//!     // Create or migrate a table; `position` is carried over as `title`
//!     db.create(
//!         "employees",
//!         &[
//!             Field::new("id", "INTEGER PRIMARY KEY"),
//!             Field::new("name", "TEXT NOT NULL"),
//!             Field::new("title", "TEXT"),
//!         ],
//!         &Indexes::Simple(vec!["title".into()]),
//!         &[("position", "title")],
//!     )?;
//!
//!     // Full-text search
//!     db.create_fts("docs", &["title", "body"], None)?;
//!     let hits = db.search("docs", "fish", &SearchRequest::new().with_weights(&[2.0, 1.0]))?;
//!     println!("Found {} documents", hits.len());
//!
//!     Ok(())
//! }
//! ```

pub mod catalog;
pub mod config;
pub mod database;
pub mod error;
pub mod exec;
pub mod fts;
pub mod recovery;
pub mod schema;
pub mod settings;

// Re-export commonly used types
pub use catalog::CatalogSnapshot;
pub use config::{FtsConfig, SnippetConfig, SyncConfig};
pub use database::Database;
pub use error::{Result, SyncError};
pub use exec::Executor;
pub use fts::{CounterWidth, FtsDefinition, Limit, SearchHit, SearchRequest};
pub use recovery::RecoveryReport;
pub use schema::{Field, IndexDefinition, Indexes, TableDefinition};
