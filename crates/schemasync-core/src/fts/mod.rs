//! FTS4 full-text tables with custom relevance ranking.
//!
//! This module provides:
//! - Virtual table setup with drift detection (recreated on change)
//! - Match counting and ranked, paginated search
//! - The `rank()` SQL function over `matchinfo()` blobs ([`rank`])
//! - Matched-term recovery from `offsets()` ([`offsets`])

pub mod offsets;
pub mod query;
pub mod rank;

pub use offsets::{matched_terms, parse_offsets, OffsetEntry};
pub use query::Limit;
pub use rank::CounterWidth;

use crate::catalog::same_definition;
use crate::config::SyncConfig;
use crate::database::Database;
use crate::schema::validate_identifier;
use crate::{Result, SyncError};
use rusqlite::params;
use rusqlite::types::ValueRef;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use tracing::{debug, info};

/// Canonical shape of an FTS4 virtual table.
#[derive(Debug, Clone)]
pub struct FtsDefinition {
    pub name: String,
    pub fields: Vec<String>,
    pub tokenizer: String,
    pub sql: String,
}

impl FtsDefinition {
    pub fn new(name: &str, fields: &[&str], tokenizer: &str) -> Self {
        let mut args: Vec<String> = fields.iter().map(|f| f.to_string()).collect();
        args.push(format!("tokenize={}", tokenizer));
        Self {
            name: name.to_string(),
            fields: fields.iter().map(|f| f.to_string()).collect(),
            tokenizer: tokenizer.to_string(),
            sql: format!(
                "CREATE VIRTUAL TABLE {} USING fts4({})",
                name,
                args.join(", ")
            ),
        }
    }
}

/// Options for [`Database::search`].
#[derive(Debug, Clone, Default)]
pub struct SearchRequest {
    pub limit: Limit,
    /// Extra SQL condition, with or without a leading `WHERE`.
    pub filter: String,
    /// Table columns to return with every hit.
    pub fields: Vec<String>,
    /// Per-column rank weights; missing columns weigh 1.
    pub weights: Vec<f64>,
}

impl SearchRequest {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_limit(mut self, limit: Limit) -> Self {
        self.limit = limit;
        self
    }

    pub fn with_filter(mut self, filter: impl Into<String>) -> Self {
        self.filter = filter.into();
        self
    }

    pub fn with_fields<I, S>(mut self, fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.fields = fields.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_weights(mut self, weights: &[f64]) -> Self {
        self.weights = weights.to_vec();
        self
    }
}

/// One ranked match.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchHit {
    pub docid: i64,
    /// Requested extra fields by name.
    pub fields: BTreeMap<String, Value>,
    /// Highlighted excerpt.
    pub snippet: String,
    /// Raw `offsets()` text.
    pub offsets: String,
    pub rank: f64,
}

fn value_to_json(value: ValueRef<'_>) -> Value {
    match value {
        ValueRef::Null => Value::Null,
        ValueRef::Integer(i) => Value::from(i),
        ValueRef::Real(f) => serde_json::Number::from_f64(f)
            .map(Value::Number)
            .unwrap_or(Value::Null),
        ValueRef::Text(t) => Value::String(String::from_utf8_lossy(t).into_owned()),
        ValueRef::Blob(b) => Value::from(b.to_vec()),
    }
}

fn value_to_text(value: ValueRef<'_>) -> String {
    match value {
        ValueRef::Null | ValueRef::Blob(_) => String::new(),
        ValueRef::Integer(i) => i.to_string(),
        ValueRef::Real(f) => f.to_string(),
        ValueRef::Text(t) => String::from_utf8_lossy(t).into_owned(),
    }
}

fn validate_tokenizer(tokenizer: &str) -> Result<()> {
    let valid = !tokenizer.trim().is_empty()
        && tokenizer
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == ' ');
    if valid {
        Ok(())
    } else {
        Err(SyncError::InvalidIdentifier(tokenizer.to_string()))
    }
}

impl Database {
    /// Create the FTS4 table `table`, or recreate it if its definition drifted.
    ///
    /// Recreation discards the indexed content; callers reinsert documents.
    /// `tokenizer` defaults to the configured one (`porter`).
    pub fn create_fts(&mut self, table: &str, fields: &[&str], tokenizer: Option<&str>) -> Result<bool> {
        validate_identifier(table)?;
        for field in fields {
            validate_identifier(field)?;
        }
        let tokenizer = tokenizer
            .map(str::to_string)
            .unwrap_or_else(|| self.fts_config.tokenizer.clone());
        validate_tokenizer(&tokenizer)?;

        let definition = FtsDefinition::new(table, fields, &tokenizer);
        self.catalog.ensure_loaded(&self.exec)?;

        let existing = self.catalog.table(table).map(str::to_string);
        if let Some(current) = existing.as_deref() {
            if same_definition(current, &definition.sql) {
                return Ok(false);
            }
        }

        if existing.is_some() {
            self.exec
                .execute_batch(&format!("DROP TABLE IF EXISTS {}", table))?;
            self.catalog.remove_table(table);
            self.catalog.forget_fts_shadows(table);
            debug!("Dropped drifted FTS table {}", table);
        }

        self.exec.execute_batch(&definition.sql)?;
        self.catalog.set_table(table, definition.sql);
        self.track_shadow_tables(table)?;

        info!("Created FTS table: {}", table);
        Ok(true)
    }

    /// Record the storage tables SQLite created for the virtual table.
    fn track_shadow_tables(&mut self, table: &str) -> Result<()> {
        let shadows = self.exec.query_collect(
            "SELECT name, sql FROM sqlite_master
             WHERE type = 'table' AND sql IS NOT NULL AND name LIKE ?1 ESCAPE '\\'",
            [format!("{}\\_%", table.replace('_', "\\_"))],
            |row| Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?)),
        )?;
        for (name, sql) in shadows {
            if crate::catalog::is_fts_shadow(&name, std::iter::once(table)) {
                self.catalog.set_table(&name, sql);
            }
        }
        Ok(())
    }

    /// Number of documents in `table` matching `expr` (and `filter`, if any).
    pub fn count(&self, table: &str, expr: &str, filter: &str) -> Result<u64> {
        validate_identifier(table)?;
        let count: i64 = self
            .exec
            .query_row(&query::count_sql(table, filter), [expr], |row| row.get(0))?;
        Ok(u64::try_from(count).unwrap_or(0))
    }

    /// Ranked matches of `expr` in `table`, best first.
    pub fn search(&mut self, table: &str, expr: &str, request: &SearchRequest) -> Result<Vec<SearchHit>> {
        validate_identifier(table)?;
        for field in &request.fields {
            validate_identifier(field)?;
        }
        self.ensure_rank_function()?;

        let sql = query::search_sql(table, &request.filter, &request.fields, &request.limit);
        let weights = rank::format_weights(&request.weights);
        let snippet = &self.fts_config.snippet;
        let extra = request.fields.len();

        let hits = self.exec.query_collect(
            &sql,
            params![
                expr,
                weights,
                snippet.start,
                snippet.end,
                snippet.ellipsis,
                snippet.tokens
            ],
            |row| {
                let mut fields = BTreeMap::new();
                for (i, name) in request.fields.iter().enumerate() {
                    fields.insert(name.clone(), value_to_json(row.get_ref(i + 1)?));
                }
                Ok(SearchHit {
                    docid: row.get(0)?,
                    fields,
                    snippet: row.get::<_, Option<String>>(extra + 1)?.unwrap_or_default(),
                    offsets: row.get::<_, Option<String>>(extra + 2)?.unwrap_or_default(),
                    rank: row.get::<_, Option<f64>>(extra + 3)?.unwrap_or(0.0),
                })
            },
        )?;

        debug!("FTS search on {} for {:?}: {} hits", table, expr, hits.len());
        Ok(hits)
    }

    /// The distinct terms of document `docid` that matched `expr`.
    pub fn words(&mut self, table: &str, expr: &str, docid: i64) -> Result<Vec<String>> {
        let request = SearchRequest::new().with_filter(format!("docid = {}", docid));
        let Some(hit) = self.search(table, expr, &request)?.into_iter().next() else {
            return Ok(Vec::new());
        };

        let texts = self.document_texts(table, docid)?;
        let columns: Vec<&str> = texts.iter().map(String::as_str).collect();
        Ok(matched_terms(&hit.offsets, &columns))
    }

    /// Field texts of one document in column order.
    fn document_texts(&self, table: &str, docid: i64) -> Result<Vec<String>> {
        let texts = self.exec.query_row_optional(
            &format!("SELECT * FROM {} WHERE docid = ?1", table),
            [docid],
            |row| {
                (0..row.as_ref().column_count())
                    .map(|i| row.get_ref(i).map(value_to_text))
                    .collect::<rusqlite::Result<Vec<String>>>()
            },
        )?;
        Ok(texts.unwrap_or_default())
    }

    /// Register `rank(matchinfo, weights)` on first use.
    fn ensure_rank_function(&mut self) -> Result<()> {
        if self.rank_registered {
            return Ok(());
        }

        let width = self.fts_config.counter_width;
        self.exec
            .register_scalar(SyncConfig::RANK_FUNCTION, 2, move |ctx| {
                let block: &[u8] = match ctx.get_raw(0) {
                    ValueRef::Blob(b) => b,
                    _ => &[],
                };
                let weights = match ctx.get_raw(1) {
                    ValueRef::Text(t) => std::str::from_utf8(t).unwrap_or(""),
                    _ => "",
                };
                Ok(rank::rank(block, weights, width))
            })?;

        self.rank_registered = true;
        debug!("Registered {} function ({:?} counters)", SyncConfig::RANK_FUNCTION, width);
        Ok(())
    }
}
