//! SQL construction for full-text counting and ranked search.
//!
//! Bound parameters shared by the statements built here:
//! `?1` match expression, `?2` weight list, `?3`..`?5` snippet markup,
//! `?6` snippet token count.

use crate::config::SyncConfig;
use crate::SyncError;
use std::str::FromStr;

/// How many ranked results to return.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Limit {
    #[default]
    All,
    /// The `n` best matches.
    Top(u64),
    /// `length` matches after skipping the `offset` best ones.
    Page { offset: u64, length: u64 },
}

/// Largest count SQLite accepts in `LIMIT`/`OFFSET`.
const MAX_COUNT: u64 = i64::MAX as u64;

fn parse_count(text: &str) -> Option<u64> {
    text.trim().parse::<u64>().ok().filter(|n| *n <= MAX_COUNT)
}

impl Limit {
    /// Values above the engine's range are clamped to it.
    fn clause(&self) -> Option<String> {
        match self {
            Limit::All => None,
            Limit::Top(n) => Some(format!("LIMIT {}", (*n).min(MAX_COUNT))),
            Limit::Page { offset, length } => Some(format!(
                "LIMIT {} OFFSET {}",
                (*length).min(MAX_COUNT),
                (*offset).min(MAX_COUNT)
            )),
        }
    }
}

impl FromStr for Limit {
    type Err = SyncError;

    /// `""` → all, `"n"` → top n, `"offset,length"` → a page.
    fn from_str(spec: &str) -> Result<Self, Self::Err> {
        let invalid = || SyncError::InvalidLimit(spec.to_string());
        let spec_trimmed = spec.trim();
        if spec_trimmed.is_empty() {
            return Ok(Limit::All);
        }

        match spec_trimmed.split_once(',') {
            None => parse_count(spec_trimmed).map(Limit::Top).ok_or_else(invalid),
            Some((offset, length)) => {
                let offset = parse_count(offset).ok_or_else(invalid)?;
                let length = parse_count(length).ok_or_else(invalid)?;
                Ok(Limit::Page { offset, length })
            }
        }
    }
}

/// Strip a leading `WHERE` or `AND` keyword the caller may have written.
pub(crate) fn normalize_filter(filter: &str) -> &str {
    let mut filter = filter.trim();
    for keyword in ["WHERE", "AND"] {
        let head = filter.get(..keyword.len());
        let rest = filter.get(keyword.len()..).unwrap_or("");
        if head.is_some_and(|h| h.eq_ignore_ascii_case(keyword))
            && rest.starts_with(char::is_whitespace)
        {
            filter = rest.trim_start();
        }
    }
    filter
}

/// `WHERE <table> MATCH ?1 [AND (<filter>)]`
pub(crate) fn match_clause(table: &str, filter: &str) -> String {
    let filter = normalize_filter(filter);
    if filter.is_empty() {
        format!("WHERE {} MATCH ?1", table)
    } else {
        format!("WHERE {} MATCH ?1 AND ({})", table, filter)
    }
}

pub(crate) fn count_sql(table: &str, filter: &str) -> String {
    format!("SELECT COUNT(*) FROM {} {}", table, match_clause(table, filter))
}

/// Ranked search returning docid, `fields`, snippet, offsets and score.
///
/// A bounded limit ranks inside a subquery first so the page holds the best
/// matches; the outer query joins back for snippet and offsets.
pub(crate) fn search_sql(table: &str, filter: &str, fields: &[String], limit: &Limit) -> String {
    let rank = format!(
        "{}(matchinfo({}, 'pcx'), ?2)",
        SyncConfig::RANK_FUNCTION,
        table
    );
    let details = format!(
        "{}.docid, {}snippet({}, ?3, ?4, ?5, -1, ?6), offsets({})",
        table,
        fields
            .iter()
            .map(|f| format!("{}.{}, ", table, f))
            .collect::<String>(),
        table,
        table
    );

    match limit.clause() {
        None => format!(
            "SELECT {details}, {rank} AS score FROM {table} {filter} \
             ORDER BY score DESC, {table}.docid",
            details = details,
            rank = rank,
            table = table,
            filter = match_clause(table, filter),
        ),
        Some(limit) => format!(
            "SELECT {details}, ranked.score FROM {table} \
             JOIN (SELECT docid, {rank} AS score FROM {table} {filter} \
             ORDER BY score DESC, docid {limit}) AS ranked \
             ON ranked.docid = {table}.docid \
             WHERE {table} MATCH ?1 \
             ORDER BY ranked.score DESC, {table}.docid",
            details = details,
            rank = rank,
            table = table,
            filter = match_clause(table, filter),
            limit = limit,
        ),
    }
}
