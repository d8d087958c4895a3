//! Centralized configuration for schemasync.
//!
//! Constants used by the synchronizers, plus the tunable full-text settings.

use crate::fts::CounterWidth;

/// Layer-wide constants.
pub struct SyncConfig;

impl SyncConfig {
    /// Milliseconds SQLite waits on a locked database before failing.
    pub const BUSY_TIMEOUT_MS: u32 = 30_000;
    /// Suffix of the replacement table built during a migration.
    pub const SHADOW_TABLE_SUFFIX: &'static str = "_copy";
    /// Single-row table holding the serialized settings blob.
    pub const SETTINGS_TABLE: &'static str = "settings";
    /// Name the ranking function is registered under.
    pub const RANK_FUNCTION: &'static str = "rank";
    pub const DEFAULT_TOKENIZER: &'static str = "porter";
    /// Storage tables FTS4 creates next to each virtual table (`<table>_<suffix>`).
    pub const FTS_SHADOW_SUFFIXES: [&'static str; 5] =
        ["content", "segments", "segdir", "docsize", "stat"];
}

/// Markup passed to the FTS `snippet()` function.
#[derive(Debug, Clone)]
pub struct SnippetConfig {
    pub start: String,
    pub end: String,
    pub ellipsis: String,
    /// Approximate number of tokens in the excerpt.
    pub tokens: i32,
}

impl Default for SnippetConfig {
    fn default() -> Self {
        Self {
            start: "<b>".to_string(),
            end: "</b>".to_string(),
            ellipsis: "<b>...</b>".to_string(),
            tokens: 15,
        }
    }
}

/// Configuration for full-text tables and ranking.
#[derive(Debug, Clone)]
pub struct FtsConfig {
    /// Tokenizer used when `create_fts` is called without one.
    pub tokenizer: String,
    pub snippet: SnippetConfig,
    /// How `matchinfo` counters are decoded by the rank function.
    pub counter_width: CounterWidth,
}

impl Default for FtsConfig {
    fn default() -> Self {
        Self {
            tokenizer: SyncConfig::DEFAULT_TOKENIZER.to_string(),
            snippet: SnippetConfig::default(),
            counter_width: CounterWidth::Full,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fts_defaults() {
        let config = FtsConfig::default();
        assert_eq!(config.tokenizer, "porter");
        assert_eq!(config.counter_width, CounterWidth::Full);
        assert_eq!(config.snippet.tokens, 15);
    }
}
