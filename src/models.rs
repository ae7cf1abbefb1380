use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One entry read from a configured feed. `url` is the only identity key.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct FeedItem {
    pub url: String,
    pub title: String,
    pub summary: String,
    pub published_at: DateTime<Utc>,
    pub source_feed: String, // configured feed URL
    pub source_title: String,
}

/// "This URL has been ingested." Written once, never updated or removed.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct DedupeRecord {
    pub url: String,
    pub seen_at: DateTime<Utc>,
}

/// Identifier the research library assigned to a created record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecordId(pub String);

impl fmt::Display for RecordId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Counts reported at the end of a run.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct RunStats {
    pub fetched: usize,
    pub too_old: usize,
    pub keyword_filtered: usize,
    pub duplicate: usize,
    pub written: usize,
    pub failed: usize,
    pub failed_sources: usize,
}

impl fmt::Display for RunStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "fetched={} too_old={} keyword_filtered={} duplicate={} written={} failed={} failed_sources={}",
            self.fetched,
            self.too_old,
            self.keyword_filtered,
            self.duplicate,
            self.written,
            self.failed,
            self.failed_sources
        )
    }
}

/// Trim `text` and keep at most `max_chars` characters.
pub fn truncate_chars(text: &str, max_chars: usize) -> String {
    text.trim().chars().take(max_chars).collect()
}
