use chrono::{DateTime, Duration, Utc};
use regex::{Regex, RegexBuilder};

use crate::config::KeywordFilterConfig;
use crate::error::ConfigError;
use crate::models::FeedItem;

/// A yes/no predicate applied to each item of a run.
pub trait Rule {
    fn evaluate(&self, item: &FeedItem) -> bool;
}

/// Maximum item age, relative to the time a run starts.
#[derive(Debug, Clone, Copy)]
pub struct RecencyWindow {
    max_age: Duration,
}

impl RecencyWindow {
    /// `None` when `days` does not fit in a duration.
    pub fn days(days: i64) -> Option<Self> {
        Duration::try_days(days).map(|max_age| Self { max_age })
    }

    /// Fix the window's lower bound for a run starting at `now`.
    /// A window reaching past the earliest representable time accepts everything.
    pub fn at(&self, now: DateTime<Utc>) -> PublishedSince {
        PublishedSince {
            cutoff: now
                .checked_sub_signed(self.max_age)
                .unwrap_or(DateTime::<Utc>::MIN_UTC),
        }
    }
}

/// Accepts items published at or after `cutoff`.
#[derive(Debug, Clone, Copy)]
pub struct PublishedSince {
    cutoff: DateTime<Utc>,
}

impl PublishedSince {
    pub fn includes(&self, published_at: Option<DateTime<Utc>>) -> bool {
        match published_at {
            // No publish date means we cannot place it in the window
            None => false,
            Some(published) => published >= self.cutoff,
        }
    }
}

impl Rule for PublishedSince {
    fn evaluate(&self, item: &FeedItem) -> bool {
        self.includes(Some(item.published_at))
    }
}

/// Case-insensitive substring match over title and summary.
#[derive(Debug, Clone)]
pub enum KeywordFilter {
    Disabled,
    /// `None` when the keyword set is empty: nothing can match.
    Enabled(Option<Regex>),
}

impl KeywordFilter {
    pub fn new<I, S>(enabled: bool, keywords: I) -> Result<Self, ConfigError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        if !enabled {
            return Ok(Self::Disabled);
        }

        let alternatives: Vec<String> = keywords
            .into_iter()
            .filter_map(|k| {
                // Surrounding spaces are part of the keyword
                let k = k.as_ref();
                (!k.is_empty()).then(|| regex::escape(k))
            })
            .collect();

        if alternatives.is_empty() {
            return Ok(Self::Enabled(None));
        }

        let regex = RegexBuilder::new(&alternatives.join("|"))
            .case_insensitive(true)
            .build()?;
        Ok(Self::Enabled(Some(regex)))
    }

    pub fn from_config(config: &KeywordFilterConfig) -> Result<Self, ConfigError> {
        Self::new(config.enabled, &config.keywords)
    }

    pub fn is_enabled(&self) -> bool {
        matches!(self, Self::Enabled(_))
    }
}

impl Rule for KeywordFilter {
    fn evaluate(&self, item: &FeedItem) -> bool {
        match self {
            KeywordFilter::Disabled => true,
            KeywordFilter::Enabled(None) => false,
            KeywordFilter::Enabled(Some(regex)) => {
                regex.is_match(&item.title) || regex.is_match(&item.summary)
            }
        }
    }
}
