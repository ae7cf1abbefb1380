use async_trait::async_trait;
use chrono::{DateTime, Utc};
use feed_rs::model::{Entry, Feed};
use feed_rs::parser;
use log::debug;
use reqwest::{Client, Url};

use crate::error::FetchError;
use crate::models::{truncate_chars, FeedItem};

const UNKNOWN_SOURCE: &str = "Unknown";

/// Produces the items of one configured feed source.
#[async_trait]
pub trait ReadFeed: Send + Sync {
    async fn read(&self, source: &str) -> Result<Vec<FeedItem>, FetchError>;
}

/// Fetches feeds over HTTP(S) and parses them with `feed-rs`.
pub struct FeedReader {
    client: Client,
    max_summary_chars: usize,
}

impl FeedReader {
    pub fn new(client: Client, max_summary_chars: usize) -> Self {
        Self {
            client,
            max_summary_chars,
        }
    }

    async fn fetch(&self, url: &str) -> Result<Vec<u8>, FetchError> {
        let request_error = |source| FetchError::Request {
            url: url.to_string(),
            source,
        };

        let response = self.client.get(url).send().await.map_err(request_error)?;
        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::Status {
                url: url.to_string(),
                status: status.as_u16(),
            });
        }

        let bytes = response.bytes().await.map_err(request_error)?;
        Ok(bytes.to_vec())
    }
}

#[async_trait]
impl ReadFeed for FeedReader {
    async fn read(&self, source: &str) -> Result<Vec<FeedItem>, FetchError> {
        let body = self.fetch(source).await?;
        let fetched_at = Utc::now();
        let items = parse_feed(&body, source, fetched_at, self.max_summary_chars)?;
        debug!("Parsed {} items from {}", items.len(), source);
        Ok(items)
    }
}

/// Parse a feed document into items, in document order.
///
/// Entries without a link are dropped. Entries with neither a published nor an
/// updated date are stamped with `fetched_at`.
pub fn parse_feed(
    body: &[u8],
    source: &str,
    fetched_at: DateTime<Utc>,
    max_summary_chars: usize,
) -> Result<Vec<FeedItem>, FetchError> {
    let feed = parser::parse(body).map_err(|source_err| FetchError::Parse {
        url: source.to_string(),
        source: source_err,
    })?;

    Ok(items_from_feed(feed, source, fetched_at, max_summary_chars))
}

fn items_from_feed(
    feed: Feed,
    source: &str,
    fetched_at: DateTime<Utc>,
    max_summary_chars: usize,
) -> Vec<FeedItem> {
    let source_title = feed
        .title
        .map(|t| t.content.trim().to_string())
        .filter(|t| !t.is_empty())
        .unwrap_or_else(|| UNKNOWN_SOURCE.to_string());

    feed.entries
        .into_iter()
        .filter_map(|entry| {
            let link = entry_link(&entry)?;
            let published_at = entry.published.or(entry.updated).unwrap_or(fetched_at);
            let title = entry
                .title
                .as_ref()
                .map(|t| t.content.trim().to_string())
                .unwrap_or_default();

            Some(FeedItem {
                url: canonicalize_url(&link),
                title,
                summary: truncate_chars(&entry_summary(&entry), max_summary_chars),
                published_at,
                source_feed: source.to_string(),
                source_title: source_title.clone(),
            })
        })
        .collect()
}

fn entry_link(entry: &Entry) -> Option<String> {
    entry
        .links
        .iter()
        .map(|link| link.href.trim())
        .find(|href| !href.is_empty())
        .map(str::to_string)
}

fn entry_summary(entry: &Entry) -> String {
    if let Some(summary) = &entry.summary {
        if !summary.content.trim().is_empty() {
            return summary.content.clone();
        }
    }

    entry
        .content
        .as_ref()
        .and_then(|c| c.body.clone())
        .unwrap_or_default()
}

/// Canonical identity form of a link: trimmed, without `#fragment`.
pub fn canonicalize_url(link: &str) -> String {
    let trimmed = link.trim();
    match Url::parse(trimmed) {
        Ok(mut url) => {
            url.set_fragment(None);
            url.to_string()
        }
        Err(_) => trimmed.to_string(),
    }
}
