use chrono::{DateTime, Utc};
use log::{debug, error, info, warn};

use crate::config::Config;
use crate::db::DedupeStore;
use crate::error::{ConfigError, DedupeError, WriteError};
use crate::feed::ReadFeed;
use crate::filter::{KeywordFilter, PublishedSince, RecencyWindow, Rule};
use crate::models::{FeedItem, RecordId, RunStats};
use crate::notion::ResearchLibrary;

/// Everything the driver needs to decide what to ingest. Built once at
/// startup and handed to [`Pipeline::new`].
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    pub feeds: Vec<String>,
    pub recency: RecencyWindow,
    pub keywords: KeywordFilter,
}

impl PipelineConfig {
    pub fn from_config(config: &Config) -> Result<Self, ConfigError> {
        Ok(Self {
            feeds: config
                .feeds
                .iter()
                .map(|f| f.trim().to_string())
                .filter(|f| !f.is_empty())
                .collect(),
            recency: RecencyWindow::days(config.recency_days).ok_or_else(|| {
                ConfigError::Invalid {
                    field: "recency_days",
                    reason: format!("{} days is out of range", config.recency_days),
                }
            })?,
            keywords: KeywordFilter::from_config(&config.keyword_filter)?,
        })
    }
}

/// What happened to one item.
#[derive(Debug)]
pub enum ItemOutcome {
    TooOld,
    KeywordMiss,
    Duplicate,
    Written(RecordId),
    WriteFailed(WriteError),
    StoreFailed(DedupeError),
}

impl RunStats {
    fn tally(&mut self, outcome: &ItemOutcome) {
        match outcome {
            ItemOutcome::TooOld => self.too_old += 1,
            ItemOutcome::KeywordMiss => self.keyword_filtered += 1,
            ItemOutcome::Duplicate => self.duplicate += 1,
            ItemOutcome::Written(_) => self.written += 1,
            ItemOutcome::WriteFailed(_) | ItemOutcome::StoreFailed(_) => self.failed += 1,
        }
    }
}

/// One linear pass: read, filter by age, filter by keyword, dedupe, write,
/// record. Sources and items are handled strictly in configured order.
pub struct Pipeline<R, W> {
    config: PipelineConfig,
    reader: R,
    library: W,
    store: DedupeStore,
}

impl<R: ReadFeed, W: ResearchLibrary> Pipeline<R, W> {
    pub fn new(config: PipelineConfig, reader: R, library: W, store: DedupeStore) -> Self {
        Self {
            config,
            reader,
            library,
            store,
        }
    }

    pub fn store(&self) -> &DedupeStore {
        &self.store
    }

    pub fn into_store(self) -> DedupeStore {
        self.store
    }

    pub async fn run(&self, now: DateTime<Utc>) -> RunStats {
        let recency = self.config.recency.at(now);
        let mut stats = RunStats::default();

        info!(
            "Ingesting {} feeds (keyword filter {})",
            self.config.feeds.len(),
            if self.config.keywords.is_enabled() { "on" } else { "off" }
        );

        for source in &self.config.feeds {
            let items = match self.reader.read(source).await {
                Ok(items) => items,
                Err(err) => {
                    warn!("Skipping feed {}: {}", source, err);
                    stats.failed_sources += 1;
                    continue;
                }
            };

            debug!("{}: {} items", source, items.len());
            stats.fetched += items.len();

            for item in &items {
                let outcome = self.process(item, &recency).await;
                log_outcome(item, &outcome);
                stats.tally(&outcome);
            }
        }

        info!("Ingest complete. {}", stats);
        stats
    }

    async fn process(&self, item: &FeedItem, recency: &PublishedSince) -> ItemOutcome {
        if !recency.evaluate(item) {
            return ItemOutcome::TooOld;
        }
        if !self.config.keywords.evaluate(item) {
            return ItemOutcome::KeywordMiss;
        }

        match self.store.has(&item.url).await {
            Ok(true) => return ItemOutcome::Duplicate,
            Ok(false) => {}
            Err(err) => return ItemOutcome::StoreFailed(err),
        }

        // Only a confirmed write is recorded; anything else is retried next run.
        let id = match self.library.write(item).await {
            Ok(id) => id,
            Err(err) => return ItemOutcome::WriteFailed(err),
        };

        match self.store.record(&item.url, Utc::now()).await {
            Ok(()) => {}
            Err(DedupeError::DuplicateKey { url }) => {
                warn!("Dedupe record for {} already existed after write", url);
            }
            Err(err) => {
                error!("Written {} but could not record it as seen: {}", item.url, err);
            }
        }

        ItemOutcome::Written(id)
    }
}

fn log_outcome(item: &FeedItem, outcome: &ItemOutcome) {
    match outcome {
        ItemOutcome::TooOld => debug!("Too old: {}", item.url),
        ItemOutcome::KeywordMiss => debug!("No keyword match: {}", item.url),
        ItemOutcome::Duplicate => debug!("Already ingested: {}", item.url),
        ItemOutcome::Written(id) => info!("Ingested {} ({})", item.url, id),
        ItemOutcome::WriteFailed(err) => error!("Research library write failed for {}: {}", item.url, err),
        ItemOutcome::StoreFailed(err) => error!("Dedupe lookup failed for {}: {}", item.url, err),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::FetchError;
    use async_trait::async_trait;
    use chrono::Duration;
    use std::collections::{HashMap, HashSet};
    use std::sync::Mutex;
    use tempfile::TempDir;

    const GOOD: &str = "https://feeds.example.com/good.xml";
    const BROKEN: &str = "https://feeds.example.com/broken.xml";

    struct StaticReader {
        feeds: HashMap<String, Vec<FeedItem>>,
    }

    #[async_trait]
    impl ReadFeed for StaticReader {
        async fn read(&self, source: &str) -> Result<Vec<FeedItem>, FetchError> {
            match self.feeds.get(source) {
                Some(items) => Ok(items.clone()),
                None => Err(FetchError::Status {
                    url: source.to_string(),
                    status: 500,
                }),
            }
        }
    }

    #[derive(Default)]
    struct FakeLibrary {
        written: Mutex<Vec<String>>,
        failing: Mutex<HashSet<String>>,
    }

    impl FakeLibrary {
        fn fail_on(&self, url: &str) {
            self.failing.lock().unwrap().insert(url.to_string());
        }

        fn recover(&self) {
            self.failing.lock().unwrap().clear();
        }

        fn written(&self) -> Vec<String> {
            self.written.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl ResearchLibrary for FakeLibrary {
        async fn write(&self, item: &FeedItem) -> Result<RecordId, WriteError> {
            if self.failing.lock().unwrap().contains(&item.url) {
                return Err(WriteError::Rejected {
                    status: 400,
                    code: "validation_error".to_string(),
                    message: "rejected".to_string(),
                });
            }
            let mut written = self.written.lock().unwrap();
            written.push(item.url.clone());
            Ok(RecordId(format!("page-{}", written.len())))
        }
    }

    fn item(url: &str, title: &str, age_days: i64, now: DateTime<Utc>) -> FeedItem {
        FeedItem {
            url: url.to_string(),
            title: title.to_string(),
            summary: String::new(),
            published_at: now - Duration::days(age_days),
            source_feed: GOOD.to_string(),
            source_title: "Good Feed".to_string(),
        }
    }

    fn config(feeds: &[&str], keywords: KeywordFilter) -> PipelineConfig {
        PipelineConfig {
            feeds: feeds.iter().map(|f| f.to_string()).collect(),
            recency: RecencyWindow::days(7).unwrap(),
            keywords,
        }
    }

    async fn pipeline(
        dir: &TempDir,
        config: PipelineConfig,
        feeds: HashMap<String, Vec<FeedItem>>,
    ) -> Pipeline<StaticReader, FakeLibrary> {
        let store = DedupeStore::open(&dir.path().join("seen.db")).await.unwrap();
        Pipeline::new(config, StaticReader { feeds }, FakeLibrary::default(), store)
    }

    #[tokio::test]
    async fn counts_every_kind_of_outcome() {
        let dir = tempfile::tempdir().unwrap();
        let now = Utc::now();
        let items = vec![
            item("https://example.com/ai", "New AI tooling for ops teams", 1, now),
            item("https://example.com/old-ai", "AI retrospective", 10, now),
            item("https://example.com/earnings", "Quarterly earnings report", 1, now),
            item("https://example.com/automation", "Workflow automation", 2, now),
            item("https://example.com/ai", "New AI tooling, retitled", 1, now),
            item("https://example.com/bad", "AI post the API rejects", 1, now),
        ];
        let keywords = KeywordFilter::new(true, &["AI", "automation"]).unwrap();
        let pipeline = pipeline(&dir, config(&[GOOD], keywords), HashMap::from([(GOOD.to_string(), items)])).await;
        pipeline.library.fail_on("https://example.com/bad");

        let stats = pipeline.run(now).await;

        assert_eq!(
            stats,
            RunStats {
                fetched: 6,
                too_old: 1,
                keyword_filtered: 1,
                duplicate: 1,
                written: 2,
                failed: 1,
                failed_sources: 0,
            }
        );
        assert_eq!(
            pipeline.library.written(),
            vec!["https://example.com/ai", "https://example.com/automation"]
        );
        assert!(!pipeline.store().has("https://example.com/bad").await.unwrap());
        assert!(!pipeline.store().has("https://example.com/earnings").await.unwrap());
    }

    #[tokio::test]
    async fn rerun_writes_nothing_twice() {
        let dir = tempfile::tempdir().unwrap();
        let now = Utc::now();
        let items = vec![
            item("https://example.com/1", "one", 1, now),
            item("https://example.com/2", "two", 2, now),
        ];
        let pipeline = pipeline(
            &dir,
            config(&[GOOD], KeywordFilter::Disabled),
            HashMap::from([(GOOD.to_string(), items)]),
        )
        .await;

        let first = pipeline.run(now).await;
        let second = pipeline.run(now).await;

        assert_eq!(first.written, 2);
        assert_eq!(second.written, 0);
        assert_eq!(second.duplicate, 2);
        assert_eq!(pipeline.library.written().len(), 2);
    }

    #[tokio::test]
    async fn dedupe_survives_a_new_process() {
        let dir = tempfile::tempdir().unwrap();
        let now = Utc::now();
        let feeds = HashMap::from([(GOOD.to_string(), vec![item("https://example.com/1", "one", 1, now)])]);

        let first = pipeline(&dir, config(&[GOOD], KeywordFilter::Disabled), feeds.clone()).await;
        assert_eq!(first.run(now).await.written, 1);
        first.into_store().close().await;

        let second = pipeline(&dir, config(&[GOOD], KeywordFilter::Disabled), feeds).await;
        let stats = second.run(now).await;
        assert_eq!(stats.duplicate, 1);
        assert!(second.library.written().is_empty());
    }

    #[tokio::test]
    async fn failed_write_is_retried_next_run() {
        let dir = tempfile::tempdir().unwrap();
        let now = Utc::now();
        let items = vec![item("https://example.com/flaky", "flaky", 1, now)];
        let pipeline = pipeline(
            &dir,
            config(&[GOOD], KeywordFilter::Disabled),
            HashMap::from([(GOOD.to_string(), items)]),
        )
        .await;

        pipeline.library.fail_on("https://example.com/flaky");
        let first = pipeline.run(now).await;
        assert_eq!(first.failed, 1);
        assert_eq!(first.duplicate, 0);

        pipeline.library.recover();
        let second = pipeline.run(now).await;
        assert_eq!(second.written, 1);
        assert_eq!(second.duplicate, 0);
        assert_eq!(pipeline.library.written(), vec!["https://example.com/flaky"]);
    }

    #[tokio::test]
    async fn broken_source_does_not_stop_the_next_one() {
        let dir = tempfile::tempdir().unwrap();
        let now = Utc::now();
        let items = vec![item("https://example.com/1", "one", 1, now)];
        let pipeline = pipeline(
            &dir,
            config(&[BROKEN, GOOD], KeywordFilter::Disabled),
            HashMap::from([(GOOD.to_string(), items)]),
        )
        .await;

        let stats = pipeline.run(now).await;

        assert_eq!(stats.failed_sources, 1);
        assert_eq!(stats.fetched, 1);
        assert_eq!(stats.written, 1);
    }

    #[tokio::test]
    async fn malformed_feed_over_http_is_skipped() {
        let mut server = mockito::Server::new_async().await;
        let now = Utc::now();
        let fresh = format!(
            r#"<?xml version="1.0"?>
<rss version="2.0"><channel><title>Fresh</title>
<item><title>Platform engineering notes</title><link>https://example.com/fresh</link>
<pubDate>{}</pubDate></item>
</channel></rss>"#,
            (now - Duration::days(1)).to_rfc2822()
        );
        let _broken = server
            .mock("GET", "/broken.xml")
            .with_status(200)
            .with_body("<html><body>maintenance</body></html>")
            .create_async()
            .await;
        let _good = server
            .mock("GET", "/good.xml")
            .with_status(200)
            .with_body(fresh)
            .create_async()
            .await;

        let dir = tempfile::tempdir().unwrap();
        let store = DedupeStore::open(&dir.path().join("seen.db")).await.unwrap();
        let broken = format!("{}/broken.xml", server.url());
        let good = format!("{}/good.xml", server.url());
        let pipeline = Pipeline::new(
            config(&[broken.as_str(), good.as_str()], KeywordFilter::Disabled),
            crate::feed::FeedReader::new(reqwest::Client::new(), 4000),
            FakeLibrary::default(),
            store,
        );

        let stats = pipeline.run(now).await;

        assert_eq!(stats.failed_sources, 1);
        assert_eq!(stats.fetched, 1);
        assert_eq!(pipeline.library.written(), vec!["https://example.com/fresh"]);
    }

    #[tokio::test]
    async fn empty_keyword_set_writes_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let now = Utc::now();
        let items = vec![item("https://example.com/1", "New AI tooling", 1, now)];
        let keywords = KeywordFilter::new(true, Vec::<String>::new()).unwrap();
        let pipeline = pipeline(&dir, config(&[GOOD], keywords), HashMap::from([(GOOD.to_string(), items)])).await;

        let stats = pipeline.run(now).await;

        assert_eq!(stats.keyword_filtered, 1);
        assert_eq!(stats.written, 0);
    }

    /// Writes succeed, but another handle on the same store file records the
    /// URL first, as an overlapping run would.
    struct RacingLibrary {
        rival: DedupeStore,
        written: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl ResearchLibrary for RacingLibrary {
        async fn write(&self, item: &FeedItem) -> Result<RecordId, WriteError> {
            self.rival.record(&item.url, Utc::now()).await.unwrap();
            self.written.lock().unwrap().push(item.url.clone());
            Ok(RecordId("page-raced".to_string()))
        }
    }

    #[tokio::test]
    async fn duplicate_record_after_write_still_counts_as_written() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("seen.db");
        let now = Utc::now();
        let items = vec![item("https://example.com/raced", "raced", 1, now)];

        let store = DedupeStore::open(&path).await.unwrap();
        let library = RacingLibrary {
            rival: DedupeStore::open(&path).await.unwrap(),
            written: Mutex::new(Vec::new()),
        };
        let pipeline = Pipeline::new(
            config(&[GOOD], KeywordFilter::Disabled),
            StaticReader {
                feeds: HashMap::from([(GOOD.to_string(), items)]),
            },
            library,
            store,
        );

        let stats = pipeline.run(now).await;

        assert_eq!(stats.written, 1);
        assert_eq!(stats.failed, 0);
        assert_eq!(pipeline.library.written.lock().unwrap().len(), 1);
        assert!(pipeline.store().has("https://example.com/raced").await.unwrap());
        assert_eq!(pipeline.store().count().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn unreadable_store_fails_the_item_without_writing() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("seen.db");
        let now = Utc::now();
        let items = vec![item("https://example.com/1", "one", 1, now)];
        let pipeline = pipeline(
            &dir,
            config(&[GOOD], KeywordFilter::Disabled),
            HashMap::from([(GOOD.to_string(), items)]),
        )
        .await;

        let other = sqlx::SqlitePool::connect(&format!("sqlite:{}", path.display()))
            .await
            .unwrap();
        sqlx::query("DROP TABLE seen_urls").execute(&other).await.unwrap();
        other.close().await;

        let stats = pipeline.run(now).await;

        assert_eq!(stats.failed, 1);
        assert_eq!(stats.written, 0);
        assert!(pipeline.library.written().is_empty());
    }

    #[test]
    fn config_is_built_from_static_settings() {
        let config = Config {
            feeds: vec![" https://a.example/feed ".to_string(), "".to_string()],
            ..Config::default()
        };

        let pipeline_config = PipelineConfig::from_config(&config).unwrap();

        assert_eq!(pipeline_config.feeds, vec!["https://a.example/feed"]);
        assert!(pipeline_config.keywords.is_enabled());
    }
}
