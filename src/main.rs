use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result};
use chrono::Utc;
use clap::Parser;
use log::{info, warn, LevelFilter};
use reqwest::Client;

mod config;
mod db;
mod error;
mod feed;
mod filter;
mod logger;
mod models;
mod notion;
mod pipeline;

use config::{Config, NotionSettings};
use db::DedupeStore;
use feed::FeedReader;
use notion::NotionClient;
use pipeline::{Pipeline, PipelineConfig};

const USER_AGENT: &str = concat!("rss-curator/", env!("CARGO_PKG_VERSION"));

/// Ingest recent RSS items into the research library.
///
/// With no flags, runs one ingest pass: fetch every configured feed, keep
/// recent items that match the keywords and were not ingested before, and
/// create a research library row for each.
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// YAML config file [default: curator.yaml if present]
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Check that the research library database is reachable, then exit
    #[arg(long, conflicts_with = "list")]
    validate: bool,

    /// Print the URLs already ingested, then exit
    #[arg(short, long)]
    list: bool,

    /// Number of entries shown by --list
    #[arg(long, default_value_t = 50)]
    limit: u32,

    /// Console log level (off, error, warn, info, debug, trace)
    #[arg(long, default_value = "info")]
    log_level: String,

    /// Also log to this file, at debug level
    #[arg(long)]
    log_file: Option<PathBuf>,
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    let args = Args::parse();

    logger::init(logger::LogConfig {
        console_level: logger::parse_log_level(&args.log_level),
        file_level: LevelFilter::Debug,
        log_file: args.log_file.clone(),
    })?;

    let config = Config::load(args.config.as_deref())?;

    if args.list {
        return list_seen(&config, args.limit).await;
    }

    let settings = NotionSettings::from_env()?;
    let pipeline_config = PipelineConfig::from_config(&config)?;

    let client = Client::builder()
        .timeout(Duration::from_secs(config.request_timeout_secs))
        .user_agent(USER_AGENT)
        .build()
        .context("Failed to build HTTP client")?;
    let library = NotionClient::new(client.clone(), &config.notion_api_base, settings);

    if args.validate {
        let title = library.research_database_title().await?;
        let title = if title.is_empty() { "(no title)".to_string() } else { title };
        info!("Research library reachable: {}", title);
        return Ok(());
    }

    let store = DedupeStore::open(&config.dedupe_db_path)
        .await
        .with_context(|| format!("Failed to open dedupe store {}", config.dedupe_db_path.display()))?;
    let reader = FeedReader::new(client, config.max_match_text_chars);

    let pipeline = Pipeline::new(pipeline_config, reader, library, store);
    pipeline.run(Utc::now()).await;

    report_store_size(pipeline.store()).await;
    pipeline.into_store().close().await;

    Ok(())
}

async fn report_store_size(store: &DedupeStore) -> Option<i64> {
    match store.count().await {
        Ok(total) => {
            info!("Dedupe store holds {} URLs", total);
            Some(total)
        }
        Err(err) => {
            warn!("Could not count dedupe records: {}", err);
            None
        }
    }
}

async fn list_seen(config: &Config, limit: u32) -> Result<()> {
    let store = DedupeStore::open(&config.dedupe_db_path).await?;
    let records = store.recent(limit).await?;
    let total = store.count().await?;

    println!("Seen URLs ({} of {}):", records.len(), total);
    for record in records {
        println!("{}  {}", record.seen_at.format("%Y-%m-%d %H:%M:%S"), record.url);
    }

    store.close().await;
    Ok(())
}
