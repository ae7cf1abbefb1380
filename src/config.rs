use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};

use chrono::{Duration, Utc};
use log::info;
use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

pub const DEFAULT_CONFIG_PATH: &str = "curator.yaml";

const DEFAULT_FEEDS: &[&str] = &[
    // Operating model and governance
    "https://hbr.org/feed",
    "https://sloanreview.mit.edu/feed/",
    "https://www.mckinsey.com/featured-insights/rss",
    "https://www.bcg.com/publications/rss",
    "https://www.bain.com/insights/rss/",
    "https://knowledge.wharton.upenn.edu/feed/",
    // Transformation and operational excellence
    "https://www.processexcellencenetwork.com/rss",
    "https://insights.btoes.com/rss.xml",
    "https://www.strategy-business.com/rss",
    "https://www.gartner.com/smarterwithgartner/rss.xml",
    // Platform and engineering modernization
    "https://www.infoq.com/feed/",
    "https://www.thoughtworks.com/rss/insights.xml",
    "https://www.cncf.io/feed/",
    "https://www.atlassian.com/blog/feed",
    // AI strategy and cloud
    "https://cloud.google.com/blog/rss",
    "https://aws.amazon.com/blogs/architecture/feed/",
    "https://www.microsoft.com/en-us/worklab/feed",
    // Organizational design
    "https://fs.blog/feed/",
    "https://martinfowler.com/feed.atom",
];

const DEFAULT_KEYWORDS: &[&str] = &[
    "operating model",
    "operational modernization",
    "modernization",
    "transformation",
    "ai transformation",
    "portfolio",
    "portfolio governance",
    "governance",
    "execution systems",
    "workflow",
    "automation",
    "agentic",
    "platform engineering",
    "coordination debt",
    "decision velocity",
    "signal",
];

/// Static configuration, read from YAML.
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct Config {
    #[serde(default = "default_feeds")]
    pub feeds: Vec<String>,
    #[serde(default = "default_recency_days")]
    pub recency_days: i64,
    #[serde(default)]
    pub keyword_filter: KeywordFilterConfig,
    #[serde(default = "default_dedupe_db_path")]
    pub dedupe_db_path: PathBuf,
    /// Summary text is capped at this many characters (feeds can be noisy).
    #[serde(default = "default_max_match_text_chars")]
    pub max_match_text_chars: usize,
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
    #[serde(default = "default_notion_api_base")]
    pub notion_api_base: String,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct KeywordFilterConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default = "default_keywords")]
    pub keywords: Vec<String>,
}

impl Default for KeywordFilterConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            keywords: default_keywords(),
        }
    }
}

fn default_feeds() -> Vec<String> {
    DEFAULT_FEEDS.iter().map(|s| s.to_string()).collect()
}
fn default_keywords() -> Vec<String> {
    DEFAULT_KEYWORDS.iter().map(|s| s.to_string()).collect()
}
fn default_recency_days() -> i64 {
    14
}
fn default_true() -> bool {
    true
}
fn default_dedupe_db_path() -> PathBuf {
    PathBuf::from("rss_seen.db")
}
fn default_max_match_text_chars() -> usize {
    4000
}
fn default_request_timeout_secs() -> u64 {
    30
}
fn default_notion_api_base() -> String {
    "https://api.notion.com".to_string()
}

impl Default for Config {
    fn default() -> Self {
        Self {
            feeds: default_feeds(),
            recency_days: default_recency_days(),
            keyword_filter: KeywordFilterConfig::default(),
            dedupe_db_path: default_dedupe_db_path(),
            max_match_text_chars: default_max_match_text_chars(),
            request_timeout_secs: default_request_timeout_secs(),
            notion_api_base: default_notion_api_base(),
        }
    }
}

impl Config {
    /// Load configuration.
    ///
    /// With an explicit path the file must exist. Without one, `curator.yaml`
    /// is read when present and the built-in defaults are used otherwise.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let config = match path {
            Some(path) => Self::from_yaml_file(path)?,
            None if Path::new(DEFAULT_CONFIG_PATH).exists() => {
                Self::from_yaml_file(Path::new(DEFAULT_CONFIG_PATH))?
            }
            None => {
                info!("No {} found, using built-in defaults", DEFAULT_CONFIG_PATH);
                Self::default()
            }
        };
        config.validate()?;
        Ok(config)
    }

    fn from_yaml_file(path: &Path) -> Result<Self, ConfigError> {
        info!("Loading configuration from {}", path.display());
        let contents = fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        serde_yaml::from_str(&contents).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.feeds.iter().all(|f| f.trim().is_empty()) {
            return Err(ConfigError::Invalid {
                field: "feeds",
                reason: "at least one feed URL is required".to_string(),
            });
        }
        if self.recency_days <= 0 {
            return Err(ConfigError::Invalid {
                field: "recency_days",
                reason: format!("must be positive, got {}", self.recency_days),
            });
        }
        let reachable = Duration::try_days(self.recency_days)
            .and_then(|age| Utc::now().checked_sub_signed(age))
            .is_some();
        if !reachable {
            return Err(ConfigError::Invalid {
                field: "recency_days",
                reason: format!(
                    "{} days reaches past the earliest representable date",
                    self.recency_days
                ),
            });
        }
        if self.max_match_text_chars == 0 {
            return Err(ConfigError::Invalid {
                field: "max_match_text_chars",
                reason: "must be positive".to_string(),
            });
        }
        if self.request_timeout_secs == 0 {
            return Err(ConfigError::Invalid {
                field: "request_timeout_secs",
                reason: "must be positive".to_string(),
            });
        }
        Ok(())
    }
}

pub const NOTION_TOKEN: &str = "NOTION_TOKEN";
pub const NOTION_RESEARCH_DB_ID: &str = "NOTION_RESEARCH_DB_ID";
pub const NOTION_QUEUE_DB_ID: &str = "NOTION_QUEUE_DB_ID";

/// Credentials and table identifiers, only ever taken from the environment.
#[derive(Clone)]
pub struct NotionSettings {
    pub token: String,
    pub research_db_id: String,
    /// Draft queue table. Required, but nothing in the ingest pass writes to it.
    pub queue_db_id: String,
}

impl NotionSettings {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let required = |name: &'static str| {
            lookup(name)
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
                .ok_or(ConfigError::MissingEnv(name))
        };

        Ok(Self {
            token: required(NOTION_TOKEN)?,
            research_db_id: required(NOTION_RESEARCH_DB_ID)?,
            queue_db_id: required(NOTION_QUEUE_DB_ID)?,
        })
    }
}

impl fmt::Debug for NotionSettings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NotionSettings")
            .field("token", &"<redacted>")
            .field("research_db_id", &self.research_db_id)
            .field("queue_db_id", &self.queue_db_id)
            .finish()
    }
}
