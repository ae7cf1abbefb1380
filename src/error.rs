use std::path::PathBuf;

use thiserror::Error;

/// Startup problems. These abort the run before any network activity.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    MissingEnv(&'static str),

    #[error("Invalid value for `{field}`: {reason}")]
    Invalid { field: &'static str, reason: String },

    #[error("Failed to read config file {}: {source}", .path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse config file {}: {source}", .path.display())]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_yaml::Error,
    },

    #[error("Keyword set could not be compiled: {0}")]
    BadKeyword(#[from] regex::Error),
}

/// A single feed source could not be retrieved or parsed.
#[derive(Debug, Error)]
pub enum FetchError {
    #[error("request to {url} failed: {source}")]
    Request {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("{url} responded with HTTP {status}")]
    Status { url: String, status: u16 },

    #[error("could not parse feed from {url}: {source}")]
    Parse {
        url: String,
        #[source]
        source: feed_rs::parser::ParseFeedError,
    },
}

/// A single item could not be created in the research library.
#[derive(Debug, Error)]
pub enum WriteError {
    #[error("HTTP request failed: {0}")]
    Network(#[source] reqwest::Error),

    #[error("Authentication failed (HTTP {status}): {message}")]
    Unauthorized { status: u16, message: String },

    #[error("Rejected by the API (HTTP {status}, {code}): {message}")]
    Rejected {
        status: u16,
        code: String,
        message: String,
    },

    #[error("Unreadable response from the API: {0}")]
    InvalidResponse(#[source] reqwest::Error),
}

#[derive(Debug, Error)]
pub enum DedupeError {
    #[error("URL already recorded as seen: {url}")]
    DuplicateKey { url: String },

    #[error("Dedupe store error: {0}")]
    Storage(#[from] sqlx::Error),

    #[error("Dedupe store I/O error: {0}")]
    Io(#[from] std::io::Error),
}
