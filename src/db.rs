use std::path::Path;

use chrono::{DateTime, Utc};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};
use sqlx::Row;

use crate::error::DedupeError;
use crate::models::DedupeRecord;

/// Durable set of URLs that have already been written to the research library.
///
/// Membership only grows: there is no update, delete or expiry. A single
/// pipeline instance is assumed to own the file at a time.
pub struct DedupeStore {
    pool: SqlitePool,
}

impl DedupeStore {
    pub async fn open(path: &Path) -> Result<Self, DedupeError> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }

        let options = SqliteConnectOptions::new()
            .filename(path)
            .create_if_missing(true);

        // One connection: there is never more than one writer.
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect_with(options)
            .await?;

        let store = Self { pool };
        store.init().await?;
        Ok(store)
    }

    async fn init(&self) -> Result<(), DedupeError> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS seen_urls (
                url TEXT PRIMARY KEY,
                first_seen_utc TEXT NOT NULL
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    pub async fn has(&self, url: &str) -> Result<bool, DedupeError> {
        let row = sqlx::query("SELECT 1 FROM seen_urls WHERE url = ?")
            .bind(url)
            .fetch_optional(&self.pool)
            .await?;

        Ok(row.is_some())
    }

    /// Insert a record. Never overwrites: a second call for the same URL
    /// fails with [`DedupeError::DuplicateKey`].
    pub async fn record(&self, url: &str, seen_at: DateTime<Utc>) -> Result<(), DedupeError> {
        sqlx::query(
            r#"
            INSERT INTO seen_urls (url, first_seen_utc)
            VALUES (?, ?)
            "#,
        )
        .bind(url)
        .bind(seen_at)
        .execute(&self.pool)
        .await
        .map_err(|err| match err {
            sqlx::Error::Database(db_err) if db_err.is_unique_violation() => {
                DedupeError::DuplicateKey {
                    url: url.to_string(),
                }
            }
            other => DedupeError::Storage(other),
        })?;

        Ok(())
    }

    /// Most recently seen first.
    pub async fn recent(&self, limit: u32) -> Result<Vec<DedupeRecord>, DedupeError> {
        let rows = sqlx::query(
            r#"
            SELECT url, first_seen_utc FROM seen_urls
            ORDER BY first_seen_utc DESC
            LIMIT ?
            "#,
        )
        .bind(i64::from(limit))
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter()
            .map(|row| -> Result<DedupeRecord, DedupeError> {
                Ok(DedupeRecord {
                    url: row.try_get("url")?,
                    seen_at: row.try_get("first_seen_utc")?,
                })
            })
            .collect()
    }

    pub async fn count(&self) -> Result<i64, DedupeError> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM seen_urls")
            .fetch_one(&self.pool)
            .await?;
        Ok(count)
    }

    pub async fn close(self) {
        self.pool.close().await;
    }
}
