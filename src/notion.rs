use anyhow::Context;
use async_trait::async_trait;
use log::debug;
use reqwest::{Client, RequestBuilder, Response, StatusCode};
use serde::Deserialize;
use serde_json::{json, Value};

use crate::config::NotionSettings;
use crate::error::WriteError;
use crate::models::{truncate_chars, FeedItem, RecordId};

pub const NOTION_VERSION: &str = "2022-06-28";

const MAX_TEXT_CHARS: usize = 2000;
const MAX_SELECT_CHARS: usize = 100;

/// Destination for items that survived filtering and dedupe.
#[async_trait]
pub trait ResearchLibrary: Send + Sync {
    async fn write(&self, item: &FeedItem) -> Result<RecordId, WriteError>;
}

/// Client for the Notion pages/databases API.
pub struct NotionClient {
    client: Client,
    api_base: String,
    settings: NotionSettings,
}

#[derive(Debug, Deserialize)]
struct CreatedPage {
    id: String,
}

#[derive(Debug, Deserialize)]
struct ApiErrorBody {
    #[serde(default)]
    code: String,
    #[serde(default)]
    message: String,
}

#[derive(Debug, Deserialize)]
struct DatabaseInfo {
    #[serde(default)]
    title: Vec<RichText>,
}

#[derive(Debug, Deserialize)]
struct RichText {
    #[serde(default)]
    plain_text: String,
}

impl NotionClient {
    pub fn new(client: Client, api_base: &str, settings: NotionSettings) -> Self {
        Self {
            client,
            api_base: api_base.trim_end_matches('/').to_string(),
            settings,
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}/v1{}", self.api_base, path)
    }

    fn authorized(&self, request: RequestBuilder) -> RequestBuilder {
        request
            .bearer_auth(&self.settings.token)
            .header("Notion-Version", NOTION_VERSION)
    }

    /// Title of the research library database. Used as a connectivity check.
    pub async fn research_database_title(&self) -> anyhow::Result<String> {
        let url = self.url(&format!("/databases/{}", self.settings.research_db_id));
        let response = self
            .authorized(self.client.get(&url))
            .send()
            .await
            .map_err(WriteError::Network)
            .context("Failed to reach the research library")?;

        let response = check_status(response)
            .await
            .context("Research library lookup failed")?;
        let info: DatabaseInfo = response
            .json()
            .await
            .context("Unexpected database response")?;

        Ok(info
            .title
            .iter()
            .map(|t| t.plain_text.as_str())
            .collect::<String>())
    }
}

#[async_trait]
impl ResearchLibrary for NotionClient {
    async fn write(&self, item: &FeedItem) -> Result<RecordId, WriteError> {
        let body = json!({
            "parent": { "database_id": self.settings.research_db_id },
            "properties": research_properties(item),
        });

        let response = self
            .authorized(self.client.post(self.url("/pages")))
            .json(&body)
            .send()
            .await
            .map_err(WriteError::Network)?;

        let response = check_status(response).await?;
        let page: CreatedPage = response.json().await.map_err(WriteError::InvalidResponse)?;
        debug!("Created research page {} for {}", page.id, item.url);

        Ok(RecordId(page.id))
    }
}

async fn check_status(response: Response) -> Result<Response, WriteError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let text = response.text().await.unwrap_or_default();
    let body: Option<ApiErrorBody> = serde_json::from_str(&text).ok();
    let (code, message) = match body {
        Some(body) => (body.code, body.message),
        None => (String::new(), text),
    };

    if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
        return Err(WriteError::Unauthorized {
            status: status.as_u16(),
            message,
        });
    }

    Err(WriteError::Rejected {
        status: status.as_u16(),
        code,
        message,
    })
}

/// Property payload for one research library row.
pub fn research_properties(item: &FeedItem) -> Value {
    let title = if item.title.trim().is_empty() {
        &item.url
    } else {
        &item.title
    };

    let mut properties = json!({
        "Title": { "title": [{ "text": { "content": truncate_chars(title, MAX_TEXT_CHARS) } }] },
        "URL": { "url": item.url },
        "Source": { "select": { "name": select_name(&item.source_title) } },
        "Published Date": { "date": { "start": item.published_at.to_rfc3339() } },
        "Processed": { "checkbox": false },
        "Use in Draft": { "checkbox": false },
    });

    if !item.summary.trim().is_empty() {
        properties["Summary"] = json!({
            "rich_text": [{ "text": { "content": truncate_chars(&item.summary, MAX_TEXT_CHARS) } }]
        });
    }

    properties
}

// Select option names may not contain commas.
fn select_name(source: &str) -> String {
    let name = truncate_chars(&source.replace(',', ""), MAX_SELECT_CHARS);
    if name.is_empty() {
        "Unknown".to_string()
    } else {
        name
    }
}
