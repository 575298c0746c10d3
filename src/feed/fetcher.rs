use std::time::Duration;

use futures::StreamExt;
use serde::Serialize;
use thiserror::Error;
use tokio::task::JoinHandle;

use super::normalize::{normalize, ItemError};
use super::parser::{parse_feed, RawItem};
use crate::storage::Database;
use crate::util::strip_control_chars;

const FETCH_TIMEOUT: Duration = Duration::from_secs(10);
const MAX_FEED_SIZE: usize = 10 * 1024 * 1024; // 10MB

/// Errors that abort a whole feed fetch.
///
/// The `Display` form is what gets written into the feed's `last_error`.
#[derive(Debug, Error)]
pub enum FetchError {
    /// Network-level error (DNS, connection, TLS, etc.)
    #[error("Request failed: {0}")]
    Network(#[from] reqwest::Error),
    /// HTTP response with non-2xx status code
    #[error("HTTP error: status {0}")]
    HttpStatus(u16),
    /// Request exceeded the 10-second timeout
    #[error("Request timed out")]
    Timeout,
    /// Body could not be parsed as RSS, Atom or JSON Feed
    #[error("Parse error: {0}")]
    Parse(String),
    /// Response body exceeded the 10MB size limit
    #[error("Response too large")]
    ResponseTooLarge,
}

/// Outcome of one successful fetch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FetchSummary {
    pub feed_id: i64,
    /// Title reported by the feed document (may be empty).
    pub title: String,
    /// Entries present in the document.
    pub items_seen: usize,
    /// Entries that were new and got stored.
    pub inserted: usize,
    /// Entries dropped as invalid or failed to store.
    pub skipped: usize,
}

/// Fetch one feed, store its new entries and record the outcome on the feed.
///
/// Already-stored entries are skipped silently. On failure the error message
/// is written to the feed's `last_error` and `last_fetched` is left alone;
/// nothing is retried here.
///
/// # Errors
///
/// - [`FetchError::Network`] - Connection or TLS errors
/// - [`FetchError::Timeout`] - Request exceeded 10 seconds
/// - [`FetchError::HttpStatus`] - Non-2xx HTTP response
/// - [`FetchError::ResponseTooLarge`] - Response exceeded 10MB
/// - [`FetchError::Parse`] - Not a recognizable feed
pub async fn fetch_now(
    db: &Database,
    client: &reqwest::Client,
    feed_id: i64,
    feed_url: &str,
) -> Result<FetchSummary, FetchError> {
    match fetch_and_store(db, client, feed_id, feed_url).await {
        Ok(summary) => {
            let now = chrono::Utc::now().timestamp();
            if let Err(e) = db.set_fetch_result(feed_id, Some(now), None).await {
                tracing::warn!(feed_id = feed_id, error = %e, "Failed to record fetch time");
            }
            tracing::info!(
                feed_id = feed_id,
                title = %summary.title,
                items = summary.items_seen,
                inserted = summary.inserted,
                skipped = summary.skipped,
                "Fetched feed"
            );
            Ok(summary)
        }
        Err(e) => {
            let message = e.to_string();
            if let Err(db_err) = db.set_fetch_result(feed_id, None, Some(&message)).await {
                tracing::warn!(feed_id = feed_id, error = %db_err, "Failed to record fetch error");
            }
            tracing::warn!(feed_id = feed_id, url = %feed_url, error = %message, "Feed fetch failed");
            Err(e)
        }
    }
}

/// Run [`fetch_now`] in its own task.
///
/// The task owns its failure: the error is already recorded on the feed and
/// logged by the time the handle resolves.
pub fn spawn_fetch(
    db: Database,
    client: reqwest::Client,
    feed_id: i64,
    feed_url: String,
) -> JoinHandle<Result<FetchSummary, FetchError>> {
    tokio::spawn(async move { fetch_now(&db, &client, feed_id, &feed_url).await })
}

async fn fetch_and_store(
    db: &Database,
    client: &reqwest::Client,
    feed_id: i64,
    feed_url: &str,
) -> Result<FetchSummary, FetchError> {
    let response = tokio::time::timeout(FETCH_TIMEOUT, client.get(feed_url).send())
        .await
        .map_err(|_| FetchError::Timeout)?
        .map_err(FetchError::Network)?;

    if !response.status().is_success() {
        return Err(FetchError::HttpStatus(response.status().as_u16()));
    }

    let bytes = tokio::time::timeout(FETCH_TIMEOUT, read_limited_bytes(response, MAX_FEED_SIZE))
        .await
        .map_err(|_| FetchError::Timeout)??;

    let parsed = parse_feed(&bytes).map_err(|e| FetchError::Parse(e.to_string()))?;

    let title = strip_control_chars(&parsed.title).into_owned();
    if !title.is_empty() {
        let description = strip_control_chars(&parsed.description);
        if let Err(e) = db
            .update_feed_metadata(feed_id, &title, &description, &parsed.site_url)
            .await
        {
            tracing::warn!(feed_id = feed_id, error = %e, "Failed to update feed metadata");
        }
    }

    let now = chrono::Utc::now();
    let mut summary = FetchSummary {
        feed_id,
        title,
        items_seen: parsed.items.len(),
        inserted: 0,
        skipped: 0,
    };

    for item in &parsed.items {
        match store_item(db, item, feed_id, now).await {
            Ok(true) => summary.inserted += 1,
            Ok(false) => {}
            Err(e) => {
                summary.skipped += 1;
                tracing::warn!(
                    feed_id = feed_id,
                    title = %item.title,
                    error = %e,
                    "Skipping feed item"
                );
            }
        }
    }

    Ok(summary)
}

async fn store_item(
    db: &Database,
    item: &RawItem,
    feed_id: i64,
    now: chrono::DateTime<chrono::Utc>,
) -> Result<bool, ItemError> {
    let article = normalize(item, feed_id, now)?;
    db.insert_article_if_absent(&article)
        .await
        .map_err(|e| ItemError::Database(e.to_string()))
}

async fn read_limited_bytes(
    response: reqwest::Response,
    limit: usize,
) -> Result<Vec<u8>, FetchError> {
    // Fast path: check Content-Length header
    if let Some(len) = response.content_length() {
        if len as usize > limit {
            return Err(FetchError::ResponseTooLarge);
        }
    }

    let mut bytes = Vec::new();
    let mut stream = response.bytes_stream();

    while let Some(chunk) = stream.next().await {
        let chunk = chunk.map_err(FetchError::Network)?;
        if bytes.len().saturating_add(chunk.len()) > limit {
            return Err(FetchError::ResponseTooLarge);
        }
        bytes.extend_from_slice(&chunk);
    }

    Ok(bytes)
}
