use anyhow::Result;

use super::schema::Database;
use super::types::{Feed, FeedUpdate, NewFeed};

/// Title stored for feeds registered without one.
const PLACEHOLDER_TITLE: &str = "New Feed";

const FEED_COLUMNS: &str = "id, title, url, site_url, description, fetch_interval, \
                            last_fetched, last_error, created_at, updated_at";

impl Database {
    // ========================================================================
    // Feed Registration
    // ========================================================================

    /// Register a feed and return its ID.
    ///
    /// Fails if a feed with the same URL already exists (URL is unique).
    pub async fn create_feed(&self, feed: &NewFeed) -> Result<i64> {
        let now = chrono::Utc::now().timestamp();
        let title = if feed.title.trim().is_empty() {
            PLACEHOLDER_TITLE
        } else {
            feed.title.trim()
        };

        let (id,): (i64,) = sqlx::query_as(
            r#"
            INSERT INTO feeds (title, url, site_url, description, fetch_interval, created_at, updated_at)
            VALUES (?, ?, ?, ?, ?, ?, ?)
            RETURNING id
        "#,
        )
        .bind(title)
        .bind(&feed.url)
        .bind(&feed.site_url)
        .bind(&feed.description)
        .bind(feed.fetch_interval)
        .bind(now)
        .bind(now)
        .fetch_one(&self.pool)
        .await?;

        tracing::info!(feed_id = id, url = %feed.url, "Feed registered");
        Ok(id)
    }

    /// Get a single feed by ID.
    pub async fn get_feed(&self, feed_id: i64) -> Result<Option<Feed>> {
        let feed = sqlx::query_as::<_, Feed>(&format!(
            "SELECT {FEED_COLUMNS} FROM feeds WHERE id = ?"
        ))
        .bind(feed_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(feed)
    }

    /// List every registered feed, ordered by ID.
    pub async fn list_feeds(&self) -> Result<Vec<Feed>> {
        let feeds = sqlx::query_as::<_, Feed>(&format!(
            "SELECT {FEED_COLUMNS} FROM feeds ORDER BY id"
        ))
        .fetch_all(&self.pool)
        .await?;
        Ok(feeds)
    }

    /// Overwrite the user-editable fields of a feed. Returns whether the feed existed.
    pub async fn update_feed(&self, feed_id: i64, update: &FeedUpdate) -> Result<bool> {
        let now = chrono::Utc::now().timestamp();
        let result = sqlx::query(
            r#"
            UPDATE feeds
            SET title = ?, url = ?, site_url = ?, description = ?, fetch_interval = ?, updated_at = ?
            WHERE id = ?
        "#,
        )
        .bind(&update.title)
        .bind(&update.url)
        .bind(&update.site_url)
        .bind(&update.description)
        .bind(update.fetch_interval)
        .bind(now)
        .bind(feed_id)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    /// Delete a feed and all of its articles.
    ///
    /// Returns the number of articles removed by the cascade.
    pub async fn delete_feed(&self, feed_id: i64) -> Result<u64> {
        let mut tx = self.pool.begin().await?;

        let (articles,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM articles WHERE feed_id = ?")
            .bind(feed_id)
            .fetch_one(&mut *tx)
            .await?;

        sqlx::query("DELETE FROM feeds WHERE id = ?")
            .bind(feed_id)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;
        tracing::info!(feed_id = feed_id, articles = articles, "Feed deleted");
        Ok(articles as u64)
    }

    // ========================================================================
    // Fetch Bookkeeping
    // ========================================================================

    /// Refresh title, description and site URL from the upstream document.
    pub async fn update_feed_metadata(
        &self,
        feed_id: i64,
        title: &str,
        description: &str,
        site_url: &str,
    ) -> Result<()> {
        let now = chrono::Utc::now().timestamp();
        sqlx::query(
            "UPDATE feeds SET title = ?, description = ?, site_url = ?, updated_at = ? WHERE id = ?",
        )
        .bind(title)
        .bind(description)
        .bind(site_url)
        .bind(now)
        .bind(feed_id)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Record the outcome of a fetch attempt.
    ///
    /// `fetched_at = None` leaves `last_fetched` untouched, so a failed attempt
    /// only overwrites `last_error`. `error = None` clears it.
    pub async fn set_fetch_result(
        &self,
        feed_id: i64,
        fetched_at: Option<i64>,
        error: Option<&str>,
    ) -> Result<()> {
        sqlx::query(
            "UPDATE feeds SET last_fetched = COALESCE(?, last_fetched), last_error = ? WHERE id = ?",
        )
        .bind(fetched_at)
        .bind(error)
        .bind(feed_id)
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}
