use anyhow::Result;
use sqlx::QueryBuilder;

use super::schema::Database;
use super::types::{Article, ArticleQuery, NewArticle, Stats};

// ============================================================================
// Query Limit Constants
// ============================================================================

/// Page size when the caller does not ask for one
const DEFAULT_PAGE_SIZE: i64 = 20;

/// Largest page a caller may request; anything above falls back to the default
const MAX_PAGE_SIZE: i64 = 100;

/// Column list shared by every article SELECT (listing variant omits content)
const LIST_COLUMNS: &str = "a.id, a.feed_id, f.title AS feed_title, a.guid, a.title, a.url, \
     a.description, '' AS content, a.author, a.published_at, a.fetched_at, \
     a.is_read, a.is_starred, a.image_url";

impl Database {
    // ========================================================================
    // Article Ingestion
    // ========================================================================

    /// Insert an article unless one with the same guid already exists.
    ///
    /// Returns `true` when a row was inserted and `false` on a guid conflict.
    /// The conflict is the expected outcome for every already-seen item and is
    /// not an error; existing rows (including read/starred state) are never
    /// touched.
    pub async fn insert_article_if_absent(&self, article: &NewArticle) -> Result<bool> {
        let now = chrono::Utc::now().timestamp();
        let result = sqlx::query(
            r#"
            INSERT OR IGNORE INTO articles
                (feed_id, guid, title, url, description, content, author,
                 published_at, fetched_at, image_url)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
        "#,
        )
        .bind(article.feed_id)
        .bind(&article.guid)
        .bind(&article.title)
        .bind(&article.url)
        .bind(&article.description)
        .bind(&article.content)
        .bind(&article.author)
        .bind(article.published_at)
        .bind(now)
        .bind(&article.image_url)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    // ========================================================================
    // Article Queries
    // ========================================================================

    /// List articles newest first, with optional feed and unread filters.
    ///
    /// Plain limit/offset slicing; rows inserted between two page requests can
    /// shift the window.
    pub async fn list_articles(&self, query: &ArticleQuery) -> Result<Vec<Article>> {
        let limit = match query.limit {
            Some(l) if l > 0 && l <= MAX_PAGE_SIZE => l,
            _ => DEFAULT_PAGE_SIZE,
        };
        let offset = query.offset.unwrap_or(0).max(0);

        let mut builder: QueryBuilder<sqlx::Sqlite> = QueryBuilder::new(format!(
            "SELECT {LIST_COLUMNS} FROM articles a JOIN feeds f ON a.feed_id = f.id WHERE 1 = 1"
        ));
        if let Some(feed_id) = query.feed_id {
            builder.push(" AND a.feed_id = ");
            builder.push_bind(feed_id);
        }
        if query.unread_only {
            builder.push(" AND a.is_read = 0");
        }
        builder.push(" ORDER BY a.published_at DESC, a.id DESC LIMIT ");
        builder.push_bind(limit);
        builder.push(" OFFSET ");
        builder.push_bind(offset);

        let articles = builder
            .build_query_as::<Article>()
            .fetch_all(&self.pool)
            .await?;
        Ok(articles)
    }

    /// Get a single article, including its raw content.
    pub async fn get_article(&self, article_id: i64) -> Result<Option<Article>> {
        let article = sqlx::query_as::<_, Article>(
            r#"
            SELECT a.id, a.feed_id, f.title AS feed_title, a.guid, a.title, a.url,
                   a.description, a.content, a.author, a.published_at, a.fetched_at,
                   a.is_read, a.is_starred, a.image_url
            FROM articles a
            JOIN feeds f ON a.feed_id = f.id
            WHERE a.id = ?
        "#,
        )
        .bind(article_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(article)
    }

    /// Number of stored articles for one feed.
    pub async fn count_articles_for_feed(&self, feed_id: i64) -> Result<i64> {
        let (count,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM articles WHERE feed_id = ?")
            .bind(feed_id)
            .fetch_one(&self.pool)
            .await?;
        Ok(count)
    }

    /// Feed, article and unread totals.
    pub async fn stats(&self) -> Result<Stats> {
        let (total_feeds, total_articles, unread_count): (i64, i64, i64) = sqlx::query_as(
            r#"
            SELECT
                (SELECT COUNT(*) FROM feeds),
                (SELECT COUNT(*) FROM articles),
                (SELECT COUNT(*) FROM articles WHERE is_read = 0)
        "#,
        )
        .fetch_one(&self.pool)
        .await?;

        Ok(Stats {
            total_feeds,
            total_articles,
            unread_count,
        })
    }

    // ========================================================================
    // Article Mutations
    // ========================================================================

    /// Set the read flag. Returns whether the article exists.
    pub async fn set_article_read(&self, article_id: i64, read: bool) -> Result<bool> {
        let result = sqlx::query("UPDATE articles SET is_read = ? WHERE id = ?")
            .bind(read)
            .bind(article_id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    /// Set the starred flag. Returns whether the article exists.
    pub async fn set_article_starred(&self, article_id: i64, starred: bool) -> Result<bool> {
        let result = sqlx::query("UPDATE articles SET is_starred = ? WHERE id = ?")
            .bind(starred)
            .bind(article_id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    /// Mark every unread article as read, optionally limited to one feed.
    ///
    /// Returns how many articles changed state.
    pub async fn mark_all_read(&self, feed_id: Option<i64>) -> Result<u64> {
        let result = match feed_id {
            Some(id) => {
                sqlx::query("UPDATE articles SET is_read = 1 WHERE feed_id = ? AND is_read = 0")
                    .bind(id)
                    .execute(&self.pool)
                    .await?
            }
            None => {
                sqlx::query("UPDATE articles SET is_read = 1 WHERE is_read = 0")
                    .execute(&self.pool)
                    .await?
            }
        };
        Ok(result.rows_affected())
    }
}
