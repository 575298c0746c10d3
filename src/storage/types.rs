use serde::Serialize;
use thiserror::Error;

// ============================================================================
// Error Types
// ============================================================================

/// Database-specific errors with user-friendly messages
#[derive(Debug, Error)]
pub enum DatabaseError {
    /// Another process holds the database lock
    #[error("Another instance of kantent appears to be using this database. Stop it and try again.")]
    InstanceLocked,

    /// Schema bootstrap failed
    #[error("Database migration failed: {0}")]
    Migration(String),

    /// Generic database error
    #[error("Database error: {0}")]
    Other(#[from] sqlx::Error),
}

impl DatabaseError {
    /// Check if a sqlx error indicates database locking
    pub(crate) fn from_sqlx(err: sqlx::Error) -> Self {
        if is_lock_message(&err.to_string()) {
            return DatabaseError::InstanceLocked;
        }
        DatabaseError::Other(err)
    }
}

/// SQLITE_BUSY (5), SQLITE_LOCKED (6) and SQLITE_CANTOPEN (14) all surface as
/// one of these messages.
pub(crate) fn is_lock_message(message: &str) -> bool {
    let lower = message.to_lowercase();
    lower.contains("database is locked")
        || lower.contains("database table is locked")
        || lower.contains("sqlite_busy")
        || lower.contains("sqlite_locked")
        || lower.contains("unable to open database file")
}

// ============================================================================
// Input Types
// ============================================================================

/// Default poll interval for a newly registered feed, in seconds.
pub const DEFAULT_FETCH_INTERVAL: i64 = 1800;

/// A feed registration request.
#[derive(Debug, Clone)]
pub struct NewFeed {
    pub url: String,
    /// Empty titles are stored as "New Feed" until the first successful fetch.
    pub title: String,
    pub site_url: String,
    pub description: String,
    pub fetch_interval: i64,
}

impl NewFeed {
    pub fn from_url(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            title: String::new(),
            site_url: String::new(),
            description: String::new(),
            fetch_interval: DEFAULT_FETCH_INTERVAL,
        }
    }
}

/// Explicit (user-initiated) feed edit. Every field is overwritten.
#[derive(Debug, Clone)]
pub struct FeedUpdate {
    pub title: String,
    pub url: String,
    pub site_url: String,
    pub description: String,
    pub fetch_interval: i64,
}

/// A normalized article ready for insert-if-absent.
///
/// `guid` is the idempotency key and is never empty; the normalizer rejects
/// entries that have neither a native identifier nor a link.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewArticle {
    pub feed_id: i64,
    pub guid: String,
    pub title: String,
    pub url: String,
    pub description: String,
    pub content: String,
    pub author: String,
    pub published_at: i64,
    pub image_url: Option<String>,
}

/// Filters for [`Database::list_articles`](super::Database::list_articles).
#[derive(Debug, Clone, Default)]
pub struct ArticleQuery {
    pub feed_id: Option<i64>,
    pub unread_only: bool,
    /// Defaults to 20; values above 100 fall back to the default.
    pub limit: Option<i64>,
    pub offset: Option<i64>,
}

// ============================================================================
// Data Structures
// ============================================================================

/// Feed row as stored.
#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct Feed {
    pub id: i64,
    pub title: String,
    pub url: String,
    pub site_url: String,
    pub description: String,
    /// Poll interval in seconds
    pub fetch_interval: i64,
    /// Unix seconds of the last successful fetch
    pub last_fetched: Option<i64>,
    pub last_error: Option<String>,
    pub created_at: i64,
    pub updated_at: i64,
}

/// Article row joined with its feed title.
///
/// `content` is only populated by [`Database::get_article`](super::Database::get_article);
/// listings leave it empty to keep pages small.
#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct Article {
    pub id: i64,
    pub feed_id: i64,
    pub feed_title: String,
    pub guid: String,
    pub title: String,
    pub url: String,
    pub description: String,
    pub content: String,
    pub author: String,
    pub published_at: i64,
    pub fetched_at: i64,
    pub is_read: bool,
    pub is_starred: bool,
    pub image_url: Option<String>,
}

/// Aggregate counters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Stats {
    pub total_feeds: i64,
    pub total_articles: i64,
    pub unread_count: i64,
}
