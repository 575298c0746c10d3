use anyhow::Result;
use sqlx::{
    sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions, SqliteSynchronous},
    SqlitePool,
};
use std::str::FromStr;
use std::time::Duration;

use super::types::{is_lock_message, DatabaseError};

// ============================================================================
// Database
// ============================================================================

/// Shared handle to the SQLite store. Cloning is cheap (pool handle).
#[derive(Clone)]
pub struct Database {
    pub(crate) pool: SqlitePool,
}

impl Database {
    /// Open a database connection and run migrations.
    ///
    /// `":memory:"` opens a private in-memory database. sqlx rewrites it to a
    /// shared-cache URI so the pool's connections see the same data, but
    /// shared-cache table locks are not covered by `busy_timeout`: concurrent
    /// writers need a file database.
    ///
    /// # Errors
    ///
    /// Returns `DatabaseError::InstanceLocked` if another process holds the
    /// database lock, `DatabaseError::Migration` if the schema bootstrap fails,
    /// and `DatabaseError::Other` for everything else.
    pub async fn open(path: &str) -> Result<Self, DatabaseError> {
        let url = format!("sqlite:{}?mode=rwc", path);
        let in_memory = path == ":memory:";

        // busy_timeout lets concurrent fetch tasks wait out each other's
        // write locks instead of failing with SQLITE_BUSY.
        let mut options = SqliteConnectOptions::from_str(&url)
            .map_err(DatabaseError::from_sqlx)?
            .foreign_keys(true)
            .busy_timeout(Duration::from_secs(5));
        if !in_memory {
            options = options
                .journal_mode(SqliteJournalMode::Wal)
                .synchronous(SqliteSynchronous::Normal);
        }

        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .acquire_timeout(Duration::from_secs(10))
            .connect_with(options)
            .await
            .map_err(DatabaseError::from_sqlx)?;

        let db = Self { pool };
        db.migrate().await.map_err(|e| {
            if is_lock_message(&e.to_string()) {
                DatabaseError::InstanceLocked
            } else {
                DatabaseError::Migration(e.to_string())
            }
        })?;

        tracing::debug!(path = %path, "Database ready");
        Ok(db)
    }

    /// Run database migrations atomically within a transaction.
    ///
    /// Every statement is `IF NOT EXISTS`, so re-running against an existing
    /// database is a no-op.
    async fn migrate(&self) -> Result<()> {
        let mut tx = self.pool.begin().await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS feeds (
                id INTEGER PRIMARY KEY,
                title TEXT NOT NULL,
                url TEXT UNIQUE NOT NULL,
                site_url TEXT NOT NULL DEFAULT '',
                description TEXT NOT NULL DEFAULT '',
                fetch_interval INTEGER NOT NULL DEFAULT 1800,
                last_fetched INTEGER,
                last_error TEXT,
                created_at INTEGER NOT NULL,
                updated_at INTEGER NOT NULL
            )
        "#,
        )
        .execute(&mut *tx)
        .await?;

        // guid is unique across the whole store, not per feed: it is the
        // idempotency key for every insert.
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS articles (
                id INTEGER PRIMARY KEY,
                feed_id INTEGER NOT NULL REFERENCES feeds(id) ON DELETE CASCADE,
                guid TEXT UNIQUE NOT NULL,
                title TEXT NOT NULL,
                url TEXT NOT NULL DEFAULT '',
                description TEXT NOT NULL DEFAULT '',
                content TEXT NOT NULL DEFAULT '',
                author TEXT NOT NULL DEFAULT '',
                published_at INTEGER NOT NULL,
                fetched_at INTEGER NOT NULL,
                is_read INTEGER NOT NULL DEFAULT 0,
                is_starred INTEGER NOT NULL DEFAULT 0,
                image_url TEXT
            )
        "#,
        )
        .execute(&mut *tx)
        .await?;

        for statement in [
            "CREATE INDEX IF NOT EXISTS idx_articles_feed_id ON articles(feed_id)",
            "CREATE INDEX IF NOT EXISTS idx_articles_published_at ON articles(published_at DESC)",
            "CREATE INDEX IF NOT EXISTS idx_articles_is_read ON articles(is_read)",
            // Listing one feed's page: WHERE feed_id = ? ORDER BY published_at DESC
            "CREATE INDEX IF NOT EXISTS idx_articles_feed_published ON articles(feed_id, published_at DESC)",
            "CREATE INDEX IF NOT EXISTS idx_feeds_last_fetched ON feeds(last_fetched)",
        ] {
            sqlx::query(statement).execute(&mut *tx).await?;
        }

        tx.commit().await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_open_in_memory() {
        let db = Database::open(":memory:").await.unwrap();
        let tables: Vec<(String,)> =
            sqlx::query_as("SELECT name FROM sqlite_master WHERE type = 'table' ORDER BY name")
                .fetch_all(&db.pool)
                .await
                .unwrap();
        let names: Vec<&str> = tables.iter().map(|(n,)| n.as_str()).collect();
        assert!(names.contains(&"feeds"));
        assert!(names.contains(&"articles"));
    }

    #[tokio::test]
    async fn test_in_memory_shared_within_pool_only() {
        let db = Database::open(":memory:").await.unwrap();
        let mut writer = db.pool.acquire().await.unwrap();
        let mut reader = db.pool.acquire().await.unwrap();

        sqlx::query(
            "INSERT INTO feeds (title, url, created_at, updated_at) \
             VALUES ('A', 'https://a.example/feed', 0, 0)",
        )
        .execute(&mut *writer)
        .await
        .unwrap();
        let (seen,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM feeds")
            .fetch_one(&mut *reader)
            .await
            .unwrap();
        assert_eq!(seen, 1);

        let other = Database::open(":memory:").await.unwrap();
        let (elsewhere,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM feeds")
            .fetch_one(&other.pool)
            .await
            .unwrap();
        assert_eq!(elsewhere, 0);
    }

    #[tokio::test]
    async fn test_migrate_is_idempotent() {
        let db = Database::open(":memory:").await.unwrap();
        db.migrate().await.unwrap();
        db.migrate().await.unwrap();
    }

    #[tokio::test]
    async fn test_open_file_database_reopens() {
        let dir = std::env::temp_dir().join("kantent_schema_test_reopen");
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("store.db");
        let _ = std::fs::remove_file(&path);
        let path_str = path.to_str().unwrap();

        {
            let db = Database::open(path_str).await.unwrap();
            db.pool.close().await;
        }
        let db = Database::open(path_str).await.unwrap();
        db.pool.close().await;

        std::fs::remove_dir_all(&dir).ok();
    }
}
