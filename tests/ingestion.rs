//! End-to-end ingestion against a mocked HTTP origin: fetch, refetch,
//! failure bookkeeping, scheduler ticks and overlapping fetches.

use std::path::PathBuf;
use std::time::Duration;

use futures::future::join_all;
use kantent::feed::{fetch_now, spawn_fetch, FetchError};
use kantent::scheduler::{spawn_scheduler, SchedulerConfig};
use kantent::storage::{ArticleQuery, Database, NewFeed};
use pretty_assertions::assert_eq;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

const FEED: &str = r#"<?xml version="1.0"?>
<rss version="2.0"><channel>
  <title>Integration Feed</title>
  <link>https://it.example.com/</link>
  <item>
    <guid>guid-123</guid>
    <title>Has guid</title>
    <link>https://it.example.com/a</link>
    <description>&lt;p&gt;Hello &lt;b&gt;there&lt;/b&gt;&lt;/p&gt;</description>
    <pubDate>Mon, 02 Jun 2025 10:00:00 GMT</pubDate>
  </item>
  <item>
    <title>Link only</title>
    <link>https://it.example.com/b</link>
    <pubDate>Sun, 01 Jun 2025 10:00:00 GMT</pubDate>
  </item>
</channel></rss>"#;

/// File-backed database; concurrent writers need WAL, not shared-cache memory.
async fn file_db(name: &str) -> (Database, PathBuf) {
    let dir = std::env::temp_dir().join(format!("kantent_it_{}_{}", name, std::process::id()));
    let _ = std::fs::remove_dir_all(&dir);
    std::fs::create_dir_all(&dir).unwrap();
    let db_path = dir.join("test.db");
    let db = Database::open(db_path.to_str().unwrap()).await.unwrap();
    (db, dir)
}

async fn mount_feed(server: &MockServer) {
    Mock::given(method("GET"))
        .and(path("/feed"))
        .respond_with(ResponseTemplate::new(200).set_body_string(FEED))
        .mount(server)
        .await;
}

#[tokio::test]
async fn test_fetch_stores_normalized_items() {
    let server = MockServer::start().await;
    mount_feed(&server).await;

    let db = Database::open(":memory:").await.unwrap();
    let url = format!("{}/feed", server.uri());
    let feed_id = db.create_feed(&NewFeed::from_url(&url)).await.unwrap();

    let summary = fetch_now(&db, &reqwest::Client::new(), feed_id, &url)
        .await
        .unwrap();
    assert_eq!(summary.inserted, 2);

    let articles = db.list_articles(&ArticleQuery::default()).await.unwrap();
    let identity: Vec<_> = articles
        .iter()
        .map(|a| (a.guid.as_str(), a.url.as_str()))
        .collect();
    assert_eq!(
        identity,
        vec![
            ("guid-123", "https://it.example.com/a"),
            ("https://it.example.com/b", "https://it.example.com/b"),
        ]
    );
    assert_eq!(articles[0].description, "Hello there");
    assert_eq!(articles[0].feed_title, "Integration Feed");
}

#[tokio::test]
async fn test_refetch_changes_nothing() {
    let server = MockServer::start().await;
    mount_feed(&server).await;

    let db = Database::open(":memory:").await.unwrap();
    let url = format!("{}/feed", server.uri());
    let feed_id = db.create_feed(&NewFeed::from_url(&url)).await.unwrap();
    let client = reqwest::Client::new();

    fetch_now(&db, &client, feed_id, &url).await.unwrap();
    let before = db.list_articles(&ArticleQuery::default()).await.unwrap();

    let again = fetch_now(&db, &client, feed_id, &url).await.unwrap();
    assert_eq!(again.inserted, 0);

    let after = db.list_articles(&ArticleQuery::default()).await.unwrap();
    let ids = |v: &[kantent::storage::Article]| v.iter().map(|a| a.id).collect::<Vec<_>>();
    assert_eq!(ids(&before), ids(&after));
}

#[tokio::test]
async fn test_server_error_keeps_last_fetched() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/feed"))
        .respond_with(ResponseTemplate::new(200).set_body_string(FEED))
        .up_to_n_times(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/feed"))
        .respond_with(ResponseTemplate::new(500))
        .mount(&server)
        .await;

    let db = Database::open(":memory:").await.unwrap();
    let url = format!("{}/feed", server.uri());
    let feed_id = db.create_feed(&NewFeed::from_url(&url)).await.unwrap();
    let client = reqwest::Client::new();

    fetch_now(&db, &client, feed_id, &url).await.unwrap();
    let good = db.get_feed(feed_id).await.unwrap().unwrap();
    assert!(good.last_error.is_none());

    let err = fetch_now(&db, &client, feed_id, &url).await.unwrap_err();
    assert!(matches!(err, FetchError::HttpStatus(500)));

    let failed = db.get_feed(feed_id).await.unwrap().unwrap();
    assert_eq!(failed.last_fetched, good.last_fetched);
    assert_eq!(failed.last_error.as_deref(), Some("HTTP error: status 500"));
    assert_eq!(db.count_articles_for_feed(feed_id).await.unwrap(), 2);
}

/// Poll the feed until its `last_fetched` differs from `previous`.
async fn wait_for_fetch(db: &Database, feed_id: i64, previous: Option<i64>) -> Option<i64> {
    for _ in 0..100 {
        let feed = db.get_feed(feed_id).await.unwrap().unwrap();
        if feed.last_fetched != previous {
            return feed.last_fetched;
        }
        tokio::time::sleep(Duration::from_millis(50)).await;
    }
    panic!("feed {feed_id} was not fetched again after {previous:?}");
}

#[tokio::test]
async fn test_scheduler_ticks_are_idempotent() {
    let server = MockServer::start().await;
    mount_feed(&server).await;

    let (db, dir) = file_db("ticks").await;
    let url = format!("{}/feed", server.uri());
    let feed_id = db.create_feed(&NewFeed::from_url(&url)).await.unwrap();
    db.set_fetch_result(feed_id, Some(1), None).await.unwrap();

    // Timestamps have whole-second resolution, so ticks must be over a second apart
    let handle = spawn_scheduler(
        db.clone(),
        reqwest::Client::new(),
        SchedulerConfig {
            interval: Duration::from_millis(1100),
            startup_delay: Duration::ZERO,
            max_concurrent_fetches: 4,
        },
    );

    let first = wait_for_fetch(&db, feed_id, Some(1)).await;
    assert_eq!(db.count_articles_for_feed(feed_id).await.unwrap(), 2);

    let second = wait_for_fetch(&db, feed_id, first).await;
    assert_eq!(db.count_articles_for_feed(feed_id).await.unwrap(), 2);
    handle.stop().await.unwrap();

    assert!(second > first, "last_fetched went from {first:?} to {second:?}");
    assert!(server.received_requests().await.unwrap_or_default().len() >= 2);
    let feed = db.get_feed(feed_id).await.unwrap().unwrap();
    assert!(feed.last_error.is_none());

    std::fs::remove_dir_all(&dir).ok();
}

#[tokio::test]
async fn test_overlapping_fetches_never_duplicate() {
    let server = MockServer::start().await;
    mount_feed(&server).await;

    let (db, dir) = file_db("overlap").await;
    let client = reqwest::Client::new();
    let url = format!("{}/feed", server.uri());

    // Five registrations serving identical items, fetched at once
    let mut handles = Vec::new();
    for i in 0..5 {
        let feed_id = db
            .create_feed(&NewFeed::from_url(format!("{url}?copy={i}")))
            .await
            .unwrap();
        handles.push(spawn_fetch(db.clone(), client.clone(), feed_id, url.clone()));
    }

    let inserted: usize = join_all(handles)
        .await
        .into_iter()
        .map(|joined| joined.unwrap().unwrap().inserted)
        .sum();

    assert_eq!(inserted, 2);
    assert_eq!(db.stats().await.unwrap().total_articles, 2);

    std::fs::remove_dir_all(&dir).ok();
}
