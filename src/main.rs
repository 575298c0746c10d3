use anyhow::{Context, Result};
use chrono::DateTime;
use clap::{Parser, Subcommand};
use serde::Serialize;
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

use kantent::config::Config;
use kantent::feed::{build_client, spawn_fetch, Discoverer};
use kantent::scheduler::spawn_scheduler;
use kantent::storage::{ArticleQuery, Database, DatabaseError, FeedUpdate, NewFeed};

/// Get the config directory path (~/.config/kantent/)
fn get_config_dir() -> Result<PathBuf> {
    let home = std::env::var("HOME").context("HOME environment variable not set")?;
    Ok(PathBuf::from(home).join(".config").join("kantent"))
}

#[derive(Parser, Debug)]
#[command(name = "kantent", version, about = "RSS/Atom feed ingestion service")]
struct Args {
    /// Config file (default: ~/.config/kantent/config.toml)
    #[arg(long, global = true, value_name = "FILE")]
    config: Option<PathBuf>,

    /// SQLite database file (overrides config and DATABASE_PATH)
    #[arg(long, global = true, value_name = "FILE")]
    database: Option<PathBuf>,

    /// Print results as JSON
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Poll all feeds on a schedule until interrupted
    Serve {
        /// Seconds between polls (overrides config and FEED_FETCH_INTERVAL)
        #[arg(long, value_parser = clap::value_parser!(u64).range(1..))]
        interval: Option<u64>,
        /// Maximum concurrent fetches
        #[arg(long, value_parser = clap::value_parser!(u64).range(1..))]
        max_concurrent: Option<u64>,
    },
    /// Register a feed and fetch it once
    Add {
        url: String,
        #[arg(long)]
        title: Option<String>,
        /// Register without the initial fetch
        #[arg(long)]
        no_fetch: bool,
    },
    /// Change a feed's title, URL or poll interval
    Edit {
        id: i64,
        #[arg(long)]
        title: Option<String>,
        #[arg(long)]
        url: Option<String>,
        /// Poll interval in seconds
        #[arg(long)]
        interval: Option<i64>,
    },
    /// Fetch one feed now
    Refresh { id: i64 },
    /// Delete a feed and its articles
    Remove { id: i64 },
    /// List feeds
    Feeds,
    /// List articles, newest first
    Articles {
        #[arg(long)]
        feed: Option<i64>,
        #[arg(long)]
        unread: bool,
        #[arg(long)]
        limit: Option<i64>,
        #[arg(long)]
        offset: Option<i64>,
    },
    /// Show one article including its content
    Show { id: i64 },
    /// Mark an article read (or unread with --unread)
    Read {
        id: i64,
        #[arg(long)]
        unread: bool,
    },
    /// Star an article (or unstar with --off)
    Star {
        id: i64,
        #[arg(long)]
        off: bool,
    },
    /// Mark every article (or one feed's) as read
    MarkAllRead {
        #[arg(long)]
        feed: Option<i64>,
    },
    /// Find feed URLs for a website
    Discover { site: String },
    /// Feed and article counts
    Stats,
}

#[tokio::main]
async fn main() -> Result<()> {
    // Logs go to stderr so --json output stays clean
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();

    let config_dir = get_config_dir()?;
    let config_path = args
        .config
        .clone()
        .unwrap_or_else(|| config_dir.join("config.toml"));
    let mut config = Config::load(&config_path)
        .with_context(|| format!("Failed to load config from {}", config_path.display()))?;
    config.apply_env();
    if let Some(path) = &args.database {
        config.database_path = Some(path.clone());
    }

    let db_path = config.database_path_or(&config_dir);
    if let Some(parent) = db_path.parent().filter(|p| !p.as_os_str().is_empty()) {
        if !parent.exists() {
            std::fs::create_dir_all(parent).with_context(|| {
                format!("Failed to create database directory {}", parent.display())
            })?;
        }
    }

    let db_path_str = db_path
        .to_str()
        .ok_or_else(|| anyhow::anyhow!("Invalid UTF-8 in database path"))?;
    let db = match Database::open(db_path_str).await {
        Ok(db) => db,
        Err(DatabaseError::InstanceLocked) => {
            eprintln!("Error: {}", DatabaseError::InstanceLocked);
            std::process::exit(1);
        }
        Err(e) => return Err(anyhow::anyhow!("Failed to open database: {}", e)),
    };

    let client = build_client().context("Failed to build HTTP client")?;
    let out = Output { json: args.json };

    match args.command {
        Command::Serve {
            interval,
            max_concurrent,
        } => {
            if let Some(secs) = interval {
                config.poll_interval_secs = secs;
            }
            if let Some(n) = max_concurrent {
                config.max_concurrent_fetches = n as usize;
            }
            let handle = spawn_scheduler(db, client, config.scheduler_config());
            shutdown_signal().await;
            tracing::info!("Shutting down, waiting for running fetches");
            handle.stop().await.context("Scheduler did not stop cleanly")?;
        }

        Command::Add {
            url,
            title,
            no_fetch,
        } => {
            let new_feed = NewFeed {
                title: title.unwrap_or_default(),
                ..NewFeed::from_url(url.trim())
            };
            let id = db
                .create_feed(&new_feed)
                .await
                .with_context(|| format!("Failed to add feed {}", new_feed.url))?;
            if !no_fetch {
                match spawn_fetch(db.clone(), client, id, new_feed.url.clone()).await? {
                    Ok(summary) => {
                        if !out.json {
                            println!("Fetched {} new articles", summary.inserted);
                        }
                    }
                    Err(e) => eprintln!("Warning: initial fetch failed: {}", e),
                }
            }
            let feed = db
                .get_feed(id)
                .await?
                .ok_or_else(|| anyhow::anyhow!("Feed {} vanished after insert", id))?;
            out.print(&feed, || println!("Added feed {}: {}", feed.id, feed.title))?;
        }

        Command::Edit {
            id,
            title,
            url,
            interval,
        } => {
            let feed = db
                .get_feed(id)
                .await?
                .ok_or_else(|| anyhow::anyhow!("No feed with id {}", id))?;
            let update = FeedUpdate {
                title: title.unwrap_or(feed.title),
                url: url.unwrap_or(feed.url),
                site_url: feed.site_url,
                description: feed.description,
                fetch_interval: interval.unwrap_or(feed.fetch_interval),
            };
            db.update_feed(id, &update)
                .await
                .with_context(|| format!("Failed to update feed {}", id))?;
            out.print(&update_summary(id, &update), || println!("Updated feed {}", id))?;
        }

        Command::Refresh { id } => {
            let feed = db
                .get_feed(id)
                .await?
                .ok_or_else(|| anyhow::anyhow!("No feed with id {}", id))?;
            let summary = spawn_fetch(db.clone(), client, feed.id, feed.url)
                .await?
                .with_context(|| format!("Failed to refresh feed {}", id))?;
            out.print(&summary, || {
                println!(
                    "{}: {} items, {} new, {} skipped",
                    summary.title, summary.items_seen, summary.inserted, summary.skipped
                )
            })?;
        }

        Command::Remove { id } => {
            if db.get_feed(id).await?.is_none() {
                anyhow::bail!("No feed with id {}", id);
            }
            let removed = db.delete_feed(id).await?;
            out.print(&serde_json::json!({ "id": id, "articles_removed": removed }), || {
                println!("Removed feed {} and {} articles", id, removed)
            })?;
        }

        Command::Feeds => {
            let feeds = db.list_feeds().await?;
            out.print(&feeds, || {
                for f in &feeds {
                    let status = match (&f.last_error, f.last_fetched) {
                        (Some(err), _) => format!("error: {}", err),
                        (None, Some(ts)) => format!("fetched {}", format_ts(ts)),
                        (None, None) => "never fetched".to_string(),
                    };
                    println!("{:>4}  {}  <{}>  [{}]", f.id, f.title, f.url, status);
                }
            })?;
        }

        Command::Articles {
            feed,
            unread,
            limit,
            offset,
        } => {
            let articles = db
                .list_articles(&ArticleQuery {
                    feed_id: feed,
                    unread_only: unread,
                    limit,
                    offset,
                })
                .await?;
            out.print(&articles, || {
                for a in &articles {
                    let flags = format!(
                        "{}{}",
                        if a.is_read { " " } else { "*" },
                        if a.is_starred { "★" } else { " " }
                    );
                    println!(
                        "{:>6} {} {}  {}  ({})",
                        a.id,
                        flags,
                        format_ts(a.published_at),
                        a.title,
                        a.feed_title
                    );
                }
            })?;
        }

        Command::Show { id } => {
            let article = db
                .get_article(id)
                .await?
                .ok_or_else(|| anyhow::anyhow!("No article with id {}", id))?;
            out.print(&article, || {
                println!("{}", article.title);
                println!("{} | {} | {}", article.feed_title, article.author, format_ts(article.published_at));
                println!("{}", article.url);
                if let Some(image) = &article.image_url {
                    println!("image: {}", image);
                }
                println!();
                println!("{}", article.description);
            })?;
        }

        Command::Read { id, unread } => {
            if !db.set_article_read(id, !unread).await? {
                anyhow::bail!("No article with id {}", id);
            }
            out.print(&serde_json::json!({ "id": id, "is_read": !unread }), || {
                println!("Article {} marked {}", id, if unread { "unread" } else { "read" })
            })?;
        }

        Command::Star { id, off } => {
            if !db.set_article_starred(id, !off).await? {
                anyhow::bail!("No article with id {}", id);
            }
            out.print(&serde_json::json!({ "id": id, "is_starred": !off }), || {
                println!("Article {} {}", id, if off { "unstarred" } else { "starred" })
            })?;
        }

        Command::MarkAllRead { feed } => {
            let updated = db.mark_all_read(feed).await?;
            out.print(&serde_json::json!({ "updated": updated }), || {
                println!("Marked {} articles read", updated)
            })?;
        }

        Command::Discover { site } => {
            let candidates = Discoverer::new(client)
                .discover(&site)
                .await
                .with_context(|| format!("Cannot discover feeds for {}", site))?;
            out.print(&candidates, || {
                if candidates.is_empty() {
                    println!("No feeds found");
                }
                for c in &candidates {
                    match &c.title {
                        Some(title) => println!("[{}] {}  {}", c.kind, c.url, title),
                        None => println!("[{}] {}", c.kind, c.url),
                    }
                }
            })?;
        }

        Command::Stats => {
            let stats = db.stats().await?;
            out.print(&stats, || {
                println!("feeds:    {}", stats.total_feeds);
                println!("articles: {}", stats.total_articles);
                println!("unread:   {}", stats.unread_count);
            })?;
        }
    }

    Ok(())
}

struct Output {
    json: bool,
}

impl Output {
    /// JSON when `--json` was given, otherwise the human-readable form.
    fn print<T: Serialize + ?Sized>(&self, value: &T, human: impl FnOnce()) -> Result<()> {
        if self.json {
            println!("{}", serde_json::to_string_pretty(value)?);
        } else {
            human();
        }
        Ok(())
    }
}

fn update_summary(id: i64, update: &FeedUpdate) -> serde_json::Value {
    serde_json::json!({
        "id": id,
        "title": update.title,
        "url": update.url,
        "fetch_interval": update.fetch_interval,
    })
}

fn format_ts(ts: i64) -> String {
    DateTime::from_timestamp(ts, 0)
        .map(|d| d.format("%Y-%m-%d %H:%M").to_string())
        .unwrap_or_else(|| ts.to_string())
}

/// Resolves on Ctrl-C or, on Unix, SIGTERM.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to listen for Ctrl-C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }
}
