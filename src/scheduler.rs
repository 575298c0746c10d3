//! Periodic polling of every registered feed.
//!
//! After a fixed startup delay the scheduler ticks on a fixed interval. Each
//! tick lists the feeds and spawns one fetch task per feed without waiting
//! for the previous tick's tasks. A semaphore shared across ticks caps how
//! many fetches run at once, and a feed whose previous fetch is still queued
//! or running is not dispatched again.

use std::collections::HashSet;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use thiserror::Error;
use tokio::sync::{broadcast, Semaphore};
use tokio::task::{JoinHandle, JoinSet};
use tokio::time::MissedTickBehavior;

use crate::feed::fetch_now;
use crate::storage::Database;

/// Delay between start-up and the first tick.
pub const STARTUP_DELAY: Duration = Duration::from_secs(5);
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(1800);
pub const DEFAULT_MAX_CONCURRENT_FETCHES: usize = 10;

#[derive(Debug, Clone, Copy)]
pub struct SchedulerConfig {
    pub interval: Duration,
    pub startup_delay: Duration,
    pub max_concurrent_fetches: usize,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            interval: DEFAULT_POLL_INTERVAL,
            startup_delay: STARTUP_DELAY,
            max_concurrent_fetches: DEFAULT_MAX_CONCURRENT_FETCHES,
        }
    }
}

#[derive(Debug, Error)]
pub enum SchedulerError {
    #[error("scheduler task failed: {0}")]
    Join(#[from] tokio::task::JoinError),
}

/// Ids of feeds with a fetch task that is queued or running.
type PendingFeeds = Arc<Mutex<HashSet<i64>>>;

pub struct Scheduler {
    db: Database,
    client: reqwest::Client,
    config: SchedulerConfig,
    pending: PendingFeeds,
}

impl Scheduler {
    pub fn new(db: Database, client: reqwest::Client, config: SchedulerConfig) -> Self {
        Self {
            db,
            client,
            config,
            pending: PendingFeeds::default(),
        }
    }

    /// Poll until `shutdown` fires (or its sender is dropped).
    ///
    /// On shutdown the timer loop stops, fetches still waiting for a permit
    /// are abandoned, and fetches already running are awaited to completion.
    pub async fn run(self, mut shutdown: broadcast::Receiver<()>) {
        tracing::info!(
            interval_secs = self.config.interval.as_secs(),
            max_concurrent = self.config.max_concurrent_fetches,
            "Feed scheduler started"
        );

        tokio::select! {
            _ = shutdown.recv() => {
                tracing::info!("Feed scheduler stopped before first tick");
                return;
            }
            _ = tokio::time::sleep(self.config.startup_delay) => {}
        }

        let permits = Arc::new(Semaphore::new(self.config.max_concurrent_fetches.max(1)));
        let mut in_flight = JoinSet::new();

        let period = if self.config.interval.is_zero() {
            Duration::from_secs(1)
        } else {
            self.config.interval
        };
        let mut ticker = tokio::time::interval(period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                _ = shutdown.recv() => {
                    tracing::info!("Feed scheduler shutdown requested");
                    break;
                }
                _ = ticker.tick() => {
                    self.dispatch_tick(&permits, &mut in_flight).await;
                }
                Some(joined) = in_flight.join_next(), if !in_flight.is_empty() => {
                    log_task_panic(joined);
                }
            }
        }

        // Queued tasks see a closed semaphore and return without fetching
        permits.close();
        let draining = in_flight.len();
        while let Some(joined) = in_flight.join_next().await {
            log_task_panic(joined);
        }
        tracing::info!(drained = draining, "Feed scheduler stopped");
    }

    async fn dispatch_tick(&self, permits: &Arc<Semaphore>, in_flight: &mut JoinSet<()>) {
        let feeds = match self.db.list_feeds().await {
            Ok(feeds) => feeds,
            Err(e) => {
                tracing::warn!(error = %e, "Failed to list feeds for fetch cycle");
                return;
            }
        };

        if feeds.is_empty() {
            tracing::info!("No feeds to fetch");
            return;
        }
        tracing::info!(feeds = feeds.len(), "Starting feed fetch cycle");

        for feed in feeds {
            let Some(slot) = PendingSlot::claim(&self.pending, feed.id) else {
                tracing::debug!(feed_id = feed.id, "Previous fetch still pending, skipping");
                continue;
            };
            let db = self.db.clone();
            let client = self.client.clone();
            let permits = Arc::clone(permits);
            in_flight.spawn(async move {
                let _slot = slot;
                let Ok(_permit) = permits.acquire_owned().await else {
                    tracing::debug!(feed_id = feed.id, "Fetch abandoned at shutdown");
                    return;
                };
                // Failures are recorded on the feed and logged by fetch_now
                let _ = fetch_now(&db, &client, feed.id, &feed.url).await;
            });
        }
    }
}

/// Marks a feed as pending until dropped.
struct PendingSlot {
    pending: PendingFeeds,
    feed_id: i64,
}

impl PendingSlot {
    fn claim(pending: &PendingFeeds, feed_id: i64) -> Option<Self> {
        let mut set = pending.lock().unwrap_or_else(|e| e.into_inner());
        set.insert(feed_id).then(|| Self {
            pending: Arc::clone(pending),
            feed_id,
        })
    }
}

impl Drop for PendingSlot {
    fn drop(&mut self) {
        let mut set = self.pending.lock().unwrap_or_else(|e| e.into_inner());
        set.remove(&self.feed_id);
    }
}

fn log_task_panic(joined: Result<(), tokio::task::JoinError>) {
    if let Err(e) = joined {
        tracing::error!(error = %e, "Fetch task panicked");
    }
}

/// Handle to a scheduler running in the background.
pub struct SchedulerHandle {
    cancel_tx: broadcast::Sender<()>,
    join: JoinHandle<()>,
}

impl SchedulerHandle {
    /// Stop the timer loop and wait for running fetches to finish.
    pub async fn stop(self) -> Result<(), SchedulerError> {
        let _ = self.cancel_tx.send(());
        self.join.await.map_err(SchedulerError::from)
    }
}

/// Start a [`Scheduler`] on its own task.
pub fn spawn_scheduler(
    db: Database,
    client: reqwest::Client,
    config: SchedulerConfig,
) -> SchedulerHandle {
    let (cancel_tx, cancel_rx) = broadcast::channel(1);
    let scheduler = Scheduler::new(db, client, config);
    let join = tokio::spawn(scheduler.run(cancel_rx));
    SchedulerHandle { cancel_tx, join }
}
