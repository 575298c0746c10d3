//! Feed ingestion: parsing, normalization, fetching and discovery.
//!
//! - [`parser`] - raw feed bytes into metadata and ordered [`RawItem`]s (`feed-rs`)
//! - [`normalize`] - one [`RawItem`] into a storable article
//! - [`fetcher`] - HTTP retrieval of one feed plus idempotent persistence
//! - [`discovery`] - heuristic feed-URL discovery for a website
//!
//! # Example
//!
//! ```ignore
//! use kantent::feed::{build_client, fetch_now};
//!
//! let client = build_client()?;
//! let summary = fetch_now(&db, &client, feed.id, &feed.url).await?;
//! println!("{} new articles", summary.inserted);
//! ```

pub mod discovery;
pub mod fetcher;
pub mod normalize;
pub mod parser;

use reqwest::redirect::Policy;

pub use discovery::{DiscoveryError, Discoverer, FeedCandidate, FeedKind, FeedProbe};
pub use fetcher::{fetch_now, spawn_fetch, FetchError, FetchSummary};
pub use normalize::{normalize, ItemError};
pub use parser::{parse_feed, Enclosure, ParsedFeed, RawItem};

const USER_AGENT: &str = concat!(env!("CARGO_PKG_NAME"), "/", env!("CARGO_PKG_VERSION"));
const MAX_REDIRECTS: usize = 5;

/// HTTP client shared by the fetcher, the scheduler and discovery.
///
/// Per-request timeouts are applied by the callers; the client-level timeout
/// is only an outer bound.
pub fn build_client() -> reqwest::Result<reqwest::Client> {
    reqwest::Client::builder()
        .user_agent(USER_AGENT)
        .redirect(redirect_policy())
        .pool_max_idle_per_host(4)
        .pool_idle_timeout(std::time::Duration::from_secs(30))
        .tcp_keepalive(std::time::Duration::from_secs(60))
        .timeout(std::time::Duration::from_secs(30))
        .build()
}

fn redirect_policy() -> Policy {
    Policy::custom(|attempt| {
        if attempt.previous().len() >= MAX_REDIRECTS {
            return attempt.error(format!("Too many redirects (max {MAX_REDIRECTS})"));
        }

        let url = attempt.url();
        if attempt.previous().iter().any(|prev| prev.as_str() == url.as_str()) {
            return attempt.error("Redirect loop detected");
        }

        tracing::debug!(
            to = %url,
            hop = attempt.previous().len() + 1,
            "Following redirect"
        );
        attempt.follow()
    })
}
