//! Best-effort discovery of feed URLs for an arbitrary website.
//!
//! Three independent probes run in a fixed order and their results are merged
//! with first-seen-wins deduplication on the absolute URL:
//!
//! 1. [`WellKnownPaths`] - GET common feed locations and sniff the first bytes
//! 2. [`HtmlLinks`] - `<link rel="alternate" type="...rss/atom/xml...">` elements
//! 3. [`ContentScan`] - regex scan of the raw page for feed-looking `href`s
//!
//! A failing probe contributes nothing; it never fails discovery as a whole.

mod probes;

use std::collections::HashSet;
use std::fmt;
use std::time::Duration;

use async_trait::async_trait;
use futures::StreamExt;
use serde::Serialize;
use thiserror::Error;
use url::Url;

use crate::util::normalize_site_url;

pub use probes::{ContentScan, HtmlLinks, WellKnownPaths};

const PAGE_TIMEOUT: Duration = Duration::from_secs(10);
const MAX_PAGE_SIZE: usize = 5 * 1024 * 1024; // 5MB

/// Feed format guessed from a URL or a `type` attribute.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum FeedKind {
    Rss,
    Atom,
    Unknown,
}

impl FeedKind {
    /// Guess from URL text: anything mentioning `atom` is Atom, then `rss`.
    pub fn from_url(url: &str) -> Self {
        let lower = url.to_lowercase();
        if lower.contains("atom") {
            FeedKind::Atom
        } else if lower.contains("rss") {
            FeedKind::Rss
        } else {
            FeedKind::Unknown
        }
    }

    /// Guess from a `<link type="...">` value: `rss` is checked before `atom`.
    pub fn from_mime(mime: &str) -> Self {
        let lower = mime.to_lowercase();
        if lower.contains("rss") {
            FeedKind::Rss
        } else if lower.contains("atom") {
            FeedKind::Atom
        } else {
            FeedKind::Unknown
        }
    }
}

impl fmt::Display for FeedKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            FeedKind::Rss => "rss",
            FeedKind::Atom => "atom",
            FeedKind::Unknown => "unknown",
        })
    }
}

/// A URL that probably serves a feed. Never persisted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FeedCandidate {
    pub url: String,
    pub title: Option<String>,
    #[serde(rename = "type")]
    pub kind: FeedKind,
}

/// Errors that can occur during feed discovery.
///
/// Only [`DiscoveryError::InvalidUrl`] escapes [`Discoverer::discover`]; the
/// rest are probe-local.
#[derive(Debug, Error)]
pub enum DiscoveryError {
    /// The site URL could not be parsed
    #[error("invalid URL: {0}")]
    InvalidUrl(String),
    /// HTTP request failed
    #[error("network error: {0}")]
    Network(#[from] reqwest::Error),
    /// Server answered with a non-success status
    #[error("HTTP error: status {0}")]
    HttpStatus(u16),
    /// Request exceeded its timeout
    #[error("request timed out")]
    Timeout,
    /// The page could not be interpreted
    #[error("parse error: {0}")]
    Parse(String),
    /// Response body exceeded the 5MB size limit
    #[error("response too large")]
    TooLarge,
}

/// One discovery strategy.
#[async_trait]
pub trait FeedProbe: Send + Sync {
    /// Short name used in log lines.
    fn name(&self) -> &'static str;

    /// Produce candidates for `site`. URLs must be absolute.
    async fn probe(
        &self,
        client: &reqwest::Client,
        site: &Url,
    ) -> Result<Vec<FeedCandidate>, DiscoveryError>;
}

/// Runs the probes in order and merges their candidates.
pub struct Discoverer {
    client: reqwest::Client,
    probes: Vec<Box<dyn FeedProbe>>,
}

impl Discoverer {
    /// Discoverer with the standard probe chain.
    pub fn new(client: reqwest::Client) -> Self {
        Self::with_probes(
            client,
            vec![
                Box::new(WellKnownPaths::default()),
                Box::new(HtmlLinks),
                Box::new(ContentScan),
            ],
        )
    }

    /// Discoverer with a custom probe chain, run in the given order.
    pub fn with_probes(client: reqwest::Client, probes: Vec<Box<dyn FeedProbe>>) -> Self {
        Self { client, probes }
    }

    /// Find feed candidates for `site_url`.
    ///
    /// A missing scheme defaults to `https`. Candidates keep probe order, and
    /// within a probe, document order.
    ///
    /// # Errors
    ///
    /// Returns [`DiscoveryError::InvalidUrl`] only when `site_url` cannot be
    /// parsed. Probe failures are logged and skipped.
    pub async fn discover(&self, site_url: &str) -> Result<Vec<FeedCandidate>, DiscoveryError> {
        let site =
            normalize_site_url(site_url).map_err(|e| DiscoveryError::InvalidUrl(e.to_string()))?;

        let mut seen = HashSet::new();
        let mut candidates = Vec::new();

        for probe in &self.probes {
            match probe.probe(&self.client, &site).await {
                Ok(found) => {
                    let before = candidates.len();
                    for candidate in found {
                        if seen.insert(candidate.url.clone()) {
                            candidates.push(candidate);
                        }
                    }
                    tracing::debug!(
                        probe = probe.name(),
                        site = %site,
                        added = candidates.len() - before,
                        "Discovery probe finished"
                    );
                }
                Err(e) => {
                    tracing::debug!(probe = probe.name(), site = %site, error = %e, "Discovery probe failed");
                }
            }
        }

        tracing::info!(site = %site, candidates = candidates.len(), "Feed discovery complete");
        Ok(candidates)
    }
}

/// GET an HTML page for the link-based probes. Non-success statuses are errors.
async fn fetch_page(client: &reqwest::Client, url: &Url) -> Result<String, DiscoveryError> {
    let response = tokio::time::timeout(PAGE_TIMEOUT, client.get(url.as_str()).send())
        .await
        .map_err(|_| DiscoveryError::Timeout)?
        .map_err(DiscoveryError::Network)?;

    if !response.status().is_success() {
        return Err(DiscoveryError::HttpStatus(response.status().as_u16()));
    }

    let bytes = tokio::time::timeout(PAGE_TIMEOUT, read_discovery_bytes(response))
        .await
        .map_err(|_| DiscoveryError::Timeout)??;
    Ok(String::from_utf8_lossy(&bytes).into_owned())
}

/// Reads response body with a 5MB size limit using stream-based reading.
async fn read_discovery_bytes(response: reqwest::Response) -> Result<Vec<u8>, DiscoveryError> {
    // Fast path: check Content-Length header
    if let Some(len) = response.content_length() {
        if len as usize > MAX_PAGE_SIZE {
            return Err(DiscoveryError::TooLarge);
        }
    }

    let mut bytes = Vec::new();
    let mut stream = response.bytes_stream();

    while let Some(chunk) = stream.next().await {
        let chunk = chunk.map_err(DiscoveryError::Network)?;
        if bytes.len().saturating_add(chunk.len()) > MAX_PAGE_SIZE {
            return Err(DiscoveryError::TooLarge);
        }
        bytes.extend_from_slice(&chunk);
    }

    Ok(bytes)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    struct Fixed(&'static str, Vec<&'static str>);

    #[async_trait]
    impl FeedProbe for Fixed {
        fn name(&self) -> &'static str {
            self.0
        }

        async fn probe(
            &self,
            _client: &reqwest::Client,
            _site: &Url,
        ) -> Result<Vec<FeedCandidate>, DiscoveryError> {
            Ok(self
                .1
                .iter()
                .map(|u| FeedCandidate {
                    url: (*u).to_string(),
                    title: Some(self.0.to_string()),
                    kind: FeedKind::from_url(u),
                })
                .collect())
        }
    }

    struct Failing;

    #[async_trait]
    impl FeedProbe for Failing {
        fn name(&self) -> &'static str {
            "failing"
        }

        async fn probe(
            &self,
            _client: &reqwest::Client,
            _site: &Url,
        ) -> Result<Vec<FeedCandidate>, DiscoveryError> {
            Err(DiscoveryError::Timeout)
        }
    }

    #[test]
    fn test_kind_from_url() {
        assert_eq!(FeedKind::from_url("https://x.com/atom.xml"), FeedKind::Atom);
        assert_eq!(FeedKind::from_url("https://x.com/RSS"), FeedKind::Rss);
        assert_eq!(FeedKind::from_url("https://x.com/?feed=rss2"), FeedKind::Rss);
        assert_eq!(FeedKind::from_url("https://x.com/feed"), FeedKind::Unknown);
        // "atom" wins when both appear
        assert_eq!(FeedKind::from_url("https://x.com/rss/atom"), FeedKind::Atom);
    }

    #[test]
    fn test_kind_from_mime() {
        assert_eq!(FeedKind::from_mime("application/rss+xml"), FeedKind::Rss);
        assert_eq!(FeedKind::from_mime("application/atom+xml"), FeedKind::Atom);
        assert_eq!(FeedKind::from_mime("text/xml"), FeedKind::Unknown);
    }

    #[test]
    fn test_candidate_serializes_kind_as_type() {
        let json = serde_json::to_value(FeedCandidate {
            url: "https://x.com/feed".into(),
            title: None,
            kind: FeedKind::Atom,
        })
        .unwrap();
        assert_eq!(
            json,
            serde_json::json!({ "url": "https://x.com/feed", "title": null, "type": "atom" })
        );
    }

    #[tokio::test]
    async fn test_first_probe_wins_on_duplicates() {
        let discoverer = Discoverer::with_probes(
            reqwest::Client::new(),
            vec![
                Box::new(Fixed("first", vec!["https://x.com/feed", "https://x.com/rss"])),
                Box::new(Failing),
                Box::new(Fixed("second", vec!["https://x.com/rss", "https://x.com/atom"])),
            ],
        );

        let found = discoverer.discover("x.com").await.unwrap();
        let summary: Vec<_> = found
            .iter()
            .map(|c| (c.url.as_str(), c.title.as_deref()))
            .collect();
        assert_eq!(
            summary,
            vec![
                ("https://x.com/feed", Some("first")),
                ("https://x.com/rss", Some("first")),
                ("https://x.com/atom", Some("second")),
            ]
        );
    }

    #[tokio::test]
    async fn test_invalid_site_url() {
        let discoverer = Discoverer::with_probes(reqwest::Client::new(), Vec::new());
        assert!(matches!(
            discoverer.discover("http://").await,
            Err(DiscoveryError::InvalidUrl(_))
        ));
    }
}
