use std::sync::LazyLock;
use std::time::Duration;

use async_trait::async_trait;
use futures::future::join_all;
use futures::StreamExt;
use regex::Regex;
use scraper::{Html, Selector};
use url::Url;

use super::{fetch_page, DiscoveryError, FeedCandidate, FeedKind, FeedProbe};
use crate::util::{resolve_url, strip_control_chars};

const WELL_KNOWN_TIMEOUT: Duration = Duration::from_secs(5);
const SNIFF_BYTES: usize = 1024;

/// Common feed locations, tried against the site origin.
pub const WELL_KNOWN_PATHS: &[&str] = &[
    "/feed",
    "/feed.xml",
    "/rss",
    "/rss.xml",
    "/atom.xml",
    "/feed.atom",
    "/feeds/posts/default", // Blogger
    "/?feed=rss2",          // WordPress
    "/?feed=atom",          // WordPress
    "/index.xml",           // Hugo
];

static FEED_HREF_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"href=["']([^"']*(?:feed|rss|atom)[^"']*)["']"#)
        .unwrap_or_else(|e| panic!("feed href pattern must compile: {e}"))
});

static XML_HREF_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"href=["']([^"']*\.xml)["']"#)
        .unwrap_or_else(|e| panic!("xml href pattern must compile: {e}"))
});

// ============================================================================
// Well-known paths
// ============================================================================

/// GETs each well-known path and keeps those whose body looks like a feed.
#[derive(Debug, Clone)]
pub struct WellKnownPaths {
    paths: Vec<String>,
}

impl Default for WellKnownPaths {
    fn default() -> Self {
        Self {
            paths: WELL_KNOWN_PATHS.iter().map(|p| (*p).to_string()).collect(),
        }
    }
}

#[async_trait]
impl FeedProbe for WellKnownPaths {
    fn name(&self) -> &'static str {
        "well-known"
    }

    async fn probe(
        &self,
        client: &reqwest::Client,
        site: &Url,
    ) -> Result<Vec<FeedCandidate>, DiscoveryError> {
        let urls: Vec<Url> = self
            .paths
            .iter()
            .filter_map(|p| site.join(p).ok())
            .collect();

        let checks = urls.iter().map(|url| looks_like_feed(client, url));
        let results = join_all(checks).await;

        Ok(urls
            .iter()
            .zip(results)
            .filter(|(_, ok)| *ok)
            .map(|(url, _)| FeedCandidate {
                url: url.to_string(),
                title: None,
                kind: FeedKind::from_url(url.as_str()),
            })
            .collect())
    }
}

/// HTTP 200 and the first kilobyte mentions a feed root or an XML prolog.
async fn looks_like_feed(client: &reqwest::Client, url: &Url) -> bool {
    let sniff = async {
        let response = client.get(url.as_str()).send().await.ok()?;
        if response.status() != reqwest::StatusCode::OK {
            return None;
        }
        let mut head = Vec::with_capacity(SNIFF_BYTES);
        let mut stream = response.bytes_stream();
        while head.len() < SNIFF_BYTES {
            match stream.next().await {
                Some(Ok(chunk)) => head.extend_from_slice(&chunk),
                Some(Err(_)) | None => break,
            }
        }
        head.truncate(SNIFF_BYTES);
        Some(head)
    };

    match tokio::time::timeout(WELL_KNOWN_TIMEOUT, sniff).await {
        Ok(Some(head)) => {
            let text = String::from_utf8_lossy(&head).to_lowercase();
            ["<rss", "<feed", "<atom", "<?xml"]
                .iter()
                .any(|marker| text.contains(marker))
        }
        _ => false,
    }
}

// ============================================================================
// <link rel="alternate">
// ============================================================================

/// Reads `<link rel="alternate">` elements with a feed-ish `type`.
#[derive(Debug, Clone, Copy, Default)]
pub struct HtmlLinks;

#[async_trait]
impl FeedProbe for HtmlLinks {
    fn name(&self) -> &'static str {
        "html-links"
    }

    async fn probe(
        &self,
        client: &reqwest::Client,
        site: &Url,
    ) -> Result<Vec<FeedCandidate>, DiscoveryError> {
        let page = fetch_page(client, site).await?;
        find_link_candidates(&page, site)
    }
}

/// Pure part of [`HtmlLinks`]: extract alternate feed links from `html`.
pub fn find_link_candidates(html: &str, base: &Url) -> Result<Vec<FeedCandidate>, DiscoveryError> {
    let selector =
        Selector::parse("link[rel][href]").map_err(|e| DiscoveryError::Parse(e.to_string()))?;
    let document = Html::parse_document(html);

    let candidates = document
        .select(&selector)
        .filter_map(|el| {
            let attrs = el.value();
            let is_alternate = attrs
                .attr("rel")?
                .split_ascii_whitespace()
                .any(|r| r.eq_ignore_ascii_case("alternate"));
            let mime = attrs.attr("type").unwrap_or("").to_lowercase();
            let feedish = ["rss", "atom", "xml"].iter().any(|t| mime.contains(t));
            if !is_alternate || !feedish {
                return None;
            }

            let href = attrs.attr("href")?.trim();
            if href.is_empty() {
                return None;
            }
            let url = resolve_url(base, href)?;
            let title = attrs
                .attr("title")
                .map(|t| strip_control_chars(t.trim()).into_owned())
                .filter(|t| !t.is_empty());

            Some(FeedCandidate {
                url: url.to_string(),
                title,
                kind: FeedKind::from_mime(&mime),
            })
        })
        .collect();

    Ok(candidates)
}

// ============================================================================
// Raw content scan
// ============================================================================

/// Regex scan of the raw page for `href`s that look like feeds.
#[derive(Debug, Clone, Copy, Default)]
pub struct ContentScan;

#[async_trait]
impl FeedProbe for ContentScan {
    fn name(&self) -> &'static str {
        "content-scan"
    }

    async fn probe(
        &self,
        client: &reqwest::Client,
        site: &Url,
    ) -> Result<Vec<FeedCandidate>, DiscoveryError> {
        let page = fetch_page(client, site).await?;
        Ok(scan_content(&page, site))
    }
}

/// Pure part of [`ContentScan`]. Matches of the keyword pattern come before
/// `.xml` matches; `javascript:` and fragment links are ignored.
pub fn scan_content(body: &str, base: &Url) -> Vec<FeedCandidate> {
    let mut candidates: Vec<FeedCandidate> = Vec::new();

    for re in [&*FEED_HREF_RE, &*XML_HREF_RE] {
        for caps in re.captures_iter(body) {
            let Some(href) = caps.get(1).map(|m| m.as_str()) else {
                continue;
            };
            if href.is_empty() || href.starts_with("javascript:") || href.starts_with('#') {
                continue;
            }
            let Some(url) = resolve_url(base, href) else {
                continue;
            };
            let url = url.to_string();
            if candidates.iter().any(|c| c.url == url) {
                continue;
            }
            candidates.push(FeedCandidate {
                kind: FeedKind::from_url(&url),
                url,
                title: None,
            });
        }
    }

    candidates
}
