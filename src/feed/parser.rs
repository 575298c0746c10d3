use chrono::{DateTime, Utc};
use feed_rs::model::{Entry, Link};
use feed_rs::parser;

/// Feed-level metadata plus the entries, in document order.
#[derive(Debug, Clone, Default)]
pub struct ParsedFeed {
    pub title: String,
    pub description: String,
    pub site_url: String,
    pub items: Vec<RawItem>,
}

/// A media attachment as declared by the feed (`<enclosure>`, `media:content`).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Enclosure {
    pub url: String,
    pub mime_type: String,
}

/// One feed entry before normalization.
///
/// Every field is exactly what the source declared; empty strings mean absent.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RawItem {
    pub id: String,
    pub title: String,
    pub link: String,
    /// RSS `<description>` / Atom `<summary>`, still containing markup.
    pub description: String,
    /// RSS `content:encoded` / Atom `<content>`.
    pub content: String,
    pub authors: Vec<String>,
    pub published: Option<DateTime<Utc>>,
    pub updated: Option<DateTime<Utc>>,
    /// Explicit item image (media thumbnail).
    pub image: Option<String>,
    pub enclosures: Vec<Enclosure>,
}

/// Parse RSS 0.9x/1.0/2.0, Atom or JSON Feed bytes.
///
/// Entries without a native identifier keep an empty `id` instead of a
/// generated one, so callers can apply their own fallback.
pub fn parse_feed(bytes: &[u8]) -> Result<ParsedFeed, parser::ParseFeedError> {
    let feed = parser::Builder::new()
        .id_generator(|_links, _title, _uri| String::new())
        .build()
        .parse(bytes)?;

    Ok(ParsedFeed {
        title: feed.title.map(|t| t.content.trim().to_string()).unwrap_or_default(),
        description: feed
            .description
            .map(|t| t.content.trim().to_string())
            .unwrap_or_default(),
        site_url: site_link(&feed.links).unwrap_or_default(),
        items: feed.entries.into_iter().map(RawItem::from).collect(),
    })
}

/// Pick the human-facing link: `rel="alternate"` (or no rel) before anything else.
fn site_link(links: &[Link]) -> Option<String> {
    links
        .iter()
        .find(|l| matches!(l.rel.as_deref(), None | Some("alternate")))
        .or_else(|| links.iter().find(|l| l.rel.as_deref() != Some("self")))
        .map(|l| l.href.trim().to_string())
}

impl From<Entry> for RawItem {
    fn from(entry: Entry) -> Self {
        let link = site_link(&entry.links).unwrap_or_default();

        let image = entry
            .media
            .iter()
            .flat_map(|m| m.thumbnails.iter())
            .map(|t| t.image.uri.trim())
            .find(|uri| !uri.is_empty())
            .map(str::to_string);

        let enclosures = entry
            .media
            .iter()
            .flat_map(|m| m.content.iter())
            .filter_map(|c| {
                let url = c.url.as_ref()?.to_string();
                let mime_type = c
                    .content_type
                    .as_ref()
                    .map(|m| m.essence().to_string())
                    .unwrap_or_default();
                Some(Enclosure { url, mime_type })
            })
            .collect();

        RawItem {
            id: entry.id,
            title: entry.title.map(|t| t.content).unwrap_or_default(),
            link,
            description: entry.summary.map(|t| t.content).unwrap_or_default(),
            content: entry.content.and_then(|c| c.body).unwrap_or_default(),
            authors: entry
                .authors
                .into_iter()
                .map(|p| p.name)
                .filter(|n| !n.trim().is_empty())
                .collect(),
            published: entry.published,
            updated: entry.updated,
            image,
            enclosures,
        }
    }
}
