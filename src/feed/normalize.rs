use chrono::{DateTime, Utc};
use thiserror::Error;

use super::parser::RawItem;
use crate::storage::NewArticle;
use crate::util::{clean_html, first_image_src, strip_control_chars};

/// Reasons a single entry is dropped while the rest of its feed is processed.
#[derive(Debug, Error)]
pub enum ItemError {
    /// The entry has neither a native identifier nor a link.
    #[error("Item has no identifier and no link")]
    MissingIdentifier,
    /// The insert for this entry failed.
    #[error("Database error: {0}")]
    Database(String),
}

/// Convert a parsed entry into the record the store persists.
///
/// `now` is used as the published time when the entry carries neither a
/// published nor an updated date.
pub fn normalize(item: &RawItem, feed_id: i64, now: DateTime<Utc>) -> Result<NewArticle, ItemError> {
    let link = item.link.trim();
    let guid = match item.id.trim() {
        "" if link.is_empty() => return Err(ItemError::MissingIdentifier),
        "" => link,
        id => id,
    };

    let author = item
        .authors
        .first()
        .map(|a| strip_control_chars(a.trim()).into_owned())
        .unwrap_or_default();

    let published_at = item.published.or(item.updated).unwrap_or(now).timestamp();

    Ok(NewArticle {
        feed_id,
        guid: guid.to_string(),
        title: strip_control_chars(item.title.trim()).into_owned(),
        url: link.to_string(),
        description: clean_html(&item.description),
        content: item.content.clone(),
        author,
        published_at,
        image_url: extract_image(item),
    })
}

/// Best-effort lead image: explicit image, then an image enclosure, then the
/// first `<img>` in the content body, then the first `<img>` in the summary.
fn extract_image(item: &RawItem) -> Option<String> {
    if let Some(image) = item.image.as_deref().filter(|s| !s.is_empty()) {
        return Some(image.to_string());
    }

    if let Some(enc) = item
        .enclosures
        .iter()
        .find(|e| e.mime_type.starts_with("image/"))
    {
        return Some(enc.url.clone());
    }

    first_image_src(&item.content)
        .or_else(|| first_image_src(&item.description))
        .map(str::to_string)
}
