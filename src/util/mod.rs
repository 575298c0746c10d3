//! Text and URL helpers shared by the fetch and discovery paths.
//!
//! - **Text**: markup stripping for summaries, `<img>` extraction, and
//!   control-character removal for feed-supplied strings
//! - **URLs**: user-input normalization and relative-href resolution
//!
//! # Examples
//!
//! ```
//! use kantent::util::{clean_html, normalize_site_url, resolve_url};
//!
//! assert_eq!(clean_html("<p>Hi <em>there</em></p>"), "Hi there");
//!
//! let site = normalize_site_url("example.com").unwrap();
//! let feed = resolve_url(&site, "/feed.xml").unwrap();
//! assert_eq!(feed.as_str(), "https://example.com/feed.xml");
//! ```

mod text;
mod url;

pub use self::text::{clean_html, first_image_src, strip_control_chars};
pub use self::url::{normalize_site_url, resolve_url, UrlError};
