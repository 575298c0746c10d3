use thiserror::Error;
use url::Url;

/// Errors produced while turning user input into a fetchable site URL.
#[derive(Error, Debug)]
pub enum UrlError {
    /// The URL string could not be parsed.
    #[error("Invalid URL: {0}")]
    Invalid(#[from] url::ParseError),
    /// The URL uses a scheme other than http or https.
    #[error("Unsupported scheme: {0} (only http/https allowed)")]
    UnsupportedScheme(String),
    /// The URL has no host component.
    #[error("URL has no host")]
    MissingHost,
}

/// Normalizes user input into an absolute http(s) URL.
///
/// Input without a scheme is assumed to be `https`.
///
/// # Examples
///
/// ```
/// use kantent::util::normalize_site_url;
///
/// let url = normalize_site_url("example.com/blog").unwrap();
/// assert_eq!(url.as_str(), "https://example.com/blog");
///
/// assert!(normalize_site_url("ftp://example.com").is_err());
/// ```
pub fn normalize_site_url(input: &str) -> Result<Url, UrlError> {
    let trimmed = input.trim();
    let url = if trimmed.contains("://") {
        Url::parse(trimmed)?
    } else {
        Url::parse(&format!("https://{}", trimmed.trim_start_matches("//")))?
    };

    match url.scheme() {
        "http" | "https" => {}
        scheme => return Err(UrlError::UnsupportedScheme(scheme.to_owned())),
    }
    if url.host_str().map_or(true, str::is_empty) {
        return Err(UrlError::MissingHost);
    }

    Ok(url)
}

/// Resolves a possibly relative `href` against `base`.
///
/// Returns `None` when the result is not an http(s) URL (e.g. `mailto:`).
pub fn resolve_url(base: &Url, href: &str) -> Option<Url> {
    let resolved = base.join(href.trim()).ok()?;
    matches!(resolved.scheme(), "http" | "https").then_some(resolved)
}
