use regex::Regex;
use std::borrow::Cow;
use std::sync::LazyLock;

static TAG_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"<[^>]*>").unwrap_or_else(|e| panic!("tag pattern must compile: {e}"))
});

static IMG_SRC_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?i)<img[^>]+src=["']([^"']+)["']"#)
        .unwrap_or_else(|e| panic!("img pattern must compile: {e}"))
});

/// Strips markup tags and collapses whitespace.
///
/// Every tag is replaced by a space, then runs of whitespace become a single
/// space and the ends are trimmed. A leftover `<` or `>` that is not part
/// of a tag (`2 < 3`, a tag cut off mid-way) also becomes a space, so the
/// result never contains either bracket and no text after it is lost.
///
/// # Examples
///
/// ```
/// use kantent::util::clean_html;
///
/// assert_eq!(clean_html("<p>Hello <b>world</b></p>"), "Hello world");
/// assert_eq!(clean_html("  a \n\t b  "), "a b");
/// ```
pub fn clean_html(html: &str) -> String {
    let without_tags = TAG_RE.replace_all(html, " ");
    let without_brackets = without_tags.replace(['<', '>'], " ");
    without_brackets.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Returns the `src` of the first `<img>` tag in `html`, if any.
pub fn first_image_src(html: &str) -> Option<&str> {
    IMG_SRC_RE
        .captures(html)
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str())
}

/// Removes control characters and ANSI escape sequences from feed-supplied text.
///
/// Tab, newline and carriage return are preserved. Returns `Cow::Borrowed`
/// when there is nothing to strip.
pub fn strip_control_chars(s: &str) -> Cow<'_, str> {
    let is_control = |c: char| c == '\x7f' || (c < ' ' && !matches!(c, '\t' | '\n' | '\r'));
    if !s.chars().any(is_control) {
        return Cow::Borrowed(s);
    }

    let mut out = String::with_capacity(s.len());
    let mut chars = s.chars().peekable();
    while let Some(c) = chars.next() {
        if c == '\x1b' {
            match chars.peek() {
                // CSI: parameters up to and including a final byte in 0x40..=0x7e
                Some('[') => {
                    chars.next();
                    for c in chars.by_ref() {
                        if ('\x40'..='\x7e').contains(&c) {
                            break;
                        }
                    }
                }
                // OSC: terminated by BEL or ST (ESC \)
                Some(']') => {
                    chars.next();
                    while let Some(c) = chars.next() {
                        if c == '\x07' {
                            break;
                        }
                        if c == '\x1b' && chars.peek() == Some(&'\\') {
                            chars.next();
                            break;
                        }
                    }
                }
                _ => {}
            }
        } else if !is_control(c) {
            out.push(c);
        }
    }
    Cow::Owned(out)
}
