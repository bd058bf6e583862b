//! Request path safety checks.
//!
//! The dispatcher refuses to resolve anything for a path this module flags.
//! Percent-escaped paths are decoded first and the decoded form is checked
//! again, so `%2e%2e` style traversal cannot slip past the raw check.

use std::borrow::Cow;

use once_cell::sync::Lazy;
use regex::Regex;

#[allow(clippy::expect_used)]
static PERCENT_ESCAPE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"%[0-9a-fA-F]{2}").expect("valid percent-escape pattern")
});

/// Raw structural check, no decoding.
fn violates_rules(path: &str) -> bool {
    path.is_empty()
        || !path.starts_with('/')
        || path.contains("/../")
        || path.ends_with("/..")
        || path.contains('\\')
        || path.contains('\0')
}

/// True when the path contains at least one `%XX` escape.
pub fn has_percent_escape(path: &str) -> bool {
    PERCENT_ESCAPE.is_match(path)
}

/// Percent-decode `path`, or `None` when the escapes do not form UTF-8.
pub fn decode(path: &str) -> Option<Cow<'_, str>> {
    if !has_percent_escape(path) {
        return Some(Cow::Borrowed(path));
    }
    urlencoding::decode(path).ok()
}

/// Classify a raw request path.
///
/// Unsafe when empty, not rooted, containing `/../`, ending in `/..`,
/// containing a backslash or a NUL byte, or when its percent-decoded form
/// is any of those (or fails to decode).
pub fn is_unsafe(path: &str) -> bool {
    if violates_rules(path) {
        return true;
    }
    match decode(path) {
        Some(Cow::Borrowed(_)) => false,
        Some(Cow::Owned(decoded)) => violates_rules(&decoded),
        None => true,
    }
}
