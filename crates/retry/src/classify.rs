//! Transient-vs-permanent error classification.
//!
//! Upstream failures arrive as free-text strings (provider messages, fetch
//! errors), so classification is normalized substring matching against a
//! configured tag list.

/// Error tags treated as transient by default.
pub const DEFAULT_RETRYABLE_TAGS: &[&str] = &[
    "NETWORK_ERROR",
    "TIMEOUT_ERROR",
    "RATE_LIMIT_ERROR",
    "TEMPORARY_FAILURE",
    "AI_PROVIDER_ERROR",
    "REPOSITORY_ACCESS_ERROR",
];

/// Suffixes softened away when the full tag does not match, so that
/// "Rate limit exceeded" still matches `RATE_LIMIT_ERROR` via `RATELIMIT`.
const SOFT_SUFFIXES: &[&str] = &["ERROR", "FAILURE", "EXCEPTION"];

/// Uppercase and strip whitespace, hyphens, and underscores.
fn normalize(s: &str) -> String {
    s.chars()
        .filter(|c| !c.is_whitespace() && *c != '-' && *c != '_')
        .map(|c| c.to_ascii_uppercase())
        .collect()
}

/// True when `error` matches any of the `tags` after normalization.
///
/// A tag matches when the normalized error contains the normalized tag as a
/// substring, or contains the tag with a trailing ERROR/FAILURE/EXCEPTION
/// token stripped.
pub fn is_retryable_error(error: &str, tags: &[impl AsRef<str>]) -> bool {
    let haystack = normalize(error);
    if haystack.is_empty() {
        return false;
    }

    tags.iter().any(|tag| {
        let tag = normalize(tag.as_ref());
        if tag.is_empty() {
            return false;
        }
        if haystack.contains(&tag) {
            return true;
        }
        SOFT_SUFFIXES.iter().any(|suffix| {
            tag.strip_suffix(suffix)
                .filter(|token| !token.is_empty())
                .is_some_and(|token| haystack.contains(token))
        })
    })
}
