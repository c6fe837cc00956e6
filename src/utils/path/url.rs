//! Remote reference detection.
//!
//! A remote reference is an absolute `http://` or `https://` URL. Those are
//! never joined against directories: they go to the reader untouched.

use url::Url;

/// Schemes fetched over the network.
const REMOTE_SCHEMES: &[&str] = &["http", "https"];

/// Check if a specifier is an absolute network reference.
///
/// # Examples
/// ```ignore
/// assert!(is_remote("https://example.com/reset.css"));
/// assert!(!is_remote("/styles/reset.css"));
/// assert!(!is_remote("./reset.css"));
/// ```
#[inline]
pub fn is_remote(specifier: &str) -> bool {
    parse_remote(specifier).is_some()
}

/// Parse a specifier as a remote URL, if it is one.
pub fn parse_remote(specifier: &str) -> Option<Url> {
    // Cheap reject before invoking the parser
    let (scheme, _) = specifier.split_once("://")?;
    if !REMOTE_SCHEMES.contains(&scheme.to_ascii_lowercase().as_str()) {
        return None;
    }
    Url::parse(specifier).ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_is_remote() {
        assert!(is_remote("https://example.com/reset.css"));
        assert!(is_remote("HTTP://example.com/a.css"));
        assert!(!is_remote("file:///tmp/a.css"));
        assert!(!is_remote("/about"));
        assert!(!is_remote("./file.css"));
        assert!(!is_remote("mailto:user@example.com"));
    }

    #[test]
    fn test_parse_remote_keeps_url() {
        let url = parse_remote("https://unpkg.com/reset.css?v=1").unwrap();
        assert_eq!(url.host_str(), Some("unpkg.com"));
        assert_eq!(url.query(), Some("v=1"));
    }
}
