//! Resource url canonicalization before fetching.

/// Error type for URL canonicalization failures.
#[derive(Debug, Clone, thiserror::Error)]
pub enum UrlError {
    #[error("empty URL")]
    Empty,

    #[error("relative URL needs a base: {0}")]
    Relative(String),

    #[error("unsupported scheme: {0}")]
    UnsupportedScheme(String),

    #[error("invalid URL: {0}")]
    InvalidUrl(String),
}

/// Canonicalize a resource url taken from markup.
///
/// Normalization steps:
/// 1. Trim leading/trailing whitespace
/// 2. Protocol-relative `//host/...` becomes `https://host/...`
/// 3. Bare `host/path` defaults to `https://`
/// 4. Lowercase the host and drop the fragment; the query is kept as is
///
/// Path-relative references (`/a.css`, `./a.css`) must be resolved against
/// the page before they reach the fetcher.
pub fn canonicalize(input: &str) -> Result<url::Url, UrlError> {
    let trimmed = input.trim();

    if trimmed.is_empty() {
        return Err(UrlError::Empty);
    }

    let url_str = if let Some(rest) = trimmed.strip_prefix("//") {
        format!("https://{rest}")
    } else if trimmed.contains("://") {
        trimmed.to_string()
    } else if trimmed.starts_with(['/', '.', '?', '#']) {
        return Err(UrlError::Relative(trimmed.to_string()));
    } else {
        format!("https://{trimmed}")
    };

    let mut parsed = url::Url::parse(&url_str).map_err(|e| UrlError::InvalidUrl(e.to_string()))?;

    match parsed.scheme() {
        "http" | "https" => {}
        scheme => return Err(UrlError::UnsupportedScheme(scheme.to_string())),
    }

    if let Some(host) = parsed.host_str().map(str::to_lowercase) {
        parsed.set_host(Some(&host)).map_err(|e| UrlError::InvalidUrl(e.to_string()))?;
    }

    parsed.set_fragment(None);

    Ok(parsed)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_canonicalize_basic() {
        let url = canonicalize("https://example.com/site.css").unwrap();
        assert_eq!(url.scheme(), "https");
        assert_eq!(url.host_str(), Some("example.com"));
        assert_eq!(url.path(), "/site.css");
    }

    #[test]
    fn test_canonicalize_protocol_relative() {
        let url = canonicalize("//cdn.example.com/lib.js").unwrap();
        assert_eq!(url.as_str(), "https://cdn.example.com/lib.js");
    }

    #[test]
    fn test_canonicalize_default_scheme() {
        let url = canonicalize("example.com/a.css").unwrap();
        assert_eq!(url.scheme(), "https");
        assert_eq!(url.host_str(), Some("example.com"));
    }

    #[test]
    fn test_canonicalize_relative_rejected() {
        assert!(matches!(canonicalize("/css/a.css"), Err(UrlError::Relative(_))));
        assert!(matches!(canonicalize("./a.css"), Err(UrlError::Relative(_))));
    }

    #[test]
    fn test_canonicalize_lowercase_host_and_fragment() {
        let url = canonicalize("https://EXAMPLE.COM/a.css?v=2#x").unwrap();
        assert_eq!(url.host_str(), Some("example.com"));
        assert_eq!(url.query(), Some("v=2"));
        assert_eq!(url.fragment(), None);
    }

    #[test]
    fn test_canonicalize_unsupported_scheme() {
        let result = canonicalize("file:///etc/passwd");
        assert!(matches!(result, Err(UrlError::UnsupportedScheme(_))));
    }

    #[test]
    fn test_canonicalize_empty() {
        assert!(matches!(canonicalize(""), Err(UrlError::Empty)));
        assert!(matches!(canonicalize("   "), Err(UrlError::Empty)));
    }
}
