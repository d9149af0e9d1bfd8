//! Response metadata for serving produced urls.
//!
//! The handler layer uses these to set `Content-Type`, a strong `ETag`
//! equal to the url's signature, and to answer `If-None-Match` with 304.

use crate::url::{parse_file_name, parse_signature};

/// Mime type implied by a produced file name's extension.
pub fn content_type_for(file_name: &str) -> Option<&'static str> {
    let (_, ext) = file_name.rsplit_once('.')?;
    match ext.to_ascii_lowercase().as_str() {
        "css" => Some("text/css"),
        "js" => Some("application/x-javascript"),
        "png" => Some("image/png"),
        _ => None,
    }
}

/// Mime type for a full produced url.
pub fn content_type_for_url(url: &str) -> Option<&'static str> {
    parse_file_name(url).and_then(content_type_for)
}

/// Strong ETag (quoted) for a produced url.
pub fn etag_for(url: &str) -> String {
    format!("\"{}\"", parse_signature(url))
}

/// Whether an `If-None-Match` header value matches the url's signature.
///
/// Accepts a comma-separated list, `*`, and weak validators.
pub fn is_not_modified(if_none_match: Option<&str>, url: &str) -> bool {
    let Some(header) = if_none_match else {
        return false;
    };

    let etag = etag_for(url);
    header.split(',').map(str::trim).any(|candidate| {
        candidate == "*" || candidate == etag || candidate.strip_prefix("W/") == Some(etag.as_str())
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fingerprint::Fingerprint;

    fn url() -> String {
        format!(
            "http://host/reduced/{}-{}-RequestReducedStyle.css",
            "1".repeat(32),
            Fingerprint::of_bytes(b"css").to_hex()
        )
    }

    #[test]
    fn test_content_types() {
        assert_eq!(content_type_for("a-b-RequestReducedStyle.css"), Some("text/css"));
        assert_eq!(content_type_for("a-b-RequestReducedScript.js"), Some("application/x-javascript"));
        assert_eq!(content_type_for("a-b.png"), Some("image/png"));
        assert_eq!(content_type_for("a.txt"), None);
        assert_eq!(content_type_for_url(&url()), Some("text/css"));
    }

    #[test]
    fn test_etag_format() {
        let etag = etag_for(&url());
        assert_eq!(etag, format!("\"{}\"", Fingerprint::of_bytes(b"css").to_hex()));
        assert_eq!(etag.len(), 34);
    }

    #[test]
    fn test_not_modified() {
        let url = url();
        let etag = etag_for(&url);
        assert!(is_not_modified(Some(&etag), &url));
        assert!(is_not_modified(Some(&format!("\"other\", {etag}")), &url));
        assert!(is_not_modified(Some(&format!("W/{etag}")), &url));
        assert!(is_not_modified(Some("*"), &url));
        assert!(!is_not_modified(Some("\"nope\""), &url));
        assert!(!is_not_modified(None, &url));
    }
}
