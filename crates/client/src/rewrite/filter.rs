//! Response body filter for HTML pages.

use std::io::Write;
use std::sync::Arc;

use super::rewriter::{BoxError, Delimiter, RegionTransform, RewriteError, TagRewriter};
use super::transformer::ResponseTransformer;

pub const HEAD_START: &str = "<head";
pub const HEAD_END: &str = "</head>";

/// Rewrites the `<head>` of HTML responses through a [`ResponseTransformer`].
#[derive(Clone)]
pub struct ResponseFilter {
    transformer: Arc<ResponseTransformer>,
    start: Delimiter,
    end: Delimiter,
}

impl ResponseFilter {
    pub fn new(transformer: Arc<ResponseTransformer>) -> Result<Self, RewriteError> {
        Ok(Self { transformer, start: Delimiter::new(HEAD_START)?, end: Delimiter::new(HEAD_END)? })
    }

    /// Only successful `text/html` responses are rewritten.
    pub fn is_filterable(status: u16, content_type: Option<&str>) -> bool {
        status == 200
            && content_type
                .and_then(|ct| ct.split(';').next())
                .is_some_and(|mime| mime.trim().eq_ignore_ascii_case("text/html"))
    }

    /// Wrap a response body sink.
    pub fn wrap<W: Write>(&self, sink: W) -> TagRewriter<W, impl RegionTransform + use<W>> {
        let transformer = Arc::clone(&self.transformer);
        TagRewriter::new(sink, self.start.clone(), self.end.clone(), move |region: &[u8]| -> Result<Vec<u8>, BoxError> {
            Ok(transformer.rewrite_region(region))
        })
    }

    /// Rewrite a complete document fed in chunks of `chunk_size` bytes.
    pub fn rewrite_document(&self, html: &[u8], chunk_size: usize) -> Result<Vec<u8>, RewriteError> {
        let mut rewriter = self.wrap(Vec::with_capacity(html.len()));
        for chunk in html.chunks(chunk_size.max(1)) {
            rewriter.feed(chunk)?;
        }
        rewriter.close()?;
        Ok(rewriter.into_inner())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use reducer_core::{ReductionRepository, ResourceKind};

    fn filter() -> ResponseFilter {
        let repository = Arc::new(ReductionRepository::new());
        repository.add_reduction("/a.css::/b.css", "/reduced/k-s-RequestReducedStyle.css");
        let transformer = ResponseTransformer::new(repository, &[ResourceKind::Css]);
        ResponseFilter::new(Arc::new(transformer)).unwrap()
    }

    const PAGE: &str = "<!doctype html><html><head lang=en>\
        <link rel=\"stylesheet\" href=\"/a.css\"><link rel=\"stylesheet\" href=\"/b.css\">\
        </head><body><link rel=\"stylesheet\" href=\"/a.css\"></body></html>";

    const REWRITTEN: &str = "<!doctype html><html><head lang=en>\
        <link rel=\"stylesheet\" href=\"/reduced/k-s-RequestReducedStyle.css\">\
        </head><body><link rel=\"stylesheet\" href=\"/a.css\"></body></html>";

    #[test]
    fn test_is_filterable() {
        assert!(ResponseFilter::is_filterable(200, Some("text/html")));
        assert!(ResponseFilter::is_filterable(200, Some("Text/HTML; charset=utf-8")));
        assert!(!ResponseFilter::is_filterable(404, Some("text/html")));
        assert!(!ResponseFilter::is_filterable(200, Some("application/json")));
        assert!(!ResponseFilter::is_filterable(200, None));
    }

    #[test]
    fn test_rewrites_head_only() {
        let out = filter().rewrite_document(PAGE.as_bytes(), 4096).unwrap();
        assert_eq!(String::from_utf8(out).unwrap(), REWRITTEN);
    }

    #[test]
    fn test_chunking_does_not_change_output() {
        let f = filter();
        for size in [1, 2, 5, 7, 13, 64] {
            let out = f.rewrite_document(PAGE.as_bytes(), size).unwrap();
            assert_eq!(String::from_utf8(out).unwrap(), REWRITTEN, "chunk size {size}");
        }
    }

    #[test]
    fn test_no_head_passthrough() {
        let body = b"<html><body>hi</body></html>";
        assert_eq!(filter().rewrite_document(body, 3).unwrap(), body);
    }
}
