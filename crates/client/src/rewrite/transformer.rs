//! Resource reference rewriting for a captured head region.
//!
//! ### Matching
//! - Stylesheets: `<link>` tags with `rel=stylesheet` or `type=text/css`.
//! - Scripts: `<script src=...></script>` with an empty body.
//!
//! Matches are taken in document order. Their urls, joined with `::`, form
//! the repository lookup key, so the same set in another order is a
//! different bundle.
//!
//! ### Substitution
//! On a hit the first tag keeps its markup with the url swapped for the
//! produced url, and every other matched tag is removed. On a miss nothing
//! changes and the miss is handed to the [`ReductionRequester`], if any.

use std::borrow::Cow;
use std::ops::Range;
use std::sync::{Arc, LazyLock};

use reducer_core::{ReductionRepository, ResourceKind, join_urls};
use regex::bytes::Regex;
use url::Url;

// Patterns run over raw bytes with Unicode off (`(?-u)`), so any ASCII
// compatible charset matches and non-ASCII bytes are carried through as is.

static LINK_TAG: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?is-u)<link\b[^>]*>").expect("invalid link regex"));

static STYLESHEET: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?i-u)\brel\s*=\s*["']?[^"'>]*\bstylesheet\b|\btype\s*=\s*["']?\s*text/css\b"#)
        .expect("invalid stylesheet regex")
});

static HREF: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?i-u)\bhref\s*=\s*(?:"([^"]*)"|'([^']*)'|([^\s"'>]+))"#).expect("invalid href regex")
});

static SCRIPT_TAG: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?is-u)<script\b[^>]*\bsrc\s*=[^>]*>\s*</script\s*>").expect("invalid script regex")
});

static SRC: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?i-u)\bsrc\s*=\s*(?:"([^"]*)"|'([^']*)'|([^\s"'>]+))"#).expect("invalid src regex")
});

/// Receives bundles that had no reduction yet.
pub trait ReductionRequester: Send + Sync {
    fn request(&self, url_list: &str, kind: ResourceKind);
}

/// How to find references of one resource kind.
#[derive(Debug, Clone)]
pub struct TagPattern {
    kind: ResourceKind,
    tag: &'static Regex,
    filter: Option<&'static Regex>,
    url: &'static Regex,
}

#[derive(Debug)]
struct TagMatch<'a> {
    tag: Range<usize>,
    href: &'a [u8],
    url: Range<usize>,
}

impl TagPattern {
    pub fn stylesheet() -> Self {
        Self { kind: ResourceKind::Css, tag: &*LINK_TAG, filter: Some(&*STYLESHEET), url: &*HREF }
    }

    pub fn script() -> Self {
        Self { kind: ResourceKind::JavaScript, tag: &*SCRIPT_TAG, filter: None, url: &*SRC }
    }

    /// Pattern for `kind`; sprites are not referenced by tags.
    pub fn for_kind(kind: ResourceKind) -> Option<Self> {
        match kind {
            ResourceKind::Css => Some(Self::stylesheet()),
            ResourceKind::JavaScript => Some(Self::script()),
            ResourceKind::Sprite => None,
        }
    }

    pub fn kind(&self) -> ResourceKind {
        self.kind
    }

    fn matches<'a>(&self, region: &'a [u8]) -> Vec<TagMatch<'a>> {
        self.tag
            .find_iter(region)
            .filter(|m| self.filter.is_none_or(|f| f.is_match(m.as_bytes())))
            .filter_map(|m| {
                let caps = self.url.captures(m.as_bytes())?;
                let group = caps.get(1).or_else(|| caps.get(2)).or_else(|| caps.get(3))?;
                if group.as_bytes().trim_ascii().is_empty() {
                    return None;
                }
                let url = m.start() + group.start()..m.start() + group.end();
                Some(TagMatch { tag: m.range(), href: &region[url.clone()], url })
            })
            .collect()
    }
}

/// Rewrites resource references in head markup using the reduction repository.
pub struct ResponseTransformer {
    repository: Arc<ReductionRepository>,
    patterns: Vec<TagPattern>,
    base_url: Option<Url>,
    requester: Option<Arc<dyn ReductionRequester>>,
}

impl ResponseTransformer {
    pub fn new(repository: Arc<ReductionRepository>, kinds: &[ResourceKind]) -> Self {
        let patterns = kinds.iter().filter_map(|kind| TagPattern::for_kind(*kind)).collect();
        Self { repository, patterns, base_url: None, requester: None }
    }

    /// Resolve relative references against `base` before keying.
    pub fn with_base_url(mut self, base: Url) -> Self {
        self.base_url = Some(base);
        self
    }

    pub fn with_requester(mut self, requester: Arc<dyn ReductionRequester>) -> Self {
        self.requester = Some(requester);
        self
    }

    /// Rewrite a captured region in any ASCII-compatible encoding.
    ///
    /// Bytes outside the matched tags are copied unchanged.
    pub fn rewrite_region(&self, region: &[u8]) -> Vec<u8> {
        let mut current = Cow::Borrowed(region);
        for pattern in &self.patterns {
            if let Some(rewritten) = self.apply(pattern, &current) {
                current = Cow::Owned(rewritten);
            }
        }
        current.into_owned()
    }

    pub fn rewrite_text(&self, text: &str) -> String {
        String::from_utf8_lossy(&self.rewrite_region(text.as_bytes())).into_owned()
    }

    fn apply(&self, pattern: &TagPattern, region: &[u8]) -> Option<Vec<u8>> {
        let matches = pattern.matches(region);
        if matches.is_empty() {
            return None;
        }

        let urls: Vec<String> = matches.iter().map(|m| self.resolve(m.href)).collect();
        let url_list = join_urls(&urls);

        let Some(produced) = self.repository.find_reduction(&url_list) else {
            tracing::debug!(kind = %pattern.kind(), tags = matches.len(), "no reduction yet");
            if let Some(requester) = &self.requester {
                requester.request(&url_list, pattern.kind());
            }
            return None;
        };

        let mut out = Vec::with_capacity(region.len());
        let mut cursor = 0;
        for (i, m) in matches.iter().enumerate() {
            out.extend_from_slice(&region[cursor..m.tag.start]);
            if i == 0 {
                out.extend_from_slice(&region[m.tag.start..m.url.start]);
                out.extend_from_slice(produced.as_bytes());
                out.extend_from_slice(&region[m.url.end..m.tag.end]);
            }
            cursor = m.tag.end;
        }
        out.extend_from_slice(&region[cursor..]);

        tracing::debug!(kind = %pattern.kind(), tags = matches.len(), %produced, "references reduced");
        Some(out)
    }

    fn resolve(&self, href: &[u8]) -> String {
        let href = String::from_utf8_lossy(href.trim_ascii()).replace("&amp;", "&");
        match &self.base_url {
            Some(base) => base.join(&href).map(|u| u.to_string()).unwrap_or(href),
            None => href,
        }
    }
}
