//! Minification seam.

use reducer_core::{Error, ResourceKind};

/// Turns combined resource text into its minified form.
///
/// Engines plug in here; the queue only needs text in, text out.
pub trait Minifier: Send + Sync {
    fn minify(&self, kind: ResourceKind, text: &str) -> Result<String, Error>;
}

/// Returns text unchanged. Sprites are rejected.
#[derive(Debug, Default, Clone, Copy)]
pub struct PassthroughMinifier;

impl Minifier for PassthroughMinifier {
    fn minify(&self, kind: ResourceKind, text: &str) -> Result<String, Error> {
        match kind {
            ResourceKind::Css | ResourceKind::JavaScript => Ok(text.to_string()),
            ResourceKind::Sprite => Err(Error::Minify("sprites are not text resources".to_string())),
        }
    }
}
