//! Streaming HTML rewriting.
//!
//! ### Pipeline
//! - [`TagRewriter`] finds the first delimited region in a byte stream.
//! - [`ResponseTransformer`] rewrites resource references inside it.
//! - [`ResponseFilter`] wires the two together for `<head>` regions.

pub mod filter;
pub mod rewriter;
pub mod transformer;

pub use filter::{HEAD_END, HEAD_START, ResponseFilter};
pub use rewriter::{BoxError, Delimiter, RegionTransform, RewriteError, State, TagRewriter};
pub use transformer::{ReductionRequester, ResponseTransformer, TagPattern};
