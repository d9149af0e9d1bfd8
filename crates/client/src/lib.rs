//! Client code for the request reducer.
//!
//! This crate provides the streaming HTML rewriter, the reducing queue and
//! the HTTP fetch pipeline it uses for original resources.

pub mod fetch;
pub mod reduce;
pub mod rewrite;

pub use fetch::{FetchClient, FetchConfig, FetchResponse, ResourceFetcher};
pub use reduce::{Minifier, PassthroughMinifier, QueueDeps, QueueFailure, QueueItem, ReducingQueue};
pub use rewrite::{
    Delimiter, ReductionRequester, ResponseFilter, ResponseTransformer, RewriteError, TagRewriter,
};
