//! Reduction of resource bundles.
//!
//! Misses from the transformer land on the [`ReducingQueue`], which fetches
//! each original, combines and minifies them, and saves the artifact so the
//! next response hits the repository.

pub mod minify;
pub mod queue;

pub use minify::{Minifier, PassthroughMinifier};
pub use queue::{QueueDeps, QueueFailure, QueueItem, ReducingQueue};
