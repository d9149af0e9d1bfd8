//! Core types and shared functionality for the request reducer.
//!
//! This crate provides:
//! - Content fingerprints and the produced-url codec
//! - The in-memory reduction repository
//! - Artifact stores (local directory, SQLite with a purged disk cache)
//! - Unified error types
//! - Configuration structures

pub mod config;
pub mod error;
pub mod fingerprint;
pub mod http;
pub mod repository;
pub mod store;
pub mod url;

pub use config::{AppConfig, ConfigError, StoreBackend};
pub use error::{Error, ErrorHook, TracingErrorHook};
pub use fingerprint::Fingerprint;
pub use repository::{ReductionRepository, join_urls};
pub use store::{ArtifactDb, DiskCache, DurableStore, LocalDiskStore, Store};
pub use url::{ResourceKey, ResourceKind, UrlCodec};
