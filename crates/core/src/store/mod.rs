//! Artifact stores.
//!
//! Two implementations of [`Store`]:
//!
//! - [`LocalDiskStore`] keeps artifacts as files in one directory and expires
//!   them by renaming.
//! - [`DurableStore`] persists artifacts in SQLite and serves them through a
//!   [`DiskCache`] whose files are purged when not read within a window.
//!
//! Both register `(key, url)` in the shared [`ReductionRepository`] on save
//! (sprites excepted) and drop repository entries on flush.
//!
//! [`ReductionRepository`]: crate::ReductionRepository

use std::collections::HashMap;

use async_trait::async_trait;
use tokio::io::AsyncWrite;

use crate::Error;
use crate::url::ResourceKey;

pub mod artifacts;
pub mod connection;
pub mod disk;
pub mod durable;
pub mod migrations;

pub use artifacts::{Artifact, MAX_FILE_NAME_LEN, artifact_id};
pub use connection::ArtifactDb;
pub use disk::{DiskCache, EXPIRED_PREFIX, LocalDiskStore, PurgeReport, spawn_purge};
pub use durable::DurableStore;

/// Persists produced artifacts and serves them by url.
#[async_trait]
pub trait Store: Send + Sync {
    /// Persist `content` under the file name encoded in `url`.
    async fn save(&self, content: &[u8], url: &str, original_urls: &str) -> Result<(), Error>;

    /// Write the artifact for `url` to `sink`. Returns `false` if it is absent or expired.
    async fn send_content(&self, url: &str, sink: &mut (dyn AsyncWrite + Unpin + Send)) -> Result<bool, Error>;

    /// Expire every artifact of `key`, or of all keys for [`ResourceKey::NIL`].
    async fn flush(&self, key: ResourceKey) -> Result<(), Error>;

    /// Latest live url per key, for warming a fresh repository.
    async fn saved_urls(&self) -> Result<HashMap<ResourceKey, String>, Error>;
}

/// File name encoded in a produced url, checked for use as a local path.
pub(crate) fn stored_file_name(url: &str) -> Result<&str, Error> {
    let name = crate::url::parse_file_name(url)
        .ok_or_else(|| Error::InvalidInput(format!("url has no file name: {url:?}")))?;

    if name.contains(['\\', '\0']) || name.starts_with('.') || name.starts_with(EXPIRED_PREFIX) {
        return Err(Error::InvalidInput(format!("unsafe file name: {name:?}")));
    }
    if name.chars().count() > MAX_FILE_NAME_LEN {
        return Err(Error::FileNameTooLong(name.to_string()));
    }

    Ok(name)
}

/// Whether an artifact at `url` belongs in the reduction repository.
pub(crate) fn is_reduction(url: &str) -> bool {
    !url.to_ascii_lowercase().ends_with(".png")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stored_file_name() {
        assert_eq!(stored_file_name("http://host/r/abc-def-x.css").unwrap(), "abc-def-x.css");
        assert!(matches!(stored_file_name("http://host/r/"), Err(Error::InvalidInput(_))));
        assert!(matches!(stored_file_name("http://host/r/.."), Err(Error::InvalidInput(_))));
        assert!(matches!(stored_file_name("http://host/r/Expired-x.css"), Err(Error::InvalidInput(_))));
        let long = format!("http://host/r/{}", "a".repeat(151));
        assert!(matches!(stored_file_name(&long), Err(Error::FileNameTooLong(_))));
    }

    #[test]
    fn test_is_reduction() {
        assert!(is_reduction("http://host/r/a-b-RequestReducedStyle.css"));
        assert!(!is_reduction("http://host/r/a-b.PNG"));
    }
}
