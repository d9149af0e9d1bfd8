//! Directory-backed artifact storage.
//!
//! [`LocalDiskStore`] is a complete [`Store`]; [`DiskCache`] is the read cache
//! in front of the durable store and tracks when each file was last touched
//! so [`spawn_purge`] can evict files nobody reads anymore.

use std::collections::HashMap;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant, SystemTime};

use async_trait::async_trait;
use dashmap::DashMap;
use tokio::fs;
use tokio::io::{AsyncWrite, AsyncWriteExt};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

use super::{Store, is_reduction, stored_file_name};
use crate::error::ErrorHook;
use crate::repository::ReductionRepository;
use crate::url::{ResourceKey, UrlCodec, parse_key};
use crate::Error;

/// Flushed files are renamed with this prefix instead of deleted.
pub const EXPIRED_PREFIX: &str = "Expired-";

const TMP_SUFFIX: &str = ".tmp";

fn tmp_path(path: &Path) -> PathBuf {
    let mut name = path.as_os_str().to_owned();
    name.push(TMP_SUFFIX);
    PathBuf::from(name)
}

/// Write via a sibling temp file so readers never see a partial artifact.
async fn write_atomic(path: &Path, content: &[u8]) -> std::io::Result<()> {
    let tmp = tmp_path(path);
    fs::write(&tmp, content).await?;
    fs::rename(&tmp, path).await
}

async fn read_optional(path: &Path) -> std::io::Result<Option<Vec<u8>>> {
    match fs::read(path).await {
        Ok(bytes) => Ok(Some(bytes)),
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
        Err(e) => Err(e),
    }
}

fn is_live_name(name: &str) -> bool {
    !name.starts_with(EXPIRED_PREFIX) && !name.ends_with(TMP_SUFFIX)
}

/// Artifact store that keeps every artifact as a file in one directory.
#[derive(Debug)]
pub struct LocalDiskStore {
    dir: PathBuf,
    codec: Arc<UrlCodec>,
    repository: Arc<ReductionRepository>,
}

impl LocalDiskStore {
    /// Open (creating if needed) a store rooted at `dir`.
    pub async fn open(
        dir: impl Into<PathBuf>, codec: Arc<UrlCodec>, repository: Arc<ReductionRepository>,
    ) -> Result<Self, Error> {
        let dir = dir.into();
        fs::create_dir_all(&dir).await?;
        Ok(Self { dir, codec, repository })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }
}

#[async_trait]
impl Store for LocalDiskStore {
    async fn save(&self, content: &[u8], url: &str, _original_urls: &str) -> Result<(), Error> {
        let name = stored_file_name(url)?;
        write_atomic(&self.dir.join(name), content).await?;

        if is_reduction(url) {
            self.repository.add_reduction_by_key(parse_key(url), url);
        }

        tracing::info!(url, bytes = content.len(), "saved artifact to disk");
        Ok(())
    }

    async fn send_content(&self, url: &str, sink: &mut (dyn AsyncWrite + Unpin + Send)) -> Result<bool, Error> {
        let name = stored_file_name(url)?;
        match read_optional(&self.dir.join(name)).await? {
            Some(bytes) => {
                sink.write_all(&bytes).await?;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn flush(&self, key: ResourceKey) -> Result<(), Error> {
        let mut entries = fs::read_dir(&self.dir).await?;
        let mut expired = 0usize;

        while let Some(entry) = entries.next_entry().await? {
            let Ok(name) = entry.file_name().into_string() else {
                continue;
            };
            if !is_live_name(&name) || (!key.is_nil() && parse_key(&name) != key) {
                continue;
            }

            fs::rename(entry.path(), self.dir.join(format!("{EXPIRED_PREFIX}{name}"))).await?;
            expired += 1;
        }

        self.repository.remove_reduction(key);
        tracing::info!(%key, expired, "flushed disk artifacts");
        Ok(())
    }

    async fn saved_urls(&self) -> Result<HashMap<ResourceKey, String>, Error> {
        let mut entries = fs::read_dir(&self.dir).await?;
        let mut newest: HashMap<ResourceKey, (SystemTime, String)> = HashMap::new();

        while let Some(entry) = entries.next_entry().await? {
            let Ok(name) = entry.file_name().into_string() else {
                continue;
            };
            let key = parse_key(&name);
            if !is_live_name(&name) || key.is_nil() {
                continue;
            }

            let modified = entry.metadata().await?.modified()?;
            match newest.get(&key) {
                Some((seen, _)) if *seen >= modified => {}
                _ => {
                    newest.insert(key, (modified, name));
                }
            }
        }

        Ok(newest
            .into_iter()
            .map(|(key, (_, name))| (key, self.codec.url_for_file_name(&name)))
            .collect())
    }
}

/// Local read cache in front of the durable store.
///
/// Every write and every hit refreshes the file's last-access time.
#[derive(Debug)]
pub struct DiskCache {
    dir: PathBuf,
    last_access: DashMap<String, Instant>,
}

impl DiskCache {
    /// Open (creating if needed) a cache at `dir`. Files already present are
    /// tracked as if just accessed, so they become purgeable.
    pub async fn open(dir: impl Into<PathBuf>) -> Result<Self, Error> {
        let dir = dir.into();
        fs::create_dir_all(&dir).await?;

        let last_access = DashMap::new();
        let mut entries = fs::read_dir(&dir).await?;
        while let Some(entry) = entries.next_entry().await? {
            if let Ok(name) = entry.file_name().into_string()
                && is_live_name(&name)
            {
                last_access.insert(name, Instant::now());
            }
        }

        tracing::debug!(dir = %dir.display(), tracked = last_access.len(), "opened disk cache");
        Ok(Self { dir, last_access })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub async fn write(&self, file_name: &str, content: &[u8]) -> Result<(), Error> {
        write_atomic(&self.dir.join(file_name), content).await?;
        self.last_access.insert(file_name.to_string(), Instant::now());
        Ok(())
    }

    pub async fn read(&self, file_name: &str) -> Result<Option<Vec<u8>>, Error> {
        let bytes = read_optional(&self.dir.join(file_name)).await?;
        match bytes {
            Some(_) => {
                self.last_access.insert(file_name.to_string(), Instant::now());
            }
            None => {
                self.last_access.remove(file_name);
            }
        }
        Ok(bytes)
    }

    /// Delete a cached file. Returns whether a file was removed.
    pub async fn evict(&self, file_name: &str) -> Result<bool, Error> {
        self.last_access.remove(file_name);
        match fs::remove_file(self.dir.join(file_name)).await {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(false),
            Err(e) => Err(e.into()),
        }
    }

    pub fn is_tracked(&self, file_name: &str) -> bool {
        self.last_access.contains_key(file_name)
    }

    pub fn tracked(&self) -> usize {
        self.last_access.len()
    }

    /// Delete every file not accessed within `window`.
    ///
    /// A failed deletion does not stop the sweep. The file stays tracked so the
    /// next sweep retries it, and its error is returned in the report.
    pub async fn purge_stale(&self, window: Duration) -> PurgeReport {
        let stale: Vec<String> = self
            .last_access
            .iter()
            .filter(|entry| entry.value().elapsed() >= window)
            .map(|entry| entry.key().clone())
            .collect();

        let mut report = PurgeReport::default();
        for name in stale {
            // Re-check: a request may have touched it since the scan.
            let Some((name, accessed)) = self.last_access.remove_if(&name, |_, at| at.elapsed() >= window) else {
                continue;
            };

            match fs::remove_file(self.dir.join(&name)).await {
                Ok(()) => report.purged += 1,
                Err(e) if e.kind() == ErrorKind::NotFound => {}
                Err(e) => {
                    tracing::warn!(file = %name, error = %e, "failed to purge cache file");
                    self.last_access.insert(name, accessed);
                    report.errors.push(e.into());
                }
            }
        }

        if report.purged > 0 {
            tracing::debug!(purged = report.purged, failed = report.errors.len(), "purged stale cache files");
        }
        report
    }
}

/// Outcome of one [`DiskCache::purge_stale`] sweep.
#[derive(Debug, Default)]
pub struct PurgeReport {
    pub purged: usize,
    /// One entry per file that could not be deleted.
    pub errors: Vec<Error>,
}

/// Run [`DiskCache::purge_stale`] every `interval` until the task is aborted.
///
/// Failures go to `hook`; the timer keeps running.
pub fn spawn_purge(
    cache: Arc<DiskCache>, interval: Duration, window: Duration, hook: Arc<dyn ErrorHook>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        // The first tick completes immediately.
        ticker.tick().await;

        loop {
            ticker.tick().await;
            for err in cache.purge_stale(window).await.errors {
                hook.report(&err);
            }
        }
    })
}
