//! SQLite-backed store with a local read cache.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::io::{AsyncWrite, AsyncWriteExt};
use tokio::sync::RwLock;
use tokio::task::JoinHandle;

use super::artifacts::{Artifact, artifact_id};
use super::connection::ArtifactDb;
use super::disk::{self, DiskCache};
use super::{Store, is_reduction, stored_file_name};
use crate::error::ErrorHook;
use crate::repository::ReductionRepository;
use crate::url::{ResourceKey, UrlCodec, parse_key};
use crate::Error;

/// Artifacts live in the database; reads go through a [`DiskCache`].
///
/// Cache failures never fail a request. They are reported to the
/// [`ErrorHook`] and the database answers instead.
pub struct DurableStore {
    db: ArtifactDb,
    cache: Arc<DiskCache>,
    codec: Arc<UrlCodec>,
    repository: Arc<ReductionRepository>,
    hook: Arc<dyn ErrorHook>,
    /// Bumped by every flush. A read that started in an older generation must
    /// not repopulate the cache, or it would resurrect an evicted file.
    generation: RwLock<u64>,
}

impl DurableStore {
    pub fn new(
        db: ArtifactDb, cache: Arc<DiskCache>, codec: Arc<UrlCodec>, repository: Arc<ReductionRepository>,
        hook: Arc<dyn ErrorHook>,
    ) -> Self {
        Self { db, cache, codec, repository, hook, generation: RwLock::new(0) }
    }

    pub fn cache(&self) -> &Arc<DiskCache> {
        &self.cache
    }

    /// Stored row for `url`, including expired ones.
    pub async fn artifact(&self, url: &str) -> Result<Option<Artifact>, Error> {
        let name = stored_file_name(url)?;
        self.db.get_artifact(&artifact_id(name)).await
    }

    /// Start the background sweep that purges cache files idle for `window`.
    pub fn spawn_purge(&self, interval: Duration, window: Duration) -> JoinHandle<()> {
        disk::spawn_purge(Arc::clone(&self.cache), interval, window, Arc::clone(&self.hook))
    }
}

#[async_trait]
impl Store for DurableStore {
    async fn save(&self, content: &[u8], url: &str, original_urls: &str) -> Result<(), Error> {
        let name = stored_file_name(url)?;
        let key = parse_key(url);

        self.db.upsert_artifact(&Artifact::new(key, name, content, original_urls)).await?;

        if let Err(err) = self.cache.write(name, content).await {
            self.hook.report(&err);
        }
        if is_reduction(url) {
            self.repository.add_reduction_by_key(key, url);
        }

        tracing::info!(url, %key, bytes = content.len(), "saved artifact");
        Ok(())
    }

    async fn send_content(&self, url: &str, sink: &mut (dyn AsyncWrite + Unpin + Send)) -> Result<bool, Error> {
        let name = stored_file_name(url)?;

        match self.cache.read(name).await {
            Ok(Some(bytes)) => {
                sink.write_all(&bytes).await?;
                return Ok(true);
            }
            Ok(None) => {}
            Err(err) => self.hook.report(&err),
        }

        let started = *self.generation.read().await;
        let Some(bytes) = self.db.get_live_content(&artifact_id(name)).await? else {
            tracing::debug!(url, "artifact not found");
            return Ok(false);
        };

        sink.write_all(&bytes).await?;

        // Held across the write so a flush cannot evict in between.
        let generation = self.generation.read().await;
        if *generation != started {
            tracing::debug!(url, "flushed during read, cache not repopulated");
        } else if let Err(err) = self.cache.write(name, &bytes).await {
            self.hook.report(&err);
        }
        Ok(true)
    }

    async fn flush(&self, key: ResourceKey) -> Result<(), Error> {
        let expired = self.db.expire_artifacts(key).await?;
        let names = self.db.file_names_for_key(key).await?;

        let mut generation = self.generation.write().await;
        *generation += 1;
        for name in names {
            if let Err(err) = self.cache.evict(&name).await {
                self.hook.report(&err);
            }
        }
        drop(generation);
        self.repository.remove_reduction(key);

        tracing::info!(%key, expired, "flushed artifacts");
        Ok(())
    }

    async fn saved_urls(&self) -> Result<HashMap<ResourceKey, String>, Error> {
        let mut saved = HashMap::new();

        // Oldest first, so the newest file per key is inserted last.
        for file in self.db.live_files().await? {
            match file.resource_key.parse::<ResourceKey>() {
                Ok(key) if !key.is_nil() => {
                    saved.insert(key, self.codec.url_for_file_name(&file.file_name));
                }
                _ => tracing::warn!(file = %file.file_name, "skipping artifact with invalid resource key"),
            }
        }

        Ok(saved)
    }
}
