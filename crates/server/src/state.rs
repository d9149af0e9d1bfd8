//! Process-wide state shared by every tool call.
//!
//! Built once at boot: the reduction repository, one store for the configured
//! backend, and the reducing queue. The durable backend also
//! owns the purge task for its disk cache.

use std::sync::Arc;

use reducer_client::{PassthroughMinifier, QueueDeps, ReducingQueue, ResourceFetcher};
use reducer_core::{
    AppConfig, ArtifactDb, DiskCache, DurableStore, Error, ErrorHook, LocalDiskStore, ReductionRepository,
    Store, StoreBackend, TracingErrorHook,
};
use tokio::task::JoinHandle;

pub struct AppState {
    pub config: AppConfig,
    pub repository: Arc<ReductionRepository>,
    pub store: Arc<dyn Store>,
    /// Present for the durable backend; keeps expired artifacts for lookup.
    pub durable: Option<Arc<DurableStore>>,
    pub queue: Arc<ReducingQueue>,
    purge: Option<JoinHandle<()>>,
}

impl AppState {
    /// Open the configured store, warm the repository from it and start the queue.
    pub async fn build(config: AppConfig, fetcher: Arc<dyn ResourceFetcher>) -> Result<Self, Error> {
        let codec = Arc::new(config.url_codec());
        let repository = Arc::new(ReductionRepository::new());
        let hook: Arc<dyn ErrorHook> = Arc::new(TracingErrorHook);

        let (store, durable, purge) = match config.store {
            StoreBackend::Local => {
                let store = LocalDiskStore::open(&config.cache_dir, Arc::clone(&codec), Arc::clone(&repository)).await?;
                (Arc::new(store) as Arc<dyn Store>, None, None)
            }
            StoreBackend::Durable => {
                let db = ArtifactDb::open(&config.db_path).await?;
                let cache = Arc::new(DiskCache::open(&config.cache_dir).await?);
                let store = Arc::new(DurableStore::new(
                    db,
                    cache,
                    Arc::clone(&codec),
                    Arc::clone(&repository),
                    Arc::clone(&hook),
                ));
                let purge = store.spawn_purge(config.purge_interval(), config.purge_window());
                (Arc::clone(&store) as Arc<dyn Store>, Some(store), Some(purge))
            }
        };

        let warmed = repository.warm(store.saved_urls().await?);
        tracing::info!(backend = ?config.store, warmed, "store ready");

        let queue = ReducingQueue::start(QueueDeps {
            fetcher,
            minifier: Arc::new(PassthroughMinifier),
            codec: Arc::clone(&codec),
            store: Arc::clone(&store),
            repository: Arc::clone(&repository),
            hook,
            failure_history: config.failure_history,
            max_failed_attempts: config.max_failed_attempts,
            failure_cooldown: config.failure_cooldown(),
        });

        Ok(Self { config, repository, store, durable, queue: Arc::new(queue), purge })
    }
}

impl Drop for AppState {
    fn drop(&mut self) {
        if let Some(purge) = self.purge.take() {
            purge.abort();
        }
    }
}


#[cfg(test)]
mod tests {
    use super::test_support::*;
    use super::*;

    #[tokio::test]
    async fn test_build_local() {
        let dir = tempfile::tempdir().unwrap();
        let state = state(dir.path(), StoreBackend::Local).await;
        assert!(state.durable.is_none());
        assert!(state.repository.is_empty());
    }

    #[tokio::test]
    async fn test_build_durable_warms_repository() {
        let dir = tempfile::tempdir().unwrap();
        let list = "http://site.test/a.css::http://site.test/b.css";
        {
            let state = state(dir.path(), StoreBackend::Durable).await;
            assert!(state.durable.is_some());
            assert!(state.queue.enqueue(list, reducer_core::ResourceKind::Css));
            wait_idle(&state).await;
            assert!(state.repository.find_reduction(list).is_some());
        }

        let restarted = state(dir.path(), StoreBackend::Durable).await;
        assert_eq!(restarted.repository.len(), 1);
        assert!(restarted.repository.find_reduction(list).is_some());
    }
}
