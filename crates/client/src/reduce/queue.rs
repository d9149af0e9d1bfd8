//! Background reduction of bundles that missed the repository.
//!
//! One worker task drains an unbounded channel. A key is accepted only if it
//! has no reduction yet and is not already queued or running, so each bundle
//! is reduced at most once at a time. A key that keeps failing is put on hold
//! for a cooldown instead of being fetched again on every page view.

use std::collections::VecDeque;
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use dashmap::{DashMap, DashSet};
use reducer_core::repository::URL_LIST_SEPARATOR;
use reducer_core::{Error, ErrorHook, ReductionRepository, ResourceKey, ResourceKind, Store, UrlCodec};
use serde::Serialize;
use tokio::sync::{RwLock, mpsc};

use super::minify::Minifier;
use crate::fetch::ResourceFetcher;
use crate::rewrite::ReductionRequester;

/// Collaborators the worker needs.
pub struct QueueDeps {
    pub fetcher: Arc<dyn ResourceFetcher>,
    pub minifier: Arc<dyn Minifier>,
    pub codec: Arc<UrlCodec>,
    pub store: Arc<dyn Store>,
    pub repository: Arc<ReductionRepository>,
    pub hook: Arc<dyn ErrorHook>,
    /// Failures kept for inspection; older ones are dropped.
    pub failure_history: usize,
    /// Consecutive failures after which a key is refused until the cooldown passes.
    pub max_failed_attempts: u32,
    pub failure_cooldown: Duration,
}

/// A bundle waiting for or undergoing reduction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct QueueItem {
    pub key: ResourceKey,
    pub url_list: String,
    pub kind: ResourceKind,
    pub enqueued_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize)]
pub struct QueueFailure {
    pub item: QueueItem,
    pub error: String,
    pub failed_at: DateTime<Utc>,
}

struct Shared {
    deps: QueueDeps,
    in_flight: DashSet<ResourceKey>,
    /// Consecutive failure count and time of the last failure, per key.
    strikes: DashMap<ResourceKey, (u32, Instant)>,
    current: RwLock<Option<QueueItem>>,
    failures: RwLock<VecDeque<QueueFailure>>,
}

/// Handle to the reduction worker.
pub struct ReducingQueue {
    shared: Arc<Shared>,
    tx: mpsc::UnboundedSender<QueueItem>,
}

impl ReducingQueue {
    /// Spawn the worker on the current tokio runtime.
    pub fn start(deps: QueueDeps) -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        let shared = Arc::new(Shared {
            deps,
            in_flight: DashSet::new(),
            strikes: DashMap::new(),
            current: RwLock::new(None),
            failures: RwLock::new(VecDeque::new()),
        });

        tokio::spawn(run(Arc::clone(&shared), rx));
        Self { shared, tx }
    }

    /// Queue a `::`-joined url list. Returns `false` if it was refused.
    pub fn enqueue(&self, url_list: &str, kind: ResourceKind) -> bool {
        if url_list.is_empty() || kind == ResourceKind::Sprite {
            return false;
        }

        let key = ResourceKey::for_urls(url_list);
        if self.shared.deps.repository.contains(key) || self.shared.on_hold(key) {
            return false;
        }
        if !self.shared.in_flight.insert(key) {
            return false;
        }

        let item = QueueItem { key, url_list: url_list.to_string(), kind, enqueued_at: Utc::now() };
        if self.tx.send(item).is_err() {
            self.shared.in_flight.remove(&key);
            tracing::warn!(%key, "reducing queue worker is gone");
            return false;
        }

        tracing::debug!(%key, %kind, "queued reduction");
        true
    }

    /// Item the worker is processing right now.
    pub async fn current_item(&self) -> Option<QueueItem> {
        self.shared.current.read().await.clone()
    }

    /// Recent failures, newest first.
    pub async fn failures(&self) -> Vec<QueueFailure> {
        self.shared.failures.read().await.iter().cloned().collect()
    }

    /// Keys refused until their failure cooldown passes.
    pub fn held(&self) -> usize {
        let deps = &self.shared.deps;
        self.shared
            .strikes
            .iter()
            .filter(|entry| {
                let (count, last) = *entry.value();
                count >= deps.max_failed_attempts && last.elapsed() < deps.failure_cooldown
            })
            .count()
    }

    /// Keys queued or running.
    pub fn in_flight(&self) -> usize {
        self.shared.in_flight.len()
    }
}

impl ReductionRequester for ReducingQueue {
    fn request(&self, url_list: &str, kind: ResourceKind) {
        self.enqueue(url_list, kind);
    }
}

async fn run(shared: Arc<Shared>, mut rx: mpsc::UnboundedReceiver<QueueItem>) {
    while let Some(item) = rx.recv().await {
        *shared.current.write().await = Some(item.clone());

        match shared.reduce(&item).await {
            Ok(_) => {
                shared.strikes.remove(&item.key);
            }
            Err(err) => {
                shared.deps.hook.report(&err);
                shared.strike(item.key);
                shared.record_failure(item.clone(), &err).await;
            }
        }

        *shared.current.write().await = None;
        shared.in_flight.remove(&item.key);
    }
    tracing::debug!("reducing queue stopped");
}

impl Shared {
    async fn reduce(&self, item: &QueueItem) -> Result<String, Error> {
        let mut contents = Vec::new();
        for url in item.url_list.split(URL_LIST_SEPARATOR) {
            contents.push(self.deps.fetcher.fetch_text(url).await?);
        }

        let minified = self.deps.minifier.minify(item.kind, &contents.join("\n"))?;
        let url = self.deps.codec.build_url(item.key, minified.as_bytes(), item.kind)?;
        self.deps.store.save(minified.as_bytes(), &url, &item.url_list).await?;

        tracing::info!(key = %item.key, kind = %item.kind, %url, bytes = minified.len(), "reduced bundle");
        Ok(url)
    }

    fn on_hold(&self, key: ResourceKey) -> bool {
        self.strikes.get(&key).is_some_and(|entry| {
            let (count, last) = *entry.value();
            count >= self.deps.max_failed_attempts && last.elapsed() < self.deps.failure_cooldown
        })
    }

    fn strike(&self, key: ResourceKey) {
        let mut entry = self.strikes.entry(key).or_insert((0, Instant::now()));
        entry.0 = entry.0.saturating_add(1);
        entry.1 = Instant::now();
        if entry.0 >= self.deps.max_failed_attempts {
            tracing::warn!(%key, failures = entry.0, cooldown = ?self.deps.failure_cooldown, "reduction on hold");
        }
    }

    async fn record_failure(&self, item: QueueItem, err: &Error) {
        let limit = self.deps.failure_history;
        if limit == 0 {
            return;
        }
        let mut failures = self.failures.write().await;
        failures.push_front(QueueFailure { item, error: err.to_string(), failed_at: Utc::now() });
        failures.truncate(limit);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reduce::PassthroughMinifier;
    use crate::rewrite::ResponseTransformer;
    use async_trait::async_trait;
    use reducer_core::{Fingerprint, LocalDiskStore};
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;
    use tokio::sync::Semaphore;

    struct StubFetcher {
        pages: HashMap<String, String>,
        gate: Option<Arc<Semaphore>>,
    }

    #[async_trait]
    impl ResourceFetcher for StubFetcher {
        async fn fetch_text(&self, url: &str) -> Result<String, Error> {
            if let Some(gate) = &self.gate {
                let _permit = gate.acquire().await.map_err(|e| Error::Fetch(e.to_string()))?;
            }
            self.pages.get(url).cloned().ok_or_else(|| Error::Fetch(format!("404 {url}")))
        }
    }

    #[derive(Default)]
    struct CountingHook(AtomicUsize);

    impl ErrorHook for CountingHook {
        fn report(&self, _err: &Error) {
            self.0.fetch_add(1, Ordering::SeqCst);
        }
    }

    struct Fixture {
        _dir: tempfile::TempDir,
        queue: Arc<ReducingQueue>,
        store: Arc<LocalDiskStore>,
        repository: Arc<ReductionRepository>,
        hook: Arc<CountingHook>,
    }

    async fn fixture(gate: Option<Arc<Semaphore>>, failure_history: usize) -> Fixture {
        fixture_with_hold(gate, failure_history, 3, Duration::from_secs(600)).await
    }

    async fn fixture_with_hold(
        gate: Option<Arc<Semaphore>>, failure_history: usize, max_failed_attempts: u32, failure_cooldown: Duration,
    ) -> Fixture {
        let dir = tempfile::tempdir().unwrap();
        let codec = Arc::new(UrlCodec::new("http://cdn.test", "/reduced"));
        let repository = Arc::new(ReductionRepository::new());
        let store = Arc::new(LocalDiskStore::open(dir.path(), Arc::clone(&codec), Arc::clone(&repository)).await.unwrap());
        let hook = Arc::new(CountingHook::default());
        let pages = HashMap::from([
            ("http://site.test/a.css".to_string(), "a{}".to_string()),
            ("http://site.test/b.css".to_string(), "b{}".to_string()),
            ("http://site.test/a.js".to_string(), "a()".to_string()),
        ]);

        let queue = ReducingQueue::start(QueueDeps {
            fetcher: Arc::new(StubFetcher { pages, gate }),
            minifier: Arc::new(PassthroughMinifier),
            codec,
            store: Arc::clone(&store) as Arc<dyn Store>,
            repository: Arc::clone(&repository),
            hook: Arc::clone(&hook) as Arc<dyn ErrorHook>,
            failure_history,
            max_failed_attempts,
            failure_cooldown,
        });

        Fixture { _dir: dir, queue: Arc::new(queue), store, repository, hook }
    }

    async fn wait_idle(queue: &ReducingQueue) {
        for _ in 0..300 {
            if queue.in_flight() == 0 {
                return;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!("queue did not drain");
    }

    const CSS_LIST: &str = "http://site.test/a.css::http://site.test/b.css";

    #[tokio::test]
    async fn test_reduces_and_registers() {
        let f = fixture(None, 10).await;

        assert!(f.queue.enqueue(CSS_LIST, ResourceKind::Css));
        wait_idle(&f.queue).await;

        let url = f.repository.find_reduction(CSS_LIST).unwrap();
        let mut content = Vec::new();
        assert!(f.store.send_content(&url, &mut content).await.unwrap());
        assert_eq!(content, b"a{}\nb{}");
        assert_eq!(reducer_core::url::parse_signature(&url), Fingerprint::of_bytes(&content).to_hex());
        assert_eq!(reducer_core::url::parse_key(&url), ResourceKey::for_urls(CSS_LIST));
        assert!(f.queue.failures().await.is_empty());
    }

    #[tokio::test]
    async fn test_refuses_duplicates() {
        let f = fixture(None, 10).await;

        assert!(f.queue.enqueue(CSS_LIST, ResourceKind::Css));
        assert!(!f.queue.enqueue(CSS_LIST, ResourceKind::Css));
        assert_eq!(f.queue.in_flight(), 1);

        wait_idle(&f.queue).await;
        assert!(!f.queue.enqueue(CSS_LIST, ResourceKind::Css));
    }

    #[tokio::test]
    async fn test_refuses_sprites_and_empty() {
        let f = fixture(None, 10).await;
        assert!(!f.queue.enqueue("", ResourceKind::Css));
        assert!(!f.queue.enqueue("http://site.test/s.png", ResourceKind::Sprite));
        assert_eq!(f.queue.in_flight(), 0);
    }

    #[tokio::test]
    async fn test_failure_recorded_and_retryable() {
        let f = fixture(None, 10).await;
        let list = "http://site.test/a.css::http://site.test/missing.css";

        assert!(f.queue.enqueue(list, ResourceKind::Css));
        wait_idle(&f.queue).await;

        let failures = f.queue.failures().await;
        assert_eq!(failures.len(), 1);
        assert_eq!(failures[0].item.url_list, list);
        assert!(failures[0].error.contains("missing.css"));
        assert_eq!(f.hook.0.load(Ordering::SeqCst), 1);
        assert!(f.repository.is_empty());

        assert!(f.queue.enqueue(list, ResourceKind::Css));
    }

    #[tokio::test]
    async fn test_repeated_failures_put_key_on_hold() {
        let f = fixture_with_hold(None, 10, 2, Duration::from_secs(600)).await;
        let list = "http://site.test/a.css::http://site.test/missing.css";

        for _ in 0..2 {
            assert!(f.queue.enqueue(list, ResourceKind::Css));
            wait_idle(&f.queue).await;
        }
        assert_eq!(f.queue.held(), 1);

        let transformer = ResponseTransformer::new(Arc::clone(&f.repository), &[ResourceKind::Css])
            .with_requester(Arc::clone(&f.queue) as Arc<dyn ReductionRequester>);
        let html = "<link rel=stylesheet href=http://site.test/a.css><link rel=stylesheet href=http://site.test/missing.css>";
        for _ in 0..5 {
            assert_eq!(transformer.rewrite_text(html), html);
            assert_eq!(f.queue.in_flight(), 0);
        }

        assert!(!f.queue.enqueue(list, ResourceKind::Css));
        assert_eq!(f.hook.0.load(Ordering::SeqCst), 2);
        assert_eq!(f.queue.failures().await.len(), 2);
        assert!(f.queue.enqueue(CSS_LIST, ResourceKind::Css));
    }

    #[tokio::test]
    async fn test_hold_lifts_after_cooldown() {
        let f = fixture_with_hold(None, 10, 1, Duration::from_millis(50)).await;
        let list = "http://site.test/missing.css";

        assert!(f.queue.enqueue(list, ResourceKind::Css));
        wait_idle(&f.queue).await;
        assert!(!f.queue.enqueue(list, ResourceKind::Css));

        tokio::time::sleep(Duration::from_millis(80)).await;
        assert_eq!(f.queue.held(), 0);
        assert!(f.queue.enqueue(list, ResourceKind::Css));
        wait_idle(&f.queue).await;
        assert!(!f.queue.enqueue(list, ResourceKind::Css));
    }

    #[tokio::test]
    async fn test_failure_history_bounded_newest_first() {
        let f = fixture(None, 2).await;
        for name in ["x", "y", "z"] {
            assert!(f.queue.enqueue(&format!("http://site.test/{name}.css"), ResourceKind::Css));
        }
        wait_idle(&f.queue).await;

        let failures = f.queue.failures().await;
        assert_eq!(failures.len(), 2);
        assert_eq!(failures[0].item.url_list, "http://site.test/z.css");
        assert_eq!(failures[1].item.url_list, "http://site.test/y.css");
    }

    #[tokio::test]
    async fn test_current_item() {
        let gate = Arc::new(Semaphore::new(0));
        let f = fixture(Some(Arc::clone(&gate)), 10).await;

        assert!(f.queue.enqueue("http://site.test/a.js", ResourceKind::JavaScript));
        tokio::time::sleep(Duration::from_millis(50)).await;

        let current = f.queue.current_item().await.unwrap();
        assert_eq!(current.key, ResourceKey::for_urls("http://site.test/a.js"));
        assert_eq!(current.kind, ResourceKind::JavaScript);

        gate.add_permits(10);
        wait_idle(&f.queue).await;
        assert!(f.queue.current_item().await.is_none());
    }

    #[tokio::test]
    async fn test_transformer_miss_feeds_queue() {
        let f = fixture(None, 10).await;
        let transformer = ResponseTransformer::new(Arc::clone(&f.repository), &[ResourceKind::Css])
            .with_requester(Arc::clone(&f.queue) as Arc<dyn ReductionRequester>);
        let html = "<link rel=stylesheet href=http://site.test/a.css><link rel=stylesheet href=http://site.test/b.css>";

        assert_eq!(transformer.rewrite_text(html), html);
        assert_eq!(f.queue.in_flight(), 1);
        wait_idle(&f.queue).await;

        let url = f.repository.find_reduction(CSS_LIST).unwrap();
        assert_eq!(transformer.rewrite_text(html), format!("<link rel=stylesheet href={url}>"));
    }
}
