//! In-memory map from url-list keys to produced urls.
//!
//! Entries are immutable: the first reduction stored for a key wins and later
//! inserts for the same key are dropped without error. Removal happens on
//! flush, either per key or all at once.

use std::collections::HashMap;

use dashmap::DashMap;
use dashmap::mapref::entry::Entry;

use crate::url::ResourceKey;

/// Separator used to join the ordered url list of a bundle.
pub const URL_LIST_SEPARATOR: &str = "::";

/// Join an ordered url list the way repository keys expect it.
pub fn join_urls<S: AsRef<str>>(urls: &[S]) -> String {
    urls.iter().map(AsRef::as_ref).collect::<Vec<_>>().join(URL_LIST_SEPARATOR)
}

/// Shared fingerprint → produced url cache.
#[derive(Debug, Default)]
pub struct ReductionRepository {
    entries: DashMap<ResourceKey, String>,
}

impl ReductionRepository {
    pub fn new() -> Self {
        Self::default()
    }

    /// Look up the produced url for a `::`-joined url list.
    pub fn find_reduction(&self, url_list: &str) -> Option<String> {
        let key = ResourceKey::for_urls(url_list);
        let found = self.entries.get(&key).map(|entry| entry.value().clone());
        tracing::trace!(%key, hit = found.is_some(), "reduction lookup");
        found
    }

    /// Record a reduction for a `::`-joined url list. Returns `false` if one already existed.
    pub fn add_reduction(&self, url_list: &str, produced_url: &str) -> bool {
        self.add_reduction_by_key(ResourceKey::for_urls(url_list), produced_url)
    }

    /// Record a reduction under an already computed key. Returns `false` if one already existed.
    pub fn add_reduction_by_key(&self, key: ResourceKey, produced_url: &str) -> bool {
        match self.entries.entry(key) {
            Entry::Occupied(_) => false,
            Entry::Vacant(slot) => {
                slot.insert(produced_url.to_string());
                true
            }
        }
    }

    pub fn contains(&self, key: ResourceKey) -> bool {
        self.entries.contains_key(&key)
    }

    /// Drop the entry for `key`. The nil key clears every entry.
    pub fn remove_reduction(&self, key: ResourceKey) {
        if key.is_nil() {
            self.clear();
        } else {
            self.entries.remove(&key);
        }
    }

    pub fn clear(&self) {
        self.entries.clear();
    }

    /// Seed entries from a store's saved urls; existing entries are kept.
    pub fn warm(&self, saved: HashMap<ResourceKey, String>) -> usize {
        saved
            .into_iter()
            .filter(|(key, url)| self.add_reduction_by_key(*key, url))
            .count()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[test]
    fn test_add_then_find() {
        let repo = ReductionRepository::new();
        assert!(repo.add_reduction("a.css::b.css", "http://host/x.css"));
        assert_eq!(repo.find_reduction("a.css::b.css").as_deref(), Some("http://host/x.css"));
    }

    #[test]
    fn test_find_unseen() {
        let repo = ReductionRepository::new();
        assert!(repo.find_reduction("never.css").is_none());
    }

    #[test]
    fn test_first_writer_wins() {
        let repo = ReductionRepository::new();
        assert!(repo.add_reduction("a.css", "first"));
        assert!(!repo.add_reduction("a.css", "second"));
        assert_eq!(repo.find_reduction("a.css").as_deref(), Some("first"));
    }

    #[test]
    fn test_order_matters() {
        let repo = ReductionRepository::new();
        repo.add_reduction("a.css::b.css", "ab");
        assert!(repo.find_reduction("b.css::a.css").is_none());
    }

    #[test]
    fn test_join_urls() {
        assert_eq!(join_urls(&["a.css", "b.css"]), "a.css::b.css");
        assert_eq!(join_urls::<&str>(&[]), "");
    }

    #[test]
    fn test_remove_by_key() {
        let repo = ReductionRepository::new();
        repo.add_reduction("a.css", "a");
        repo.add_reduction("b.css", "b");

        repo.remove_reduction(ResourceKey::for_urls("a.css"));
        assert!(repo.find_reduction("a.css").is_none());
        assert_eq!(repo.find_reduction("b.css").as_deref(), Some("b"));
    }

    #[test]
    fn test_remove_nil_clears() {
        let repo = ReductionRepository::new();
        repo.add_reduction("a.css", "a");
        repo.add_reduction("b.css", "b");

        repo.remove_reduction(ResourceKey::NIL);
        assert!(repo.is_empty());
    }

    #[test]
    fn test_warm_keeps_existing() {
        let repo = ReductionRepository::new();
        let key = ResourceKey::for_urls("a.css");
        repo.add_reduction_by_key(key, "live");

        let other = ResourceKey::for_urls("b.css");
        let loaded = repo.warm(HashMap::from([(key, "stale".to_string()), (other, "b".to_string())]));

        assert_eq!(loaded, 1);
        assert_eq!(repo.find_reduction("a.css").as_deref(), Some("live"));
        assert_eq!(repo.len(), 2);
    }

    #[test]
    fn test_concurrent_duplicate_inserts() {
        let repo = Arc::new(ReductionRepository::new());
        let handles: Vec<_> = (0..16)
            .map(|i| {
                let repo = Arc::clone(&repo);
                std::thread::spawn(move || repo.add_reduction("same.css", &format!("url-{i}")))
            })
            .collect();

        let winners = handles.into_iter().map(|h| h.join().unwrap()).filter(|won| *won).count();

        assert_eq!(winners, 1);
        assert_eq!(repo.len(), 1);
    }
}
