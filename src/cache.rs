//! Bounded residency tracker for folder/sharded mode.
//!
//! A resident unit is identified by a string key (collection name, or
//! `"collection::partition"` in sharded mode). `max_size == 0` disables
//! eviction entirely. Reuses the `lru` crate a second time, generalizing the
//! teacher's `ironbase-core` dependency (there used for query-result
//! caching) to this spec's resident-unit admission problem.

use lru::LruCache;
use std::num::NonZeroUsize;

use crate::{log_debug, log_warn};

/// Tracks which resident units are present and in what touch order,
/// without owning the units themselves (the `Database` owns those).
pub struct ResidentTracker {
    order: LruCache<String, ()>,
    max_size: usize,
}

impl ResidentTracker {
    pub fn new(max_size: usize) -> Self {
        let cap = NonZeroUsize::new(max_size.max(1)).unwrap();
        ResidentTracker {
            order: LruCache::new(cap),
            max_size,
        }
    }

    pub fn is_unbounded(&self) -> bool {
        self.max_size == 0
    }

    /// Record an access, returning the key that should be evicted (if any)
    /// because this touch pushed residency over budget.
    ///
    /// `lru::LruCache::put` silently discards the evicted entry when the
    /// cache is at capacity; `push` is the variant that hands it back, so
    /// that's what a genuinely new, bounded touch uses here.
    pub fn touch(&mut self, key: &str) -> Option<String> {
        if self.is_unbounded() || self.order.contains(key) {
            self.order.put(key.to_string(), ());
            return None;
        }
        match self.order.push(key.to_string(), ()) {
            Some((evicted_key, _)) if evicted_key != key => Some(evicted_key),
            _ => None,
        }
    }

    pub fn forget(&mut self, key: &str) {
        self.order.pop(key);
    }

    /// Forget every resident key belonging to `collection`: the bare
    /// collection name (folder mode) and any `"collection::partition"` keys
    /// (sharded mode), so a dropped collection's partitions don't keep
    /// occupying LRU slots they no longer own.
    pub fn forget_collection(&mut self, collection: &str) {
        let prefix = format!("{collection}::");
        let keys: Vec<String> = self
            .order
            .iter()
            .map(|(k, _)| k.clone())
            .filter(|k| k.as_str() == collection || k.starts_with(&prefix))
            .collect();
        for key in keys {
            self.order.pop(&key);
        }
    }

    pub fn contains(&self, key: &str) -> bool {
        self.order.contains(key)
    }
}

/// Evict `key` from the tracker and, if the caller reports it dirty, persist
/// it first via `persist`. `persist` returning `Err` is logged and the unit
/// is evicted anyway (eviction must not get stuck on a save failure).
pub fn evict_with_persist<F>(key: &str, dirty: bool, persist: F)
where
    F: FnOnce() -> crate::error::Result<()>,
{
    if dirty {
        if let Err(e) = persist() {
            log_warn!("failed to persist {key} before eviction: {e}");
        } else {
            log_debug!("persisted {key} before eviction");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unbounded_never_evicts() {
        let mut t = ResidentTracker::new(0);
        for i in 0..10 {
            assert_eq!(t.touch(&format!("c{i}")), None);
        }
    }

    #[test]
    fn bounded_evicts_lru() {
        let mut t = ResidentTracker::new(1);
        assert_eq!(t.touch("col1"), None);
        let evicted = t.touch("col2");
        assert_eq!(evicted, Some("col1".to_string()));
        assert!(t.contains("col2"));
        assert!(!t.contains("col1"));
    }

    #[test]
    fn re_touching_present_key_does_not_evict() {
        let mut t = ResidentTracker::new(1);
        t.touch("col1");
        assert_eq!(t.touch("col1"), None);
    }

    #[test]
    fn forget_collection_purges_sharded_partition_keys() {
        let mut t = ResidentTracker::new(0);
        t.touch("people::young");
        t.touch("people::old");
        t.touch("other");
        t.forget_collection("people");
        assert!(!t.contains("people::young"));
        assert!(!t.contains("people::old"));
        assert!(t.contains("other"));
    }
}
