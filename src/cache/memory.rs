use crate::cache::{HintCache, QueryHint};
use lru::LruCache;
use std::num::NonZeroUsize;
use std::sync::Mutex;

const DEFAULT_CAPACITY: usize = 1024;

/// In-process hint cache with an LRU bound.
pub struct MemoryHintCache {
    hints: Mutex<LruCache<String, QueryHint>>,
}

impl MemoryHintCache {
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_CAPACITY)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        let capacity = NonZeroUsize::new(capacity.max(1)).unwrap_or(NonZeroUsize::MIN);
        Self {
            hints: Mutex::new(LruCache::new(capacity)),
        }
    }

    pub fn len(&self) -> usize {
        self.hints.lock().unwrap_or_else(|e| e.into_inner()).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for MemoryHintCache {
    fn default() -> Self {
        Self::new()
    }
}

impl HintCache for MemoryHintCache {
    fn get(&self, hash: &str) -> Option<QueryHint> {
        self.hints
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .get(hash)
            .cloned()
    }

    fn set(&self, hash: &str, hint: QueryHint) {
        self.hints
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .put(hash.to_string(), hint);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_round_trip() {
        let cache = MemoryHintCache::new();
        let mut hint = QueryHint::default();
        hint.widen_field("title");
        cache.set("q1", hint.clone());
        assert_eq!(cache.get("q1"), Some(hint));
        assert_eq!(cache.get("q2"), None);
    }

    #[test]
    fn test_lru_bound_evicts() {
        let cache = MemoryHintCache::with_capacity(2);
        cache.set("a", QueryHint::default());
        cache.set("b", QueryHint::default());
        cache.set("c", QueryHint::default());
        assert_eq!(cache.len(), 2);
        assert!(cache.get("a").is_none());
    }
}
