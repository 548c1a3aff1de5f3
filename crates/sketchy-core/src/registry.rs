//! Per-Source Distribution Registry
//!
//! Maps a source identifier to its window. Each window sits behind its own
//! mutex so callers analyzing different sources never contend, while two
//! calls for the same source are serialized. The map itself is only
//! write-locked to insert a source seen for the first time.
//!
//! Entries are never evicted: the owning process decides when an engine
//! (and with it every window) is dropped.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, RwLock};

/// Statistics about the registry
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RegistryStats {
    pub total_entries: usize,
    pub total_creations: u64,
    pub total_accesses: u64,
}

pub type Entry<P> = Arc<Mutex<P>>;

pub struct SourceRegistry<P> {
    entries: RwLock<HashMap<String, Entry<P>>>,
    creations: AtomicU64,
    accesses: AtomicU64,
}

impl<P> SourceRegistry<P> {
    pub fn new() -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
            creations: AtomicU64::new(0),
            accesses: AtomicU64::new(0),
        }
    }

    /// Get the entry for `source`, creating it on first sight.
    ///
    /// Returns the entry and whether it was created by this call.
    pub fn get_or_create<F>(&self, source: &str, create: F) -> (Entry<P>, bool)
    where
        F: FnOnce() -> P,
    {
        self.accesses.fetch_add(1, Ordering::Relaxed);

        if let Some(entry) = self.read_map().get(source) {
            return (Arc::clone(entry), false);
        }

        let mut map = self.entries.write().unwrap_or_else(PoisonError::into_inner);
        // Another caller may have inserted while we waited for the write lock
        if let Some(entry) = map.get(source) {
            return (Arc::clone(entry), false);
        }
        let entry = Arc::new(Mutex::new(create()));
        map.insert(source.to_string(), Arc::clone(&entry));
        self.creations.fetch_add(1, Ordering::Relaxed);
        (entry, true)
    }

    pub fn get(&self, source: &str) -> Option<Entry<P>> {
        self.read_map().get(source).cloned()
    }

    pub fn contains(&self, source: &str) -> bool {
        self.read_map().contains_key(source)
    }

    pub fn len(&self) -> usize {
        self.read_map().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Sorted snapshot of known sources
    pub fn sources(&self) -> Vec<String> {
        let mut sources: Vec<String> = self.read_map().keys().cloned().collect();
        sources.sort();
        sources
    }

    pub fn stats(&self) -> RegistryStats {
        RegistryStats {
            total_entries: self.len(),
            total_creations: self.creations.load(Ordering::Relaxed),
            total_accesses: self.accesses.load(Ordering::Relaxed),
        }
    }

    fn read_map(&self) -> std::sync::RwLockReadGuard<'_, HashMap<String, Entry<P>>> {
        self.entries.read().unwrap_or_else(PoisonError::into_inner)
    }
}

impl<P> Default for SourceRegistry<P> {
    fn default() -> Self {
        Self::new()
    }
}

/// Lock an entry, recovering the data if a previous holder panicked
pub fn lock<P>(entry: &Entry<P>) -> MutexGuard<'_, P> {
    entry.lock().unwrap_or_else(PoisonError::into_inner)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    #[test]
    fn test_get_or_create() {
        let registry: SourceRegistry<i32> = SourceRegistry::new();

        let (entry, created) = registry.get_or_create("foo", || 42);
        assert!(created);
        assert_eq!(*lock(&entry), 42);

        *lock(&entry) = 100;
        let (again, created) = registry.get_or_create("foo", || 999);
        assert!(!created);
        assert_eq!(*lock(&again), 100);

        let stats = registry.stats();
        assert_eq!(stats.total_creations, 1);
        assert_eq!(stats.total_accesses, 2);
        assert_eq!(stats.total_entries, 1);
    }

    #[test]
    fn test_sources_sorted() {
        let registry: SourceRegistry<()> = SourceRegistry::new();
        registry.get_or_create("b", || ());
        registry.get_or_create("a", || ());
        assert_eq!(registry.sources(), vec!["a".to_string(), "b".to_string()]);
        assert!(registry.contains("a"));
        assert!(registry.get("c").is_none());
    }

    #[test]
    fn test_concurrent_creation_is_single() {
        let registry: Arc<SourceRegistry<u64>> = Arc::new(SourceRegistry::new());
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let registry = Arc::clone(&registry);
                thread::spawn(move || {
                    for _ in 0..1_000 {
                        let (entry, _) = registry.get_or_create("shared", || 0);
                        *lock(&entry) += 1;
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }

        assert_eq!(registry.stats().total_creations, 1);
        let entry = registry.get("shared").unwrap();
        assert_eq!(*lock(&entry), 8_000);
    }
}
