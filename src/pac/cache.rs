//! Per-destination cache of PAC results.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{PoisonError, RwLock};
use std::time::{Duration, Instant};
use tracing::trace;
use url::Url;

/// Proxy list returned by the PAC script, or `None` for "no proxy".
pub type ResolutionResult = Option<String>;

/// Default lifetime of a cached result.
pub const DEFAULT_CACHE_TTL: Duration = Duration::from_secs(15 * 60);

/// Entry count at which an insert first drops every expired entry.
const SWEEP_THRESHOLD: usize = 1024;

/// Storage for resolution results, keyed by destination URL.
///
/// `get` returns `None` when nothing is known and `Some(None)` for a cached
/// "no proxy" answer. Sizing and expiry belong to the implementation.
pub trait ResultCache: Send + Sync {
    fn get(&self, uri: &Url) -> Option<ResolutionResult>;
    fn insert(&self, uri: &Url, result: ResolutionResult);
}

#[derive(Debug)]
struct Entry {
    result: ResolutionResult,
    stored_at: Instant,
}

/// In-memory [`ResultCache`] with an optional time to live.
///
/// Expired entries are dropped when looked up, and all at once when an insert
/// finds the map at its sweep size. The sweep size doubles when a sweep frees
/// less than half of it.
#[derive(Debug)]
pub struct MemoryCache {
    entries: RwLock<HashMap<Url, Entry>>,
    ttl: Option<Duration>,
    sweep_at: AtomicUsize,
}

impl MemoryCache {
    pub fn new() -> Self {
        Self::with_ttl(Some(DEFAULT_CACHE_TTL))
    }

    /// `None` keeps entries forever.
    pub fn with_ttl(ttl: Option<Duration>) -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
            ttl,
            sweep_at: AtomicUsize::new(SWEEP_THRESHOLD),
        }
    }

    pub fn len(&self) -> usize {
        self.entries
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn clear(&self) {
        self.entries
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
    }

    fn is_fresh(&self, entry: &Entry) -> bool {
        match self.ttl {
            Some(ttl) => entry.stored_at.elapsed() < ttl,
            None => true,
        }
    }
}

impl Default for MemoryCache {
    fn default() -> Self {
        Self::new()
    }
}

impl ResultCache for MemoryCache {
    fn get(&self, uri: &Url) -> Option<ResolutionResult> {
        {
            let entries = self.entries.read().unwrap_or_else(PoisonError::into_inner);
            match entries.get(uri) {
                Some(entry) if self.is_fresh(entry) => return Some(entry.result.clone()),
                Some(_) => {}
                None => return None,
            }
        }

        trace!("Evicting expired PAC result for '{}'", uri);
        let mut entries = self.entries.write().unwrap_or_else(PoisonError::into_inner);
        if entries.get(uri).is_some_and(|entry| !self.is_fresh(entry)) {
            entries.remove(uri);
        }
        None
    }

    fn insert(&self, uri: &Url, result: ResolutionResult) {
        let mut entries = self.entries.write().unwrap_or_else(PoisonError::into_inner);
        let sweep_at = self.sweep_at.load(Ordering::Relaxed);
        if self.ttl.is_some() && entries.len() >= sweep_at {
            let before = entries.len();
            entries.retain(|_, entry| self.is_fresh(entry));
            trace!("Swept {} expired PAC results", before - entries.len());
            if entries.len() >= sweep_at / 2 {
                self.sweep_at.store(sweep_at.saturating_mul(2), Ordering::Relaxed);
            }
        }
        entries.insert(
            uri.clone(),
            Entry {
                result,
                stored_at: Instant::now(),
            },
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn url(s: &str) -> Url {
        Url::parse(s).unwrap()
    }

    #[test]
    fn test_miss_then_hit() {
        let cache = MemoryCache::new();
        let target = url("http://example.com/a");
        assert_eq!(cache.get(&target), None);

        cache.insert(&target, Some("PROXY p:8080".to_string()));
        assert_eq!(cache.get(&target), Some(Some("PROXY p:8080".to_string())));
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn test_no_proxy_is_distinct_from_unknown() {
        let cache = MemoryCache::new();
        let target = url("http://example.com/");
        cache.insert(&target, None);
        assert_eq!(cache.get(&target), Some(None));
        assert_eq!(cache.get(&url("http://other.example.com/")), None);
    }

    #[test]
    fn test_expired_entries_are_dropped() {
        let cache = MemoryCache::with_ttl(Some(Duration::ZERO));
        let target = url("http://example.com/");
        cache.insert(&target, Some("DIRECT".to_string()));
        assert_eq!(cache.get(&target), None);
        assert!(cache.is_empty());
    }

    #[test]
    fn test_without_ttl_entries_persist() {
        let cache = MemoryCache::with_ttl(None);
        let target = url("http://example.com/");
        cache.insert(&target, Some("DIRECT".to_string()));
        assert_eq!(cache.get(&target), Some(Some("DIRECT".to_string())));
        cache.clear();
        assert!(cache.is_empty());
    }

    #[test]
    fn test_insert_sweeps_expired_entries() {
        let cache = MemoryCache::with_ttl(Some(Duration::ZERO));
        cache.sweep_at.store(4, Ordering::Relaxed);
        for i in 0..4 {
            cache.insert(&url(&format!("http://host{i}.example.com/")), None);
        }
        assert_eq!(cache.len(), 4);

        cache.insert(&url("http://fresh.example.com/"), None);
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn test_sweep_size_grows_with_live_entries() {
        let cache = MemoryCache::with_ttl(Some(Duration::from_secs(3600)));
        cache.sweep_at.store(4, Ordering::Relaxed);
        for i in 0..5 {
            cache.insert(&url(&format!("http://host{i}.example.com/")), None);
        }
        assert_eq!(cache.len(), 5);
        assert_eq!(cache.sweep_at.load(Ordering::Relaxed), 8);
    }

    #[test]
    fn test_concurrent_writers() {
        let cache = std::sync::Arc::new(MemoryCache::new());
        let handles: Vec<_> = (0..8)
            .map(|i| {
                let cache = cache.clone();
                std::thread::spawn(move || {
                    let target = url(&format!("http://host{i}.example.com/"));
                    cache.insert(&target, Some(format!("PROXY p{i}:80")));
                    cache.get(&target)
                })
            })
            .collect();
        for (i, handle) in handles.into_iter().enumerate() {
            assert_eq!(handle.join().unwrap(), Some(Some(format!("PROXY p{i}:80"))));
        }
        assert_eq!(cache.len(), 8);
    }
}
