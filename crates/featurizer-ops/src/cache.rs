//! Content-addressed cache of deserialized transforms.
//!
//! Kernels receive the serialized archive as an input tensor on every call.
//! Deserializing it each time is wasted work when the bytes never change, so
//! transforms are kept behind the SHA-256 of the archive. Lookups take a read
//! lock; a miss upgrades to the write lock, re-checks, and loads at most once
//! per key. The cache is bounded and evicts the oldest insertion first.
//!
//! Loads run under the write lock, so a slow deserialization stalls lookups of
//! every other archive until it finishes. Archives are small and loaded once,
//! which keeps that window short.

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::RwLock;
use sha2::{Digest, Sha256};
use tracing::{info, warn};

/// SHA-256 digest of an archive's bytes.
pub type ArchiveKey = [u8; 32];

pub fn archive_key(bytes: &[u8]) -> ArchiveKey {
    Sha256::digest(bytes).into()
}

/// 12-char hex prefix of `key` for log lines.
fn short_hex(key: &ArchiveKey) -> String {
    hex::encode(&key[..6])
}

/// Hit and load counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CacheStats {
    pub hits: u64,
    pub loads: u64,
    pub evictions: u64,
}

struct CacheState<V> {
    entries: HashMap<ArchiveKey, Arc<V>>,
    order: VecDeque<ArchiveKey>,
}

/// Bounded map from archive digest to a shared, immutable value.
pub struct TransformCache<V> {
    capacity: usize,
    state: RwLock<CacheState<V>>,
    hits: AtomicU64,
    loads: AtomicU64,
    evictions: AtomicU64,
}

impl<V> TransformCache<V> {
    /// Cache holding at most `capacity` entries (minimum 1).
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            state: RwLock::new(CacheState {
                entries: HashMap::new(),
                order: VecDeque::new(),
            }),
            hits: AtomicU64::new(0),
            loads: AtomicU64::new(0),
            evictions: AtomicU64::new(0),
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Return the value cached for `bytes`, running `load` on a miss.
    ///
    /// A failed load caches nothing and the error is returned as is.
    pub fn get_or_load<E, F>(&self, bytes: &[u8], load: F) -> Result<Arc<V>, E>
    where
        F: FnOnce() -> Result<V, E>,
    {
        let key = archive_key(bytes);

        {
            let state = self.state.read();
            if let Some(value) = state.entries.get(&key) {
                self.hits.fetch_add(1, Ordering::Relaxed);
                return Ok(Arc::clone(value));
            }
        }

        let mut state = self.state.write();
        // Another caller may have loaded it between the two locks
        if let Some(value) = state.entries.get(&key) {
            self.hits.fetch_add(1, Ordering::Relaxed);
            return Ok(Arc::clone(value));
        }

        let value = Arc::new(load()?);
        self.loads.fetch_add(1, Ordering::Relaxed);

        while state.entries.len() >= self.capacity {
            let Some(oldest) = state.order.pop_front() else {
                break;
            };
            state.entries.remove(&oldest);
            self.evictions.fetch_add(1, Ordering::Relaxed);
            warn!("Evicted cached transform {}", short_hex(&oldest));
        }

        state.entries.insert(key, Arc::clone(&value));
        state.order.push_back(key);
        info!(
            "Cached transform {} ({} bytes, {}/{} entries)",
            short_hex(&key),
            bytes.len(),
            state.entries.len(),
            self.capacity
        );
        Ok(value)
    }

    pub fn contains(&self, bytes: &[u8]) -> bool {
        self.state.read().entries.contains_key(&archive_key(bytes))
    }

    pub fn len(&self) -> usize {
        self.state.read().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn clear(&self) {
        let mut state = self.state.write();
        state.entries.clear();
        state.order.clear();
    }

    pub fn stats(&self) -> CacheStats {
        CacheStats {
            hits: self.hits.load(Ordering::Relaxed),
            loads: self.loads.load(Ordering::Relaxed),
            evictions: self.evictions.load(Ordering::Relaxed),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    fn ok(value: u32) -> impl FnOnce() -> Result<u32, String> {
        move || Ok(value)
    }

    #[test]
    fn test_loads_once_per_archive() {
        let cache = TransformCache::new(4);
        let a = cache.get_or_load(b"archive-a", ok(1)).unwrap();
        let b = cache.get_or_load(b"archive-a", ok(2)).unwrap();
        assert_eq!(*a, 1);
        assert!(Arc::ptr_eq(&a, &b));
        assert_eq!(
            cache.stats(),
            CacheStats {
                hits: 1,
                loads: 1,
                evictions: 0
            }
        );
    }

    #[test]
    fn test_failed_load_is_not_cached() {
        let cache: TransformCache<u32> = TransformCache::new(4);
        let err = cache
            .get_or_load(b"bad", || Err::<u32, _>("corrupt".to_string()))
            .unwrap_err();
        assert_eq!(err, "corrupt");
        assert!(cache.is_empty());
        assert_eq!(*cache.get_or_load(b"bad", ok(7)).unwrap(), 7);
    }

    #[test]
    fn test_evicts_oldest_first() {
        let cache = TransformCache::new(2);
        cache.get_or_load(b"first", ok(1)).unwrap();
        cache.get_or_load(b"second", ok(2)).unwrap();
        cache.get_or_load(b"third", ok(3)).unwrap();

        assert_eq!(cache.len(), 2);
        assert!(!cache.contains(b"first"));
        assert!(cache.contains(b"second"));
        assert!(cache.contains(b"third"));
        assert_eq!(cache.stats().evictions, 1);
    }

    #[test]
    fn test_zero_capacity_still_holds_one() {
        let cache = TransformCache::new(0);
        assert_eq!(cache.capacity(), 1);
        cache.get_or_load(b"x", ok(1)).unwrap();
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn test_concurrent_misses_load_once() {
        let cache = TransformCache::new(4);
        let calls = AtomicUsize::new(0);

        std::thread::scope(|s| {
            for _ in 0..8 {
                s.spawn(|| {
                    let value = cache
                        .get_or_load(b"shared", || {
                            calls.fetch_add(1, Ordering::SeqCst);
                            Ok::<_, String>(42u32)
                        })
                        .unwrap();
                    assert_eq!(*value, 42);
                });
            }
        });

        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(cache.stats().loads, 1);
        assert_eq!(cache.stats().hits, 7);
    }

    #[test]
    fn test_short_hex_is_digest_prefix() {
        let key = archive_key(b"abc");
        // SHA-256("abc") = ba7816bf8f01cfea...
        assert_eq!(short_hex(&key), "ba7816bf8f01");
        assert_eq!(short_hex(&[0u8; 32]), "000000000000");
    }

    #[test]
    fn test_clear() {
        let cache = TransformCache::new(2);
        cache.get_or_load(b"x", ok(1)).unwrap();
        cache.clear();
        assert!(cache.is_empty());
    }
}
