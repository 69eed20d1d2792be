//! A bounded, refcounted resource cache keyed by `u64`.
//!
//! Unlike an LRU, nothing is evicted while a key's reference count is
//! above zero; `release` is the only path that can make room. A key
//! being loaded by one thread is visible to others via `loading`, so a
//! second caller for the same key polls instead of loading twice.

use crate::common::error::RsqlError;
use crate::common::result::RsqlResult;
use crate::config::CACHE_LOAD_BACKOFF;
use std::collections::{HashMap, HashSet};
use std::sync::Mutex;
use std::thread;

/// Produces the value for a key that is not yet resident in the cache.
pub trait Loader<V>: Send + Sync {
    fn load(&self, key: u64) -> RsqlResult<V>;
}

/// Disposes of a value once its reference count drops to zero.
pub trait Finalizer<V>: Send + Sync {
    fn finalize(&self, key: u64, value: &V);
}

struct Inner<V> {
    cache: HashMap<u64, V>,
    references: HashMap<u64, usize>,
    loading: HashSet<u64>,
    count: usize,
}

pub struct Cache<V> {
    inner: Mutex<Inner<V>>,
    max_resource: usize,
    loader: Box<dyn Loader<V>>,
    finalizer: Box<dyn Finalizer<V>>,
}

impl<V: Clone> Cache<V> {
    /// `max_resource == 0` means unbounded.
    pub fn new(max_resource: usize, loader: Box<dyn Loader<V>>, finalizer: Box<dyn Finalizer<V>>) -> Self {
        Cache {
            inner: Mutex::new(Inner {
                cache: HashMap::new(),
                references: HashMap::new(),
                loading: HashSet::new(),
                count: 0,
            }),
            max_resource,
            loader,
            finalizer,
        }
    }

    pub fn get(&self, key: u64) -> RsqlResult<V> {
        loop {
            let mut inner = self.inner.lock().unwrap();
            if inner.loading.contains(&key) {
                drop(inner);
                thread::sleep(CACHE_LOAD_BACKOFF);
                continue;
            }
            if let Some(v) = inner.cache.get(&key) {
                let v = v.clone();
                *inner.references.entry(key).or_insert(0) += 1;
                return Ok(v);
            }
            if self.max_resource > 0 && inner.count >= self.max_resource {
                return Err(RsqlError::CacheFull);
            }
            inner.count += 1;
            inner.loading.insert(key);
            break;
        }

        match self.loader.load(key) {
            Ok(v) => {
                let mut inner = self.inner.lock().unwrap();
                inner.loading.remove(&key);
                inner.cache.insert(key, v.clone());
                inner.references.insert(key, 1);
                Ok(v)
            }
            Err(e) => {
                let mut inner = self.inner.lock().unwrap();
                inner.count -= 1;
                inner.loading.remove(&key);
                Err(e)
            }
        }
    }

    pub fn release(&self, key: u64) {
        let mut inner = self.inner.lock().unwrap();
        let remaining = inner.references.get(&key).copied().unwrap_or(0).saturating_sub(1);
        if remaining == 0 {
            if let Some(v) = inner.cache.remove(&key) {
                inner.references.remove(&key);
                inner.count -= 1;
                drop(inner);
                self.finalizer.finalize(key, &v);
                return;
            }
        } else {
            inner.references.insert(key, remaining);
        }
    }

    /// Flushes and evicts everything, regardless of outstanding references.
    /// Callers must guarantee no other thread still holds a handle.
    pub fn close(&self) {
        let mut inner = self.inner.lock().unwrap();
        let keys: Vec<u64> = inner.cache.keys().copied().collect();
        for key in keys {
            if let Some(v) = inner.cache.remove(&key) {
                inner.references.remove(&key);
                inner.count -= 1;
                self.finalizer.finalize(key, &v);
            }
        }
    }

    pub fn len(&self) -> usize {
        self.inner.lock().unwrap().cache.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    struct IdentityLoader;
    impl Loader<u64> for IdentityLoader {
        fn load(&self, key: u64) -> RsqlResult<u64> {
            Ok(key)
        }
    }

    struct CountingFinalizer(Arc<AtomicUsize>);
    impl Finalizer<u64> for CountingFinalizer {
        fn finalize(&self, _key: u64, _value: &u64) {
            self.0.fetch_add(1, Ordering::SeqCst);
        }
    }

    #[test]
    fn get_then_release_runs_finalizer() {
        let finalized = Arc::new(AtomicUsize::new(0));
        let cache = Cache::new(
            0,
            Box::new(IdentityLoader),
            Box::new(CountingFinalizer(finalized.clone())),
        );
        let v = cache.get(42).unwrap();
        assert_eq!(v, 42);
        assert_eq!(finalized.load(Ordering::SeqCst), 0);
        cache.release(42);
        assert_eq!(finalized.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn nested_get_keeps_resource_alive_until_all_released() {
        let finalized = Arc::new(AtomicUsize::new(0));
        let cache = Cache::new(
            0,
            Box::new(IdentityLoader),
            Box::new(CountingFinalizer(finalized.clone())),
        );
        cache.get(1).unwrap();
        cache.get(1).unwrap();
        cache.release(1);
        assert_eq!(finalized.load(Ordering::SeqCst), 0);
        cache.release(1);
        assert_eq!(finalized.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn bounded_cache_rejects_when_full() {
        let finalized = Arc::new(AtomicUsize::new(0));
        let cache = Cache::new(
            1,
            Box::new(IdentityLoader),
            Box::new(CountingFinalizer(finalized)),
        );
        cache.get(1).unwrap();
        assert!(matches!(cache.get(2), Err(RsqlError::CacheFull)));
        cache.release(1);
        assert!(cache.get(2).is_ok());
    }
}
