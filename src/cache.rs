//! Device resource cache
//!
//! Command queues and capability strings are expensive to query. They are
//! cached per context in a small LRU owned by the backend instance. A
//! capacity of 1 behaves like a single slot: switching contexts evicts and
//! releases the previous entry.

use std::hash::Hash;
use std::num::NonZeroUsize;

use lru::LruCache;

/// LRU cache of reference-counted device resources
pub struct ResourceCache<K: Hash + Eq, V: Clone> {
    name: &'static str,
    entries: LruCache<K, V>,
}

impl<K: Hash + Eq + Copy + std::fmt::Debug, V: Clone> ResourceCache<K, V> {
    pub fn new(name: &'static str, capacity: usize) -> Self {
        let capacity = NonZeroUsize::new(capacity).unwrap_or(NonZeroUsize::MIN);
        Self {
            name,
            entries: LruCache::new(capacity),
        }
    }

    /// Cached value for `key`, building and caching it on a miss.
    ///
    /// The returned value is a clone, so for handle types the caller gets its
    /// own reference. A failed build leaves the cache untouched.
    pub fn get_or_try_insert_with<E>(
        &mut self,
        key: K,
        build: impl FnOnce() -> Result<V, E>,
    ) -> Result<V, E> {
        if let Some(value) = self.entries.get(&key) {
            log::trace!("{} cache hit for {:?}", self.name, key);
            return Ok(value.clone());
        }

        log::trace!("{} cache miss for {:?}", self.name, key);
        let value = build()?;
        if let Some((evicted, _)) = self.entries.push(key, value.clone())
            && evicted != key
        {
            log::debug!("{} cache evicted {:?}", self.name, evicted);
        }
        Ok(value)
    }

    pub fn contains(&self, key: &K) -> bool {
        self.entries.contains(key)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.entries.cap().get()
    }

    /// Drop every entry, releasing the cached resources.
    pub fn clear(&mut self) {
        self.entries.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;
    use std::rc::Rc;

    #[test]
    fn test_hit_does_not_rebuild() {
        let mut cache: ResourceCache<usize, Rc<String>> = ResourceCache::new("queue", 2);
        let builds = Cell::new(0);
        let build = || {
            builds.set(builds.get() + 1);
            Ok::<_, ()>(Rc::new("q0".to_string()))
        };

        let first = cache.get_or_try_insert_with(1, build).unwrap();
        let second = cache
            .get_or_try_insert_with(1, || Ok::<_, ()>(Rc::new("other".to_string())))
            .unwrap();
        assert_eq!(builds.get(), 1);
        assert!(Rc::ptr_eq(&first, &second));
        // cache + two callers
        assert_eq!(Rc::strong_count(&first), 3);
    }

    #[test]
    fn test_single_slot_evicts_and_releases() {
        let mut cache: ResourceCache<usize, Rc<u32>> = ResourceCache::new("caps", 1);
        let a = cache.get_or_try_insert_with(10, || Ok::<_, ()>(Rc::new(1))).unwrap();
        assert_eq!(Rc::strong_count(&a), 2);

        let _b = cache.get_or_try_insert_with(20, || Ok::<_, ()>(Rc::new(2))).unwrap();
        assert_eq!(cache.len(), 1);
        assert!(!cache.contains(&10));
        assert_eq!(Rc::strong_count(&a), 1);
    }

    #[test]
    fn test_lru_order() {
        let mut cache: ResourceCache<usize, u32> = ResourceCache::new("queue", 2);
        cache.get_or_try_insert_with(1, || Ok::<_, ()>(1)).unwrap();
        cache.get_or_try_insert_with(2, || Ok::<_, ()>(2)).unwrap();
        // touch 1 so 2 becomes least recently used
        cache.get_or_try_insert_with(1, || Ok::<_, ()>(0)).unwrap();
        cache.get_or_try_insert_with(3, || Ok::<_, ()>(3)).unwrap();

        assert!(cache.contains(&1));
        assert!(!cache.contains(&2));
        assert!(cache.contains(&3));
    }

    #[test]
    fn test_failed_build_is_not_cached() {
        let mut cache: ResourceCache<usize, u32> = ResourceCache::new("queue", 1);
        cache.get_or_try_insert_with(1, || Ok::<_, &str>(1)).unwrap();
        let err = cache.get_or_try_insert_with(2, || Err("no device")).unwrap_err();
        assert_eq!(err, "no device");
        assert!(cache.contains(&1));
        assert!(!cache.contains(&2));
    }

    #[test]
    fn test_zero_capacity_rounds_up() {
        let mut cache: ResourceCache<usize, u32> = ResourceCache::new("queue", 0);
        assert_eq!(cache.capacity(), 1);
        cache.get_or_try_insert_with(1, || Ok::<_, ()>(1)).unwrap();
        cache.clear();
        assert!(cache.is_empty());
    }
}
