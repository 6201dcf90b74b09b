// SPDX-FileCopyrightText: Copyright (c) 2025-2026 NVIDIA CORPORATION & AFFILIATES. All rights reserved.
// SPDX-License-Identifier: Apache-2.0

//! Keyed recycling pool for device memory objects.
//!
//! Creating and destroying native memory objects is expensive, so released
//! objects are not destroyed. They are parked on a free-list keyed by the
//! compatibility key they were created with and handed out again to the next
//! request with an equal key. Objects are only destroyed when the pool itself
//! is dropped.
//!
//! Retention is unbounded: free-lists grow to the high-water mark of each key
//! and are never pruned. A budgeted variant would hang an eviction policy off
//! [`RecyclingPool::recycle`].

use crate::Result;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet, VecDeque};
use std::fmt;
use std::hash::Hash;

/// Creation and destruction strategy for the objects managed by a [`RecyclingPool`].
///
/// The strategy owns everything that is specific to one kind of memory object:
/// request validation, building native descriptors and calling the driver.
pub trait MemoryObjectFactory {
    /// Compatibility key. Two requests may share an object iff their keys are equal.
    type Key: Clone + Eq + Hash + fmt::Debug;

    /// Native handle of a created object.
    type Handle: Copy + Eq + Hash + fmt::Debug;

    /// Create a new object compatible with `key`.
    fn create(&mut self, key: &Self::Key) -> Result<Self::Handle>;

    /// Destroy an object previously returned by [`create`](Self::create).
    fn destroy(&mut self, handle: Self::Handle) -> Result<()>;
}

/// Point-in-time counters of a [`RecyclingPool`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PoolStats {
    /// Objects created and not yet destroyed.
    pub live: usize,
    /// Objects parked on a free-list.
    pub cached: usize,
    /// Objects currently held by callers.
    pub loaned: usize,
    /// Distinct keys that have a free-list.
    pub keys: usize,
    /// Requests served from a free-list.
    pub hits: u64,
    /// Requests that created a new object.
    pub misses: u64,
}

/// Free-list cache of native memory objects keyed by compatibility.
///
/// Every handle the pool ever created is in the metadata table until the pool
/// is dropped. At any point a handle is either on exactly one free-list or on
/// loan to the caller, never both.
///
/// # Thread Safety
///
/// There is no internal locking; all methods take `&mut self`. Callers that
/// share a pool across threads must serialize access themselves.
pub struct RecyclingPool<F: MemoryObjectFactory> {
    /// Name used in log events.
    label: &'static str,

    factory: F,

    /// Handle to the key it was created with. Sole authority on object lifetime.
    meta: HashMap<F::Handle, F::Key>,

    /// Key to free handles, most recently recycled at the front.
    cache: HashMap<F::Key, VecDeque<F::Handle>>,

    /// Handles currently held by callers.
    loaned: HashSet<F::Handle>,

    hits: u64,
    misses: u64,
}

impl<F: MemoryObjectFactory> fmt::Debug for RecyclingPool<F> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RecyclingPool")
            .field("label", &self.label)
            .field("stats", &self.stats())
            .finish()
    }
}

impl<F: MemoryObjectFactory> RecyclingPool<F> {
    pub fn new(label: &'static str, factory: F) -> Self {
        Self {
            label,
            factory,
            meta: HashMap::new(),
            cache: HashMap::new(),
            loaned: HashSet::new(),
            hits: 0,
            misses: 0,
        }
    }

    /// Hand out an object compatible with `key`.
    ///
    /// The most recently recycled compatible object is returned if there is one;
    /// that path never touches the driver and cannot fail. Otherwise a new object
    /// is created and any creation error is returned unchanged, leaving the pool
    /// as it was.
    pub fn acquire(&mut self, key: &F::Key) -> Result<F::Handle> {
        if let Some(handle) = self.cache.get_mut(key).and_then(VecDeque::pop_front) {
            self.hits += 1;
            self.loaned.insert(handle);
            tracing::trace!(pool = self.label, ?handle, ?key, "reused");
            return Ok(handle);
        }

        let handle = self.factory.create(key)?;
        self.misses += 1;

        let previous = self.meta.insert(handle, key.clone());
        assert!(
            previous.is_none(),
            "{}: native api returned live handle {:?} twice",
            self.label,
            handle
        );
        self.loaned.insert(handle);

        tracing::trace!(pool = self.label, ?handle, ?key, "allocated");
        Ok(handle)
    }

    /// Return an object to its free-list.
    ///
    /// The object stays alive on the device and becomes the first candidate for
    /// the next request with the same key.
    ///
    /// # Panics
    ///
    /// Panics if `handle` was not handed out by this pool, or was already
    /// returned. Both are caller bugs that would otherwise let two owners hold
    /// the same device object.
    pub fn recycle(&mut self, handle: F::Handle) {
        let Some(key) = self.meta.get(&handle) else {
            panic!(
                "{}: released handle {:?} was not allocated by this pool",
                self.label, handle
            );
        };

        if !self.loaned.remove(&handle) {
            panic!("{}: handle {:?} released twice", self.label, handle);
        }

        self.cache.entry(key.clone()).or_default().push_front(handle);
        tracing::trace!(pool = self.label, ?handle, ?key, "recycled");
    }

    /// Whether `handle` was created by this pool.
    pub fn contains(&self, handle: F::Handle) -> bool {
        self.meta.contains_key(&handle)
    }

    /// Whether `handle` is currently parked on a free-list.
    pub fn is_cached(&self, handle: F::Handle) -> bool {
        self.contains(handle) && !self.loaned.contains(&handle)
    }

    /// The key `handle` was created with.
    pub fn key_of(&self, handle: F::Handle) -> Option<&F::Key> {
        self.meta.get(&handle)
    }

    /// Number of free objects parked for `key`.
    pub fn cached_for(&self, key: &F::Key) -> usize {
        self.cache.get(key).map_or(0, VecDeque::len)
    }

    pub fn factory(&self) -> &F {
        &self.factory
    }

    pub fn label(&self) -> &'static str {
        self.label
    }

    pub fn stats(&self) -> PoolStats {
        PoolStats {
            live: self.meta.len(),
            cached: self.meta.len() - self.loaned.len(),
            loaned: self.loaned.len(),
            keys: self.cache.len(),
            hits: self.hits,
            misses: self.misses,
        }
    }
}

impl<F: MemoryObjectFactory> Drop for RecyclingPool<F> {
    fn drop(&mut self) {
        if !self.loaned.is_empty() {
            tracing::debug!(
                pool = self.label,
                loaned = self.loaned.len(),
                "tearing down with objects still on loan"
            );
        }

        let live = self.meta.len();
        self.cache.clear();
        self.loaned.clear();

        for (handle, key) in self.meta.drain() {
            if let Err(e) = self.factory.destroy(handle) {
                tracing::warn!(pool = self.label, ?handle, ?key, "failed to release: {e}");
            }
        }

        tracing::debug!(
            pool = self.label,
            released = live,
            hits = self.hits,
            misses = self.misses,
            "pool torn down"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{AllocatorError, ClStatus, MemoryKind};
    use std::cell::RefCell;
    use std::rc::Rc;

    /// Factory handing out sequential ids and recording destroys.
    #[derive(Default)]
    struct CountingFactory {
        next: u32,
        created: Vec<usize>,
        destroyed: Rc<RefCell<Vec<u32>>>,
        fail_next: bool,
    }

    impl MemoryObjectFactory for CountingFactory {
        type Key = usize;
        type Handle = u32;

        fn create(&mut self, key: &usize) -> Result<u32> {
            if std::mem::take(&mut self.fail_next) {
                return Err(AllocatorError::DeviceAllocation {
                    kind: MemoryKind::Buffer,
                    status: ClStatus::OUT_OF_RESOURCES,
                });
            }
            self.next += 1;
            self.created.push(*key);
            Ok(self.next)
        }

        fn destroy(&mut self, handle: u32) -> Result<()> {
            self.destroyed.borrow_mut().push(handle);
            Ok(())
        }
    }

    fn pool() -> (RecyclingPool<CountingFactory>, Rc<RefCell<Vec<u32>>>) {
        let factory = CountingFactory::default();
        let destroyed = factory.destroyed.clone();
        (RecyclingPool::new("test", factory), destroyed)
    }

    #[test]
    fn test_hit_returns_recycled_handle_without_create() {
        let (mut pool, _) = pool();
        let h = pool.acquire(&64).unwrap();
        pool.recycle(h);
        assert_eq!(pool.acquire(&64).unwrap(), h);
        assert_eq!(pool.factory().created, vec![64]);

        let stats = pool.stats();
        assert_eq!(stats.hits, 1);
        assert_eq!(stats.misses, 1);
    }

    #[test]
    fn test_free_list_is_lifo() {
        let (mut pool, _) = pool();
        let h1 = pool.acquire(&8).unwrap();
        let h2 = pool.acquire(&8).unwrap();
        pool.recycle(h1);
        pool.recycle(h2);
        assert_eq!(pool.acquire(&8).unwrap(), h2);
        assert_eq!(pool.acquire(&8).unwrap(), h1);
    }

    #[test]
    fn test_miss_on_other_key_keeps_cached_handle() {
        let (mut pool, _) = pool();
        let h1 = pool.acquire(&8).unwrap();
        pool.recycle(h1);
        let h2 = pool.acquire(&16).unwrap();
        assert_ne!(h1, h2);
        assert!(pool.contains(h1));
        assert!(pool.contains(h2));
        assert!(!pool.contains(h2 + 1));
        assert!(pool.is_cached(h1));
        assert!(!pool.is_cached(h2));
        assert_eq!(pool.cached_for(&8), 1);
        assert_eq!(pool.key_of(h2), Some(&16));
    }

    #[test]
    fn test_failed_create_leaves_pool_untouched() {
        let (mut pool, _) = pool();
        pool.factory.fail_next = true;
        assert!(pool.acquire(&8).is_err());
        assert_eq!(pool.stats(), PoolStats::default());
    }

    #[test]
    fn test_drop_destroys_every_handle_once() {
        let (mut pool, destroyed) = pool();
        let h1 = pool.acquire(&8).unwrap();
        let _h2 = pool.acquire(&8).unwrap();
        let _h3 = pool.acquire(&32).unwrap();
        pool.recycle(h1);
        drop(pool);

        let mut destroyed = destroyed.borrow().clone();
        destroyed.sort_unstable();
        assert_eq!(destroyed, vec![1, 2, 3]);
    }

    #[test]
    fn test_debug_names_pool() {
        let (pool, _) = pool();
        assert_eq!(pool.label(), "test");
        assert!(format!("{pool:?}").contains("\"test\""));
    }

    #[test]
    #[should_panic(expected = "was not allocated by this pool")]
    fn test_recycle_foreign_handle_panics() {
        let (mut pool, _) = pool();
        pool.recycle(42);
    }

    #[test]
    #[should_panic(expected = "released twice")]
    fn test_double_recycle_panics() {
        let (mut pool, _) = pool();
        let h = pool.acquire(&8).unwrap();
        pool.recycle(h);
        pool.recycle(h);
    }
}
