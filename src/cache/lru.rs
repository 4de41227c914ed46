// Copyright (c) 2024-present, fjall-rs
// This source code is licensed under both the Apache 2.0 and MIT License
// (found in the LICENSE-* files in the repository)

use super::{Cache, CacheValue, Handle};
use ::lru::LruCache as RecencyList;
use ahash::RandomState;
use std::{
    collections::HashMap,
    sync::{
        atomic::{AtomicUsize, Ordering},
        Mutex,
    },
};

const MAX_SHARD_BITS: u32 = 6;
const MIN_SHARD_SIZE: usize = 512 * 1_024;

struct Slot {
    handle: Handle,
    refs: usize,
    in_cache: bool,
}

/// One independently locked part of the cache
///
/// Unreferenced entries that are still in the cache are kept in `lru`,
/// ordered by the time they were last released. Charges are tracked here,
/// the recency list only holds slot IDs.
struct LruShard {
    capacity: usize,
    strict_capacity_limit: bool,
    usage: usize,
    pinned_usage: usize,
    table: HashMap<Box<[u8]>, u64, RandomState>,
    slots: HashMap<u64, Slot, RandomState>,
    lru: RecencyList<u64, (), RandomState>,
}

impl LruShard {
    fn new(capacity: usize, strict_capacity_limit: bool) -> Self {
        Self {
            capacity,
            strict_capacity_limit,
            usage: 0,
            pinned_usage: 0,
            table: HashMap::default(),
            slots: HashMap::default(),
            lru: RecencyList::unbounded_with_hasher(RandomState::new()),
        }
    }

    fn push_lru(&mut self, id: u64) {
        if self.slots.contains_key(&id) {
            self.lru.put(id, ());
        }
    }

    /// Removes a slot and its table entry, returning the handle to drop.
    fn free(&mut self, id: u64) -> Option<Handle> {
        let slot = self.slots.remove(&id)?;
        self.lru.pop(&id);

        if slot.in_cache && self.table.get(slot.handle.key()) == Some(&id) {
            self.table.remove(slot.handle.key());
        }

        self.usage -= slot.handle.charge();
        Some(slot.handle)
    }

    fn evict_until_fits(&mut self, charge: usize, garbage: &mut Vec<Handle>) {
        while self.usage + charge > self.capacity {
            let Some((id, ())) = self.lru.pop_lru() else {
                break;
            };
            garbage.extend(self.free(id));
        }
    }

    fn insert(
        &mut self,
        handle: Handle,
        pinned: bool,
        garbage: &mut Vec<Handle>,
    ) -> crate::Result<Option<Handle>> {
        let charge = handle.charge();

        self.evict_until_fits(charge, garbage);

        if self.usage + charge > self.capacity && (self.strict_capacity_limit || !pinned) {
            garbage.push(handle);

            if pinned {
                return Err(crate::Error::MemoryLimit);
            }

            // Behaves as if it was inserted and evicted right away
            return Ok(None);
        }

        let id = handle.id();

        if let Some(old_id) = self.table.insert(handle.key().into(), id) {
            if let Some(old) = self.slots.get_mut(&old_id) {
                old.in_cache = false;

                if old.refs == 0 {
                    garbage.extend(self.free(old_id));
                }
            }
        }

        self.usage += charge;
        self.slots.insert(
            id,
            Slot {
                handle: handle.share(),
                refs: usize::from(pinned),
                in_cache: true,
            },
        );

        if pinned {
            self.pinned_usage += charge;
            Ok(Some(handle))
        } else {
            self.push_lru(id);
            garbage.push(handle);
            Ok(None)
        }
    }

    fn lookup(&mut self, key: &[u8]) -> Option<Handle> {
        let id = *self.table.get(key)?;
        let slot = self.slots.get_mut(&id)?;

        if slot.refs == 0 {
            self.lru.pop(&id);
            self.pinned_usage += slot.handle.charge();
        }
        slot.refs += 1;

        Some(slot.handle.share())
    }

    fn release(&mut self, id: u64, erase_if_last_ref: bool, garbage: &mut Vec<Handle>) -> bool {
        let Some(slot) = self.slots.get_mut(&id) else {
            return false;
        };

        debug_assert!(slot.refs > 0, "released handle has no references");
        slot.refs = slot.refs.saturating_sub(1);

        if slot.refs > 0 {
            return false;
        }

        let charge = slot.handle.charge();
        let in_cache = slot.in_cache;
        self.pinned_usage -= charge;

        if in_cache && !erase_if_last_ref && self.usage <= self.capacity {
            self.push_lru(id);
            return false;
        }

        garbage.extend(self.free(id));
        true
    }

    fn erase(&mut self, key: &[u8], garbage: &mut Vec<Handle>) {
        let Some(id) = self.table.remove(key) else {
            return;
        };

        if let Some(slot) = self.slots.get_mut(&id) {
            slot.in_cache = false;

            if slot.refs == 0 {
                garbage.extend(self.free(id));
            }
        }
    }

    fn erase_unref_entries(&mut self, garbage: &mut Vec<Handle>) {
        while let Some((id, ())) = self.lru.pop_lru() {
            garbage.extend(self.free(id));
        }
    }

    fn set_capacity(&mut self, capacity: usize, garbage: &mut Vec<Handle>) {
        self.capacity = capacity;
        self.evict_until_fits(0, garbage);
    }
}

/// Sharded LRU cache
///
/// Entries are charged by the caller-supplied charge. Referenced entries are
/// never evicted; unreferenced ones are evicted least-recently-released first.
pub struct LruCache {
    shards: Box<[Mutex<LruShard>]>,
    hasher: RandomState,
    capacity: AtomicUsize,
}

impl std::fmt::Debug for LruCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "LruCache<cap: {} bytes, shards: {}>",
            self.capacity(),
            self.shards.len()
        )
    }
}

fn default_shard_bits(capacity: usize) -> u32 {
    let mut num_shard_bits = 0;
    let mut num_shards = capacity / MIN_SHARD_SIZE;

    while num_shards > 1 && num_shard_bits < MAX_SHARD_BITS {
        num_shards >>= 1;
        num_shard_bits += 1;
    }

    num_shard_bits
}

fn per_shard_capacity(capacity: usize, num_shards: usize) -> usize {
    capacity.div_ceil(num_shards)
}

impl LruCache {
    /// Creates a new cache with roughly `bytes` of capacity.
    #[must_use]
    pub fn with_capacity_bytes(bytes: usize) -> Self {
        Self::new(bytes, default_shard_bits(bytes), false)
    }

    /// Creates a new cache with `2^num_shard_bits` shards.
    #[must_use]
    pub fn new(capacity: usize, num_shard_bits: u32, strict_capacity_limit: bool) -> Self {
        let num_shards = 1_usize << num_shard_bits.min(MAX_SHARD_BITS);
        let shard_capacity = per_shard_capacity(capacity, num_shards);

        log::debug!(
            "Creating LRU cache with capacity={capacity}, shards={num_shards}, strict={strict_capacity_limit}"
        );

        Self {
            shards: (0..num_shards)
                .map(|_| Mutex::new(LruShard::new(shard_capacity, strict_capacity_limit)))
                .collect(),
            hasher: RandomState::new(),
            capacity: AtomicUsize::new(capacity),
        }
    }

    #[allow(clippy::cast_possible_truncation)]
    fn shard(&self, key: &[u8]) -> &Mutex<LruShard> {
        let idx = (self.hasher.hash_one(key) as usize) & (self.shards.len() - 1);

        // NOTE: The shard count is a power of two, so idx is in bounds
        #[allow(clippy::indexing_slicing)]
        &self.shards[idx]
    }

    /// Returns the number of entries, referenced or not, that are in the cache.
    #[must_use]
    pub fn len(&self) -> usize {
        self.shards
            .iter()
            .map(|shard| shard.lock().expect("lock is poisoned").table.len())
            .sum()
    }

    /// Returns `true` if there are no cached entries.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Cache for LruCache {
    fn name(&self) -> &'static str {
        "LruCache"
    }

    fn insert(&self, key: &[u8], value: CacheValue, charge: usize) -> crate::Result<Handle> {
        let mut garbage = vec![];

        let result = self
            .shard(key)
            .lock()
            .expect("lock is poisoned")
            .insert(Handle::new(key, value, charge), true, &mut garbage);

        // NOTE: Evicted entries are dropped outside of the shard lock
        drop(garbage);

        match result {
            Ok(Some(handle)) => Ok(handle),
            Ok(None) => Err(crate::Error::MemoryLimit),
            Err(e) => Err(e),
        }
    }

    fn insert_unpinned(&self, key: &[u8], value: CacheValue, charge: usize) -> crate::Result<()> {
        let mut garbage = vec![];

        self.shard(key)
            .lock()
            .expect("lock is poisoned")
            .insert(Handle::new(key, value, charge), false, &mut garbage)?;

        drop(garbage);
        Ok(())
    }

    fn lookup(&self, key: &[u8]) -> Option<Handle> {
        self.shard(key).lock().expect("lock is poisoned").lookup(key)
    }

    fn release(&self, handle: Handle, erase_if_last_ref: bool) -> bool {
        let mut garbage = vec![];

        let erased = self
            .shard(handle.key())
            .lock()
            .expect("lock is poisoned")
            .release(handle.id(), erase_if_last_ref, &mut garbage);

        drop(garbage);
        drop(handle);

        erased
    }

    fn erase(&self, key: &[u8]) {
        let mut garbage = vec![];

        self.shard(key)
            .lock()
            .expect("lock is poisoned")
            .erase(key, &mut garbage);

        drop(garbage);
    }

    fn erase_unref_entries(&self) {
        for shard in &*self.shards {
            let mut garbage = vec![];
            shard
                .lock()
                .expect("lock is poisoned")
                .erase_unref_entries(&mut garbage);
            drop(garbage);
        }
    }

    fn set_capacity(&self, capacity: usize) {
        let shard_capacity = per_shard_capacity(capacity, self.shards.len());
        self.capacity.store(capacity, Ordering::Release);

        for shard in &*self.shards {
            let mut garbage = vec![];
            shard
                .lock()
                .expect("lock is poisoned")
                .set_capacity(shard_capacity, &mut garbage);
            drop(garbage);
        }
    }

    fn set_strict_capacity_limit(&self, flag: bool) {
        for shard in &*self.shards {
            shard.lock().expect("lock is poisoned").strict_capacity_limit = flag;
        }
    }

    fn capacity(&self) -> usize {
        self.capacity.load(Ordering::Acquire)
    }

    fn usage(&self) -> usize {
        self.shards
            .iter()
            .map(|shard| shard.lock().expect("lock is poisoned").usage)
            .sum()
    }

    fn pinned_usage(&self) -> usize {
        self.shards
            .iter()
            .map(|shard| shard.lock().expect("lock is poisoned").pinned_usage)
            .sum()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use test_log::test;

    fn value(n: u32) -> CacheValue {
        Arc::new(n)
    }

    fn read(handle: &Handle) -> u32 {
        *handle.value().clone().downcast::<u32>().unwrap()
    }

    #[test]
    fn lru_insert_lookup_release() -> crate::Result<()> {
        let cache = LruCache::new(100, 0, false);

        let handle = cache.insert(b"a", value(1), 10)?;
        assert_eq!(10, cache.usage());
        assert_eq!(10, cache.pinned_usage());
        assert!(!cache.release(handle, false));
        assert_eq!(0, cache.pinned_usage());

        let handle = cache.lookup(b"a").unwrap();
        assert_eq!(1, read(&handle));
        assert!(!cache.release(handle, false));

        assert!(cache.lookup(b"b").is_none());
        assert_eq!(1, cache.len());

        Ok(())
    }

    #[test]
    fn lru_evicts_least_recently_released() -> crate::Result<()> {
        let cache = LruCache::new(30, 0, false);

        for (idx, key) in [b"a", b"b", b"c"].into_iter().enumerate() {
            cache.insert_unpinned(key, value(idx as u32), 10)?;
        }

        // Touch "a", so "b" is the oldest
        let handle = cache.lookup(b"a").unwrap();
        cache.release(handle, false);

        cache.insert_unpinned(b"d", value(3), 10)?;

        assert!(cache.lookup(b"b").is_none());
        for key in [b"a", b"c", b"d"] {
            let handle = cache.lookup(key).unwrap();
            cache.release(handle, false);
        }
        assert_eq!(30, cache.usage());

        Ok(())
    }

    #[test]
    fn lru_referenced_entries_leave_recency_list() -> crate::Result<()> {
        let cache = LruCache::new(100, 0, false);

        cache.insert_unpinned(b"a", value(1), 10)?;
        cache.insert_unpinned(b"b", value(2), 10)?;

        // Looked up repeatedly, "a" must not be listed more than once
        for _ in 0..3 {
            let handle = cache.lookup(b"a").unwrap();
            cache.release(handle, false);
        }

        let held = cache.lookup(b"b").unwrap();
        cache.erase_unref_entries();

        assert!(cache.lookup(b"a").is_none());
        assert_eq!(10, cache.usage());
        assert_eq!(10, cache.pinned_usage());

        assert!(!cache.release(held, false));
        cache.erase_unref_entries();
        assert_eq!(0, cache.usage());
        assert!(cache.is_empty());

        Ok(())
    }

    #[test]
    fn lru_pinned_entries_are_not_evicted() -> crate::Result<()> {
        let cache = LruCache::new(20, 0, false);

        let a = cache.insert(b"a", value(1), 10)?;
        let b = cache.insert(b"b", value(2), 10)?;

        // Not strict: pinned inserts may exceed the capacity
        let c = cache.insert(b"c", value(3), 10)?;
        assert_eq!(30, cache.usage());

        // Releasing while over capacity frees the entry
        assert!(cache.release(c, false));
        assert_eq!(20, cache.usage());

        // Unpinned inserts that do not fit are dropped
        cache.insert_unpinned(b"d", value(4), 10)?;
        assert!(cache.lookup(b"d").is_none());

        cache.release(a, false);
        cache.release(b, false);
        Ok(())
    }

    #[test]
    fn lru_strict_capacity_limit() -> crate::Result<()> {
        let cache = LruCache::new(10, 0, true);

        let a = cache.insert(b"a", value(1), 10)?;
        assert!(matches!(
            cache.insert(b"b", value(2), 1),
            Err(crate::Error::MemoryLimit)
        ));
        assert_eq!(10, cache.usage());

        cache.release(a, false);

        // "a" is unreferenced now, so it can be evicted
        let b = cache.insert(b"b", value(2), 1)?;
        assert_eq!(1, cache.usage());
        cache.release(b, false);

        Ok(())
    }

    #[test]
    fn lru_erase_referenced_entry() -> crate::Result<()> {
        let cache = LruCache::new(100, 0, false);

        let handle = cache.insert(b"a", value(1), 10)?;
        cache.erase(b"a");

        // Still charged until the last reference is gone
        assert!(cache.lookup(b"a").is_none());
        assert_eq!(10, cache.usage());
        assert_eq!(1, read(&handle));

        assert!(cache.release(handle, false));
        assert_eq!(0, cache.usage());

        Ok(())
    }

    #[test]
    fn lru_replace_referenced_entry() -> crate::Result<()> {
        let cache = LruCache::new(100, 0, false);

        let old = cache.insert(b"a", value(1), 10)?;
        cache.insert_unpinned(b"a", value(2), 20)?;
        assert_eq!(30, cache.usage());

        let new = cache.lookup(b"a").unwrap();
        assert_eq!(2, read(&new));

        assert!(cache.release(old, false));
        assert_eq!(20, cache.usage());
        assert!(!cache.release(new, false));

        Ok(())
    }

    #[test]
    fn lru_release_with_erase() -> crate::Result<()> {
        let cache = LruCache::new(100, 0, false);

        let handle = cache.insert(b"a", value(1), 10)?;
        let handle2 = cache.lookup(b"a").unwrap();

        assert!(!cache.release(handle, true));
        assert!(cache.release(handle2, true));
        assert_eq!(0, cache.usage());
        assert!(cache.is_empty());

        Ok(())
    }

    #[test]
    fn lru_set_capacity_and_erase_unref() -> crate::Result<()> {
        let cache = LruCache::new(100, 0, false);

        for idx in 0..10_u32 {
            cache.insert_unpinned(&idx.to_be_bytes(), value(idx), 5)?;
        }
        let pinned = cache.insert(b"pinned", value(99), 5)?;
        assert_eq!(55, cache.usage());

        cache.set_capacity(20);
        assert_eq!(20, cache.capacity());
        assert_eq!(20, cache.usage());

        cache.erase_unref_entries();
        assert_eq!(5, cache.usage());

        cache.release(pinned, false);
        Ok(())
    }

    #[test]
    fn lru_default_shard_bits() {
        assert_eq!(0, default_shard_bits(1_024));
        assert_eq!(1, default_shard_bits(1_024 * 1_024));
        assert_eq!(MAX_SHARD_BITS, default_shard_bits(1_024 * 1_024 * 1_024));
    }
}
