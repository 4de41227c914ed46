// Copyright (c) 2024-present, fjall-rs
// This source code is licensed under both the Apache 2.0 and MIT License
// (found in the LICENSE-* files in the repository)

use super::{Cache, CacheEntryRole, CacheValue, ConcurrentCacheReservationManager, Handle};
use std::sync::Arc;

/// Cache decorator that charges the usage of the wrapped cache to a parent cache
///
/// This lets a blob cache and a block cache share one memory budget: the
/// parent cache holds a reservation that follows the usage of the inner cache.
///
/// Failing to adjust the reservation never fails the cache operation itself.
pub struct ChargedCache<C: Cache> {
    inner: C,
    cache_res_mgr: Arc<ConcurrentCacheReservationManager>,
}

impl<C: Cache> std::fmt::Debug for ChargedCache<C> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "ChargedCache<{}, reserved: {}>",
            self.inner.name(),
            self.cache_res_mgr.total_reserved_cache_size(),
        )
    }
}

impl<C: Cache> ChargedCache<C> {
    /// Wraps `inner`, charging its usage to `parent`.
    pub fn new(inner: C, parent: Arc<dyn Cache>) -> Self {
        Self {
            inner,
            cache_res_mgr: Arc::new(ConcurrentCacheReservationManager::new(
                parent,
                CacheEntryRole::BlobCache,
                false,
            )),
        }
    }

    /// Returns the wrapped cache.
    pub fn inner(&self) -> &C {
        &self.inner
    }

    /// Returns the manager holding the reservation in the parent cache.
    #[must_use]
    pub fn cache_reservation_manager(&self) -> &Arc<ConcurrentCacheReservationManager> {
        &self.cache_res_mgr
    }

    fn sync_reservation(&self) {
        if let Err(e) = self
            .cache_res_mgr
            .update_cache_reservation(self.inner.usage())
        {
            log::warn!("Could not charge {} to parent cache: {e:?}", self.inner.name());
        }
    }
}

impl<C: Cache> Cache for ChargedCache<C> {
    fn name(&self) -> &'static str {
        "ChargedCache"
    }

    fn insert(&self, key: &[u8], value: CacheValue, charge: usize) -> crate::Result<Handle> {
        let result = self.inner.insert(key, value, charge);

        // Inserting may have evicted entries even if it failed, so use the total usage
        self.sync_reservation();

        result
    }

    fn insert_unpinned(&self, key: &[u8], value: CacheValue, charge: usize) -> crate::Result<()> {
        let result = self.inner.insert_unpinned(key, value, charge);
        self.sync_reservation();
        result
    }

    fn lookup(&self, key: &[u8]) -> Option<Handle> {
        self.inner.lookup(key)
    }

    fn lookup_or_promote(
        &self,
        key: &[u8],
        promote: &mut dyn FnMut() -> Option<(CacheValue, usize)>,
    ) -> Option<Handle> {
        let handle = self.inner.lookup_or_promote(key, promote);
        self.sync_reservation();
        handle
    }

    fn release(&self, handle: Handle, erase_if_last_ref: bool) -> bool {
        let memory_used_delta = self.inner.handle_usage(&handle);
        let erased = self.inner.release(handle, erase_if_last_ref);

        if erased {
            if let Err(e) = self
                .cache_res_mgr
                .update_cache_reservation_delta(memory_used_delta, false)
            {
                log::warn!("Could not shrink reservation of {}: {e:?}", self.inner.name());
            }
        }

        erased
    }

    fn erase(&self, key: &[u8]) {
        self.inner.erase(key);
        self.sync_reservation();
    }

    fn erase_unref_entries(&self) {
        self.inner.erase_unref_entries();
        self.sync_reservation();
    }

    fn set_capacity(&self, capacity: usize) {
        self.inner.set_capacity(capacity);

        // Shrinking may have evicted entries
        self.sync_reservation();
    }

    fn set_strict_capacity_limit(&self, flag: bool) {
        self.inner.set_strict_capacity_limit(flag);
    }

    fn capacity(&self) -> usize {
        self.inner.capacity()
    }

    fn usage(&self) -> usize {
        self.inner.usage()
    }

    fn pinned_usage(&self) -> usize {
        self.inner.pinned_usage()
    }

    fn handle_usage(&self, handle: &Handle) -> usize {
        self.inner.handle_usage(handle)
    }
}
