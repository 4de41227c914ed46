// Copyright (c) 2024-present, fjall-rs
// This source code is licensed under both the Apache 2.0 and MIT License
// (found in the LICENSE-* files in the repository)

//! Generic cache primitive and its decorators
//!
//! A [`Cache`] owns its entries. A [`Handle`] is a counted reference to one
//! entry that pins it in the cache until it is given back through
//! [`Cache::release`]. [`CacheHandleGuard`] does that automatically on drop.

mod charged;
mod guard;
mod lru;
mod reservation;
mod roles;

pub use {
    charged::ChargedCache,
    guard::CacheHandleGuard,
    lru::LruCache,
    reservation::{
        CacheReservationHandle, CacheReservationManager, ConcurrentCacheReservationManager,
        DUMMY_ENTRY_SIZE,
    },
    roles::{CacheEntryRole, NUM_CACHE_ENTRY_ROLES},
};

use std::{
    any::Any,
    sync::{
        atomic::{AtomicU64, Ordering},
        Arc,
    },
};

/// Type-erased cached object
pub type CacheValue = Arc<dyn Any + Send + Sync>;

static NEXT_ENTRY_ID: AtomicU64 = AtomicU64::new(1);

struct Entry {
    id: u64,
    key: Box<[u8]>,
    value: CacheValue,
    charge: usize,
}

/// Counted reference to a cache entry
///
/// Every handle obtained from a cache must be given back through
/// [`Cache::release`], otherwise the entry stays pinned forever.
#[must_use]
pub struct Handle(Arc<Entry>);

impl std::fmt::Debug for Handle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Handle<#{}, charge: {}>", self.0.id, self.0.charge)
    }
}

impl Handle {
    /// Creates a handle to a new entry.
    ///
    /// Only meant for [`Cache`] implementations.
    pub fn new(key: &[u8], value: CacheValue, charge: usize) -> Self {
        Self(Arc::new(Entry {
            id: NEXT_ENTRY_ID.fetch_add(1, Ordering::Relaxed),
            key: key.into(),
            value,
            charge,
        }))
    }

    /// Creates another handle to the same entry.
    ///
    /// Only meant for [`Cache`] implementations.
    #[doc(hidden)]
    pub fn share(&self) -> Self {
        Self(self.0.clone())
    }

    /// Process-unique ID of the entry.
    #[doc(hidden)]
    #[must_use]
    pub fn id(&self) -> u64 {
        self.0.id
    }

    /// Key of the entry.
    #[must_use]
    pub fn key(&self) -> &[u8] {
        &self.0.key
    }

    /// Cached object.
    #[must_use]
    pub fn value(&self) -> &CacheValue {
        &self.0.value
    }

    /// Charge of the entry in bytes.
    #[must_use]
    pub fn charge(&self) -> usize {
        self.0.charge
    }
}

/// Capability set of a cache
///
/// Blob components only depend on this contract, not on a specific
/// eviction algorithm.
pub trait Cache: Send + Sync {
    /// Name of the implementation.
    fn name(&self) -> &'static str;

    /// Inserts an entry and returns a handle to it, replacing any entry with the same key.
    ///
    /// The cache may evict unreferenced entries to make room.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::MemoryLimit`] if the cache has a strict capacity
    /// limit and the entry does not fit.
    fn insert(&self, key: &[u8], value: CacheValue, charge: usize) -> crate::Result<Handle>;

    /// Inserts an entry without keeping a reference to it.
    ///
    /// If the entry does not fit, it is dropped as if it was inserted and
    /// evicted immediately.
    ///
    /// # Errors
    ///
    /// Implementations may fail, the default LRU cache never does.
    fn insert_unpinned(&self, key: &[u8], value: CacheValue, charge: usize) -> crate::Result<()>;

    /// Looks up an entry.
    fn lookup(&self, key: &[u8]) -> Option<Handle>;

    /// Looks up an entry, materializing it through `promote` on a miss.
    ///
    /// `promote` returns the object and its charge, e.g. after loading it from
    /// a slower tier. The promoted entry is inserted into the cache.
    fn lookup_or_promote(
        &self,
        key: &[u8],
        promote: &mut dyn FnMut() -> Option<(CacheValue, usize)>,
    ) -> Option<Handle> {
        if let Some(handle) = self.lookup(key) {
            return Some(handle);
        }

        let (value, charge) = promote()?;
        self.insert(key, value, charge).ok()
    }

    /// Gives back a handle.
    ///
    /// Returns `true` if the entry was freed as a result.
    fn release(&self, handle: Handle, erase_if_last_ref: bool) -> bool;

    /// Removes an entry. Referenced entries are freed once their last handle is released.
    fn erase(&self, key: &[u8]);

    /// Removes all entries that are not referenced by any handle.
    fn erase_unref_entries(&self);

    /// Sets the capacity in bytes, evicting unreferenced entries if needed.
    fn set_capacity(&self, capacity: usize);

    /// Sets whether inserts fail instead of exceeding the capacity.
    fn set_strict_capacity_limit(&self, flag: bool);

    /// Returns the capacity in bytes.
    fn capacity(&self) -> usize;

    /// Returns the sum of the charges of all entries.
    fn usage(&self) -> usize;

    /// Returns the sum of the charges of all referenced entries.
    fn pinned_usage(&self) -> usize;

    /// Returns the memory a handle's entry is charged for.
    fn handle_usage(&self, handle: &Handle) -> usize {
        handle.charge()
    }
}

impl<C: Cache + ?Sized> Cache for Arc<C> {
    fn name(&self) -> &'static str {
        (**self).name()
    }

    fn insert(&self, key: &[u8], value: CacheValue, charge: usize) -> crate::Result<Handle> {
        (**self).insert(key, value, charge)
    }

    fn insert_unpinned(&self, key: &[u8], value: CacheValue, charge: usize) -> crate::Result<()> {
        (**self).insert_unpinned(key, value, charge)
    }

    fn lookup(&self, key: &[u8]) -> Option<Handle> {
        (**self).lookup(key)
    }

    fn lookup_or_promote(
        &self,
        key: &[u8],
        promote: &mut dyn FnMut() -> Option<(CacheValue, usize)>,
    ) -> Option<Handle> {
        (**self).lookup_or_promote(key, promote)
    }

    fn release(&self, handle: Handle, erase_if_last_ref: bool) -> bool {
        (**self).release(handle, erase_if_last_ref)
    }

    fn erase(&self, key: &[u8]) {
        (**self).erase(key);
    }

    fn erase_unref_entries(&self) {
        (**self).erase_unref_entries();
    }

    fn set_capacity(&self, capacity: usize) {
        (**self).set_capacity(capacity);
    }

    fn set_strict_capacity_limit(&self, flag: bool) {
        (**self).set_strict_capacity_limit(flag);
    }

    fn capacity(&self) -> usize {
        (**self).capacity()
    }

    fn usage(&self) -> usize {
        (**self).usage()
    }

    fn pinned_usage(&self) -> usize {
        (**self).pinned_usage()
    }

    fn handle_usage(&self, handle: &Handle) -> usize {
        (**self).handle_usage(handle)
    }
}
