// Copyright (c) 2024-present, fjall-rs
// This source code is licensed under both the Apache 2.0 and MIT License
// (found in the LICENSE-* files in the repository)

use super::{Cache, CacheEntryRole, CacheValue, Handle};
use std::sync::{
    atomic::{AtomicU64, Ordering},
    Arc, Mutex,
};

/// Granularity of reservations
pub const DUMMY_ENTRY_SIZE: usize = 256 * 1_024;

static NEXT_MANAGER_ID: AtomicU64 = AtomicU64::new(1);

/// Charges memory against a cache by inserting pinned dummy entries into it
///
/// The reserved size is always a multiple of [`DUMMY_ENTRY_SIZE`].
pub struct CacheReservationManager {
    cache: Arc<dyn Cache>,
    role: CacheEntryRole,
    delayed_decrease: bool,

    id: u64,
    next_key: u64,

    cache_allocated_size: usize,
    memory_used: usize,
    dummy_handles: Vec<Handle>,
}

impl std::fmt::Debug for CacheReservationManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "CacheReservationManager<{}, reserved: {}, used: {}>",
            self.role, self.cache_allocated_size, self.memory_used,
        )
    }
}

impl CacheReservationManager {
    /// Creates a manager that reserves memory in `cache`.
    ///
    /// With `delayed_decrease`, the reservation is only shrunk once the memory
    /// used drops below 3/4 of the reserved size.
    #[must_use]
    pub fn new(cache: Arc<dyn Cache>, role: CacheEntryRole, delayed_decrease: bool) -> Self {
        Self {
            cache,
            role,
            delayed_decrease,
            id: NEXT_MANAGER_ID.fetch_add(1, Ordering::Relaxed),
            next_key: 0,
            cache_allocated_size: 0,
            memory_used: 0,
            dummy_handles: vec![],
        }
    }

    /// Returns the role the dummy entries are tagged with.
    #[must_use]
    pub fn role(&self) -> CacheEntryRole {
        self.role
    }

    /// Returns the number of bytes currently reserved in the cache.
    #[must_use]
    pub fn total_reserved_cache_size(&self) -> usize {
        self.cache_allocated_size
    }

    /// Returns the memory usage last reported to the manager.
    #[must_use]
    pub fn total_memory_used(&self) -> usize {
        self.memory_used
    }

    /// Adjusts the reservation to cover `new_mem_used` bytes.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::MemoryLimit`] if the cache refused a dummy
    /// entry. The reported memory usage is recorded anyway.
    pub fn update_cache_reservation(&mut self, new_mem_used: usize) -> crate::Result<()> {
        self.memory_used = new_mem_used;
        let cur_cache_allocated_size = self.cache_allocated_size;

        if new_mem_used == cur_cache_allocated_size {
            return Ok(());
        }

        if new_mem_used > cur_cache_allocated_size {
            return self.increase_cache_reservation(new_mem_used);
        }

        if self.delayed_decrease && new_mem_used >= cur_cache_allocated_size / 4 * 3 {
            return Ok(());
        }

        self.decrease_cache_reservation(new_mem_used);
        Ok(())
    }

    fn increase_cache_reservation(&mut self, new_mem_used: usize) -> crate::Result<()> {
        while new_mem_used > self.cache_allocated_size {
            let key = self.next_dummy_key();
            let value: CacheValue = Arc::new(());

            let handle = self
                .cache
                .insert(&key, value, DUMMY_ENTRY_SIZE)
                .map_err(|e| {
                    log::debug!(
                        "Could not reserve {DUMMY_ENTRY_SIZE} bytes for {}: {e:?}",
                        self.role,
                    );
                    e
                })?;

            self.dummy_handles.push(handle);
            self.cache_allocated_size += DUMMY_ENTRY_SIZE;
        }

        log::trace!(
            "Reserved {} bytes for {} in {}",
            self.cache_allocated_size,
            self.role,
            self.cache.name(),
        );

        Ok(())
    }

    fn decrease_cache_reservation(&mut self, new_mem_used: usize) {
        while new_mem_used + DUMMY_ENTRY_SIZE <= self.cache_allocated_size {
            let Some(handle) = self.dummy_handles.pop() else {
                break;
            };
            self.cache.release(handle, true);
            self.cache_allocated_size -= DUMMY_ENTRY_SIZE;
        }

        log::trace!(
            "Shrunk reservation for {} to {} bytes",
            self.role,
            self.cache_allocated_size,
        );
    }

    /// Returns a cache key that is unique among all managers in the process.
    fn next_dummy_key(&mut self) -> Vec<u8> {
        self.next_key += 1;

        let mut key = Vec::with_capacity(1 + 2 * std::mem::size_of::<u64>());
        key.push(u8::from(self.role));
        key.extend_from_slice(&self.id.to_be_bytes());
        key.extend_from_slice(&self.next_key.to_be_bytes());
        key
    }
}

impl Drop for CacheReservationManager {
    fn drop(&mut self) {
        for handle in self.dummy_handles.drain(..) {
            self.cache.release(handle, true);
        }
    }
}

/// Thread-safe [`CacheReservationManager`]
#[derive(Debug)]
pub struct ConcurrentCacheReservationManager(Mutex<CacheReservationManager>);

impl ConcurrentCacheReservationManager {
    /// Creates a manager that reserves memory in `cache`.
    #[must_use]
    pub fn new(cache: Arc<dyn Cache>, role: CacheEntryRole, delayed_decrease: bool) -> Self {
        Self(Mutex::new(CacheReservationManager::new(
            cache,
            role,
            delayed_decrease,
        )))
    }

    /// See [`CacheReservationManager::update_cache_reservation`].
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::MemoryLimit`] if the cache is full.
    pub fn update_cache_reservation(&self, new_mem_used: usize) -> crate::Result<()> {
        self.0
            .lock()
            .expect("lock is poisoned")
            .update_cache_reservation(new_mem_used)
    }

    /// Adjusts the reservation by `delta` bytes relative to the current usage.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::MemoryLimit`] if the cache is full.
    pub fn update_cache_reservation_delta(&self, delta: usize, increase: bool) -> crate::Result<()> {
        let mut lock = self.0.lock().expect("lock is poisoned");

        let new_mem_used = if increase {
            lock.memory_used.saturating_add(delta)
        } else {
            lock.memory_used.saturating_sub(delta)
        };

        lock.update_cache_reservation(new_mem_used)
    }

    /// Reserves `incremental` bytes on top of the current usage.
    ///
    /// The bytes are given back when the returned handle is dropped.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::MemoryLimit`] if the cache is full, in which
    /// case nothing stays reserved.
    pub fn make_cache_reservation(
        self: &Arc<Self>,
        incremental: usize,
    ) -> crate::Result<CacheReservationHandle> {
        let mut lock = self.0.lock().expect("lock is poisoned");
        let prev = lock.memory_used;

        if let Err(e) = lock.update_cache_reservation(prev.saturating_add(incremental)) {
            lock.decrease_cache_reservation(prev);
            lock.memory_used = prev;
            return Err(e);
        }

        Ok(CacheReservationHandle {
            manager: self.clone(),
            incremental,
        })
    }

    /// Returns the number of bytes currently reserved in the cache.
    #[must_use]
    pub fn total_reserved_cache_size(&self) -> usize {
        self.0
            .lock()
            .expect("lock is poisoned")
            .total_reserved_cache_size()
    }

    /// Returns the memory usage last reported to the manager.
    #[must_use]
    pub fn total_memory_used(&self) -> usize {
        self.0.lock().expect("lock is poisoned").total_memory_used()
    }
}

/// Reservation of a fixed number of bytes, given back on drop
#[derive(Debug)]
pub struct CacheReservationHandle {
    manager: Arc<ConcurrentCacheReservationManager>,
    incremental: usize,
}

impl CacheReservationHandle {
    /// Returns the number of reserved bytes.
    #[must_use]
    pub fn size(&self) -> usize {
        self.incremental
    }
}

impl Drop for CacheReservationHandle {
    fn drop(&mut self) {
        if let Err(e) = self
            .manager
            .update_cache_reservation_delta(self.incremental, false)
        {
            log::warn!("Failed to give back cache reservation: {e:?}");
        }
    }
}
