// Copyright (c) 2024-present, fjall-rs
// This source code is licensed under both the Apache 2.0 and MIT License
// (found in the LICENSE-* files in the repository)

use super::{Cache, Handle};
use std::sync::Arc;

/// Scoped reference to a typed cache entry
///
/// Keeps the entry pinned in the cache and releases it when dropped.
pub struct CacheHandleGuard<T: Send + Sync + 'static> {
    cache: Arc<dyn Cache>,
    handle: Option<Handle>,
    value: Arc<T>,
}

impl<T: Send + Sync + 'static> CacheHandleGuard<T> {
    /// Wraps a handle obtained from `cache`.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::InvalidArgument`] (after releasing the handle)
    /// if the cached object is not a `T`.
    pub fn new(cache: Arc<dyn Cache>, handle: Handle) -> crate::Result<Self> {
        let value = handle.value().clone();

        match value.downcast::<T>() {
            Ok(value) => Ok(Self {
                cache,
                handle: Some(handle),
                value,
            }),
            Err(_) => {
                cache.release(handle, false);
                Err(crate::Error::InvalidArgument(
                    "cache entry has an unexpected type",
                ))
            }
        }
    }

    /// Returns the shared cached object.
    #[must_use]
    pub fn value(&self) -> &Arc<T> {
        &self.value
    }

    /// Returns the underlying handle.
    #[must_use]
    pub fn handle(&self) -> Option<&Handle> {
        self.handle.as_ref()
    }
}

impl<T: Send + Sync + 'static> std::ops::Deref for CacheHandleGuard<T> {
    type Target = T;

    fn deref(&self) -> &Self::Target {
        &self.value
    }
}

impl<T: Send + Sync + 'static> Drop for CacheHandleGuard<T> {
    fn drop(&mut self) {
        if let Some(handle) = self.handle.take() {
            self.cache.release(handle, false);
        }
    }
}
