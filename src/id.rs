// Copyright (c) 2024-present, fjall-rs
// This source code is licensed under both the Apache 2.0 and MIT License
// (found in the LICENSE-* files in the repository)

use std::sync::{atomic::AtomicU64, Arc};

/// Number identifying a blob file
pub type BlobFileNumber = u64;

/// Never assigned to a real blob file
pub const INVALID_BLOB_FILE_NUMBER: BlobFileNumber = 0;

/// Hands out blob file numbers; clones share the same counter
#[derive(Clone, Debug)]
pub struct IdGenerator(Arc<AtomicU64>);

impl Default for IdGenerator {
    fn default() -> Self {
        Self::new(INVALID_BLOB_FILE_NUMBER + 1)
    }
}

impl std::ops::Deref for IdGenerator {
    type Target = Arc<AtomicU64>;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl IdGenerator {
    /// Creates a generator whose first number is `start`.
    #[must_use]
    pub fn new(start: BlobFileNumber) -> Self {
        Self(Arc::new(AtomicU64::new(start)))
    }

    /// Returns the next blob file number.
    pub fn next(&self) -> BlobFileNumber {
        self.fetch_add(1, std::sync::atomic::Ordering::SeqCst)
    }
}
