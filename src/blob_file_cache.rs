// Copyright (c) 2024-present, fjall-rs
// This source code is licensed under both the Apache 2.0 and MIT License
// (found in the LICENSE-* files in the repository)

use crate::{
    blob_file::reader::BlobFileReader,
    cache::{Cache, CacheHandleGuard, CacheValue},
    config::{Config, ReadOptions},
    file::FileSystem,
    id::BlobFileNumber,
};
use ahash::RandomState;
use std::sync::{
    atomic::{AtomicU64, Ordering},
    Arc, Mutex,
};

const NUM_STRIPES: usize = 128;

/// Every reader is charged the same, so the capacity is a reader count
const READER_CHARGE: usize = 1;

/// Cache of open blob file readers
///
/// Concurrent misses for the same file open it only once: opening happens
/// under one of a fixed set of mutexes, selected by the file number.
pub struct BlobFileCache {
    cache: Arc<dyn Cache>,
    fs: Arc<dyn FileSystem>,
    config: Config,

    stripes: [Mutex<()>; NUM_STRIPES],
    hasher: RandomState,

    file_opens: AtomicU64,
}

impl std::fmt::Debug for BlobFileCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "BlobFileCache<{}, opens: {}>",
            self.cache.name(),
            self.file_opens(),
        )
    }
}

fn cache_key(file_number: BlobFileNumber) -> [u8; 8] {
    file_number.to_le_bytes()
}

impl BlobFileCache {
    /// Creates a blob file cache that keeps its readers in `cache`.
    #[must_use]
    pub fn new(cache: Arc<dyn Cache>, fs: Arc<dyn FileSystem>, config: Config) -> Self {
        Self {
            cache,
            fs,
            config,
            stripes: std::array::from_fn(|_| Mutex::new(())),
            hasher: RandomState::new(),
            file_opens: AtomicU64::new(0),
        }
    }

    /// Returns the number of readers opened so far.
    #[must_use]
    pub fn file_opens(&self) -> u64 {
        self.file_opens.load(Ordering::Acquire)
    }

    #[allow(clippy::cast_possible_truncation)]
    fn stripe(&self, file_number: BlobFileNumber) -> &Mutex<()> {
        let idx = (self.hasher.hash_one(file_number) as usize) % NUM_STRIPES;

        // NOTE: idx < NUM_STRIPES
        #[allow(clippy::indexing_slicing)]
        &self.stripes[idx]
    }

    /// Returns a reader for the given blob file, opening it if needed.
    ///
    /// # Errors
    ///
    /// Will return `Err` if the file cannot be opened or is malformed, in
    /// which case nothing is cached. Returns [`crate::Error::MemoryLimit`]
    /// if the cache is full and has a strict capacity limit.
    pub fn get_blob_file_reader(
        &self,
        read_options: &ReadOptions,
        file_number: BlobFileNumber,
    ) -> crate::Result<CacheHandleGuard<BlobFileReader>> {
        let key = cache_key(file_number);

        if let Some(handle) = self.cache.lookup(&key) {
            return CacheHandleGuard::new(self.cache.clone(), handle);
        }

        let _lock = self.stripe(file_number).lock().expect("lock is poisoned");

        // Another thread may have opened the file while we waited
        if let Some(handle) = self.cache.lookup(&key) {
            return CacheHandleGuard::new(self.cache.clone(), handle);
        }

        let reader = BlobFileReader::create(&*self.fs, &self.config, read_options, file_number)
            .map_err(|e| {
                log::debug!("Could not open blob file #{file_number}: {e:?}");
                e
            })?;

        self.file_opens.fetch_add(1, Ordering::AcqRel);
        log::debug!("Opened blob file reader #{file_number}");

        let value: CacheValue = Arc::new(reader);
        let handle = self.cache.insert(&key, value, READER_CHARGE)?;

        CacheHandleGuard::new(self.cache.clone(), handle)
    }

    /// Removes a reader from the cache, e.g. once its blob file is obsolete.
    ///
    /// Readers that are still in use stay valid until they are dropped.
    pub fn evict(&self, file_number: BlobFileNumber) {
        log::trace!("Evicting blob file reader #{file_number}");
        self.cache.erase(&cache_key(file_number));
    }
}

#[cfg(test)]
#[allow(clippy::indexing_slicing)]
mod tests {
    use super::*;
    use crate::{blob_file::tests::write_blob_file, cache::LruCache, mock::MockFileSystem};
    use test_log::test;

    type Setup = (Arc<MockFileSystem>, Arc<LruCache>, BlobFileCache);

    fn setup(capacity: usize, strict: bool) -> crate::Result<Setup> {
        let fs = Arc::new(MockFileSystem::default());
        let config = Config::new("blobs");

        write_blob_file(&*fs, &config, 1, &[(&b"a"[..], &b"abc"[..])])?;
        write_blob_file(&*fs, &config, 2, &[(&b"b"[..], &b"def"[..])])?;

        let cache = Arc::new(LruCache::new(capacity, 0, strict));
        let blob_file_cache = BlobFileCache::new(cache.clone(), fs.clone(), config);

        Ok((fs, cache, blob_file_cache))
    }

    #[test]
    fn blob_file_cache_opens_once() -> crate::Result<()> {
        let (fs, cache, blob_file_cache) = setup(10, false)?;

        let reader = blob_file_cache.get_blob_file_reader(&ReadOptions::default(), 1)?;
        assert_eq!(1, reader.file_number());
        assert_eq!(1, cache.pinned_usage());
        drop(reader);
        assert_eq!(0, cache.pinned_usage());

        let reader = blob_file_cache.get_blob_file_reader(&ReadOptions::default(), 1)?;
        assert_eq!(1, reader.file_number());

        assert_eq!(1, fs.open_count());
        assert_eq!(1, blob_file_cache.file_opens());
        assert_eq!(1, cache.usage());

        Ok(())
    }

    #[test]
    fn blob_file_cache_does_not_cache_errors() -> crate::Result<()> {
        let (fs, cache, blob_file_cache) = setup(10, false)?;

        fs.fail_opens(true);
        assert!(matches!(
            blob_file_cache.get_blob_file_reader(&ReadOptions::default(), 1),
            Err(crate::Error::Io(_))
        ));
        assert_eq!(0, cache.usage());

        fs.fail_opens(false);
        let reader = blob_file_cache.get_blob_file_reader(&ReadOptions::default(), 1)?;
        assert_eq!(1, reader.file_number());
        assert_eq!(1, blob_file_cache.file_opens());

        // Missing file
        assert!(blob_file_cache
            .get_blob_file_reader(&ReadOptions::default(), 3)
            .is_err());
        assert_eq!(1, cache.usage());

        Ok(())
    }

    #[test]
    fn blob_file_cache_strict_capacity() -> crate::Result<()> {
        let (_fs, cache, blob_file_cache) = setup(1, true)?;

        let reader = blob_file_cache.get_blob_file_reader(&ReadOptions::default(), 1)?;

        assert!(matches!(
            blob_file_cache.get_blob_file_reader(&ReadOptions::default(), 2),
            Err(crate::Error::MemoryLimit)
        ));
        assert_eq!(1, cache.usage());
        assert!(cache.lookup(&cache_key(2)).is_none());

        // Once the first reader is unpinned, it can be evicted
        drop(reader);
        let reader = blob_file_cache.get_blob_file_reader(&ReadOptions::default(), 2)?;
        assert_eq!(2, reader.file_number());

        Ok(())
    }

    #[test]
    fn blob_file_cache_evict() -> crate::Result<()> {
        let (fs, cache, blob_file_cache) = setup(10, false)?;

        let reader = blob_file_cache.get_blob_file_reader(&ReadOptions::default(), 1)?;
        blob_file_cache.evict(1);

        // Still usable while referenced
        let (blob, _) = reader.get_blob(
            &ReadOptions::default(),
            b"a",
            reader.file_size() - 32 - 3,
            3,
            reader.compression(),
            None,
        )?;
        assert_eq!(blob, b"abc");
        drop(reader);
        assert_eq!(0, cache.usage());

        blob_file_cache.get_blob_file_reader(&ReadOptions::default(), 1)?;
        assert_eq!(2, fs.open_count());

        Ok(())
    }
}
