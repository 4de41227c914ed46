// Copyright (c) 2024-present, fjall-rs
// This source code is licensed under both the Apache 2.0 and MIT License
// (found in the LICENSE-* files in the repository)

use crate::{
    blob_file::{prefetch::FilePrefetchBuffer, read_request::BlobReadRequest},
    blob_file_cache::BlobFileCache,
    cache::{Cache, CacheHandleGuard, CacheValue},
    config::ReadOptions,
    id::BlobFileNumber,
    BlobIndex, Slice,
};
use std::sync::Arc;

/// Blob cache key, made of the file number and the value offset
///
/// Both are encoded big endian, so keys of the same file sort together.
pub(crate) fn blob_cache_key(file_number: BlobFileNumber, offset: u64) -> [u8; 16] {
    let mut key = [0; 16];

    let (head, tail) = key.split_at_mut(8);
    head.copy_from_slice(&file_number.to_be_bytes());
    tail.copy_from_slice(&offset.to_be_bytes());

    key
}

/// Reads blobs through an optional blob cache
///
/// Misses are served by a reader from the [`BlobFileCache`].
pub struct BlobSource {
    blob_file_cache: Arc<BlobFileCache>,
    blob_cache: Option<Arc<dyn Cache>>,
}

impl BlobSource {
    /// Creates a blob source.
    ///
    /// Without a blob cache, every read goes to the blob file.
    #[must_use]
    pub fn new(blob_file_cache: Arc<BlobFileCache>, blob_cache: Option<Arc<dyn Cache>>) -> Self {
        Self {
            blob_file_cache,
            blob_cache,
        }
    }

    /// Returns the blob file cache.
    #[must_use]
    pub fn blob_file_cache(&self) -> &Arc<BlobFileCache> {
        &self.blob_file_cache
    }

    fn get_blob_from_cache(&self, file_number: BlobFileNumber, offset: u64) -> Option<Slice> {
        let cache = self.blob_cache.as_ref()?;
        let handle = cache.lookup(&blob_cache_key(file_number, offset))?;

        match CacheHandleGuard::<Slice>::new(cache.clone(), handle) {
            Ok(guard) => Some((**guard.value()).clone()),
            Err(e) => {
                log::warn!("Unexpected blob cache entry for blob file #{file_number}: {e:?}");
                None
            }
        }
    }

    fn put_blob_into_cache(&self, file_number: BlobFileNumber, offset: u64, blob: &Slice) {
        let Some(cache) = &self.blob_cache else {
            return;
        };

        let value: CacheValue = Arc::new(blob.clone());

        if let Err(e) = cache.insert_unpinned(&blob_cache_key(file_number, offset), value, blob.len())
        {
            log::debug!("Failed to insert blob into blob cache: {e:?}");
        }
    }

    /// Returns `true` if the blob is in the blob cache.
    #[must_use]
    pub fn blob_in_cache(&self, file_number: BlobFileNumber, offset: u64) -> bool {
        self.get_blob_from_cache(file_number, offset).is_some()
    }

    /// Reads the blob that `blob_index` points to.
    ///
    /// Also returns the number of bytes read from the file, which is 0 for
    /// a blob cache hit.
    ///
    /// # Errors
    ///
    /// Will return `Err` if the blob file cannot be opened, an IO error
    /// occurs, or the record is corrupted.
    pub fn get_blob(
        &self,
        read_options: &ReadOptions,
        user_key: &[u8],
        blob_index: &BlobIndex,
        prefetch_buffer: Option<&mut FilePrefetchBuffer>,
    ) -> crate::Result<(Slice, u64)> {
        let &BlobIndex {
            file_number,
            offset,
            size,
            compression,
        } = blob_index;

        if let Some(blob) = self.get_blob_from_cache(file_number, offset) {
            log::trace!("Blob cache hit for blob file #{file_number} at {offset}");
            return Ok((blob, 0));
        }

        let reader = self
            .blob_file_cache
            .get_blob_file_reader(read_options, file_number)?;

        let (blob, bytes_read) = reader.get_blob(
            read_options,
            user_key,
            offset,
            size,
            compression,
            prefetch_buffer,
        )?;

        if read_options.fill_cache {
            self.put_blob_into_cache(file_number, offset, &blob);
        }

        Ok((blob, bytes_read))
    }

    /// Reads a batch of blobs from a single blob file.
    ///
    /// Requests may come in any order. Blob cache hits are served directly,
    /// the rest is read from the file in as few reads as possible.
    ///
    /// Returns the number of bytes read from the file.
    pub fn multi_get_blob(
        &self,
        read_options: &ReadOptions,
        file_number: BlobFileNumber,
        requests: &mut [BlobReadRequest],
    ) -> u64 {
        let mut pending_idxs = Vec::with_capacity(requests.len());
        let mut pending = Vec::with_capacity(requests.len());

        for (idx, request) in requests.iter_mut().enumerate() {
            if let Some(blob) = self.get_blob_from_cache(file_number, request.offset) {
                request.result = Some(Ok(blob));
            } else {
                pending_idxs.push(idx);
                pending.push(BlobReadRequest::new(
                    request.user_key.clone(),
                    request.offset,
                    request.len,
                    request.compression,
                ));
            }
        }

        if pending.is_empty() {
            return 0;
        }

        let reader = match self
            .blob_file_cache
            .get_blob_file_reader(read_options, file_number)
        {
            Ok(reader) => reader,
            Err(e) => {
                for idx in pending_idxs {
                    if let Some(request) = requests.get_mut(idx) {
                        request.result = Some(Err(e.duplicate()));
                    }
                }

                return 0;
            }
        };

        let bytes_read = reader.multi_get_blob(read_options, &mut pending);

        for (idx, mut served) in pending_idxs.into_iter().zip(pending) {
            let Some(request) = requests.get_mut(idx) else {
                continue;
            };

            let result = served.take_result();

            if read_options.fill_cache {
                if let Some(Ok(blob)) = &result {
                    self.put_blob_into_cache(file_number, request.offset, blob);
                }
            }

            request.result = result;
        }

        bytes_read
    }
}
