// Copyright (c) 2024-present, fjall-rs
// This source code is licensed under both the Apache 2.0 and MIT License
// (found in the LICENSE-* files in the repository)

use crate::{file::IoPriority, path::absolute_path, CompressionType};
use std::path::{Path, PathBuf};

/// Blob file configuration
#[derive(Clone, Debug)]
pub struct Config {
    /// Folder the blob files live in
    pub(crate) path: PathBuf,

    /// Column family the blob files belong to
    pub(crate) column_family_id: u32,

    /// Compression to use for new blob files
    pub(crate) compression: CompressionType,

    /// Target size of blob files
    pub(crate) blob_file_size: u64,

    /// Values smaller than this are kept inline
    pub(crate) min_blob_size: u64,

    /// Use fsync instead of fdatasync
    pub(crate) use_fsync: bool,

    /// Flush after every record
    pub(crate) do_flush: bool,

    /// Compute a whole-file checksum when writing blob files
    pub(crate) file_checksum: bool,
}

impl Config {
    /// Creates a new configuration builder for the given blob folder.
    pub fn new<P: AsRef<Path>>(path: P) -> Self {
        Self {
            path: absolute_path(path),
            column_family_id: 0,
            compression: CompressionType::None,
            blob_file_size: 256 * 1_024 * 1_024,
            min_blob_size: 0,
            use_fsync: false,
            do_flush: false,
            file_checksum: true,
        }
    }

    /// Returns the blob folder.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Sets the column family ID.
    ///
    /// Blob files record it in their header, and readers
    /// refuse to open files of another column family.
    #[must_use]
    pub fn column_family_id(mut self, id: u32) -> Self {
        self.column_family_id = id;
        self
    }

    /// Sets the compression & decompression scheme.
    #[must_use]
    pub fn compression(mut self, compression: CompressionType) -> Self {
        self.compression = compression;
        self
    }

    /// Sets the target size of blob files.
    ///
    /// Once a blob file reaches this size, it is finished and
    /// the next blob goes into a new file.
    ///
    /// Like `blob_file_size` in `RocksDB`.
    ///
    /// Default = 256 MiB
    #[must_use]
    pub fn blob_file_size(mut self, bytes: u64) -> Self {
        self.blob_file_size = bytes;
        self
    }

    /// Sets the minimum value size that is separated into blob files.
    ///
    /// Default = 0 (every value)
    #[must_use]
    pub fn min_blob_size(mut self, bytes: u64) -> Self {
        self.min_blob_size = bytes;
        self
    }

    /// Uses fsync instead of fdatasync when syncing blob files.
    #[must_use]
    pub fn use_fsync(mut self, flag: bool) -> Self {
        self.use_fsync = flag;
        self
    }

    /// Flushes the write buffer after every record.
    #[must_use]
    pub fn do_flush(mut self, flag: bool) -> Self {
        self.do_flush = flag;
        self
    }

    /// Computes a whole-file checksum for every finished blob file.
    ///
    /// Default = true
    #[must_use]
    pub fn file_checksum(mut self, flag: bool) -> Self {
        self.file_checksum = flag;
        self
    }
}

/// Per-read options
#[derive(Clone, Debug)]
pub struct ReadOptions {
    /// Read and verify the full record (header, key, CRCs) on every read
    pub verify_checksums: bool,

    /// Insert values read from disk into the blob cache
    pub fill_cache: bool,

    /// Priority passed to the file layer
    pub io_priority: IoPriority,
}

impl Default for ReadOptions {
    fn default() -> Self {
        Self {
            verify_checksums: true,
            fill_cache: true,
            io_priority: IoPriority::default(),
        }
    }
}
