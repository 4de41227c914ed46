// Copyright (c) 2024-present, fjall-rs
// This source code is licensed under both the Apache 2.0 and MIT License
// (found in the LICENSE-* files in the repository)

//! File I/O abstraction used by blob writers and readers

mod fs;
mod writer;

pub use {
    fs::{FileSystem, ReadOnlyFileSystem, StdFileSystem},
    writer::{FileChecksum, WritableFileWriter, UNKNOWN_FILE_CHECKSUM_FUNC_NAME},
};

/// I/O priority, passed through to the file layer (e.g. for rate limiting)
#[derive(Copy, Clone, Debug, Default, Eq, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Deserialize, serde::Serialize))]
pub enum IoPriority {
    /// Background work
    Low,

    /// Background work with elevated priority
    Mid,

    /// Flushes and other urgent background work
    High,

    /// User-facing reads and writes
    User,

    /// Not rate limited
    #[default]
    Total,
}

/// A file that is only ever appended to
pub trait WritableFile: Send {
    /// Appends `data` to the end of the file.
    ///
    /// # Errors
    ///
    /// Will return `Err` if an IO error occurs.
    fn append(&mut self, data: &[u8]) -> std::io::Result<()>;

    /// Flushes OS-level buffers, if any.
    ///
    /// # Errors
    ///
    /// Will return `Err` if an IO error occurs.
    fn flush(&mut self) -> std::io::Result<()>;

    /// Makes the file content durable.
    ///
    /// Without `use_fsync`, only the data (not all metadata) is synced.
    ///
    /// # Errors
    ///
    /// Will return `Err` if an IO error occurs.
    fn sync(&mut self, use_fsync: bool) -> std::io::Result<()>;

    /// Closes the file.
    ///
    /// # Errors
    ///
    /// Will return `Err` if an IO error occurs.
    fn close(&mut self) -> std::io::Result<()>;
}

/// A file that supports positional reads from multiple threads
pub trait RandomAccessFile: Send + Sync {
    /// Fills `buf` with the bytes starting at `offset`.
    ///
    /// # Errors
    ///
    /// Will return `Err` if an IO error occurs or the file is too short.
    fn read_at(&self, offset: u64, buf: &mut [u8], priority: IoPriority) -> std::io::Result<()>;

    /// Returns the size of the file in bytes.
    ///
    /// # Errors
    ///
    /// Will return `Err` if an IO error occurs.
    fn size(&self) -> std::io::Result<u64>;
}
