// Copyright (c) 2024-present, fjall-rs
// This source code is licensed under both the Apache 2.0 and MIT License
// (found in the LICENSE-* files in the repository)

use super::WritableFile;
use std::path::{Path, PathBuf};
use xxhash_rust::xxh3::Xxh3;

/// Reported as checksum method when no whole-file checksum is computed
pub const UNKNOWN_FILE_CHECKSUM_FUNC_NAME: &str = "Unknown";

const XXH3_FUNC_NAME: &str = "FileChecksumXxh3";

const DEFAULT_BUFFER_SIZE: usize = 64 * 1_024;

/// Whole-file checksum of a finished file
#[derive(Clone, Debug, Eq, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Deserialize, serde::Serialize))]
pub struct FileChecksum {
    /// Name of the checksum function
    pub method: String,

    /// Hex-encoded checksum value
    pub value: String,
}

/// Buffered writer on top of a [`WritableFile`]
///
/// Tracks the logical file size, remembers whether any write failed
/// and optionally computes a whole-file checksum.
pub struct WritableFileWriter {
    path: PathBuf,
    file: Box<dyn WritableFile>,
    buf: Vec<u8>,
    buffer_size: usize,
    file_size: u64,
    seen_error: bool,
    checksum: Option<Xxh3>,
    finalized_checksum: Option<u64>,
}

impl WritableFileWriter {
    /// Wraps a file.
    ///
    /// With `compute_checksum`, an xxh3 checksum over every appended byte
    /// is kept and reported after [`WritableFileWriter::close`].
    pub fn new<P: Into<PathBuf>>(
        path: P,
        file: Box<dyn WritableFile>,
        compute_checksum: bool,
    ) -> Self {
        Self {
            path: path.into(),
            file,
            buf: Vec::with_capacity(DEFAULT_BUFFER_SIZE),
            buffer_size: DEFAULT_BUFFER_SIZE,
            file_size: 0,
            seen_error: false,
            checksum: compute_checksum.then(Xxh3::new),
            finalized_checksum: None,
        }
    }

    /// Sets the size of the write buffer.
    #[must_use]
    pub fn buffer_size(mut self, bytes: usize) -> Self {
        self.buffer_size = bytes;
        self
    }

    /// Path of the underlying file.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Number of bytes appended so far, buffered ones included.
    #[must_use]
    pub fn file_size(&self) -> u64 {
        self.file_size
    }

    /// Returns `true` if any operation on the file has failed.
    #[must_use]
    pub fn seen_error(&self) -> bool {
        self.seen_error
    }

    fn track<T>(&mut self, result: std::io::Result<T>) -> std::io::Result<T> {
        if result.is_err() {
            self.seen_error = true;
        }
        result
    }

    fn write_buffered(&mut self, data: &[u8]) -> std::io::Result<()> {
        if self.buf.len() + data.len() > self.buffer_size {
            self.flush_buffer()?;
        }

        if data.len() >= self.buffer_size {
            self.file.append(data)
        } else {
            self.buf.extend_from_slice(data);
            Ok(())
        }
    }

    fn flush_buffer(&mut self) -> std::io::Result<()> {
        if !self.buf.is_empty() {
            self.file.append(&self.buf)?;
            self.buf.clear();
        }
        Ok(())
    }

    /// Appends data.
    ///
    /// # Errors
    ///
    /// Will return `Err` if an IO error occurs.
    pub fn append(&mut self, data: &[u8]) -> std::io::Result<()> {
        let result = self.write_buffered(data);
        self.track(result)?;

        if let Some(hasher) = &mut self.checksum {
            hasher.update(data);
        }
        self.file_size += data.len() as u64;

        Ok(())
    }

    /// Writes buffered data to the file.
    ///
    /// # Errors
    ///
    /// Will return `Err` if an IO error occurs.
    pub fn flush(&mut self) -> std::io::Result<()> {
        let result = self.flush_buffer().and_then(|()| self.file.flush());
        self.track(result)
    }

    /// Flushes and makes the file durable.
    ///
    /// # Errors
    ///
    /// Will return `Err` if an IO error occurs.
    pub fn sync(&mut self, use_fsync: bool) -> std::io::Result<()> {
        self.flush()?;
        let result = self.file.sync(use_fsync);
        self.track(result)
    }

    /// Flushes and closes the file, finalizing the checksum.
    ///
    /// # Errors
    ///
    /// Will return `Err` if an IO error occurs.
    pub fn close(&mut self) -> std::io::Result<()> {
        self.flush()?;
        let result = self.file.close();
        self.track(result)?;

        self.finalized_checksum = self.checksum.as_ref().map(Xxh3::digest);
        Ok(())
    }

    /// Name of the whole-file checksum function.
    #[must_use]
    pub fn file_checksum_func_name(&self) -> &'static str {
        if self.checksum.is_some() {
            XXH3_FUNC_NAME
        } else {
            UNKNOWN_FILE_CHECKSUM_FUNC_NAME
        }
    }

    /// Whole-file checksum, available after a successful close.
    #[must_use]
    pub fn file_checksum(&self) -> Option<FileChecksum> {
        self.finalized_checksum.map(|digest| FileChecksum {
            method: self.file_checksum_func_name().into(),
            value: format!("{digest:016x}"),
        })
    }
}
