// Copyright (c) 2024-present, fjall-rs
// This source code is licensed under both the Apache 2.0 and MIT License
// (found in the LICENSE-* files in the repository)

use crate::file::{IoPriority, RandomAccessFile};

/// Readahead window over one file
///
/// Reads that fall inside the window are served from memory. Otherwise the
/// window is moved to the read offset and filled with at least
/// `readahead_size` bytes. Owned by the caller, e.g. a scan over a blob file.
#[derive(Debug)]
pub struct FilePrefetchBuffer {
    readahead_size: usize,
    offset: u64,
    buffer: Vec<u8>,

    hits: u64,
    misses: u64,
}

impl FilePrefetchBuffer {
    /// Creates an empty window.
    #[must_use]
    pub fn new(readahead_size: usize) -> Self {
        Self {
            readahead_size,
            offset: 0,
            buffer: Vec::new(),
            hits: 0,
            misses: 0,
        }
    }

    /// Number of reads served from the window.
    #[must_use]
    pub fn hits(&self) -> u64 {
        self.hits
    }

    /// Number of reads that refilled the window.
    #[must_use]
    pub fn misses(&self) -> u64 {
        self.misses
    }

    fn window(&self, offset: u64, len: usize) -> Option<&[u8]> {
        let start = usize::try_from(offset.checked_sub(self.offset)?).ok()?;
        self.buffer.get(start..start.checked_add(len)?)
    }

    /// Reads `len` bytes at `offset`, never reading past `limit`.
    pub(crate) fn read(
        &mut self,
        file: &dyn RandomAccessFile,
        offset: u64,
        len: usize,
        limit: u64,
        priority: IoPriority,
    ) -> std::io::Result<&[u8]> {
        if self.window(offset, len).is_some() {
            self.hits += 1;
        } else {
            self.misses += 1;

            let available = usize::try_from(limit.saturating_sub(offset)).unwrap_or(usize::MAX);
            let n = len.max(self.readahead_size.min(available));

            // NOTE: Keep the old window if the read fails
            let mut buffer = vec![0; n];
            file.read_at(offset, &mut buffer, priority)?;

            self.offset = offset;
            self.buffer = buffer;
        }

        self.window(offset, len).ok_or_else(|| {
            std::io::Error::new(
                std::io::ErrorKind::UnexpectedEof,
                "prefetch window is too short",
            )
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{file::FileSystem, mock::MockFileSystem};
    use std::path::Path;
    use test_log::test;

    #[test]
    fn prefetch_serves_from_window() -> crate::Result<()> {
        let fs = MockFileSystem::default();
        let path = Path::new("file");
        fs.set_contents(path, (0..=255).collect());
        let file = fs.new_random_access_file(path)?;

        let mut prefetch = FilePrefetchBuffer::new(64);

        assert_eq!(&[10_u8, 11, 12], prefetch.read(&*file, 10, 3, 256, IoPriority::User)?);
        assert_eq!(&[70_u8, 71], prefetch.read(&*file, 70, 2, 256, IoPriority::User)?);
        assert_eq!(1, prefetch.hits());
        assert_eq!(1, prefetch.misses());

        // Outside of the window [10, 74)
        assert_eq!(&[73_u8, 74], prefetch.read(&*file, 73, 2, 256, IoPriority::User)?);
        assert_eq!(2, prefetch.misses());

        // Readahead is clamped to the limit
        assert_eq!(&[250_u8], prefetch.read(&*file, 250, 1, 256, IoPriority::User)?);

        Ok(())
    }

    #[test]
    fn prefetch_read_past_end_fails() -> crate::Result<()> {
        let fs = MockFileSystem::default();
        let path = Path::new("file");
        fs.set_contents(path, vec![0; 10]);
        let file = fs.new_random_access_file(path)?;

        let mut prefetch = FilePrefetchBuffer::new(4);
        assert!(prefetch.read(&*file, 8, 4, 100, IoPriority::User).is_err());

        Ok(())
    }
}
