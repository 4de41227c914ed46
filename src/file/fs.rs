// Copyright (c) 2024-present, fjall-rs
// This source code is licensed under both the Apache 2.0 and MIT License
// (found in the LICENSE-* files in the repository)

use super::{IoPriority, RandomAccessFile, WritableFile};
use std::{fs::File, path::Path, sync::Arc};

/// File system used to create and open blob files
pub trait FileSystem: Send + Sync {
    /// Creates (or truncates) a file for appending.
    ///
    /// # Errors
    ///
    /// Will return `Err` if an IO error occurs, or the file system does not allow writes.
    fn new_writable_file(&self, path: &Path) -> crate::Result<Box<dyn WritableFile>>;

    /// Opens an existing file for positional reads.
    ///
    /// # Errors
    ///
    /// Will return `Err` if an IO error occurs.
    fn new_random_access_file(&self, path: &Path) -> crate::Result<Arc<dyn RandomAccessFile>>;

    /// Returns the size of a file in bytes.
    ///
    /// # Errors
    ///
    /// Will return `Err` if an IO error occurs.
    fn file_size(&self, path: &Path) -> crate::Result<u64>;

    /// Deletes a file.
    ///
    /// # Errors
    ///
    /// Will return `Err` if an IO error occurs, or the file system does not allow writes.
    fn remove_file(&self, path: &Path) -> crate::Result<()>;
}

/// [`FileSystem`] backed by `std::fs`
#[derive(Clone, Copy, Debug, Default)]
pub struct StdFileSystem;

struct StdWritableFile(Option<File>);

impl StdWritableFile {
    fn file(&mut self) -> std::io::Result<&mut File> {
        self.0.as_mut().ok_or_else(|| {
            std::io::Error::new(std::io::ErrorKind::Other, "file is already closed")
        })
    }
}

impl WritableFile for StdWritableFile {
    fn append(&mut self, data: &[u8]) -> std::io::Result<()> {
        use std::io::Write;
        self.file()?.write_all(data)
    }

    fn flush(&mut self) -> std::io::Result<()> {
        use std::io::Write;
        self.file()?.flush()
    }

    fn sync(&mut self, use_fsync: bool) -> std::io::Result<()> {
        let file = self.file()?;

        if use_fsync {
            file.sync_all()
        } else {
            file.sync_data()
        }
    }

    fn close(&mut self) -> std::io::Result<()> {
        self.0.take();
        Ok(())
    }
}

struct StdRandomAccessFile(File);

impl RandomAccessFile for StdRandomAccessFile {
    #[cfg(unix)]
    fn read_at(&self, offset: u64, buf: &mut [u8], _: IoPriority) -> std::io::Result<()> {
        use std::os::unix::fs::FileExt;
        self.0.read_exact_at(buf, offset)
    }

    #[cfg(windows)]
    fn read_at(&self, offset: u64, buf: &mut [u8], _: IoPriority) -> std::io::Result<()> {
        use std::os::windows::fs::FileExt;

        let mut read = 0;

        while let Some(rest) = buf.get_mut(read..).filter(|rest| !rest.is_empty()) {
            let n = self.0.seek_read(rest, offset + read as u64)?;

            if n == 0 {
                return Err(std::io::Error::new(
                    std::io::ErrorKind::UnexpectedEof,
                    "failed to fill whole buffer",
                ));
            }

            read += n;
        }

        Ok(())
    }

    fn size(&self) -> std::io::Result<u64> {
        Ok(self.0.metadata()?.len())
    }
}

impl FileSystem for StdFileSystem {
    fn new_writable_file(&self, path: &Path) -> crate::Result<Box<dyn WritableFile>> {
        log::trace!("Creating writable file at {}", path.display());

        if let Some(folder) = path.parent() {
            std::fs::create_dir_all(folder)?;
        }

        let file = File::create(path)?;
        Ok(Box::new(StdWritableFile(Some(file))))
    }

    fn new_random_access_file(&self, path: &Path) -> crate::Result<Arc<dyn RandomAccessFile>> {
        let file = File::open(path)?;
        Ok(Arc::new(StdRandomAccessFile(file)))
    }

    fn file_size(&self, path: &Path) -> crate::Result<u64> {
        Ok(std::fs::metadata(path)?.len())
    }

    fn remove_file(&self, path: &Path) -> crate::Result<()> {
        Ok(std::fs::remove_file(path)?)
    }
}

/// [`FileSystem`] decorator that rejects every mutating operation
#[derive(Clone, Debug, Default)]
pub struct ReadOnlyFileSystem<F: FileSystem>(F);

impl<F: FileSystem> ReadOnlyFileSystem<F> {
    /// Wraps a file system.
    pub fn new(inner: F) -> Self {
        Self(inner)
    }
}

impl<F: FileSystem> FileSystem for ReadOnlyFileSystem<F> {
    fn new_writable_file(&self, _: &Path) -> crate::Result<Box<dyn WritableFile>> {
        Err(crate::Error::NotSupported("Not supported in read-only file system"))
    }

    fn new_random_access_file(&self, path: &Path) -> crate::Result<Arc<dyn RandomAccessFile>> {
        self.0.new_random_access_file(path)
    }

    fn file_size(&self, path: &Path) -> crate::Result<u64> {
        self.0.file_size(path)
    }

    fn remove_file(&self, _: &Path) -> crate::Result<()> {
        Err(crate::Error::NotSupported("Not supported in read-only file system"))
    }
}
