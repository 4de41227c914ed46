// Copyright (c) 2024-present, fjall-rs
// This source code is licensed under both the Apache 2.0 and MIT License
// (found in the LICENSE-* files in the repository)

use crate::file::{FileSystem, IoPriority, RandomAccessFile, WritableFile};
use std::{
    collections::HashMap,
    path::{Path, PathBuf},
    sync::{
        atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering},
        Arc, RwLock,
    },
    time::Duration,
};

type FileContent = Arc<RwLock<Vec<u8>>>;

#[derive(Default)]
struct MockFileSystemInner {
    files: RwLock<HashMap<PathBuf, FileContent>>,
    open_count: AtomicUsize,
    fail_appends: AtomicBool,
    fail_opens: AtomicBool,
    open_delay_ms: AtomicU64,
}

/// Mock in-memory file system
///
/// Counts opens and can inject failures, used for tests only.
#[allow(clippy::module_name_repetitions)]
#[derive(Clone, Default)]
pub struct MockFileSystem(Arc<MockFileSystemInner>);

impl MockFileSystem {
    /// Number of successful [`FileSystem::new_random_access_file`] calls.
    #[must_use]
    pub fn open_count(&self) -> usize {
        self.0.open_count.load(Ordering::Acquire)
    }

    /// Makes every following append fail.
    pub fn fail_appends(&self, flag: bool) {
        self.0.fail_appends.store(flag, Ordering::Release);
    }

    /// Makes every following open fail.
    pub fn fail_opens(&self, flag: bool) {
        self.0.fail_opens.store(flag, Ordering::Release);
    }

    /// Delays every open, to widen race windows.
    pub fn open_delay(&self, delay: Duration) {
        #[allow(clippy::cast_possible_truncation)]
        self.0
            .open_delay_ms
            .store(delay.as_millis() as u64, Ordering::Release);
    }

    fn get(&self, path: &Path) -> std::io::Result<FileContent> {
        self.0
            .files
            .read()
            .expect("lock is poisoned")
            .get(path)
            .cloned()
            .ok_or_else(|| std::io::Error::new(std::io::ErrorKind::NotFound, "no such file"))
    }

    /// Returns a copy of a file's content.
    ///
    /// # Errors
    ///
    /// Will return `Err` if the file does not exist.
    pub fn contents(&self, path: &Path) -> std::io::Result<Vec<u8>> {
        Ok(self.get(path)?.read().expect("lock is poisoned").clone())
    }

    /// Replaces a file's content.
    pub fn set_contents(&self, path: &Path, bytes: Vec<u8>) {
        self.0
            .files
            .write()
            .expect("lock is poisoned")
            .insert(path.into(), Arc::new(RwLock::new(bytes)));
    }

    /// Returns `true` if the file exists.
    #[must_use]
    pub fn exists(&self, path: &Path) -> bool {
        self.get(path).is_ok()
    }
}

struct MockWritableFile {
    content: FileContent,
    fs: MockFileSystem,
}

impl WritableFile for MockWritableFile {
    fn append(&mut self, data: &[u8]) -> std::io::Result<()> {
        if self.fs.0.fail_appends.load(Ordering::Acquire) {
            return Err(std::io::Error::new(
                std::io::ErrorKind::Other,
                "injected append failure",
            ));
        }

        self.content
            .write()
            .expect("lock is poisoned")
            .extend_from_slice(data);

        Ok(())
    }

    fn flush(&mut self) -> std::io::Result<()> {
        Ok(())
    }

    fn sync(&mut self, _: bool) -> std::io::Result<()> {
        Ok(())
    }

    fn close(&mut self) -> std::io::Result<()> {
        Ok(())
    }
}

struct MockRandomAccessFile(FileContent);

impl RandomAccessFile for MockRandomAccessFile {
    fn read_at(&self, offset: u64, buf: &mut [u8], _: IoPriority) -> std::io::Result<()> {
        let content = self.0.read().expect("lock is poisoned");

        let start = usize::try_from(offset).unwrap_or(usize::MAX);
        let src = start
            .checked_add(buf.len())
            .and_then(|end| content.get(start..end))
            .ok_or_else(|| {
                std::io::Error::new(
                    std::io::ErrorKind::UnexpectedEof,
                    "failed to fill whole buffer",
                )
            })?;

        buf.copy_from_slice(src);
        Ok(())
    }

    fn size(&self) -> std::io::Result<u64> {
        Ok(self.0.read().expect("lock is poisoned").len() as u64)
    }
}

impl FileSystem for MockFileSystem {
    fn new_writable_file(&self, path: &Path) -> crate::Result<Box<dyn WritableFile>> {
        let content = FileContent::default();

        self.0
            .files
            .write()
            .expect("lock is poisoned")
            .insert(path.into(), content.clone());

        Ok(Box::new(MockWritableFile {
            content,
            fs: self.clone(),
        }))
    }

    fn new_random_access_file(&self, path: &Path) -> crate::Result<Arc<dyn RandomAccessFile>> {
        let delay = self.0.open_delay_ms.load(Ordering::Acquire);
        if delay > 0 {
            std::thread::sleep(Duration::from_millis(delay));
        }

        if self.0.fail_opens.load(Ordering::Acquire) {
            return Err(std::io::Error::new(std::io::ErrorKind::Other, "injected open failure").into());
        }

        let content = self.get(path)?;
        self.0.open_count.fetch_add(1, Ordering::AcqRel);

        Ok(Arc::new(MockRandomAccessFile(content)))
    }

    fn file_size(&self, path: &Path) -> crate::Result<u64> {
        Ok(self.get(path)?.read().expect("lock is poisoned").len() as u64)
    }

    fn remove_file(&self, path: &Path) -> crate::Result<()> {
        self.0
            .files
            .write()
            .expect("lock is poisoned")
            .remove(path)
            .map(|_| ())
            .ok_or_else(|| std::io::Error::new(std::io::ErrorKind::NotFound, "no such file").into())
    }
}
