// Copyright (c) 2024-present, fjall-rs
// This source code is licensed under both the Apache 2.0 and MIT License
// (found in the LICENSE-* files in the repository)

use super::writer::BlobLogWriter;
use crate::{
    blob_source::blob_cache_key,
    cache::{Cache, CacheValue},
    file::{FileSystem, WritableFileWriter},
    format::{BlobLogFooter, BlobLogHeader, RECORD_HEADER_SIZE},
    id::{BlobFileNumber, IdGenerator},
    path::blob_file_path,
    BlobIndex, Config, Slice,
};
use std::{path::PathBuf, sync::Arc};

/// A finished blob file
#[derive(Clone, Debug, Eq, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Deserialize, serde::Serialize))]
pub struct BlobFileAddition {
    /// Blob file number
    pub blob_file_number: BlobFileNumber,

    /// Number of blobs in the file
    pub total_blob_count: u64,

    /// Size of all records, headers included
    pub total_blob_bytes: u64,

    /// Whole-file checksum function, empty if unknown
    pub checksum_method: String,

    /// Whole-file checksum, empty if unknown
    pub checksum_value: String,
}

/// Separates large values into blob files
///
/// Opens a new blob file on demand and rolls over to the next one once the
/// current file reaches the configured target size.
pub struct BlobFileBuilder {
    fs: Arc<dyn FileSystem>,
    config: Config,
    id_generator: IdGenerator,
    blob_cache: Option<Arc<dyn Cache>>,

    writer: Option<BlobLogWriter>,
    blob_count: u64,
    blob_bytes: u64,

    blob_file_paths: Vec<PathBuf>,
    blob_file_additions: Vec<BlobFileAddition>,
}

impl BlobFileBuilder {
    /// Creates a builder. No file is created until the first blob is added.
    #[must_use]
    pub fn new(fs: Arc<dyn FileSystem>, config: Config, id_generator: IdGenerator) -> Self {
        Self {
            fs,
            config,
            id_generator,
            blob_cache: None,
            writer: None,
            blob_count: 0,
            blob_bytes: 0,
            blob_file_paths: Vec::new(),
            blob_file_additions: Vec::new(),
        }
    }

    /// Inserts every written blob into the given blob cache.
    #[must_use]
    pub fn prepopulate_blob_cache(mut self, cache: Arc<dyn Cache>) -> Self {
        self.blob_cache = Some(cache);
        self
    }

    /// Paths of all blob files that were created, including unfinished ones.
    #[must_use]
    pub fn blob_file_paths(&self) -> &[PathBuf] {
        &self.blob_file_paths
    }

    /// Writes a value into the current blob file.
    ///
    /// Returns `None` if the value is smaller than the configured
    /// minimum blob size and should be stored inline.
    ///
    /// # Errors
    ///
    /// Will return `Err` if an IO error occurs, or the value cannot be compressed.
    pub fn add(&mut self, key: &[u8], value: &[u8]) -> crate::Result<Option<BlobIndex>> {
        if (value.len() as u64) < self.config.min_blob_size {
            return Ok(None);
        }

        let compression = self.config.compression;
        let blob = compression.compress(value)?;

        let writer = self.open_blob_file_if_needed()?;
        let (_, blob_offset) = writer.add_record(key, &blob)?;
        let blob_file_number = writer.log_number();

        self.blob_count += 1;
        self.blob_bytes += (RECORD_HEADER_SIZE + key.len() + blob.len()) as u64;

        self.close_blob_file_if_needed()?;

        self.put_blob_into_cache_if_needed(value, blob_file_number, blob_offset);

        Ok(Some(BlobIndex {
            file_number: blob_file_number,
            offset: blob_offset,
            size: blob.len() as u64,
            compression,
        }))
    }

    /// Closes the current blob file and returns all finished blob files.
    ///
    /// # Errors
    ///
    /// Will return `Err` if an IO error occurs.
    pub fn finish(mut self) -> crate::Result<Vec<BlobFileAddition>> {
        if self.writer.is_some() {
            self.close_blob_file()?;
        }
        Ok(std::mem::take(&mut self.blob_file_additions))
    }

    /// Drops the current blob file without writing its footer.
    ///
    /// The file stays unterminated; see [`BlobFileBuilder::blob_file_paths`]
    /// for cleaning it up.
    pub fn abandon(mut self) {
        if let Some(writer) = self.writer.take() {
            log::debug!(
                "Abandoning blob file #{} with {} blobs",
                writer.log_number(),
                self.blob_count,
            );
        }
    }

    fn open_blob_file_if_needed(&mut self) -> crate::Result<&mut BlobLogWriter> {
        if self.writer.is_none() {
            let blob_file_number = self.id_generator.next();
            let path = blob_file_path(&self.config.path, blob_file_number);

            let file = self.fs.new_writable_file(&path)?;

            // NOTE: Track the path right away, so it can be cleaned up on failure
            self.blob_file_paths.push(path.clone());

            let mut writer = BlobLogWriter::new(
                WritableFileWriter::new(path, file, self.config.file_checksum),
                blob_file_number,
                self.config.use_fsync,
                self.config.do_flush,
            );

            writer.write_header(&BlobLogHeader::new(
                self.config.column_family_id,
                self.config.compression,
                false,
                (0, 0),
            ))?;

            log::trace!("Opened blob file #{blob_file_number}");

            self.writer = Some(writer);
        }

        self.writer.as_mut().ok_or_else(|| {
            crate::Error::Io(std::io::Error::new(
                std::io::ErrorKind::Other,
                "no open blob file",
            ))
        })
    }

    fn close_blob_file_if_needed(&mut self) -> crate::Result<()> {
        let should_close = self
            .writer
            .as_ref()
            .is_some_and(|writer| writer.block_offset() >= self.config.blob_file_size);

        if should_close {
            self.close_blob_file()?;
        }

        Ok(())
    }

    fn close_blob_file(&mut self) -> crate::Result<()> {
        let Some(mut writer) = self.writer.take() else {
            return Ok(());
        };

        let footer = BlobLogFooter {
            blob_count: self.blob_count,
            expiration_range: (0, 0),
        };

        let checksum = writer.append_footer(&footer, true)?;
        let (checksum_method, checksum_value) = checksum
            .map(|checksum| (checksum.method, checksum.value))
            .unwrap_or_default();

        let blob_file_number = writer.log_number();

        log::info!(
            "Generated blob file #{blob_file_number}: {} total blobs, {} total bytes",
            self.blob_count,
            self.blob_bytes,
        );

        self.blob_file_additions.push(BlobFileAddition {
            blob_file_number,
            total_blob_count: self.blob_count,
            total_blob_bytes: self.blob_bytes,
            checksum_method,
            checksum_value,
        });

        self.blob_count = 0;
        self.blob_bytes = 0;

        Ok(())
    }

    fn put_blob_into_cache_if_needed(
        &self,
        value: &[u8],
        blob_file_number: BlobFileNumber,
        blob_offset: u64,
    ) {
        let Some(cache) = &self.blob_cache else {
            return;
        };

        let key = blob_cache_key(blob_file_number, blob_offset);
        let blob: CacheValue = Arc::new(Slice::from(value));

        if let Err(e) = cache.insert_unpinned(&key, blob, value.len()) {
            log::warn!("Failed to pre-populate the blob into blob cache: {e:?}");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        blob_file::reader::BlobFileReader, cache::LruCache, config::ReadOptions,
        mock::MockFileSystem,
    };
    use test_log::test;

    #[test]
    fn builder_min_blob_size() -> crate::Result<()> {
        let fs = Arc::new(MockFileSystem::default());
        let config = Config::new("blobs").min_blob_size(10);

        let mut builder = BlobFileBuilder::new(fs.clone(), config, IdGenerator::default());
        assert!(builder.add(b"a", b"small")?.is_none());
        assert!(builder.blob_file_paths().is_empty());

        assert!(builder.add(b"b", b"large enough")?.is_some());
        assert_eq!(1, builder.blob_file_paths().len());

        let additions = builder.finish()?;
        assert_eq!(1, additions.len());
        assert_eq!(1, additions[0].total_blob_count);
        assert_eq!(
            (RECORD_HEADER_SIZE + 1 + 12) as u64,
            additions[0].total_blob_bytes
        );
        assert_eq!("FileChecksumXxh3", additions[0].checksum_method);

        Ok(())
    }

    #[test]
    #[allow(clippy::indexing_slicing)]
    fn builder_rollover() -> crate::Result<()> {
        let fs = Arc::new(MockFileSystem::default());
        let config = Config::new("blobs").blob_file_size(1_000);

        let mut builder = BlobFileBuilder::new(fs.clone(), config.clone(), IdGenerator::new(5));

        let mut indexes = vec![];
        for idx in 0..100_u32 {
            let key = idx.to_be_bytes();
            let value = format!("value-{idx}").repeat(10);
            let index = builder.add(&key, value.as_bytes())?.expect("should be separated");
            indexes.push((key, value, index));
        }

        let additions = builder.finish()?;
        assert!(additions.len() > 1);
        assert_eq!(5, additions[0].blob_file_number);
        assert_eq!(
            100,
            additions.iter().map(|a| a.total_blob_count).sum::<u64>()
        );

        for (key, value, index) in indexes {
            let reader = BlobFileReader::create(
                &*fs,
                &config,
                &ReadOptions::default(),
                index.file_number,
            )?;

            let (blob, _) = reader.get_blob(
                &ReadOptions::default(),
                &key,
                index.offset,
                index.size,
                index.compression,
                None,
            )?;
            assert_eq!(blob, value.as_bytes());
        }

        Ok(())
    }

    #[test]
    fn builder_abandon_leaves_unterminated_file() -> crate::Result<()> {
        let fs = Arc::new(MockFileSystem::default());
        let config = Config::new("blobs");

        let mut builder = BlobFileBuilder::new(fs.clone(), config.clone(), IdGenerator::default());
        builder.add(b"a", b"abc")?;
        let paths = builder.blob_file_paths().to_vec();
        builder.abandon();

        assert_eq!(1, paths.len());
        assert!(matches!(
            BlobFileReader::create(&*fs, &config, &ReadOptions::default(), 1),
            Err(crate::Error::Corruption(_))
        ));

        Ok(())
    }

    #[test]
    fn builder_prepopulates_blob_cache() -> crate::Result<()> {
        let fs = Arc::new(MockFileSystem::default());
        let cache = Arc::new(LruCache::new(1_024 * 1_024, 0, false));

        let mut builder = BlobFileBuilder::new(fs, Config::new("blobs"), IdGenerator::default())
            .prepopulate_blob_cache(cache.clone());

        let index = builder.add(b"a", b"abc")?.expect("should be separated");
        builder.finish()?;

        let handle = cache
            .lookup(&blob_cache_key(index.file_number, index.offset))
            .expect("should be cached");
        assert_eq!(3, handle.charge());
        cache.release(handle, false);

        Ok(())
    }
}
