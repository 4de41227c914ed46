// Copyright (c) 2024-present, fjall-rs
// This source code is licensed under both the Apache 2.0 and MIT License
// (found in the LICENSE-* files in the repository)

use crate::{
    coding::Encode,
    file::{FileChecksum, WritableFileWriter},
    format::{BlobLogFooter, BlobLogHeader, BlobLogRecord, RECORD_HEADER_SIZE},
    id::BlobFileNumber,
};

/// Last element written to a blob file
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum ElemType {
    /// Nothing written yet
    None,

    /// Header written
    FileHeader,

    /// At least one record written
    Record,

    /// Footer written, the file is closed
    FileFooter,
}

/// Appends the header, records and footer of one blob file
///
/// The file is laid out as `[header][record]*[footer]`. Calling the
/// methods out of that order is a bug and panics.
pub struct BlobLogWriter {
    dest: Option<WritableFileWriter>,
    log_number: BlobFileNumber,
    block_offset: u64,
    use_fsync: bool,
    do_flush: bool,
    last_elem_type: ElemType,

    pub(crate) blob_count: u64,
    pub(crate) bytes_written: u64,
}

impl std::fmt::Debug for BlobLogWriter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "BlobLogWriter<#{}, offset: {}, {:?}>",
            self.log_number, self.block_offset, self.last_elem_type,
        )
    }
}

fn closed_error() -> crate::Error {
    crate::Error::Io(std::io::Error::new(
        std::io::ErrorKind::Other,
        "blob log writer is closed",
    ))
}

impl BlobLogWriter {
    /// Creates a writer on top of a file destination.
    #[must_use]
    pub fn new(
        dest: WritableFileWriter,
        log_number: BlobFileNumber,
        use_fsync: bool,
        do_flush: bool,
    ) -> Self {
        Self {
            dest: Some(dest),
            log_number,
            block_offset: 0,
            use_fsync,
            do_flush,
            last_elem_type: ElemType::None,
            blob_count: 0,
            bytes_written: 0,
        }
    }

    /// Returns the blob file number.
    #[must_use]
    pub fn log_number(&self) -> BlobFileNumber {
        self.log_number
    }

    /// Returns the offset the next record will be written at.
    #[must_use]
    pub fn block_offset(&self) -> u64 {
        self.block_offset
    }

    /// Returns the last element that was written.
    #[must_use]
    pub fn last_elem_type(&self) -> ElemType {
        self.last_elem_type
    }

    /// Returns the number of records written.
    #[must_use]
    pub fn blob_count(&self) -> u64 {
        self.blob_count
    }

    /// Returns the number of bytes handed to the destination, including
    /// header, record headers and footer.
    #[must_use]
    pub fn bytes_written(&self) -> u64 {
        self.bytes_written
    }

    fn dest(&mut self) -> crate::Result<&mut WritableFileWriter> {
        self.dest.as_mut().ok_or_else(closed_error)
    }

    /// Flushes and syncs the destination.
    ///
    /// # Errors
    ///
    /// Will return `Err` if an IO error occurs.
    pub fn sync(&mut self) -> crate::Result<()> {
        let use_fsync = self.use_fsync;
        self.dest()?.sync(use_fsync)?;
        log::trace!("Synced blob file #{}", self.log_number);
        Ok(())
    }

    /// Writes the file header. Must be called first, exactly once.
    ///
    /// # Errors
    ///
    /// Will return `Err` if an IO error occurs.
    ///
    /// # Panics
    ///
    /// Panics if anything was written before.
    pub fn write_header(&mut self, header: &BlobLogHeader) -> crate::Result<()> {
        assert_eq!(0, self.block_offset, "header must be written first");
        assert_eq!(ElemType::None, self.last_elem_type, "header must be written first");

        let bytes = header.encode_into_vec()?;
        let do_flush = self.do_flush;

        let result = self.dest().and_then(|dest| {
            dest.append(&bytes)?;
            if do_flush {
                dest.flush()?;
            }
            Ok(())
        });

        if result.is_ok() {
            self.block_offset += bytes.len() as u64;
        }

        self.last_elem_type = ElemType::FileHeader;
        self.bytes_written += bytes.len() as u64;

        log::trace!("Wrote header of blob file #{}", self.log_number);

        result
    }

    /// Appends a record without expiration.
    ///
    /// Returns the offsets of the key and of the value in the file.
    ///
    /// # Errors
    ///
    /// Will return `Err` if an IO error occurs.
    ///
    /// # Panics
    ///
    /// Panics if the header was not written, or the footer was already written.
    pub fn add_record(&mut self, key: &[u8], value: &[u8]) -> crate::Result<(u64, u64)> {
        self.add_record_with_expiration(key, value, 0)
    }

    /// Appends a record with an expiration timestamp.
    ///
    /// Returns the offsets of the key and of the value in the file.
    ///
    /// # Errors
    ///
    /// Will return `Err` if an IO error occurs.
    ///
    /// # Panics
    ///
    /// Panics if the header was not written, or the footer was already written.
    pub fn add_record_with_expiration(
        &mut self,
        key: &[u8],
        value: &[u8],
        expiration: u64,
    ) -> crate::Result<(u64, u64)> {
        assert_ne!(0, self.block_offset, "header must be written first");
        assert!(
            matches!(
                self.last_elem_type,
                ElemType::FileHeader | ElemType::Record
            ),
            "cannot add record after footer",
        );

        let header = BlobLogRecord::encode_header(key, value, expiration)?;
        let do_flush = self.do_flush;

        let result = self.dest().and_then(|dest| {
            dest.append(&header)?;
            dest.append(key)?;
            dest.append(value)?;
            if do_flush {
                dest.flush()?;
            }
            Ok(())
        });

        let key_offset = self.block_offset + RECORD_HEADER_SIZE as u64;
        let blob_offset = key_offset + key.len() as u64;
        self.block_offset = blob_offset + value.len() as u64;
        self.last_elem_type = ElemType::Record;

        self.bytes_written += (RECORD_HEADER_SIZE + key.len() + value.len()) as u64;
        self.blob_count += 1;

        result.map(|()| (key_offset, blob_offset))
    }

    /// Appends the footer, syncs and closes the file.
    ///
    /// If `want_checksum` is set and the destination computed a whole-file
    /// checksum, it is returned.
    ///
    /// If the destination has seen a write error before, nothing is
    /// written and the file is left unterminated.
    ///
    /// # Errors
    ///
    /// Will return `Err` if an IO error occurs, or occurred before.
    ///
    /// # Panics
    ///
    /// Panics if the header was not written, or the footer was already written.
    pub fn append_footer(
        &mut self,
        footer: &BlobLogFooter,
        want_checksum: bool,
    ) -> crate::Result<Option<FileChecksum>> {
        assert_ne!(0, self.block_offset, "header must be written first");
        assert!(
            matches!(
                self.last_elem_type,
                ElemType::FileHeader | ElemType::Record
            ),
            "footer was already written",
        );

        let bytes = footer.encode_into_vec()?;

        let Some(mut dest) = self.dest.take() else {
            return Err(closed_error());
        };

        if dest.seen_error() {
            log::warn!(
                "Blob file #{} has seen a write error, not closing it",
                self.log_number
            );

            return Err(crate::Error::Io(std::io::Error::new(
                std::io::ErrorKind::Other,
                "Seen error, skip closing",
            )));
        }

        dest.append(&bytes)?;
        self.block_offset += bytes.len() as u64;
        self.bytes_written += bytes.len() as u64;

        dest.sync(self.use_fsync)?;
        dest.close()?;

        self.last_elem_type = ElemType::FileFooter;

        log::debug!(
            "Closed blob file #{} with {} blobs, {} bytes",
            self.log_number,
            footer.blob_count,
            self.block_offset,
        );

        Ok(want_checksum.then(|| dest.file_checksum()).flatten())
    }
}

#[cfg(test)]
#[allow(clippy::indexing_slicing)]
mod tests {
    use super::*;
    use crate::{
        file::FileSystem,
        format::{FOOTER_SIZE, HEADER_SIZE},
        mock::MockFileSystem,
        CompressionType,
    };
    use std::path::Path;
    use test_log::test;

    fn new_writer(fs: &MockFileSystem, path: &Path) -> crate::Result<BlobLogWriter> {
        let file = fs.new_writable_file(path)?;
        Ok(BlobLogWriter::new(
            WritableFileWriter::new(path, file, true),
            1,
            false,
            false,
        ))
    }

    fn header() -> BlobLogHeader {
        BlobLogHeader::new(0, CompressionType::None, false, (0, 0))
    }

    #[test]
    fn blob_log_writer_offsets() -> crate::Result<()> {
        let fs = MockFileSystem::default();
        let path = Path::new("000001.blob");
        let mut writer = new_writer(&fs, path)?;

        writer.write_header(&header())?;
        assert_eq!(HEADER_SIZE as u64, writer.block_offset());

        let (key_offset, blob_offset) = writer.add_record(b"key", b"value")?;
        assert_eq!((HEADER_SIZE + RECORD_HEADER_SIZE) as u64, key_offset);
        assert_eq!(key_offset + 3, blob_offset);

        let (key_offset2, blob_offset2) = writer.add_record(b"k2", b"v2")?;
        assert_eq!(blob_offset + 5 + RECORD_HEADER_SIZE as u64, key_offset2);
        assert_eq!(key_offset2 + 2, blob_offset2);

        let footer = BlobLogFooter {
            blob_count: 2,
            expiration_range: (0, 0),
        };
        let checksum = writer.append_footer(&footer, true)?;
        assert_eq!(ElemType::FileFooter, writer.last_elem_type());
        assert_eq!(2, writer.blob_count());

        let bytes = fs.contents(path)?;
        assert_eq!(bytes.len() as u64, writer.block_offset());
        assert_eq!(bytes.len() as u64, writer.bytes_written());
        assert_eq!(
            b"value",
            &bytes[blob_offset as usize..blob_offset as usize + 5]
        );
        assert_eq!(b"key", &bytes[key_offset as usize..blob_offset as usize]);

        let decoded = BlobLogFooter::decode(&bytes[bytes.len() - FOOTER_SIZE..])?;
        assert_eq!(footer, decoded);

        let checksum = checksum.expect("should have checksum");
        assert_eq!(
            format!("{:016x}", xxhash_rust::xxh3::xxh3_64(&bytes)),
            checksum.value
        );

        Ok(())
    }

    #[test]
    fn blob_log_writer_no_checksum_wanted() -> crate::Result<()> {
        let fs = MockFileSystem::default();
        let mut writer = new_writer(&fs, Path::new("a.blob"))?;

        writer.write_header(&header())?;
        assert!(writer
            .append_footer(&BlobLogFooter::default(), false)?
            .is_none());

        Ok(())
    }

    #[test]
    fn blob_log_writer_seen_error_skips_footer() -> crate::Result<()> {
        let fs = MockFileSystem::default();
        let path = Path::new("000001.blob");
        let mut writer = new_writer(&fs, path)?;

        writer.write_header(&header())?;
        writer.sync()?;

        // Large enough to bypass the write buffer
        fs.fail_appends(true);
        assert!(writer.add_record(b"key", &[0; 100_000]).is_err());
        fs.fail_appends(false);

        assert!(matches!(
            writer.append_footer(&BlobLogFooter::default(), true),
            Err(crate::Error::Io(_))
        ));

        // Header only, no footer
        assert_eq!(HEADER_SIZE, fs.contents(path)?.len());

        Ok(())
    }

    #[test]
    #[should_panic(expected = "header must be written first")]
    fn blob_log_writer_record_before_header() {
        let fs = MockFileSystem::default();
        let mut writer = new_writer(&fs, Path::new("a.blob")).expect("should create");
        let _ = writer.add_record(b"a", b"b");
    }

    #[test]
    #[should_panic(expected = "footer")]
    fn blob_log_writer_record_after_footer() {
        let fs = MockFileSystem::default();
        let mut writer = new_writer(&fs, Path::new("a.blob")).expect("should create");
        writer.write_header(&header()).expect("should write");
        writer
            .append_footer(&BlobLogFooter::default(), false)
            .expect("should close");
        let _ = writer.add_record(b"a", b"b");
    }
}
