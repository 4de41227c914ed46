// Copyright (c) 2024-present, fjall-rs
// This source code is licensed under both the Apache 2.0 and MIT License
// (found in the LICENSE-* files in the repository)

use crate::{
    file::{FileSystem, IoPriority, RandomAccessFile},
    format::{
        BlobLogFooter, BlobLogHeader, BlobLogRecord, RecordHeader, FOOTER_SIZE, HEADER_SIZE,
        RECORD_HEADER_SIZE,
    },
    Slice,
};
use std::{
    io::{BufReader, Read},
    path::Path,
    sync::Arc,
};

/// [`Read`] adapter over a [`RandomAccessFile`], reading from the front
pub struct FileCursor {
    file: Arc<dyn RandomAccessFile>,
    offset: u64,
    file_size: u64,
}

impl Read for FileCursor {
    fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
        let remaining = self.file_size.saturating_sub(self.offset);

        #[allow(clippy::cast_possible_truncation)]
        let len = buf.len().min(remaining.min(usize::MAX as u64) as usize);

        let Some(buf) = buf.get_mut(..len).filter(|buf| !buf.is_empty()) else {
            return Ok(0);
        };

        self.file.read_at(self.offset, buf, IoPriority::Low)?;
        self.offset += len as u64;

        Ok(len)
    }
}

/// Reads through a blob file in order
///
/// Yields every record, then validates the footer. Stops at the first error;
/// a file without a valid footer ends with a [`crate::Error::Corruption`].
pub struct SequentialReader<R: Read> {
    inner: R,
    header: BlobLogHeader,
    footer: Option<BlobLogFooter>,
    offset: u64,
    file_size: u64,
    is_terminated: bool,
}

impl SequentialReader<BufReader<FileCursor>> {
    /// Opens a blob file of `fs` for sequential reading.
    ///
    /// # Errors
    ///
    /// Will return `Err` if an IO error occurs, or the header is invalid.
    pub fn open<P: AsRef<Path>>(fs: &dyn FileSystem, path: P) -> crate::Result<Self> {
        let file = fs.new_random_access_file(path.as_ref())?;
        let file_size = file.size()?;

        let cursor = FileCursor {
            file,
            offset: 0,
            file_size,
        };
        Self::new(BufReader::new(cursor), file_size)
    }
}

impl<R: Read> SequentialReader<R> {
    /// Reads the header of a blob file of `file_size` bytes.
    ///
    /// # Errors
    ///
    /// Will return `Err` if an IO error occurs, or the header is invalid.
    pub fn new(mut inner: R, file_size: u64) -> crate::Result<Self> {
        let mut buf = [0; HEADER_SIZE];
        inner.read_exact(&mut buf)?;
        let header = BlobLogHeader::decode(&buf)?;

        Ok(Self {
            inner,
            header,
            footer: None,
            offset: HEADER_SIZE as u64,
            file_size,
            is_terminated: false,
        })
    }

    /// Returns the file header.
    #[must_use]
    pub fn header(&self) -> &BlobLogHeader {
        &self.header
    }

    /// Returns the footer, once the reader has reached it.
    #[must_use]
    pub fn footer(&self) -> Option<&BlobLogFooter> {
        self.footer.as_ref()
    }

    /// Returns the offset of the next record.
    #[must_use]
    pub fn offset(&self) -> u64 {
        self.offset
    }

    fn read_footer(&mut self) -> crate::Result<()> {
        let mut buf = [0; FOOTER_SIZE];
        self.inner.read_exact(&mut buf)?;
        self.footer = Some(BlobLogFooter::decode(&buf)?);
        self.offset += FOOTER_SIZE as u64;
        Ok(())
    }

    fn read_record(&mut self) -> crate::Result<BlobLogRecord> {
        let records_end = self.file_size.saturating_sub(FOOTER_SIZE as u64);

        if self.offset + RECORD_HEADER_SIZE as u64 > records_end {
            return Err(crate::Error::Corruption("Blob file is unterminated"));
        }

        let mut buf = [0; RECORD_HEADER_SIZE];
        self.inner.read_exact(&mut buf)?;
        let header = RecordHeader::decode(&buf)?;

        let record_end = self
            .offset
            .checked_add(header.record_size()?)
            .ok_or(crate::Error::Corruption("Blob record size overflows"))?;

        if record_end > records_end {
            return Err(crate::Error::Corruption(
                "Blob record extends past the end of the file",
            ));
        }

        #[allow(clippy::cast_possible_truncation)]
        let key = Slice::from_reader(&mut self.inner, header.key_size as usize)?;

        #[allow(clippy::cast_possible_truncation)]
        let value = Slice::from_reader(&mut self.inner, header.value_size as usize)?;

        header.check_blob_crc(&key, &value)?;
        self.offset = record_end;

        Ok(BlobLogRecord { header, key, value })
    }
}

impl<R: Read> Iterator for SequentialReader<R> {
    type Item = crate::Result<BlobLogRecord>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.is_terminated {
            return None;
        }

        if self.offset + FOOTER_SIZE as u64 == self.file_size {
            self.is_terminated = true;

            return match self.read_footer() {
                Ok(()) => None,
                Err(e) => Some(Err(e)),
            };
        }

        let result = self.read_record();

        if result.is_err() {
            self.is_terminated = true;
        }

        Some(result)
    }
}
