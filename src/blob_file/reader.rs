// Copyright (c) 2024-present, fjall-rs
// This source code is licensed under both the Apache 2.0 and MIT License
// (found in the LICENSE-* files in the repository)

use super::{prefetch::FilePrefetchBuffer, read_request::BlobReadRequest};
use crate::{
    config::{Config, ReadOptions},
    file::{FileSystem, IoPriority, RandomAccessFile},
    format::{
        BlobLogFooter, BlobLogHeader, BlobLogRecord, RecordHeader, FOOTER_SIZE, HEADER_SIZE,
        RECORD_HEADER_SIZE,
    },
    id::BlobFileNumber,
    path::blob_file_path,
    CompressionType, Slice,
};
use std::sync::Arc;

const NO_EXPIRATION: (u64, u64) = (0, 0);

/// Random access reader of a closed blob file
///
/// Header and footer are validated when the reader is created, so a reader
/// never exists for an unterminated file.
pub struct BlobFileReader {
    file_number: BlobFileNumber,
    file: Arc<dyn RandomAccessFile>,
    file_size: u64,
    compression: CompressionType,
}

impl std::fmt::Debug for BlobFileReader {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "BlobFileReader<#{}, {} bytes, {}>",
            self.file_number, self.file_size, self.compression,
        )
    }
}

fn read_from_file(
    file: &dyn RandomAccessFile,
    offset: u64,
    size: u64,
    priority: IoPriority,
) -> crate::Result<Vec<u8>> {
    let len = usize::try_from(size).map_err(|_| crate::Error::Corruption("Blob is too large"))?;

    let mut buf = vec![0; len];
    file.read_at(offset, &mut buf, priority)?;
    Ok(buf)
}

fn is_valid_blob_offset(offset: u64, key_size: u64, value_size: u64, file_size: u64) -> bool {
    let min_offset = (HEADER_SIZE as u64) + BlobLogRecord::value_adjustment(key_size);

    if offset < min_offset {
        return false;
    }

    let Some(end) = offset.checked_add(value_size) else {
        return false;
    };

    file_size
        .checked_sub(FOOTER_SIZE as u64)
        .is_some_and(|max_end| end <= max_end)
}

/// Checks a full record (header, key, value) against what the caller expects.
fn verify_blob(record: &[u8], user_key: &[u8], value_size: u64) -> crate::Result<()> {
    if record.len() < RECORD_HEADER_SIZE {
        return Err(crate::Error::Corruption("Blob record is truncated"));
    }
    let (header_bytes, rest) = record.split_at(RECORD_HEADER_SIZE);

    let header = RecordHeader::decode(header_bytes)?;

    if header.key_size != user_key.len() as u64 {
        return Err(crate::Error::Corruption(
            "Key size mismatch when reading blob",
        ));
    }

    if header.value_size != value_size {
        return Err(crate::Error::Corruption(
            "Value size mismatch when reading blob",
        ));
    }

    if rest.len() < user_key.len() {
        return Err(crate::Error::Corruption("Blob record is truncated"));
    }
    let (key, value) = rest.split_at(user_key.len());

    if key != user_key {
        return Err(crate::Error::Corruption("Key mismatch when reading blob"));
    }

    header.check_blob_crc(key, value)
}

fn uncompress_blob_if_needed(value: &[u8], compression: CompressionType) -> crate::Result<Slice> {
    match compression {
        CompressionType::None => Ok(value.into()),

        #[allow(unreachable_patterns)]
        _ => Ok(compression.decompress(value)?.into()),
    }
}

impl BlobFileReader {
    /// Opens a blob file and validates its header and footer.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::Corruption`] if the file is malformed, belongs
    /// to another column family, is a TTL file, or has no valid footer.
    ///
    /// Will return `Err` if an IO error occurs.
    pub fn create(
        fs: &dyn FileSystem,
        config: &Config,
        read_options: &ReadOptions,
        file_number: BlobFileNumber,
    ) -> crate::Result<Self> {
        let path = blob_file_path(&config.path, file_number);
        log::trace!("Opening blob file reader for {}", path.display());

        let file = fs.new_random_access_file(&path)?;
        let file_size = file.size()?;

        if file_size < (HEADER_SIZE + FOOTER_SIZE) as u64 {
            return Err(crate::Error::Corruption("Malformed blob file"));
        }

        let compression = Self::read_header(&*file, read_options, config.column_family_id)?;
        Self::read_footer(&*file, read_options, file_size)?;

        Ok(Self {
            file_number,
            file,
            file_size,
            compression,
        })
    }

    fn read_header(
        file: &dyn RandomAccessFile,
        read_options: &ReadOptions,
        column_family_id: u32,
    ) -> crate::Result<CompressionType> {
        let bytes = read_from_file(file, 0, HEADER_SIZE as u64, read_options.io_priority)?;
        let header = BlobLogHeader::decode(&bytes)?;

        if header.column_family_id != column_family_id {
            return Err(crate::Error::Corruption("Column family ID mismatch"));
        }

        if header.has_ttl || header.expiration_range != NO_EXPIRATION {
            return Err(crate::Error::Corruption("Unexpected TTL blob file"));
        }

        Ok(header.compression)
    }

    fn read_footer(
        file: &dyn RandomAccessFile,
        read_options: &ReadOptions,
        file_size: u64,
    ) -> crate::Result<()> {
        let offset = file_size - FOOTER_SIZE as u64;
        let bytes = read_from_file(file, offset, FOOTER_SIZE as u64, read_options.io_priority)?;
        let footer = BlobLogFooter::decode(&bytes)?;

        if footer.expiration_range != NO_EXPIRATION {
            return Err(crate::Error::Corruption("Unexpected TTL blob file"));
        }

        Ok(())
    }

    /// Returns the blob file number.
    #[must_use]
    pub fn file_number(&self) -> BlobFileNumber {
        self.file_number
    }

    /// Returns the compression used by every blob in the file.
    #[must_use]
    pub fn compression(&self) -> CompressionType {
        self.compression
    }

    /// Returns the size of the file in bytes.
    #[must_use]
    pub fn file_size(&self) -> u64 {
        self.file_size
    }

    fn check_request(
        &self,
        user_key: &[u8],
        offset: u64,
        value_size: u64,
        compression: CompressionType,
    ) -> crate::Result<()> {
        if !is_valid_blob_offset(offset, user_key.len() as u64, value_size, self.file_size) {
            return Err(crate::Error::Corruption("Invalid blob offset"));
        }

        if !compression.same_format(self.compression) {
            return Err(crate::Error::Corruption(
                "Compression type mismatch when reading blob",
            ));
        }

        Ok(())
    }

    /// Reads one blob.
    ///
    /// With `verify_checksums`, the whole record is read and checked against
    /// `user_key`, otherwise only the value bytes are read.
    ///
    /// Returns the (decompressed) value and the number of bytes read.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::Corruption`] if the offset is out of bounds,
    /// the compression does not match, or verification fails.
    ///
    /// Will return `Err` if an IO error occurs, or the value cannot be decompressed.
    pub fn get_blob(
        &self,
        read_options: &ReadOptions,
        user_key: &[u8],
        offset: u64,
        value_size: u64,
        compression: CompressionType,
        prefetch_buffer: Option<&mut FilePrefetchBuffer>,
    ) -> crate::Result<(Slice, u64)> {
        self.check_request(user_key, offset, value_size, compression)?;

        let adjustment = if read_options.verify_checksums {
            BlobLogRecord::value_adjustment(user_key.len() as u64)
        } else {
            0
        };

        let record_offset = offset - adjustment;
        let record_size = value_size + adjustment;

        let owned;
        let record: &[u8] = if let Some(prefetch_buffer) = prefetch_buffer {
            let len = usize::try_from(record_size)
                .map_err(|_| crate::Error::Corruption("Blob is too large"))?;

            prefetch_buffer.read(
                &*self.file,
                record_offset,
                len,
                self.file_size - FOOTER_SIZE as u64,
                read_options.io_priority,
            )?
        } else {
            owned = read_from_file(
                &*self.file,
                record_offset,
                record_size,
                read_options.io_priority,
            )?;
            &owned
        };

        if read_options.verify_checksums {
            verify_blob(record, user_key, value_size)?;
        }

        #[allow(clippy::cast_possible_truncation)]
        let value = record.get(adjustment as usize..).unwrap_or_default();

        let value = uncompress_blob_if_needed(value, compression)?;

        Ok((value, record_size))
    }

    /// Reads a batch of blobs, filling in the result of every request.
    ///
    /// Requests may come in any order. Records that are adjacent or overlap
    /// in the file are fetched with a single read. An invalid request does not
    /// affect the others.
    ///
    /// Returns the number of bytes read.
    pub fn multi_get_blob(
        &self,
        read_options: &ReadOptions,
        requests: &mut [BlobReadRequest],
    ) -> u64 {
        // (request index, record start, record end, value adjustment)
        let mut pending = Vec::with_capacity(requests.len());

        for (idx, request) in requests.iter_mut().enumerate() {
            if let Err(e) = self.check_request(
                &request.user_key,
                request.offset,
                request.len,
                request.compression,
            ) {
                request.result = Some(Err(e));
                continue;
            }

            let adjustment = if read_options.verify_checksums {
                BlobLogRecord::value_adjustment(request.user_key.len() as u64)
            } else {
                0
            };

            pending.push((
                idx,
                request.offset - adjustment,
                request.offset + request.len,
                adjustment,
            ));
        }

        pending.sort_by_key(|&(_, start, _, _)| start);

        let mut ranges: Vec<ReadRange> = Vec::new();

        for (idx, start, end, adjustment) in pending {
            match ranges.last_mut() {
                Some(range) if start <= range.end => {
                    range.end = range.end.max(end);
                    range.members.push((idx, start, adjustment));
                }
                _ => ranges.push(ReadRange {
                    start,
                    end,
                    members: vec![(idx, start, adjustment)],
                }),
            }
        }

        let mut total_bytes = 0;

        for range in ranges {
            let result = read_from_file(
                &*self.file,
                range.start,
                range.end - range.start,
                read_options.io_priority,
            );

            let buf = match result {
                Ok(buf) => buf,
                Err(e) => {
                    log::debug!(
                        "Failed to read range {}..{} of blob file #{}: {e:?}",
                        range.start,
                        range.end,
                        self.file_number,
                    );

                    for (idx, _, _) in range.members {
                        if let Some(request) = requests.get_mut(idx) {
                            request.result = Some(Err(e.duplicate()));
                        }
                    }
                    continue;
                }
            };

            total_bytes += buf.len() as u64;

            for (idx, start, adjustment) in range.members {
                let Some(request) = requests.get_mut(idx) else {
                    continue;
                };

                #[allow(clippy::cast_possible_truncation)]
                let begin = (start - range.start) as usize;

                #[allow(clippy::cast_possible_truncation)]
                let end = begin + (adjustment + request.len) as usize;

                request.result = Some(
                    buf.get(begin..end)
                        .ok_or(crate::Error::Corruption("Blob record is truncated"))
                        .and_then(|record| {
                            if read_options.verify_checksums {
                                verify_blob(record, &request.user_key, request.len)?;
                            }

                            #[allow(clippy::cast_possible_truncation)]
                            let value = record.get(adjustment as usize..).unwrap_or_default();

                            uncompress_blob_if_needed(value, request.compression)
                        }),
                );
            }
        }

        total_bytes
    }
}

/// Physical read covering one or more records
struct ReadRange {
    start: u64,
    end: u64,

    /// (request index, record start, value adjustment)
    members: Vec<(usize, u64, u64)>,
}
