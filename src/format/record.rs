// Copyright (c) 2024-present, fjall-rs
// This source code is licensed under both the Apache 2.0 and MIT License
// (found in the LICENSE-* files in the repository)

use super::masked_crc32;
use crate::{coding::EncodeError, Slice};
use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};

/// Size of an encoded record header
pub const RECORD_HEADER_SIZE: usize = 8 + 8 + 8 + 4 + 4;

/// Length of the record header prefix covered by the header CRC
const HEADER_CRC_COVERAGE: usize = RECORD_HEADER_SIZE - 8;

/// Fixed-size header in front of every blob record
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct RecordHeader {
    /// Length of the key that follows the header
    pub key_size: u64,

    /// Length of the (possibly compressed) value that follows the key
    pub value_size: u64,

    /// Expiration timestamp, 0 if none
    pub expiration: u64,

    /// Masked CRC of the first 24 header bytes
    pub header_crc: u32,

    /// Masked CRC of key + value
    pub blob_crc: u32,
}

impl RecordHeader {
    /// Decodes a record header from exactly [`RECORD_HEADER_SIZE`] bytes.
    ///
    /// # Errors
    ///
    /// Will return `Err` if the header is malformed or its CRC does not match.
    pub fn decode(src: &[u8]) -> crate::Result<Self> {
        if src.len() != RECORD_HEADER_SIZE {
            return Err(crate::Error::Corruption(
                "Unexpected blob record header size",
            ));
        }

        let (covered, _) = src.split_at(HEADER_CRC_COVERAGE);
        let expected_crc = masked_crc32(&[covered]);

        let mut reader = src;

        let key_size = reader.read_u64::<LittleEndian>()?;
        let value_size = reader.read_u64::<LittleEndian>()?;
        let expiration = reader.read_u64::<LittleEndian>()?;
        let header_crc = reader.read_u32::<LittleEndian>()?;
        let blob_crc = reader.read_u32::<LittleEndian>()?;

        if header_crc != expected_crc {
            return Err(crate::Error::Corruption("Blob record header CRC mismatch"));
        }

        Ok(Self {
            key_size,
            value_size,
            expiration,
            header_crc,
            blob_crc,
        })
    }

    /// Total on-disk size of the record, header included.
    ///
    /// # Errors
    ///
    /// Will return `Err` if the sizes in the header overflow.
    pub fn record_size(&self) -> crate::Result<u64> {
        (RECORD_HEADER_SIZE as u64)
            .checked_add(self.key_size)
            .and_then(|size| size.checked_add(self.value_size))
            .ok_or(crate::Error::Corruption("Blob record size overflows"))
    }

    /// Verifies the blob CRC against the key and value bytes.
    ///
    /// # Errors
    ///
    /// Will return `Err` if the CRC does not match.
    pub fn check_blob_crc(&self, key: &[u8], value: &[u8]) -> crate::Result<()> {
        if masked_crc32(&[key, value]) == self.blob_crc {
            Ok(())
        } else {
            Err(crate::Error::Corruption("Blob CRC mismatch"))
        }
    }
}

/// A blob record as it appears on disk
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct BlobLogRecord {
    /// Decoded record header
    pub header: RecordHeader,

    /// User key
    pub key: Slice,

    /// Value as stored (compressed if the file uses compression)
    pub value: Slice,
}

impl BlobLogRecord {
    /// Distance between the start of a record and its value.
    #[must_use]
    pub fn value_adjustment(key_size: u64) -> u64 {
        RECORD_HEADER_SIZE as u64 + key_size
    }

    /// Encodes the header of a record holding `key` and `value`.
    ///
    /// # Errors
    ///
    /// Will return `Err` if an IO error occurs.
    pub fn encode_header(
        key: &[u8],
        value: &[u8],
        expiration: u64,
    ) -> Result<Vec<u8>, EncodeError> {
        let mut v = Vec::with_capacity(RECORD_HEADER_SIZE);
        v.write_u64::<LittleEndian>(key.len() as u64)?;
        v.write_u64::<LittleEndian>(value.len() as u64)?;
        v.write_u64::<LittleEndian>(expiration)?;

        let header_crc = masked_crc32(&[&v]);
        v.write_u32::<LittleEndian>(header_crc)?;

        let blob_crc = masked_crc32(&[key, value]);
        v.write_u32::<LittleEndian>(blob_crc)?;

        Ok(v)
    }

    /// Decodes a full record (header, key and value) from `src`.
    ///
    /// # Errors
    ///
    /// Will return `Err` if the record is malformed, the lengths do not match
    /// the available bytes, or any CRC does not match.
    pub fn decode(src: &[u8]) -> crate::Result<Self> {
        if src.len() < RECORD_HEADER_SIZE {
            return Err(crate::Error::Corruption("Blob record is truncated"));
        }

        let (header_bytes, rest) = src.split_at(RECORD_HEADER_SIZE);

        let header = RecordHeader::decode(header_bytes)?;

        if header.record_size()? != src.len() as u64 {
            return Err(crate::Error::Corruption(
                "Blob record length does not match its header",
            ));
        }

        #[allow(clippy::cast_possible_truncation)]
        let (key, value) = rest.split_at(header.key_size as usize);
        header.check_blob_crc(key, value)?;

        Ok(Self {
            header,
            key: key.into(),
            value: value.into(),
        })
    }
}

#[cfg(test)]
#[allow(clippy::indexing_slicing)]
mod tests {
    use super::*;
    use test_log::test;

    fn encode_record(key: &[u8], value: &[u8], expiration: u64) -> crate::Result<Vec<u8>> {
        let mut bytes = BlobLogRecord::encode_header(key, value, expiration)?;
        bytes.extend_from_slice(key);
        bytes.extend_from_slice(value);
        Ok(bytes)
    }

    #[test]
    fn record_round_trip() -> crate::Result<()> {
        for (key, value, expiration) in [
            (&b"a"[..], &b""[..], 0),
            (&b"key"[..], &b"value"[..], 0),
            (&b"k"[..], &[0xAB; 4_096][..], 1_700_000_000),
        ] {
            let bytes = encode_record(key, value, expiration)?;
            assert_eq!(
                RECORD_HEADER_SIZE + key.len() + value.len(),
                bytes.len()
            );

            let record = BlobLogRecord::decode(&bytes)?;
            assert_eq!(key, &*record.key);
            assert_eq!(value, &*record.value);
            assert_eq!(key.len() as u64, record.header.key_size);
            assert_eq!(value.len() as u64, record.header.value_size);
            assert_eq!(expiration, record.header.expiration);
        }

        Ok(())
    }

    #[test]
    fn record_detects_any_flipped_byte() -> crate::Result<()> {
        let bytes = encode_record(b"key", b"some value", 0)?;

        for idx in 0..bytes.len() {
            let mut corrupted = bytes.clone();
            corrupted[idx] ^= 0x80;

            assert!(
                matches!(
                    BlobLogRecord::decode(&corrupted),
                    Err(crate::Error::Corruption(_))
                ),
                "flipped byte {idx} was not detected",
            );
        }

        Ok(())
    }

    #[test]
    fn record_length_mismatch() -> crate::Result<()> {
        let mut bytes = encode_record(b"key", b"value", 0)?;
        bytes.push(0);

        assert!(matches!(
            BlobLogRecord::decode(&bytes),
            Err(crate::Error::Corruption(_))
        ));

        assert!(matches!(
            BlobLogRecord::decode(&bytes[..10]),
            Err(crate::Error::Corruption(_))
        ));
        Ok(())
    }
    #[test]
    fn record_size_overflow() -> crate::Result<()> {
        let mut bytes = encode_record(b"key", b"value", 0)?;

        // Sizes that overflow, under a valid header CRC
        bytes[..8].copy_from_slice(&(u64::MAX - 8).to_le_bytes());
        let crc = masked_crc32(&[&bytes[..HEADER_CRC_COVERAGE]]);
        bytes[HEADER_CRC_COVERAGE..HEADER_CRC_COVERAGE + 4].copy_from_slice(&crc.to_le_bytes());

        let header = RecordHeader::decode(&bytes[..RECORD_HEADER_SIZE])?;
        assert!(matches!(
            header.record_size(),
            Err(crate::Error::Corruption(_))
        ));
        assert!(matches!(
            BlobLogRecord::decode(&bytes),
            Err(crate::Error::Corruption(_))
        ));

        Ok(())
    }
}
