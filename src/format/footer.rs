// Copyright (c) 2024-present, fjall-rs
// This source code is licensed under both the Apache 2.0 and MIT License
// (found in the LICENSE-* files in the repository)

use super::{masked_crc32, ExpirationRange, MAGIC_NUMBER};
use crate::coding::{Encode, EncodeError};
use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use std::io::Write;

/// Size of an encoded blob file footer
pub const FOOTER_SIZE: usize = 4 + 8 + 8 + 8 + 4;

/// Blob file footer
///
/// Its presence marks the file as closed. A file without a valid
/// footer is unterminated and must not be used as a data source.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Deserialize, serde::Serialize))]
pub struct BlobLogFooter {
    /// Number of records in the file
    pub blob_count: u64,

    /// Expiration range of the blobs
    pub expiration_range: ExpirationRange,
}

impl BlobLogFooter {
    /// Decodes a footer from exactly [`FOOTER_SIZE`] bytes.
    ///
    /// # Errors
    ///
    /// Will return `Err` if the footer is malformed or its checksum does not match.
    pub fn decode(src: &[u8]) -> crate::Result<Self> {
        if src.len() != FOOTER_SIZE {
            return Err(crate::Error::Corruption(
                "Unexpected blob file footer size",
            ));
        }

        let (content, _) = src.split_at(FOOTER_SIZE - std::mem::size_of::<u32>());
        let expected_crc = masked_crc32(&[content]);

        let mut reader = src;

        let magic_number = reader.read_u32::<LittleEndian>()?;
        let blob_count = reader.read_u64::<LittleEndian>()?;
        let expiration_range = (
            reader.read_u64::<LittleEndian>()?,
            reader.read_u64::<LittleEndian>()?,
        );
        let crc = reader.read_u32::<LittleEndian>()?;

        if magic_number != MAGIC_NUMBER {
            return Err(crate::Error::Corruption(
                "Magic number mismatch in blob file footer",
            ));
        }

        if crc != expected_crc {
            return Err(crate::Error::Corruption("Blob file footer CRC mismatch"));
        }

        Ok(Self {
            blob_count,
            expiration_range,
        })
    }
}

impl Encode for BlobLogFooter {
    fn encode_into<W: Write>(&self, writer: &mut W) -> Result<(), EncodeError> {
        let mut v = Vec::with_capacity(FOOTER_SIZE);
        v.write_u32::<LittleEndian>(MAGIC_NUMBER)?;
        v.write_u64::<LittleEndian>(self.blob_count)?;
        v.write_u64::<LittleEndian>(self.expiration_range.0)?;
        v.write_u64::<LittleEndian>(self.expiration_range.1)?;

        let crc = masked_crc32(&[&v]);
        v.write_u32::<LittleEndian>(crc)?;

        assert_eq!(v.len(), FOOTER_SIZE, "blob file footer has invalid size");

        writer.write_all(&v)?;
        Ok(())
    }
}
