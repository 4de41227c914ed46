// Copyright (c) 2024-present, fjall-rs
// This source code is licensed under both the Apache 2.0 and MIT License
// (found in the LICENSE-* files in the repository)

use super::{ExpirationRange, MAGIC_NUMBER};
use crate::{
    coding::{Encode, EncodeError},
    CompressionType,
};
use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use std::io::Write;

/// Size of an encoded blob file header
pub const HEADER_SIZE: usize = 4 + 4 + 4 + 1 + 1 + 8 + 8;

/// Current (and only) blob file format version
pub const VERSION_1: u32 = 1;

const FLAG_HAS_TTL: u8 = 1;

/// Blob file header, written once at offset 0
#[derive(Clone, Debug, Eq, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Deserialize, serde::Serialize))]
pub struct BlobLogHeader {
    /// Format version
    pub version: u32,

    /// Column family the blob file belongs to
    pub column_family_id: u32,

    /// Compression used for every blob in the file
    pub compression: CompressionType,

    /// Whether the blobs carry expiration timestamps
    pub has_ttl: bool,

    /// Expiration range of the blobs
    pub expiration_range: ExpirationRange,
}

impl BlobLogHeader {
    /// Creates a version 1 header.
    #[must_use]
    pub fn new(
        column_family_id: u32,
        compression: CompressionType,
        has_ttl: bool,
        expiration_range: ExpirationRange,
    ) -> Self {
        Self {
            version: VERSION_1,
            column_family_id,
            compression,
            has_ttl,
            expiration_range,
        }
    }

    /// Decodes a header from exactly [`HEADER_SIZE`] bytes.
    ///
    /// # Errors
    ///
    /// Will return `Err` if the header is malformed.
    pub fn decode(src: &[u8]) -> crate::Result<Self> {
        if src.len() != HEADER_SIZE {
            return Err(crate::Error::Corruption(
                "Unexpected blob file header size",
            ));
        }

        let mut reader = src;

        let magic_number = reader.read_u32::<LittleEndian>()?;
        let version = reader.read_u32::<LittleEndian>()?;
        let column_family_id = reader.read_u32::<LittleEndian>()?;

        if magic_number != MAGIC_NUMBER {
            return Err(crate::Error::Corruption(
                "Magic number mismatch in blob file header",
            ));
        }

        if version != VERSION_1 {
            return Err(crate::Error::Corruption("Unknown blob file header version"));
        }

        let flags = reader.read_u8()?;

        let compression_tag = reader.read_u8()?;
        let compression = CompressionType::try_from(compression_tag)
            .map_err(|()| crate::Error::NotSupported("Unsupported blob compression type"))?;

        let expiration_range = (
            reader.read_u64::<LittleEndian>()?,
            reader.read_u64::<LittleEndian>()?,
        );

        Ok(Self {
            version,
            column_family_id,
            compression,
            has_ttl: flags & FLAG_HAS_TTL == FLAG_HAS_TTL,
            expiration_range,
        })
    }
}

impl Encode for BlobLogHeader {
    fn encode_into<W: Write>(&self, writer: &mut W) -> Result<(), EncodeError> {
        writer.write_u32::<LittleEndian>(MAGIC_NUMBER)?;
        writer.write_u32::<LittleEndian>(self.version)?;
        writer.write_u32::<LittleEndian>(self.column_family_id)?;
        writer.write_u8(if self.has_ttl { FLAG_HAS_TTL } else { 0 })?;
        self.compression.encode_into(writer)?;
        writer.write_u64::<LittleEndian>(self.expiration_range.0)?;
        writer.write_u64::<LittleEndian>(self.expiration_range.1)?;
        Ok(())
    }
}
