// Copyright (c) 2024-present, fjall-rs
// This source code is licensed under both the Apache 2.0 and MIT License
// (found in the LICENSE-* files in the repository)

use crate::{
    coding::{Decode, DecodeError, Encode, EncodeError},
    id::BlobFileNumber,
    CompressionType,
};
use byteorder::{ReadBytesExt, WriteBytesExt};
use std::io::{Read, Write};
use varint_rs::{VarintReader, VarintWriter};

const BLOB_INDEX_TAG: u8 = 1;

/// Points at a value stored in a blob file
///
/// This is what the primary index stores instead of a large value.
#[allow(clippy::module_name_repetitions)]
#[derive(Clone, Debug, Eq, Hash, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Deserialize, serde::Serialize))]
pub struct BlobIndex {
    /// Blob file number
    pub file_number: BlobFileNumber,

    /// Offset of the value bytes (not the record) in the file
    pub offset: u64,

    /// Size of the value as stored
    pub size: u64,

    /// Compression of the stored value
    pub compression: CompressionType,
}

impl Encode for BlobIndex {
    fn encode_into<W: Write>(&self, writer: &mut W) -> Result<(), EncodeError> {
        writer.write_u8(BLOB_INDEX_TAG)?;
        writer.write_u64_varint(self.file_number)?;
        writer.write_u64_varint(self.offset)?;
        writer.write_u64_varint(self.size)?;
        self.compression.encode_into(writer)?;
        Ok(())
    }
}

impl Decode for BlobIndex {
    fn decode_from<R: Read>(reader: &mut R) -> Result<Self, DecodeError> {
        let tag = reader.read_u8()?;
        if tag != BLOB_INDEX_TAG {
            return Err(DecodeError::InvalidTag(("BlobIndex", tag)));
        }

        let file_number = reader.read_u64_varint()?;
        let offset = reader.read_u64_varint()?;
        let size = reader.read_u64_varint()?;
        let compression = CompressionType::decode_from(reader)?;

        Ok(Self {
            file_number,
            offset,
            size,
            compression,
        })
    }
}
