// Copyright (c) 2024-present, fjall-rs
// This source code is licensed under both the Apache 2.0 and MIT License
// (found in the LICENSE-* files in the repository)

use crate::coding::{Decode, DecodeError, Encode, EncodeError};
use byteorder::{ReadBytesExt, WriteBytesExt};
use std::io::{Read, Write};

/// Default zlib level used when a blob file header is decoded
#[cfg(feature = "miniz")]
pub const DEFAULT_MINIZ_LEVEL: u8 = 6;

/// Compression failed
#[derive(Debug)]
pub struct CompressError(pub String);

/// Decompression failed (malformed input)
#[derive(Debug)]
pub struct DecompressError(pub String);

/// Compression type
///
/// Only the tag values follow the `RocksDB` compression type numbering.
/// Payloads are size-prepended `lz4_flex` blocks and raw DEFLATE streams,
/// not `RocksDB`'s compressed block framing.
#[derive(Copy, Clone, Debug, Default, Eq, Hash, PartialEq)]
#[allow(clippy::module_name_repetitions)]
#[cfg_attr(feature = "serde", derive(serde::Deserialize, serde::Serialize))]
pub enum CompressionType {
    /// No compression
    #[default]
    None,

    /// LZ4 compression (speed-optimized)
    #[cfg(feature = "lz4")]
    Lz4,

    /// Zlib/DEFLATE compression (space-optimized)
    ///
    /// The level is only used when compressing.
    #[cfg(feature = "miniz")]
    Miniz(u8),
}

impl From<CompressionType> for u8 {
    fn from(val: CompressionType) -> Self {
        match val {
            CompressionType::None => 0,

            #[cfg(feature = "miniz")]
            CompressionType::Miniz(_) => 2,

            #[cfg(feature = "lz4")]
            CompressionType::Lz4 => 4,
        }
    }
}

impl TryFrom<u8> for CompressionType {
    type Error = ();

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(Self::None),

            #[cfg(feature = "miniz")]
            2 => Ok(Self::Miniz(DEFAULT_MINIZ_LEVEL)),

            #[cfg(feature = "lz4")]
            4 => Ok(Self::Lz4),

            _ => Err(()),
        }
    }
}

impl CompressionType {
    /// Returns `true` if both types produce the same on-disk format.
    #[must_use]
    pub fn same_format(self, other: Self) -> bool {
        u8::from(self) == u8::from(other)
    }

    /// Compresses a blob.
    ///
    /// # Errors
    ///
    /// Will return `Err` if the codec fails.
    #[allow(clippy::unnecessary_wraps)]
    pub fn compress(self, bytes: &[u8]) -> Result<Vec<u8>, CompressError> {
        match self {
            Self::None => Ok(bytes.into()),

            #[cfg(feature = "lz4")]
            Self::Lz4 => Ok(lz4_flex::compress_prepend_size(bytes)),

            #[cfg(feature = "miniz")]
            Self::Miniz(level) => Ok(miniz_oxide::deflate::compress_to_vec(bytes, level)),
        }
    }

    /// Decompresses a blob.
    ///
    /// # Errors
    ///
    /// Will return `Err` if the input is malformed.
    #[allow(clippy::unnecessary_wraps)]
    pub fn decompress(self, bytes: &[u8]) -> Result<Vec<u8>, DecompressError> {
        match self {
            Self::None => Ok(bytes.into()),

            #[cfg(feature = "lz4")]
            Self::Lz4 => lz4_flex::decompress_size_prepended(bytes)
                .map_err(|e| DecompressError(e.to_string())),

            #[cfg(feature = "miniz")]
            Self::Miniz(_) => miniz_oxide::inflate::decompress_to_vec(bytes)
                .map_err(|e| DecompressError(format!("{e:?}"))),
        }
    }
}

impl Encode for CompressionType {
    fn encode_into<W: Write>(&self, writer: &mut W) -> Result<(), EncodeError> {
        writer.write_u8(u8::from(*self))?;
        Ok(())
    }
}

impl Decode for CompressionType {
    fn decode_from<R: Read>(reader: &mut R) -> Result<Self, DecodeError> {
        let tag = reader.read_u8()?;
        Self::try_from(tag).map_err(|()| DecodeError::InvalidTag(("CompressionType", tag)))
    }
}

impl std::fmt::Display for CompressionType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{}",
            match self {
                Self::None => "no compression",

                #[cfg(feature = "lz4")]
                Self::Lz4 => "lz4",

                #[cfg(feature = "miniz")]
                Self::Miniz(_) => "miniz",
            }
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_log::test;

    #[test]
    fn compression_none_is_identity() -> Result<(), CompressError> {
        let data = b"hello blob".repeat(10);
        let compressed = CompressionType::None.compress(&data)?;
        assert_eq!(compressed, data);
        Ok(())
    }

    #[test]
    fn compression_unknown_tag() {
        let mut bytes: &[u8] = &[200];
        assert!(matches!(
            CompressionType::decode_from(&mut bytes),
            Err(DecodeError::InvalidTag(("CompressionType", 200)))
        ));
    }

    #[test]
    #[cfg(feature = "lz4")]
    #[allow(clippy::unwrap_used)]
    fn compression_lz4_round_trip() {
        let data = b"verycompressable".repeat(100);
        let compressed = CompressionType::Lz4.compress(&data).unwrap();
        assert!(compressed.len() < data.len());
        assert_eq!(data, CompressionType::Lz4.decompress(&compressed).unwrap());
        assert!(CompressionType::Lz4.decompress(b"\xff\xff\xff\x7fgarbage").is_err());
    }

    #[test]
    #[cfg(feature = "miniz")]
    #[allow(clippy::unwrap_used)]
    fn compression_miniz_tag_ignores_level() {
        assert!(CompressionType::Miniz(1).same_format(CompressionType::Miniz(9)));
        assert_eq!(2, u8::from(CompressionType::Miniz(3)));
    }
}
