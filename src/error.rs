// Copyright (c) 2024-present, fjall-rs
// This source code is licensed under both the Apache 2.0 and MIT License
// (found in the LICENSE-* files in the repository)

use crate::{
    coding::{DecodeError, EncodeError},
    compression::{CompressError, DecompressError},
};

/// Represents errors that can occur in the blob layer
#[derive(Debug)]
pub enum Error {
    /// I/O error
    Io(std::io::Error),

    /// Data on disk does not match what was expected
    /// (checksum mismatch, key mismatch, malformed header/footer, ...)
    Corruption(&'static str),

    /// Operation is not valid in the current mode
    NotSupported(&'static str),

    /// A wait exceeded the caller-specified deadline
    TimedOut,

    /// Malformed caller input
    InvalidArgument(&'static str),

    /// Insert was refused because the cache is full and has a strict capacity limit
    MemoryLimit,

    /// Serialization failed
    Encode(EncodeError),

    /// Deserialization failed
    Decode(DecodeError),

    /// Compression failed
    Compress(CompressError),

    /// Decompression failed
    Decompress(DecompressError),
}

impl Error {
    /// Returns `true` if the error signals corrupted data.
    #[must_use]
    pub fn is_corruption(&self) -> bool {
        matches!(self, Self::Corruption(_) | Self::Decode(_))
    }

    /// Creates an equal error, keeping the variant.
    ///
    /// I/O errors keep their kind and message, but lose their inner source.
    pub(crate) fn duplicate(&self) -> Self {
        match self {
            Self::Io(e) => Self::Io(duplicate_io_error(e)),
            Self::Corruption(msg) => Self::Corruption(msg),
            Self::NotSupported(msg) => Self::NotSupported(msg),
            Self::TimedOut => Self::TimedOut,
            Self::InvalidArgument(msg) => Self::InvalidArgument(msg),
            Self::MemoryLimit => Self::MemoryLimit,
            Self::Encode(EncodeError::Io(e)) => {
                Self::Encode(EncodeError::Io(duplicate_io_error(e)))
            }
            Self::Decode(e) => Self::Decode(match e {
                DecodeError::Io(e) => DecodeError::Io(duplicate_io_error(e)),
                DecodeError::InvalidTag(tag) => DecodeError::InvalidTag(*tag),
                DecodeError::InvalidMagic(msg) => DecodeError::InvalidMagic(msg),
                DecodeError::InvalidVersion(version) => DecodeError::InvalidVersion(*version),
                DecodeError::ChecksumMismatch(msg) => DecodeError::ChecksumMismatch(msg),
                DecodeError::InvalidSize(msg) => DecodeError::InvalidSize(msg),
            }),
            Self::Compress(e) => Self::Compress(CompressError(e.0.clone())),
            Self::Decompress(e) => Self::Decompress(DecompressError(e.0.clone())),
        }
    }
}

fn duplicate_io_error(e: &std::io::Error) -> std::io::Error {
    std::io::Error::new(e.kind(), e.to_string())
}

impl std::fmt::Display for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Io(e) => write!(f, "BlobError: IO error: {e}"),
            Self::Corruption(msg) => write!(f, "BlobError: Corruption: {msg}"),
            Self::NotSupported(msg) => write!(f, "BlobError: Not supported: {msg}"),
            Self::TimedOut => write!(f, "BlobError: Timed out"),
            Self::InvalidArgument(msg) => write!(f, "BlobError: Invalid argument: {msg}"),
            Self::MemoryLimit => write!(f, "BlobError: Insert failed due to cache being full"),
            e => write!(f, "BlobError: {e:?}"),
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Io(e) => Some(e),
            _ => None,
        }
    }
}

impl From<std::io::Error> for Error {
    fn from(value: std::io::Error) -> Self {
        Self::Io(value)
    }
}

impl From<EncodeError> for Error {
    fn from(value: EncodeError) -> Self {
        Self::Encode(value)
    }
}

impl From<DecodeError> for Error {
    fn from(value: DecodeError) -> Self {
        match value {
            DecodeError::Io(e) if e.kind() != std::io::ErrorKind::UnexpectedEof => Self::Io(e),
            e => Self::Decode(e),
        }
    }
}

impl From<CompressError> for Error {
    fn from(value: CompressError) -> Self {
        Self::Compress(value)
    }
}

impl From<DecompressError> for Error {
    fn from(value: DecompressError) -> Self {
        Self::Decompress(value)
    }
}

/// Blob layer result
pub type Result<T> = std::result::Result<T, Error>;
