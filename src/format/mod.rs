// Copyright (c) 2024-present, fjall-rs
// This source code is licensed under both the Apache 2.0 and MIT License
// (found in the LICENSE-* files in the repository)

//! On-disk format of blob files
//!
//! ```text
//! [header]                         30 bytes
//! [record header][key][value]      repeated
//! [footer]                         32 bytes
//! ```
//!
//! All integers are little endian.

mod footer;
mod header;
mod record;

pub use {
    footer::{BlobLogFooter, FOOTER_SIZE},
    header::{BlobLogHeader, HEADER_SIZE, VERSION_1},
    record::{BlobLogRecord, RecordHeader, RECORD_HEADER_SIZE},
};

/// Magic number shared by blob file headers and footers
pub const MAGIC_NUMBER: u32 = 0x0024_8F37;

/// Expiration range `[min, max]` of the blobs in a file, `(0, 0)` if unused
pub type ExpirationRange = (u64, u64);

const MASK_DELTA: u32 = 0xA282_EAD8;

/// Masks a CRC so that computing the CRC of a string that
/// contains embedded CRCs does not degrade.
#[must_use]
pub fn mask_crc(crc: u32) -> u32 {
    crc.rotate_right(15).wrapping_add(MASK_DELTA)
}

/// Inverse of [`mask_crc`].
#[must_use]
pub fn unmask_crc(masked: u32) -> u32 {
    masked.wrapping_sub(MASK_DELTA).rotate_left(15)
}

pub(crate) fn masked_crc32(parts: &[&[u8]]) -> u32 {
    let mut hasher = crc32fast::Hasher::new();
    for part in parts {
        hasher.update(part);
    }
    mask_crc(hasher.finalize())
}
