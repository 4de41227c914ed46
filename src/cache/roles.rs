// Copyright (c) 2024-present, fjall-rs
// This source code is licensed under both the Apache 2.0 and MIT License
// (found in the LICENSE-* files in the repository)

/// Kind of memory charged to a cache
///
/// Used to tag reservation entries, so their usage can be attributed.
#[derive(Copy, Clone, Debug, Eq, Hash, PartialEq, PartialOrd, Ord)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[repr(u8)]
pub enum CacheEntryRole {
    /// Data block of a table file
    DataBlock,

    /// Filter block of a table file
    FilterBlock,

    /// Top-level index of partitioned filters
    FilterMetaBlock,

    /// Obsolete filter format
    DeprecatedFilterBlock,

    /// Index block of a table file
    IndexBlock,

    /// Any other block
    OtherBlock,

    /// Memtable memory
    WriteBuffer,

    /// Buffered data for building compression dictionaries
    CompressionDictionaryBuildingBuffer,

    /// Memory used while constructing filters
    FilterConstruction,

    /// Table reader objects
    BlockBasedTableReader,

    /// File metadata
    FileMetadata,

    /// Blob value
    BlobValue,

    /// Blob cache usage charged to a block cache
    BlobCache,

    /// Everything else
    Misc,
}

/// Number of cache entry roles
pub const NUM_CACHE_ENTRY_ROLES: usize = CacheEntryRole::Misc as usize + 1;

const CAMEL_NAMES: [&str; NUM_CACHE_ENTRY_ROLES] = [
    "DataBlock",
    "FilterBlock",
    "FilterMetaBlock",
    "DeprecatedFilterBlock",
    "IndexBlock",
    "OtherBlock",
    "WriteBuffer",
    "CompressionDictionaryBuildingBuffer",
    "FilterConstruction",
    "BlockBasedTableReader",
    "FileMetadata",
    "BlobValue",
    "BlobCache",
    "Misc",
];

const HYPHEN_NAMES: [&str; NUM_CACHE_ENTRY_ROLES] = [
    "data-block",
    "filter-block",
    "filter-meta-block",
    "deprecated-filter-block",
    "index-block",
    "other-block",
    "write-buffer",
    "compression-dictionary-building-buffer",
    "filter-construction",
    "block-based-table-reader",
    "file-metadata",
    "blob-value",
    "blob-cache",
    "misc",
];

impl CacheEntryRole {
    /// All roles, in ordinal order.
    pub const ALL: [Self; NUM_CACHE_ENTRY_ROLES] = [
        Self::DataBlock,
        Self::FilterBlock,
        Self::FilterMetaBlock,
        Self::DeprecatedFilterBlock,
        Self::IndexBlock,
        Self::OtherBlock,
        Self::WriteBuffer,
        Self::CompressionDictionaryBuildingBuffer,
        Self::FilterConstruction,
        Self::BlockBasedTableReader,
        Self::FileMetadata,
        Self::BlobValue,
        Self::BlobCache,
        Self::Misc,
    ];

    /// Name in `CamelCase`.
    #[must_use]
    pub fn camel_name(self) -> &'static str {
        // NOTE: Both tables have one entry per variant
        #[allow(clippy::indexing_slicing)]
        CAMEL_NAMES[self as usize]
    }

    /// Name in `hyphen-case`, as used for stats keys.
    #[must_use]
    pub fn hyphen_name(self) -> &'static str {
        #[allow(clippy::indexing_slicing)]
        HYPHEN_NAMES[self as usize]
    }
}

impl From<CacheEntryRole> for u8 {
    fn from(value: CacheEntryRole) -> Self {
        value as Self
    }
}

impl std::fmt::Display for CacheEntryRole {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.camel_name())
    }
}
