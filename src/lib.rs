// Copyright (c) 2024-present, fjall-rs
// This source code is licensed under both the Apache 2.0 and MIT License
// (found in the LICENSE-* files in the repository)

//! Blob storage layer for key-value separated LSM storage.
//!
//! Large values are moved out of the LSM tree into append-only blob files.
//! The tree only keeps a small [`BlobIndex`] that points at the value:
//!
//! [header][record][record][record]...[footer]
//!
//! Each record carries its key, so a read can verify that the blob it found
//! actually belongs to the key that pointed at it, and two checksums
//! (one over the record header, one over key and value).
//!
//! Blob files are written by a [`BlobLogWriter`] (or a [`BlobFileBuilder`]
//! that rolls over to new files on its own) and read by a [`BlobFileReader`].
//! Open readers are kept in a [`BlobFileCache`], recently read values may be
//! kept in a blob cache; [`BlobSource`] ties both together.
//!
//! All caches implement the [`Cache`] trait. Memory used outside of a cache
//! can be charged against it with a [`CacheReservationManager`], which
//! inserts dummy entries so that the cache capacity acts as a global memory
//! budget. [`ChargedCache`] uses this to account a blob cache against a
//! shared block cache.

#![forbid(unsafe_code)]
#![deny(clippy::all, missing_docs)]
#![deny(clippy::unwrap_used, clippy::indexing_slicing)]
#![warn(clippy::pedantic, clippy::nursery, clippy::cargo)]
#![warn(clippy::expect_used)]
#![allow(clippy::missing_const_for_fn)]

mod blob_file;
mod blob_file_cache;
mod blob_source;
mod coding;
mod compression;
mod config;
mod error;
mod id;
mod index;
mod mock;
mod path;
mod slice;

pub mod cache;
pub mod file;
pub mod format;

pub use {
    blob_file::{
        builder::{BlobFileAddition, BlobFileBuilder},
        prefetch::FilePrefetchBuffer,
        read_request::BlobReadRequest,
        reader::BlobFileReader,
        sequential::{FileCursor, SequentialReader},
        writer::{BlobLogWriter, ElemType},
    },
    blob_file_cache::BlobFileCache,
    blob_source::BlobSource,
    cache::{
        Cache, CacheEntryRole, CacheHandleGuard, CacheReservationHandle, CacheReservationManager,
        ChargedCache, ConcurrentCacheReservationManager, LruCache,
    },
    coding::{Decode, DecodeError, Encode, EncodeError},
    compression::{CompressError, CompressionType, DecompressError},
    config::{Config, ReadOptions},
    error::{Error, Result},
    id::{BlobFileNumber, IdGenerator, INVALID_BLOB_FILE_NUMBER},
    index::BlobIndex,
    path::blob_file_path,
    slice::Slice,
};

#[doc(hidden)]
pub use mock::MockFileSystem;
