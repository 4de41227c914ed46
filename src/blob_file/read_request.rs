// Copyright (c) 2024-present, fjall-rs
// This source code is licensed under both the Apache 2.0 and MIT License
// (found in the LICENSE-* files in the repository)

use crate::{CompressionType, Slice};

/// One read of a batched blob lookup
///
/// The result slot is filled in by the reader.
#[derive(Debug)]
pub struct BlobReadRequest {
    /// Key the blob was written with
    pub user_key: Slice,

    /// Offset of the value in the blob file
    pub offset: u64,

    /// Size of the value as stored
    pub len: u64,

    /// Compression the value was written with
    pub compression: CompressionType,

    /// Outcome of the read, `None` until the request was served
    pub result: Option<crate::Result<Slice>>,
}

impl BlobReadRequest {
    /// Creates a pending request.
    pub fn new<K: Into<Slice>>(
        user_key: K,
        offset: u64,
        len: u64,
        compression: CompressionType,
    ) -> Self {
        Self {
            user_key: user_key.into(),
            offset,
            len,
            compression,
            result: None,
        }
    }

    /// Takes the result out of the request.
    pub fn take_result(&mut self) -> Option<crate::Result<Slice>> {
        self.result.take()
    }
}
