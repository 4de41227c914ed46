// Copyright (c) 2024-present, fjall-rs
// This source code is licensed under both the Apache 2.0 and MIT License
// (found in the LICENSE-* files in the repository)

use crate::id::BlobFileNumber;
use path_absolutize::Absolutize;
use std::path::{Path, PathBuf};

pub const BLOB_FILE_SUFFIX: &str = "blob";

pub fn absolute_path<P: AsRef<Path>>(path: P) -> PathBuf {
    let path = path.as_ref();

    path.absolutize()
        .map_or_else(|_| path.to_path_buf(), std::borrow::Cow::into_owned)
}

/// Returns the path of a blob file, e.g. `<folder>/000042.blob`.
#[must_use]
pub fn blob_file_path<P: AsRef<Path>>(folder: P, number: BlobFileNumber) -> PathBuf {
    folder
        .as_ref()
        .join(format!("{number:06}.{BLOB_FILE_SUFFIX}"))
}
