// Copyright (c) 2024-present, fjall-rs
// This source code is licensed under both the Apache 2.0 and MIT License
// (found in the LICENSE-* files in the repository)

//! Blob files: writing, random access and sequential reading

pub mod builder;
pub mod prefetch;
pub mod read_request;
pub mod reader;
pub mod sequential;
pub mod writer;
