// Copyright © Aptos Foundation
// SPDX-License-Identifier: Apache-2.0

//! Content-addressed storage primitives.
//!
//! Everything a module is made of is addressed by content: files are hashed into
//! [`Digest`]s, a set of files is described by a [`Manifest`] whose own digest identifies
//! the whole tree, and file contents travel as [`Blob`]s that verify themselves against
//! the digest they claim. [`Bucket`] is the read interface over a file tree, whether it
//! lives on disk, in memory, or behind a one-time remote fetch.

mod blob;
mod bucket;
mod digest;
mod error;
mod manifest;
mod single_flight;

pub use crate::{
    blob::{Blob, BlobSet, FileSet},
    bucket::{Bucket, LocalBucket, MemoryBucket, Object, ObjectInfo, RemoteBucket},
    digest::{Digest, DigestType, SHAKE256_DIGEST_LENGTH},
    error::CasError,
    manifest::{
        compute_file_digest, validate_path, FileNode, Manifest, DEFAULT_FILE_MODE,
        EXECUTABLE_FILE_MODE,
    },
    single_flight::{FetchFn, SingleFlight},
};
