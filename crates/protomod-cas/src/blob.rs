// Copyright © Aptos Foundation
// SPDX-License-Identifier: Apache-2.0

use crate::{
    bucket::MemoryBucket,
    digest::{Digest, DigestType},
    error::CasError,
    manifest::Manifest,
};
use bytes::Bytes;
use std::collections::BTreeMap;

/// File content together with the digest of that content.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Blob {
    digest: Digest,
    content: Bytes,
}

impl Blob {
    /// Creates a blob, hashing the content.
    pub fn new(content: impl Into<Bytes>) -> Self {
        let content = content.into();
        Self {
            digest: Digest::for_content(DigestType::Shake256, &content),
            content,
        }
    }

    /// Creates a blob from content received alongside a claimed digest. The content is
    /// rehashed and must match.
    pub fn new_verified(digest: Digest, content: impl Into<Bytes>) -> Result<Self, CasError> {
        let content = content.into();
        let actual = Digest::for_content(digest.digest_type(), &content);
        digest.verify(&actual, "blob")?;
        Ok(Self { digest, content })
    }

    pub fn digest(&self) -> &Digest {
        &self.digest
    }

    pub fn content(&self) -> &Bytes {
        &self.content
    }
}

/// A set of blobs addressed by digest. Identical blobs collapse into one entry.
#[derive(Clone, Debug, Default)]
pub struct BlobSet {
    digest_to_blob: BTreeMap<Digest, Blob>,
}

impl BlobSet {
    pub fn new(blobs: impl IntoIterator<Item = Blob>) -> Self {
        Self {
            digest_to_blob: blobs
                .into_iter()
                .map(|blob| (blob.digest.clone(), blob))
                .collect(),
        }
    }

    pub fn get(&self, digest: &Digest) -> Option<&Blob> {
        self.digest_to_blob.get(digest)
    }

    pub fn len(&self) -> usize {
        self.digest_to_blob.len()
    }

    pub fn is_empty(&self) -> bool {
        self.digest_to_blob.is_empty()
    }
}

/// A manifest paired with the blobs holding the content of every file it lists.
#[derive(Clone, Debug)]
pub struct FileSet {
    manifest: Manifest,
    blob_set: BlobSet,
}

impl FileSet {
    /// Fails with [`CasError::NotFound`] if the blob set lacks content for any manifest
    /// entry.
    pub fn new(manifest: Manifest, blob_set: BlobSet) -> Result<Self, CasError> {
        for file_node in manifest.file_nodes() {
            if blob_set.get(file_node.digest()).is_none() {
                return Err(CasError::NotFound(format!(
                    "blob {} for file {:?}",
                    file_node.digest(),
                    file_node.path()
                )));
            }
        }
        Ok(Self { manifest, blob_set })
    }

    pub fn manifest(&self) -> &Manifest {
        &self.manifest
    }

    pub fn blob_set(&self) -> &BlobSet {
        &self.blob_set
    }

    /// Materializes the file set as an in-memory bucket.
    pub fn to_memory_bucket(&self) -> Result<MemoryBucket, CasError> {
        MemoryBucket::with_modes(self.manifest.file_nodes().iter().filter_map(|file_node| {
            self.blob_set.get(file_node.digest()).map(|blob| {
                (
                    file_node.path().to_string(),
                    file_node.mode(),
                    blob.content().clone(),
                )
            })
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::manifest::{FileNode, DEFAULT_FILE_MODE};
    use claims::assert_ok;

    #[test]
    fn test_tampered_blob_is_rejected() {
        let blob = Blob::new("message Foo {}");
        assert_ok!(Blob::new_verified(blob.digest().clone(), "message Foo {}"));
        let error = Blob::new_verified(blob.digest().clone(), "message Bar {}").unwrap_err();
        assert_eq!(error.get_label(), "digest_mismatch");
    }

    #[tokio::test]
    async fn test_file_set_to_bucket() {
        let a = Blob::new("a");
        let b = Blob::new("b");
        let manifest = Manifest::new(vec![
            FileNode::new("x/a.proto", DEFAULT_FILE_MODE, a.digest().clone()).unwrap(),
            FileNode::new("x/b.proto", DEFAULT_FILE_MODE, b.digest().clone()).unwrap(),
            // Same content under another path shares the blob.
            FileNode::new("y/a.proto", DEFAULT_FILE_MODE, a.digest().clone()).unwrap(),
        ])
        .unwrap();
        let blob_set = BlobSet::new(vec![a.clone(), b, a]);
        assert_eq!(blob_set.len(), 2);

        let file_set = FileSet::new(manifest.clone(), blob_set).unwrap();
        let bucket = file_set.to_memory_bucket().unwrap();
        assert_eq!(bucket.paths(), vec!["x/a.proto", "x/b.proto", "y/a.proto"]);
        assert_eq!(bucket.manifest().unwrap(), manifest);
    }

    #[test]
    fn test_file_set_requires_all_blobs() {
        let a = Blob::new("a");
        let manifest = Manifest::new(vec![
            FileNode::new("a.proto", DEFAULT_FILE_MODE, a.digest().clone()).unwrap(),
        ])
        .unwrap();
        let error = FileSet::new(manifest, BlobSet::default()).unwrap_err();
        assert!(error.is_not_found());
    }
}
