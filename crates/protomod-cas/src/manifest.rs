// Copyright © Aptos Foundation
// SPDX-License-Identifier: Apache-2.0

use crate::{
    digest::{Digest, DigestType},
    error::CasError,
};
use std::{collections::BTreeMap, fmt::Write};

/// Mode recorded for regular files.
pub const DEFAULT_FILE_MODE: u32 = 0o644;
/// Mode recorded for files with any executable bit set.
pub const EXECUTABLE_FILE_MODE: u32 = 0o755;

/// A single entry of a [`Manifest`]: where a file lives, its mode, and the digest of its
/// content.
#[derive(Clone, Debug, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub struct FileNode {
    path: String,
    mode: u32,
    digest: Digest,
}

impl FileNode {
    pub fn new(path: impl Into<String>, mode: u32, digest: Digest) -> Result<Self, CasError> {
        let path = path.into();
        validate_path(&path)?;
        if mode != DEFAULT_FILE_MODE && mode != EXECUTABLE_FILE_MODE {
            return Err(CasError::MalformedInput(format!(
                "unsupported mode {:o} for {:?}",
                mode, path
            )));
        }
        Ok(Self { path, mode, digest })
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn mode(&self) -> u32 {
        self.mode
    }

    pub fn digest(&self) -> &Digest {
        &self.digest
    }
}

/// Checks that `path` is a normalized, relative, `/`-separated path.
pub fn validate_path(path: &str) -> Result<(), CasError> {
    let malformed = |reason: &str| {
        Err(CasError::MalformedInput(format!(
            "path {:?} {}",
            path, reason
        )))
    };
    if path.is_empty() {
        return malformed("is empty");
    }
    if path.starts_with('/') {
        return malformed("is absolute");
    }
    if path.contains('\\') {
        return malformed("contains a backslash");
    }
    // Manifest lines are newline delimited.
    if path.chars().any(char::is_control) {
        return malformed("contains a control character");
    }
    if path.ends_with('/') {
        return malformed("has a trailing separator");
    }
    for component in path.split('/') {
        match component {
            "" => return malformed("contains an empty component"),
            "." => return malformed("is not normalized"),
            ".." => return malformed("escapes its root"),
            _ => {},
        }
    }
    Ok(())
}

/// The canonical description of a file tree.
///
/// File nodes are kept sorted by path, which makes the encoded manifest, and therefore
/// its digest, independent of the order in which files were supplied.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct Manifest {
    file_nodes: Vec<FileNode>,
}

impl Manifest {
    pub fn new(file_nodes: impl IntoIterator<Item = FileNode>) -> Result<Self, CasError> {
        let mut path_to_file_node = BTreeMap::new();
        for file_node in file_nodes {
            // Paths were validated when the node was created.
            if let Some(existing) = path_to_file_node.insert(file_node.path.clone(), file_node) {
                return Err(CasError::MalformedInput(format!(
                    "duplicate path {:?} in manifest",
                    existing.path
                )));
            }
        }
        Ok(Self {
            file_nodes: path_to_file_node.into_values().collect(),
        })
    }

    pub fn file_nodes(&self) -> &[FileNode] {
        &self.file_nodes
    }

    pub fn get_file_node(&self, path: &str) -> Option<&FileNode> {
        self.file_nodes
            .binary_search_by(|file_node| file_node.path.as_str().cmp(path))
            .ok()
            .map(|index| &self.file_nodes[index])
    }

    pub fn is_empty(&self) -> bool {
        self.file_nodes.is_empty()
    }

    /// Encodes the manifest as one `<digest>  <mode>  <path>` line per file.
    pub fn encode(&self) -> String {
        let mut encoded = String::new();
        for file_node in &self.file_nodes {
            // Writing into a String cannot fail.
            let _ = writeln!(
                encoded,
                "{}  {:04o}  {}",
                file_node.digest, file_node.mode, file_node.path
            );
        }
        encoded
    }

    pub fn digest(&self) -> Digest {
        Digest::for_content(DigestType::Shake256, self.encode().as_bytes())
    }
}

/// Computes the digest of the manifest for `file_nodes`.
///
/// Fails if paths are duplicated.
pub fn compute_file_digest(
    file_nodes: impl IntoIterator<Item = FileNode>,
) -> Result<Digest, CasError> {
    Ok(Manifest::new(file_nodes)?.digest())
}

#[cfg(test)]
mod tests {
    use super::*;
    use claims::{assert_err, assert_ok};
    use proptest::prelude::*;

    fn file_node(path: &str, content: &str) -> FileNode {
        FileNode::new(
            path,
            DEFAULT_FILE_MODE,
            Digest::for_content(DigestType::Shake256, content.as_bytes()),
        )
        .unwrap()
    }

    #[test]
    fn test_validate_path() {
        assert_ok!(validate_path("a.proto"));
        assert_ok!(validate_path("foo/bar/a.proto"));
        assert_ok!(validate_path(".hidden/a.proto"));
        for bad in [
            "",
            "/abs.proto",
            "a/../b.proto",
            "../a.proto",
            "./a.proto",
            "a//b.proto",
            "a/",
            "a\\b.proto",
            "a.proto\nb.proto",
            "a.proto\r",
            "a\tb.proto",
        ] {
            assert_err!(validate_path(bad), "{:?} should be rejected", bad);
        }
    }

    #[test]
    fn test_path_cannot_forge_manifest_lines() {
        let b = Digest::for_content(DigestType::Shake256, b"b");
        let forged = format!("a.proto\n{}  0644  b.proto", b);
        let error = FileNode::new(forged, DEFAULT_FILE_MODE, b).unwrap_err();
        assert!(matches!(error, CasError::MalformedInput(_)));
    }

    #[test]
    fn test_manifest_rejects_duplicates() {
        let result = Manifest::new(vec![file_node("a.proto", "1"), file_node("a.proto", "2")]);
        assert!(matches!(result, Err(CasError::MalformedInput(_))));
    }

    #[test]
    fn test_mode_changes_digest() {
        let content = Digest::for_content(DigestType::Shake256, b"x");
        let regular = FileNode::new("run.sh", DEFAULT_FILE_MODE, content.clone()).unwrap();
        let executable = FileNode::new("run.sh", EXECUTABLE_FILE_MODE, content.clone()).unwrap();
        assert_ne!(
            compute_file_digest([regular]).unwrap(),
            compute_file_digest([executable]).unwrap()
        );
        assert_err!(FileNode::new("run.sh", 0o600, content));
    }

    #[test]
    fn test_encode_and_lookup() {
        let manifest = Manifest::new(vec![file_node("b.proto", "b"), file_node("a.proto", "a")])
            .unwrap();
        let encoded = manifest.encode();
        let lines: Vec<&str> = encoded.lines().collect();
        assert_eq!(lines.len(), 2);
        assert!(lines[0].ends_with("  0644  a.proto"));
        assert!(lines[1].ends_with("  0644  b.proto"));
        assert_eq!(manifest.get_file_node("b.proto").unwrap().path(), "b.proto");
        assert!(manifest.get_file_node("c.proto").is_none());
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(64))]

        #[test]
        fn test_file_digest_ignores_input_order(
            files in proptest::collection::btree_map("[a-z]{1,6}(/[a-z]{1,6}){0,2}\\.proto", ".{0,12}", 1..10),
            rotation in any::<usize>(),
        ) {
            let canonical: Vec<FileNode> = files.iter().map(|(p, c)| file_node(p, c)).collect();
            let mut permuted = canonical.clone();
            let len = permuted.len();
            permuted.rotate_left(rotation % len);
            permuted.reverse();
            prop_assert_eq!(
                compute_file_digest(canonical).unwrap(),
                compute_file_digest(permuted).unwrap()
            );
        }
    }
}
