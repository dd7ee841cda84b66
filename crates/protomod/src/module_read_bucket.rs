// Copyright © Aptos Foundation
// SPDX-License-Identifier: Apache-2.0

use crate::error::ModuleError;
use bytes::Bytes;
use protomod_cas::{Bucket, FileNode, Manifest, ObjectInfo};
use std::path::Path;

/// Documentation files recognized at the root of a module, in order of precedence. Only
/// the first one present belongs to the module.
pub const DOC_FILE_PATHS: [&str; 3] = ["buf.md", "README.md", "README.markdown"];
/// The license file recognized at the root of a module.
pub const LICENSE_FILE_PATH: &str = "LICENSE";

const PROTO_FILE_EXTENSION: &str = ".proto";

#[derive(Clone, Copy, Debug, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub enum FileType {
    Proto,
    Doc,
    License,
}

/// Metadata about a file that belongs to a module.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct FileInfo {
    object_info: ObjectInfo,
    file_type: FileType,
    is_target_file: bool,
}

impl FileInfo {
    pub fn path(&self) -> &str {
        self.object_info.path()
    }

    pub fn mode(&self) -> u32 {
        self.object_info.mode()
    }

    pub fn local_path(&self) -> Option<&Path> {
        self.object_info.local_path()
    }

    pub fn file_type(&self) -> FileType {
        self.file_type
    }

    /// True if the module is a target and the file passes the target path filters.
    pub fn is_target_file(&self) -> bool {
        self.is_target_file
    }
}

/// A file of a module along with its content.
#[derive(Clone, Debug)]
pub struct ModuleFile {
    info: FileInfo,
    content: Bytes,
}

impl ModuleFile {
    pub fn info(&self) -> &FileInfo {
        &self.info
    }

    pub fn content(&self) -> &Bytes {
        &self.content
    }
}

/// The view of a bucket that makes up a module: every `.proto` file, at most one
/// documentation file and at most one license file. Anything else in the bucket is
/// ignored.
#[derive(Clone, Debug)]
pub struct ModuleReadBucket {
    bucket: Bucket,
    is_target: bool,
    target_paths: Vec<String>,
    target_exclude_paths: Vec<String>,
}

impl ModuleReadBucket {
    /// A non-target view over `bucket`.
    pub fn new(bucket: Bucket) -> Self {
        Self::new_with_targeting(bucket, false, vec![], vec![])
    }

    pub(crate) fn new_with_targeting(
        bucket: Bucket,
        is_target: bool,
        target_paths: Vec<String>,
        target_exclude_paths: Vec<String>,
    ) -> Self {
        Self {
            bucket,
            is_target,
            target_paths,
            target_exclude_paths,
        }
    }

    /// The paths of all module files with their types, sorted by path.
    pub async fn file_paths(&self) -> Result<Vec<(String, FileType)>, ModuleError> {
        let paths = self.bucket.paths().await?;
        let doc_path: Option<&'static str> = DOC_FILE_PATHS
            .into_iter()
            .find(|doc_path| paths.iter().any(|path| path.as_str() == *doc_path));
        Ok(paths
            .into_iter()
            .filter_map(|path| {
                let file_type = if path.ends_with(PROTO_FILE_EXTENSION) {
                    FileType::Proto
                } else if doc_path == Some(path.as_str()) {
                    FileType::Doc
                } else if path == LICENSE_FILE_PATH {
                    FileType::License
                } else {
                    return None;
                };
                Some((path, file_type))
            })
            .collect())
    }

    pub async fn stat_file_info(&self, path: &str) -> Result<FileInfo, ModuleError> {
        let file_type = self.file_type(path).await?;
        let object_info = self.bucket.stat(path).await?;
        Ok(self.file_info(object_info, file_type))
    }

    pub async fn get_file(&self, path: &str) -> Result<ModuleFile, ModuleError> {
        let file_type = self.file_type(path).await?;
        let object = self.bucket.get(path).await?;
        Ok(ModuleFile {
            info: self.file_info(object.info().clone(), file_type),
            content: object.content().clone(),
        })
    }

    /// Calls `f` for every module file, in path order.
    pub async fn walk_file_infos<F>(&self, mut f: F) -> Result<(), ModuleError>
    where
        F: FnMut(&FileInfo) -> Result<(), ModuleError>,
    {
        for (path, file_type) in self.file_paths().await? {
            let object_info = self.bucket.stat(&path).await?;
            f(&self.file_info(object_info, file_type))?;
        }
        Ok(())
    }

    /// The manifest of the module files.
    pub async fn manifest(&self) -> Result<Manifest, ModuleError> {
        let mut file_nodes: Vec<FileNode> = Vec::new();
        for (path, _) in self.file_paths().await? {
            file_nodes.push(self.bucket.get(&path).await?.file_node()?);
        }
        Ok(Manifest::new(file_nodes)?)
    }

    /// Classifies `path` from its name alone, checking only the doc files that take
    /// precedence over it instead of listing the bucket.
    async fn file_type(&self, path: &str) -> Result<FileType, ModuleError> {
        if path.ends_with(PROTO_FILE_EXTENSION) {
            return Ok(FileType::Proto);
        }
        if path == LICENSE_FILE_PATH {
            return Ok(FileType::License);
        }
        let precedence = DOC_FILE_PATHS
            .iter()
            .position(|doc_path| *doc_path == path)
            .ok_or_else(|| ModuleError::NotFound(path.to_string()))?;
        for doc_path in &DOC_FILE_PATHS[..precedence] {
            match self.bucket.stat(doc_path).await {
                Ok(_) => return Err(ModuleError::NotFound(path.to_string())),
                Err(error) if error.is_not_found() => {},
                Err(error) => return Err(error.into()),
            }
        }
        Ok(FileType::Doc)
    }

    fn file_info(&self, object_info: ObjectInfo, file_type: FileType) -> FileInfo {
        let is_target_file = self.is_target && self.matches_target_paths(object_info.path());
        FileInfo {
            object_info,
            file_type,
            is_target_file,
        }
    }

    fn matches_target_paths(&self, path: &str) -> bool {
        let included = self.target_paths.is_empty()
            || self
                .target_paths
                .iter()
                .any(|target_path| path_has_prefix(path, target_path));
        included
            && !self
                .target_exclude_paths
                .iter()
                .any(|exclude_path| path_has_prefix(path, exclude_path))
    }
}

/// True if `path` equals `prefix` or lies in the directory `prefix`.
fn path_has_prefix(path: &str, prefix: &str) -> bool {
    path == prefix
        || path
            .strip_prefix(prefix)
            .is_some_and(|rest| rest.starts_with('/'))
}

#[cfg(test)]
mod tests {
    use super::*;
    use protomod_cas::{LocalBucket, MemoryBucket};

    fn bucket() -> Bucket {
        Bucket::from(
            MemoryBucket::new(vec![
                ("LICENSE", "MIT"),
                ("README.md", "readme"),
                ("buf.md", "doc"),
                ("buf.yaml", "version: v2"),
                ("foo/a.proto", "a"),
                ("foo/bar/b.proto", "b"),
                ("foobar/c.proto", "c"),
            ])
            .unwrap(),
        )
    }

    #[tokio::test]
    async fn test_module_files() {
        let read_bucket = ModuleReadBucket::new(bucket());
        assert_eq!(read_bucket.file_paths().await.unwrap(), vec![
            ("LICENSE".to_string(), FileType::License),
            ("buf.md".to_string(), FileType::Doc),
            ("foo/a.proto".to_string(), FileType::Proto),
            ("foo/bar/b.proto".to_string(), FileType::Proto),
            ("foobar/c.proto".to_string(), FileType::Proto),
        ]);
        assert!(read_bucket
            .stat_file_info("README.md")
            .await
            .unwrap_err()
            .is_not_found());
        assert!(read_bucket
            .get_file("buf.yaml")
            .await
            .unwrap_err()
            .is_not_found());
        assert_eq!(read_bucket.manifest().await.unwrap().file_nodes().len(), 5);
    }

    #[tokio::test]
    async fn test_doc_file_precedence_on_lookup() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("README.md"), "readme").unwrap();
        std::fs::write(dir.path().join("README.markdown"), "older").unwrap();
        let read_bucket =
            ModuleReadBucket::new(Bucket::from(LocalBucket::new(dir.path()).unwrap()));

        let info = read_bucket.stat_file_info("README.md").await.unwrap();
        assert_eq!(info.file_type(), FileType::Doc);
        assert!(read_bucket
            .get_file("README.markdown")
            .await
            .unwrap_err()
            .is_not_found());
        assert!(read_bucket
            .stat_file_info("buf.md")
            .await
            .unwrap_err()
            .is_not_found());

        // A higher precedence doc file takes over once it appears.
        std::fs::write(dir.path().join("buf.md"), "doc").unwrap();
        assert!(read_bucket
            .stat_file_info("README.md")
            .await
            .unwrap_err()
            .is_not_found());
        assert_eq!(
            read_bucket.get_file("buf.md").await.unwrap().info().file_type(),
            FileType::Doc
        );
    }

    #[tokio::test]
    async fn test_target_paths() {
        let read_bucket = ModuleReadBucket::new_with_targeting(
            bucket(),
            true,
            vec!["foo".to_string()],
            vec!["foo/bar".to_string()],
        );
        let mut targets = Vec::new();
        read_bucket
            .walk_file_infos(|file_info| {
                if file_info.is_target_file() {
                    targets.push(file_info.path().to_string());
                }
                Ok(())
            })
            .await
            .unwrap();
        assert_eq!(targets, vec!["foo/a.proto"]);

        let non_target = ModuleReadBucket::new(bucket());
        assert!(!non_target
            .stat_file_info("foo/a.proto")
            .await
            .unwrap()
            .is_target_file());
    }
}
