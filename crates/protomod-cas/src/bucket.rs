// Copyright © Aptos Foundation
// SPDX-License-Identifier: Apache-2.0

use crate::{
    digest::{Digest, DigestType},
    error::CasError,
    manifest::{validate_path, FileNode, Manifest, DEFAULT_FILE_MODE, EXECUTABLE_FILE_MODE},
    single_flight::SingleFlight,
};
use bytes::Bytes;
use std::{
    collections::BTreeMap,
    fmt,
    future::Future,
    path::{Path, PathBuf},
    sync::Arc,
};
use tracing::debug;
use walkdir::WalkDir;

/// Metadata about a single file in a [`Bucket`].
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct ObjectInfo {
    path: String,
    mode: u32,
    /// Set when the file is backed by the local file system.
    local_path: Option<PathBuf>,
}

impl ObjectInfo {
    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn mode(&self) -> u32 {
        self.mode
    }

    pub fn local_path(&self) -> Option<&Path> {
        self.local_path.as_deref()
    }
}

/// A file read from a [`Bucket`].
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Object {
    info: ObjectInfo,
    content: Bytes,
}

impl Object {
    pub fn info(&self) -> &ObjectInfo {
        &self.info
    }

    pub fn content(&self) -> &Bytes {
        &self.content
    }

    pub fn file_node(&self) -> Result<FileNode, CasError> {
        FileNode::new(
            self.info.path.clone(),
            self.info.mode,
            Digest::for_content(DigestType::Shake256, &self.content),
        )
    }
}

/// A read-only file tree.
///
/// The set of backing stores is closed: a directory on disk, an in-memory map, or an
/// in-memory map produced by a remote fetch that runs at most once. Every variant walks
/// its files in lexicographic path order.
#[derive(Clone, Debug)]
pub enum Bucket {
    Local(LocalBucket),
    Memory(MemoryBucket),
    Remote(RemoteBucket),
}

impl Bucket {
    pub async fn get(&self, path: &str) -> Result<Object, CasError> {
        match self {
            Bucket::Local(bucket) => bucket.get(path).await,
            Bucket::Memory(bucket) => bucket.get(path),
            Bucket::Remote(bucket) => bucket.bucket().await?.get(path),
        }
    }

    pub async fn stat(&self, path: &str) -> Result<ObjectInfo, CasError> {
        match self {
            Bucket::Local(bucket) => bucket.stat(path).await,
            Bucket::Memory(bucket) => bucket.stat(path),
            Bucket::Remote(bucket) => bucket.bucket().await?.stat(path),
        }
    }

    /// All file paths, sorted.
    pub async fn paths(&self) -> Result<Vec<String>, CasError> {
        match self {
            Bucket::Local(bucket) => bucket.paths().await,
            Bucket::Memory(bucket) => Ok(bucket.paths()),
            Bucket::Remote(bucket) => Ok(bucket.bucket().await?.paths()),
        }
    }

    /// Calls `f` for every file, in lexicographic path order, stopping at the first error.
    pub async fn walk<E, F>(&self, mut f: F) -> Result<(), E>
    where
        E: From<CasError>,
        F: FnMut(&ObjectInfo) -> Result<(), E>,
    {
        for path in self.paths().await? {
            let info = self.stat(&path).await?;
            f(&info)?;
        }
        Ok(())
    }

    /// Reads every file and builds the manifest describing the tree.
    pub async fn manifest(&self) -> Result<Manifest, CasError> {
        let mut file_nodes = Vec::new();
        for path in self.paths().await? {
            file_nodes.push(self.get(&path).await?.file_node()?);
        }
        Manifest::new(file_nodes)
    }
}

impl From<LocalBucket> for Bucket {
    fn from(bucket: LocalBucket) -> Self {
        Bucket::Local(bucket)
    }
}

impl From<MemoryBucket> for Bucket {
    fn from(bucket: MemoryBucket) -> Self {
        Bucket::Memory(bucket)
    }
}

impl From<RemoteBucket> for Bucket {
    fn from(bucket: RemoteBucket) -> Self {
        Bucket::Remote(bucket)
    }
}

/// A bucket rooted at a directory on the local file system.
#[derive(Clone, Debug)]
pub struct LocalBucket {
    root: PathBuf,
}

impl LocalBucket {
    pub fn new(root: impl Into<PathBuf>) -> Result<Self, CasError> {
        let root = root.into();
        if !root.is_dir() {
            return Err(CasError::NotFound(format!(
                "directory {}",
                root.display()
            )));
        }
        Ok(Self { root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    async fn get(&self, path: &str) -> Result<Object, CasError> {
        let info = self.stat(path).await?;
        let local_path = self.root.join(path);
        let content = tokio::fs::read(&local_path)
            .await
            .map_err(|error| CasError::from_io(path, error))?;
        Ok(Object {
            info,
            content: Bytes::from(content),
        })
    }

    async fn stat(&self, path: &str) -> Result<ObjectInfo, CasError> {
        validate_path(path)?;
        let local_path = self.root.join(path);
        let metadata = tokio::fs::metadata(&local_path)
            .await
            .map_err(|error| CasError::from_io(path, error))?;
        if !metadata.is_file() {
            return Err(CasError::NotFound(path.to_string()));
        }
        Ok(ObjectInfo {
            path: path.to_string(),
            mode: mode_for_metadata(&metadata),
            local_path: Some(local_path),
        })
    }

    async fn paths(&self) -> Result<Vec<String>, CasError> {
        let root = self.root.clone();
        tokio::task::spawn_blocking(move || walk_directory(&root))
            .await
            .map_err(|error| CasError::Io(String::from("walk"), error.to_string()))?
    }
}

fn walk_directory(root: &Path) -> Result<Vec<String>, CasError> {
    let mut paths = Vec::new();
    for entry in WalkDir::new(root).follow_links(false) {
        let entry = entry.map_err(|error| {
            CasError::Io(root.display().to_string(), error.to_string())
        })?;
        if !entry.file_type().is_file() {
            continue;
        }
        let relative = entry.path().strip_prefix(root).map_err(|error| {
            CasError::Io(entry.path().display().to_string(), error.to_string())
        })?;
        let components = relative
            .components()
            .map(|component| {
                component.as_os_str().to_str().ok_or_else(|| {
                    CasError::MalformedInput(format!(
                        "path {} is not valid UTF-8",
                        relative.display()
                    ))
                })
            })
            .collect::<Result<Vec<&str>, CasError>>()?;
        paths.push(components.join("/"));
    }
    // WalkDir orders by directory, not by full path.
    paths.sort();
    debug!("Walked {} files under {}", paths.len(), root.display());
    Ok(paths)
}

#[cfg(unix)]
fn mode_for_metadata(metadata: &std::fs::Metadata) -> u32 {
    use std::os::unix::fs::PermissionsExt;
    if metadata.permissions().mode() & 0o111 != 0 {
        EXECUTABLE_FILE_MODE
    } else {
        DEFAULT_FILE_MODE
    }
}

#[cfg(not(unix))]
fn mode_for_metadata(_metadata: &std::fs::Metadata) -> u32 {
    DEFAULT_FILE_MODE
}

#[derive(Clone, Debug)]
struct MemoryEntry {
    mode: u32,
    content: Bytes,
}

/// A bucket held entirely in memory. Cloning is cheap.
#[derive(Clone, Debug, Default)]
pub struct MemoryBucket {
    entries: Arc<BTreeMap<String, MemoryEntry>>,
}

impl MemoryBucket {
    /// Creates a bucket of regular files.
    pub fn new<P, C>(files: impl IntoIterator<Item = (P, C)>) -> Result<Self, CasError>
    where
        P: Into<String>,
        C: Into<Bytes>,
    {
        Self::with_modes(
            files
                .into_iter()
                .map(|(path, content)| (path.into(), DEFAULT_FILE_MODE, content.into())),
        )
    }

    pub fn with_modes(
        files: impl IntoIterator<Item = (String, u32, Bytes)>,
    ) -> Result<Self, CasError> {
        let mut entries = BTreeMap::new();
        for (path, mode, content) in files {
            validate_path(&path)?;
            if entries
                .insert(path.clone(), MemoryEntry { mode, content })
                .is_some()
            {
                return Err(CasError::MalformedInput(format!(
                    "duplicate path {:?}",
                    path
                )));
            }
        }
        Ok(Self {
            entries: Arc::new(entries),
        })
    }

    pub fn get(&self, path: &str) -> Result<Object, CasError> {
        let entry = self.entry(path)?;
        Ok(Object {
            info: ObjectInfo {
                path: path.to_string(),
                mode: entry.mode,
                local_path: None,
            },
            content: entry.content.clone(),
        })
    }

    pub fn stat(&self, path: &str) -> Result<ObjectInfo, CasError> {
        let entry = self.entry(path)?;
        Ok(ObjectInfo {
            path: path.to_string(),
            mode: entry.mode,
            local_path: None,
        })
    }

    pub fn paths(&self) -> Vec<String> {
        self.entries.keys().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn manifest(&self) -> Result<Manifest, CasError> {
        Manifest::new(
            self.entries
                .iter()
                .map(|(path, entry)| {
                    FileNode::new(
                        path.clone(),
                        entry.mode,
                        Digest::for_content(DigestType::Shake256, &entry.content),
                    )
                })
                .collect::<Result<Vec<_>, _>>()?,
        )
    }

    fn entry(&self, path: &str) -> Result<&MemoryEntry, CasError> {
        self.entries
            .get(path)
            .ok_or_else(|| CasError::NotFound(path.to_string()))
    }
}

/// A bucket whose content is downloaded on first access.
///
/// The download runs at most once per bucket no matter how many files are read or how
/// many tasks read concurrently.
#[derive(Clone)]
pub struct RemoteBucket {
    commit_id: Arc<str>,
    inner: Arc<SingleFlight<MemoryBucket, CasError>>,
}

impl RemoteBucket {
    pub fn new<F, Fut>(commit_id: impl Into<String>, fetch: F) -> Self
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<MemoryBucket, CasError>> + Send + 'static,
    {
        Self {
            commit_id: Arc::from(commit_id.into()),
            inner: Arc::new(SingleFlight::new(fetch)),
        }
    }

    pub fn commit_id(&self) -> &str {
        &self.commit_id
    }

    pub fn is_fetched(&self) -> bool {
        self.inner.is_resolved()
    }

    pub fn fetch_count(&self) -> usize {
        self.inner.fetch_count()
    }

    async fn bucket(&self) -> Result<MemoryBucket, CasError> {
        self.inner.get().await
    }
}

impl fmt::Debug for RemoteBucket {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RemoteBucket")
            .field("commit_id", &self.commit_id)
            .field("fetched", &self.is_fetched())
            .finish()
    }
}
