// Copyright © Aptos Foundation
// SPDX-License-Identifier: Apache-2.0

use async_trait::async_trait;
use bytes::Bytes;
use chrono::{DateTime, Utc};
use protomod::{ModuleDigest, ModuleDigestType, ModuleError, ModuleRef};
use protomod_cas::{Digest, Manifest};

/// A commit as stored by a registry. Owners and modules are referenced by ID.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct ApiCommit {
    pub id: String,
    pub owner_id: String,
    pub module_id: String,
    pub create_time: DateTime<Utc>,
    pub digest: ModuleDigest,
}

/// A commit with the manifest of its files and every commit it depends on.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct ApiCommitNode {
    pub commit: ApiCommit,
    pub manifest: Manifest,
    pub dep_commits: Vec<ApiCommit>,
}

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct ApiModule {
    pub id: String,
    pub owner_id: String,
    pub name: String,
    pub deprecated: bool,
}

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct ApiOwner {
    pub id: String,
    pub name: String,
}

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct ApiBlob {
    pub digest: Digest,
    pub content: Bytes,
}

/// The registry RPC surface the providers need.
///
/// Every method is batched: results are positionally aligned with the request, and a
/// request containing anything unknown fails as a whole with an error for which
/// [`ModuleError::is_not_found`] holds.
#[async_trait]
pub trait RegistryClient: Send + Sync {
    async fn get_commits(
        &self,
        registry: &str,
        commit_ids: &[String],
    ) -> Result<Vec<ApiCommit>, ModuleError>;

    async fn resolve_commits(
        &self,
        registry: &str,
        module_refs: &[ModuleRef],
    ) -> Result<Vec<ApiCommit>, ModuleError>;

    async fn get_commit_nodes(
        &self,
        registry: &str,
        commit_ids: &[String],
        digest_type: ModuleDigestType,
    ) -> Result<Vec<ApiCommitNode>, ModuleError>;

    async fn get_blobs(
        &self,
        registry: &str,
        digests: &[Digest],
    ) -> Result<Vec<ApiBlob>, ModuleError>;

    async fn get_modules(
        &self,
        registry: &str,
        module_ids: &[String],
    ) -> Result<Vec<ApiModule>, ModuleError>;

    async fn get_owners(
        &self,
        registry: &str,
        owner_ids: &[String],
    ) -> Result<Vec<ApiOwner>, ModuleError>;
}
