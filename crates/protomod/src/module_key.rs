// Copyright © Aptos Foundation
// SPDX-License-Identifier: Apache-2.0

use crate::{error::ModuleError, full_name::ModuleFullName, module_digest::ModuleDigest};
use protomod_cas::SingleFlight;
use std::{fmt, future::Future, sync::Arc};

/// A specific commit of a named module, together with the module's digest at that commit.
///
/// The digest may be supplied up front or fetched on first use. A lazily fetched digest
/// is fetched at most once per key, and clones of a key share the fetch.
#[derive(Clone)]
pub struct ModuleKey {
    full_name: ModuleFullName,
    commit_id: Arc<str>,
    digest: Arc<SingleFlight<ModuleDigest, ModuleError>>,
}

impl ModuleKey {
    pub fn new(
        full_name: ModuleFullName,
        commit_id: impl Into<String>,
        digest: ModuleDigest,
    ) -> Result<Self, ModuleError> {
        Ok(Self {
            full_name,
            commit_id: validate_commit_id(commit_id.into())?,
            digest: Arc::new(SingleFlight::resolved(digest)),
        })
    }

    pub fn new_lazy<F, Fut>(
        full_name: ModuleFullName,
        commit_id: impl Into<String>,
        get_digest: F,
    ) -> Result<Self, ModuleError>
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<ModuleDigest, ModuleError>> + Send + 'static,
    {
        Ok(Self {
            full_name,
            commit_id: validate_commit_id(commit_id.into())?,
            digest: Arc::new(SingleFlight::new(get_digest)),
        })
    }

    pub fn full_name(&self) -> &ModuleFullName {
        &self.full_name
    }

    pub fn commit_id(&self) -> &str {
        &self.commit_id
    }

    pub async fn digest(&self) -> Result<ModuleDigest, ModuleError> {
        self.digest.get().await
    }

    /// Number of times the digest has been fetched. At most one.
    pub fn digest_fetch_count(&self) -> usize {
        self.digest.fetch_count()
    }
}

fn validate_commit_id(commit_id: String) -> Result<Arc<str>, ModuleError> {
    if commit_id.is_empty() {
        return Err(ModuleError::MalformedInput(
            "commit ID is empty".to_string(),
        ));
    }
    Ok(Arc::from(commit_id))
}

impl fmt::Display for ModuleKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.full_name, self.commit_id)
    }
}

impl fmt::Debug for ModuleKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ModuleKey")
            .field("full_name", &self.full_name.to_string())
            .field("commit_id", &self.commit_id)
            .field("digest", &self.digest.peek())
            .finish()
    }
}
