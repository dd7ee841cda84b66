// Copyright © Aptos Foundation
// SPDX-License-Identifier: Apache-2.0

use crate::{
    error::ModuleError,
    full_name::ModuleFullName,
    module_data::ModuleData,
    module_digest::ModuleDigest,
    module_key::ModuleKey,
    module_read_bucket::ModuleReadBucket,
    module_set::ModuleSetInner,
};
use futures::future::{BoxFuture, FutureExt};
use std::{
    fmt,
    sync::{Arc, OnceLock, Weak},
};
use tokio::sync::OnceCell;

/// Where a module came from.
#[derive(Clone, Debug)]
pub(crate) enum ModuleSource {
    Local {
        declared_dep_full_names: Vec<ModuleFullName>,
    },
    Remote {
        module_data: ModuleData,
    },
}

/// A module within a [`ModuleSet`](crate::ModuleSet). Cloning is cheap.
#[derive(Clone)]
pub struct Module {
    inner: Arc<ModuleInner>,
}

struct ModuleInner {
    opaque_id: String,
    bucket_id: String,
    full_name: Option<ModuleFullName>,
    commit_id: Option<String>,
    is_target: bool,
    read_bucket: ModuleReadBucket,
    source: ModuleSource,
    digest: OnceCell<Result<ModuleDigest, ModuleError>>,
    /// Set once, when the module set is built.
    binding: OnceLock<ModuleBinding>,
}

struct ModuleBinding {
    module_set: Weak<ModuleSetInner>,
    /// Indices into the module set of every dependency, with whether it is direct.
    deps: Vec<(usize, bool)>,
}

/// A dependency of a module.
#[derive(Clone, Debug)]
pub struct ModuleDep {
    module: Module,
    is_direct: bool,
}

impl ModuleDep {
    pub fn module(&self) -> &Module {
        &self.module
    }

    /// True if a file of the depending module imports a file of this module.
    pub fn is_direct(&self) -> bool {
        self.is_direct
    }
}

impl Module {
    pub(crate) fn new(
        bucket_id: String,
        full_name: Option<ModuleFullName>,
        commit_id: Option<String>,
        is_target: bool,
        read_bucket: ModuleReadBucket,
        source: ModuleSource,
    ) -> Self {
        let opaque_id = match &full_name {
            Some(full_name) => full_name.to_string(),
            None => bucket_id.clone(),
        };
        Self {
            inner: Arc::new(ModuleInner {
                opaque_id,
                bucket_id,
                full_name,
                commit_id,
                is_target,
                read_bucket,
                source,
                digest: OnceCell::new(),
                binding: OnceLock::new(),
            }),
        }
    }

    /// Identifies the module within its set: the full name if the module has one, else
    /// the bucket ID.
    pub fn opaque_id(&self) -> &str {
        &self.inner.opaque_id
    }

    /// Describes where the module was read from. Empty for remote modules.
    pub fn bucket_id(&self) -> &str {
        &self.inner.bucket_id
    }

    pub fn full_name(&self) -> Option<&ModuleFullName> {
        self.inner.full_name.as_ref()
    }

    pub fn commit_id(&self) -> Option<&str> {
        self.inner.commit_id.as_deref()
    }

    pub fn is_target(&self) -> bool {
        self.inner.is_target
    }

    pub fn is_local(&self) -> bool {
        matches!(self.inner.source, ModuleSource::Local { .. })
    }

    pub fn read_bucket(&self) -> &ModuleReadBucket {
        &self.inner.read_bucket
    }

    /// Full names of the dependencies declared for a local module. Empty for remote
    /// modules.
    pub fn declared_dep_full_names(&self) -> &[ModuleFullName] {
        match &self.inner.source {
            ModuleSource::Local {
                declared_dep_full_names,
            } => declared_dep_full_names,
            ModuleSource::Remote { .. } => &[],
        }
    }

    pub(crate) fn module_data(&self) -> Option<&ModuleData> {
        match &self.inner.source {
            ModuleSource::Remote { module_data } => Some(module_data),
            ModuleSource::Local { .. } => None,
        }
    }

    /// Every module this module depends on, direct and transitive, sorted by opaque ID.
    ///
    /// Only modules actually reached through imports of this module's files are listed.
    pub fn dep_modules(&self) -> Result<Vec<ModuleDep>, ModuleError> {
        let binding = self.binding()?;
        let module_set = binding.module_set.upgrade().ok_or_else(|| {
            ModuleError::System(format!(
                "module set of {} has been dropped",
                self.opaque_id()
            ))
        })?;
        binding
            .deps
            .iter()
            .map(|(index, is_direct)| {
                module_set
                    .modules
                    .get(*index)
                    .map(|module| ModuleDep {
                        module: module.clone(),
                        is_direct: *is_direct,
                    })
                    .ok_or_else(|| {
                        ModuleError::System(format!("dependency index {} out of range", index))
                    })
            })
            .collect()
    }

    /// The B5 digest of the module, computed on first use.
    ///
    /// Remote modules combine their files with the digests of the dependency keys
    /// recorded at commit time. Local modules combine their files with the digests of
    /// their resolved dependencies.
    pub async fn digest(&self) -> Result<ModuleDigest, ModuleError> {
        self.inner
            .digest
            .get_or_init(|| self.compute_digest())
            .await
            .clone()
    }

    fn compute_digest(&self) -> BoxFuture<'_, Result<ModuleDigest, ModuleError>> {
        async move {
            let file_digest = self.inner.read_bucket.manifest().await?.digest();
            let mut dep_digests = Vec::new();
            match &self.inner.source {
                ModuleSource::Remote { module_data } => {
                    for module_key in module_data.declared_dep_module_keys().await? {
                        dep_digests.push(module_key.digest().await?);
                    }
                },
                ModuleSource::Local { .. } => {
                    for dep in self.dep_modules()? {
                        dep_digests.push(dep.module.digest().await?);
                    }
                },
            }
            ModuleDigest::b5(file_digest, &dep_digests)
        }
        .boxed()
    }

    /// The key of this module. Fails for modules without a full name or commit ID.
    pub async fn to_module_key(&self) -> Result<ModuleKey, ModuleError> {
        let full_name = self.full_name().cloned().ok_or_else(|| {
            ModuleError::MalformedInput(format!("module {} has no name", self.opaque_id()))
        })?;
        let commit_id = self.commit_id().ok_or_else(|| {
            ModuleError::MalformedInput(format!("module {} has no commit", self.opaque_id()))
        })?;
        ModuleKey::new(full_name, commit_id, self.digest().await?)
    }

    pub(crate) fn bind(
        &self,
        module_set: Weak<ModuleSetInner>,
        deps: Vec<(usize, bool)>,
    ) -> Result<(), ModuleError> {
        self.inner
            .binding
            .set(ModuleBinding { module_set, deps })
            .map_err(|_| ModuleError::AlreadyBuilt(self.opaque_id().to_string()))
    }

    fn binding(&self) -> Result<&ModuleBinding, ModuleError> {
        self.inner.binding.get().ok_or_else(|| {
            ModuleError::System(format!(
                "module {} is not part of a module set",
                self.opaque_id()
            ))
        })
    }
}

impl fmt::Debug for Module {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Module")
            .field("opaque_id", &self.inner.opaque_id)
            .field("commit_id", &self.inner.commit_id)
            .field("is_target", &self.inner.is_target)
            .field("is_local", &self.is_local())
            .finish()
    }
}

impl fmt::Display for Module {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.inner.opaque_id)
    }
}
