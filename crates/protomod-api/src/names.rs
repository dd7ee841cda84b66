// Copyright © Aptos Foundation
// SPDX-License-Identifier: Apache-2.0

use crate::client::{ApiCommit, ApiModule, RegistryClient};
use itertools::Itertools;
use protomod::{check_result_count, ModuleError, ModuleFullName, ModuleKey};
use std::collections::{BTreeSet, HashMap};
use tracing::warn;

/// Resolves the owner and module IDs of registry commits into module names.
///
/// Lookups are cached for the lifetime of the resolver, which is one provider call. Names
/// can change on the registry, so nothing is kept across calls.
pub(crate) struct NameResolver<'a> {
    client: &'a dyn RegistryClient,
    registry: &'a str,
    max_batch_size: usize,
    module_id_to_module: HashMap<String, ApiModule>,
    owner_id_to_name: HashMap<String, String>,
    warned_module_ids: BTreeSet<String>,
}

impl<'a> NameResolver<'a> {
    pub(crate) fn new(
        client: &'a dyn RegistryClient,
        registry: &'a str,
        max_batch_size: usize,
    ) -> Self {
        Self {
            client,
            registry,
            max_batch_size,
            module_id_to_module: HashMap::new(),
            owner_id_to_name: HashMap::new(),
            warned_module_ids: BTreeSet::new(),
        }
    }

    /// Fetches the modules and owners of `commits` that are not cached yet.
    pub(crate) async fn prefetch<'c>(
        &mut self,
        commits: impl IntoIterator<Item = &'c ApiCommit>,
    ) -> Result<(), ModuleError> {
        let missing_module_ids: Vec<String> = commits
            .into_iter()
            .map(|commit| commit.module_id.clone())
            .filter(|module_id| !self.module_id_to_module.contains_key(module_id))
            .unique()
            .collect();
        for chunk in missing_module_ids.chunks(self.max_batch_size) {
            let modules = self.client.get_modules(self.registry, chunk).await?;
            check_result_count("modules", chunk.len(), &modules)?;
            for module in modules {
                self.module_id_to_module.insert(module.id.clone(), module);
            }
        }

        let missing_owner_ids: Vec<String> = self
            .module_id_to_module
            .values()
            .map(|module| module.owner_id.clone())
            .filter(|owner_id| !self.owner_id_to_name.contains_key(owner_id))
            .unique()
            .sorted()
            .collect();
        for chunk in missing_owner_ids.chunks(self.max_batch_size) {
            let owners = self.client.get_owners(self.registry, chunk).await?;
            check_result_count("owners", chunk.len(), &owners)?;
            for owner in owners {
                self.owner_id_to_name.insert(owner.id, owner.name);
            }
        }
        Ok(())
    }

    /// The full name of the module of a prefetched commit.
    pub(crate) fn full_name(&self, commit: &ApiCommit) -> Result<ModuleFullName, ModuleError> {
        let module = self.module(commit)?;
        let owner_name = self.owner_id_to_name.get(&module.owner_id).ok_or_else(|| {
            ModuleError::System(format!("owner {} was not prefetched", module.owner_id))
        })?;
        ModuleFullName::new(self.registry, owner_name.as_str(), module.name.as_str())
    }

    pub(crate) fn module_key(&self, commit: &ApiCommit) -> Result<ModuleKey, ModuleError> {
        ModuleKey::new(self.full_name(commit)?, commit.id.clone(), commit.digest.clone())
    }

    /// Logs a warning the first time a deprecated module is seen.
    pub(crate) fn warn_if_deprecated(&mut self, commit: &ApiCommit) -> Result<(), ModuleError> {
        if self.module(commit)?.deprecated
            && self.warned_module_ids.insert(commit.module_id.clone())
        {
            warn!("{} is deprecated", self.full_name(commit)?);
        }
        Ok(())
    }

    fn module(&self, commit: &ApiCommit) -> Result<&ApiModule, ModuleError> {
        self.module_id_to_module.get(&commit.module_id).ok_or_else(|| {
            ModuleError::System(format!("module {} was not prefetched", commit.module_id))
        })
    }
}
