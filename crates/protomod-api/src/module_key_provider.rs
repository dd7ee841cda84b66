// Copyright © Aptos Foundation
// SPDX-License-Identifier: Apache-2.0

use crate::{
    batch::{collect_positional, group_by_registry, record_call},
    client::RegistryClient,
    config::RegistryProviderConfig,
    names::NameResolver,
};
use async_trait::async_trait;
use protomod::{check_result_count, ModuleError, ModuleKey, ModuleKeyProvider, ModuleRef};
use std::sync::Arc;

/// A [`ModuleKeyProvider`] backed by registries.
pub struct ApiModuleKeyProvider {
    client: Arc<dyn RegistryClient>,
    config: RegistryProviderConfig,
}

impl ApiModuleKeyProvider {
    pub fn new(
        client: Arc<dyn RegistryClient>,
        config: RegistryProviderConfig,
    ) -> Result<Self, ModuleError> {
        config.sanitize()?;
        Ok(Self { client, config })
    }
}

#[async_trait]
impl ModuleKeyProvider for ApiModuleKeyProvider {
    async fn get_module_keys_for_module_refs(
        &self,
        module_refs: &[ModuleRef],
    ) -> Result<Vec<ModuleKey>, ModuleError> {
        let mut module_keys: Vec<Option<ModuleKey>> = vec![None; module_refs.len()];
        let registry_to_refs =
            group_by_registry(module_refs, |module_ref| module_ref.full_name().registry());
        for (registry, indexed_refs) in registry_to_refs {
            let mut names =
                NameResolver::new(self.client.as_ref(), &registry, self.config.max_batch_size);
            for chunk in indexed_refs.chunks(self.config.max_batch_size) {
                let refs: Vec<ModuleRef> = chunk
                    .iter()
                    .map(|(_, module_ref)| (*module_ref).clone())
                    .collect();
                record_call("module_key", &registry, chunk.len());
                let api_commits = self.client.resolve_commits(&registry, &refs).await?;
                check_result_count("commits", chunk.len(), &api_commits)?;
                names.prefetch(&api_commits).await?;
                for ((index, module_ref), api_commit) in chunk.iter().zip(&api_commits) {
                    names.warn_if_deprecated(api_commit)?;
                    let module_key = names.module_key(api_commit)?;
                    if module_key.full_name() != module_ref.full_name() {
                        return Err(ModuleError::System(format!(
                            "resolved {} to a commit of {}",
                            module_ref,
                            module_key.full_name()
                        )));
                    }
                    module_keys[*index] = Some(module_key);
                }
            }
        }
        collect_positional("module key", module_keys)
    }
}
