// Copyright © Aptos Foundation
// SPDX-License-Identifier: Apache-2.0

use crate::{
    batch::{collect_positional, group_by_registry, record_call},
    client::RegistryClient,
    config::RegistryProviderConfig,
    names::NameResolver,
};
use async_trait::async_trait;
use protomod::{check_result_count, Commit, CommitProvider, ModuleError, ModuleKey};
use std::sync::Arc;

/// A [`CommitProvider`] backed by registries.
pub struct ApiCommitProvider {
    client: Arc<dyn RegistryClient>,
    config: RegistryProviderConfig,
}

impl ApiCommitProvider {
    pub fn new(
        client: Arc<dyn RegistryClient>,
        config: RegistryProviderConfig,
    ) -> Result<Self, ModuleError> {
        config.sanitize()?;
        Ok(Self { client, config })
    }
}

#[async_trait]
impl CommitProvider for ApiCommitProvider {
    async fn get_commits_for_module_keys(
        &self,
        module_keys: &[ModuleKey],
    ) -> Result<Vec<Commit>, ModuleError> {
        let mut commits: Vec<Option<Commit>> = vec![None; module_keys.len()];
        let registry_to_keys =
            group_by_registry(module_keys, |module_key| module_key.full_name().registry());
        for (registry, indexed_keys) in registry_to_keys {
            let mut names =
                NameResolver::new(self.client.as_ref(), &registry, self.config.max_batch_size);
            for chunk in indexed_keys.chunks(self.config.max_batch_size) {
                let commit_ids: Vec<String> = chunk
                    .iter()
                    .map(|(_, module_key)| module_key.commit_id().to_string())
                    .collect();
                record_call("commit", &registry, chunk.len());
                let api_commits = self.client.get_commits(&registry, &commit_ids).await?;
                check_result_count("commits", chunk.len(), &api_commits)?;
                names.prefetch(&api_commits).await?;
                for ((index, module_key), api_commit) in chunk.iter().zip(&api_commits) {
                    if api_commit.id != module_key.commit_id() {
                        return Err(ModuleError::System(format!(
                            "requested commit {} from {}, got {}",
                            module_key.commit_id(),
                            registry,
                            api_commit.id
                        )));
                    }
                    commits[*index] = Some(Commit::new(
                        names.module_key(api_commit)?,
                        api_commit.create_time,
                    ));
                }
            }
        }
        collect_positional("commit", commits)
    }
}
