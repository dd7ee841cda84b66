// Copyright © Aptos Foundation
// SPDX-License-Identifier: Apache-2.0

use crate::{
    batch::{collect_positional, group_by_registry, record_call},
    client::RegistryClient,
    config::RegistryProviderConfig,
    names::NameResolver,
};
use async_trait::async_trait;
use protomod::{check_result_count, ModuleData, ModuleDataProvider, ModuleError, ModuleKey};
use protomod_cas::{Blob, BlobSet, CasError, Digest, FileSet, Manifest, MemoryBucket};
use std::{collections::BTreeSet, sync::Arc};
use tracing::debug;

/// A [`ModuleDataProvider`] backed by registries.
///
/// Keys are grouped by registry and each group is requested in chunks of at most
/// `max_batch_size` commits. File contents are not downloaded until a module's bucket is
/// first read.
pub struct ApiModuleDataProvider {
    client: Arc<dyn RegistryClient>,
    config: RegistryProviderConfig,
}

impl ApiModuleDataProvider {
    pub fn new(
        client: Arc<dyn RegistryClient>,
        config: RegistryProviderConfig,
    ) -> Result<Self, ModuleError> {
        config.sanitize()?;
        Ok(Self { client, config })
    }
}

#[async_trait]
impl ModuleDataProvider for ApiModuleDataProvider {
    async fn get_module_datas_for_module_keys(
        &self,
        module_keys: &[ModuleKey],
    ) -> Result<Vec<ModuleData>, ModuleError> {
        let mut module_datas: Vec<Option<ModuleData>> = vec![None; module_keys.len()];
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
                record_call("module_data", &registry, chunk.len());
                debug!(
                    "Requesting {} commit nodes from {}",
                    commit_ids.len(),
                    registry
                );
                let nodes = self
                    .client
                    .get_commit_nodes(&registry, &commit_ids, self.config.digest_type)
                    .await?;
                check_result_count("commit nodes", chunk.len(), &nodes)?;
                let commits: Vec<_> = nodes
                    .iter()
                    .flat_map(|node| std::iter::once(&node.commit).chain(&node.dep_commits))
                    .collect();
                names.prefetch(commits).await?;

                for ((index, module_key), node) in chunk.iter().zip(nodes) {
                    if node.commit.id != module_key.commit_id() {
                        return Err(ModuleError::System(format!(
                            "requested commit {} from {}, got {}",
                            module_key.commit_id(),
                            registry,
                            node.commit.id
                        )));
                    }
                    names.warn_if_deprecated(&node.commit)?;
                    let returned_key = names.module_key(&node.commit)?;
                    let dep_module_keys = node
                        .dep_commits
                        .iter()
                        .map(|commit| names.module_key(commit))
                        .collect::<Result<Vec<_>, _>>()?;
                    let client = self.client.clone();
                    let registry = registry.clone();
                    let manifest = node.manifest;
                    let max_batch_size = self.config.max_batch_size;
                    module_datas[*index] = Some(ModuleData::new(
                        returned_key,
                        move || {
                            let client = client.clone();
                            let registry = registry.clone();
                            let manifest = manifest.clone();
                            async move {
                                download_files(client.as_ref(), &registry, manifest, max_batch_size)
                                    .await
                            }
                        },
                        move || {
                            let dep_module_keys = dep_module_keys.clone();
                            async move { Ok(dep_module_keys) }
                        },
                    ));
                }
            }
        }
        collect_positional("module data", module_datas)
    }
}

/// Downloads the blobs of `manifest` in chunks, verifying each one against its digest.
async fn download_files(
    client: &dyn RegistryClient,
    registry: &str,
    manifest: Manifest,
    max_batch_size: usize,
) -> Result<MemoryBucket, CasError> {
    let digests: Vec<Digest> = manifest
        .file_nodes()
        .iter()
        .map(|file_node| file_node.digest().clone())
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect();
    let mut blobs = Vec::with_capacity(digests.len());
    for chunk in digests.chunks(max_batch_size) {
        record_call("blobs", registry, chunk.len());
        let api_blobs = client
            .get_blobs(registry, chunk)
            .await
            .map_err(|error| to_cas_error(registry, error))?;
        check_result_count("blobs", chunk.len(), &api_blobs)
            .map_err(|error| to_cas_error(registry, error))?;
        for (digest, api_blob) in chunk.iter().zip(api_blobs) {
            digest.verify(&api_blob.digest, format!("blob from {}", registry))?;
            blobs.push(Blob::new_verified(api_blob.digest, api_blob.content)?);
        }
    }
    debug!("Downloaded {} blobs from {}", blobs.len(), registry);
    FileSet::new(manifest, BlobSet::new(blobs))?.to_memory_bucket()
}

fn to_cas_error(registry: &str, error: ModuleError) -> CasError {
    match error {
        ModuleError::Cas(error) => error,
        error if error.is_not_found() => CasError::NotFound(error.to_string()),
        error => CasError::Io(registry.to_string(), error.to_string()),
    }
}
