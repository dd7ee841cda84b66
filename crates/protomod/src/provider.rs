// Copyright © Aptos Foundation
// SPDX-License-Identifier: Apache-2.0

use crate::{
    commit::Commit, error::ModuleError, full_name::ModuleRef, module_data::ModuleData,
    module_key::ModuleKey,
};
use async_trait::async_trait;

/// Fetches module content for module keys.
///
/// Results are positionally aligned with the input. The call is all-or-nothing: if any
/// key cannot be found the whole call fails with an error for which
/// [`ModuleError::is_not_found`] holds.
#[async_trait]
pub trait ModuleDataProvider: Send + Sync {
    async fn get_module_datas_for_module_keys(
        &self,
        module_keys: &[ModuleKey],
    ) -> Result<Vec<ModuleData>, ModuleError>;
}

/// Fetches commit metadata for module keys, with the same contract as
/// [`ModuleDataProvider`].
#[async_trait]
pub trait CommitProvider: Send + Sync {
    async fn get_commits_for_module_keys(
        &self,
        module_keys: &[ModuleKey],
    ) -> Result<Vec<Commit>, ModuleError>;
}

/// Resolves module references to module keys, with the same contract as
/// [`ModuleDataProvider`].
#[async_trait]
pub trait ModuleKeyProvider: Send + Sync {
    async fn get_module_keys_for_module_refs(
        &self,
        module_refs: &[ModuleRef],
    ) -> Result<Vec<ModuleKey>, ModuleError>;
}

/// A provider that has nothing. Suitable for workspaces without remote dependencies.
#[derive(Clone, Copy, Debug, Default)]
pub struct NopModuleDataProvider;

#[async_trait]
impl ModuleDataProvider for NopModuleDataProvider {
    async fn get_module_datas_for_module_keys(
        &self,
        module_keys: &[ModuleKey],
    ) -> Result<Vec<ModuleData>, ModuleError> {
        match module_keys.first() {
            Some(module_key) => Err(ModuleError::NotFound(module_key.to_string())),
            None => Ok(vec![]),
        }
    }
}

/// A provider that has nothing.
#[derive(Clone, Copy, Debug, Default)]
pub struct NopCommitProvider;

#[async_trait]
impl CommitProvider for NopCommitProvider {
    async fn get_commits_for_module_keys(
        &self,
        module_keys: &[ModuleKey],
    ) -> Result<Vec<Commit>, ModuleError> {
        match module_keys.first() {
            Some(module_key) => Err(ModuleError::NotFound(module_key.to_string())),
            None => Ok(vec![]),
        }
    }
}

/// Checks that a provider returned exactly one result per requested key.
pub fn check_result_count<T>(
    kind: &str,
    requested: usize,
    results: &[T],
) -> Result<(), ModuleError> {
    if results.len() != requested {
        return Err(ModuleError::System(format!(
            "requested {} {}, got {}",
            requested,
            kind,
            results.len()
        )));
    }
    Ok(())
}
