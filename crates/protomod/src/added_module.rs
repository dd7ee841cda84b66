// Copyright © Aptos Foundation
// SPDX-License-Identifier: Apache-2.0

use crate::{
    config::RemoteTieBreakPolicy,
    error::ModuleError,
    full_name::ModuleFullName,
    metrics,
    module_key::ModuleKey,
    provider::{check_result_count, CommitProvider},
};
use protomod_cas::Bucket;
use std::collections::{BTreeSet, HashSet};
use tracing::debug;

/// Options for a module read from a local bucket.
#[derive(Clone, Debug, Default)]
pub struct LocalModuleOptions {
    pub full_name: Option<ModuleFullName>,
    /// Only meaningful together with a full name
    pub commit_id: Option<String>,
    /// If non-empty, only files at or below these paths are target files
    pub target_paths: Vec<String>,
    /// Files at or below these paths are never target files
    pub target_exclude_paths: Vec<String>,
    /// Every one of these must end up in the module set
    pub declared_dep_full_names: Vec<ModuleFullName>,
}

/// Options for a module fetched from a registry.
#[derive(Clone, Debug, Default)]
pub struct RemoteModuleOptions {
    pub target_paths: Vec<String>,
    pub target_exclude_paths: Vec<String>,
}

/// A module added to a [`ModuleSetBuilder`](crate::ModuleSetBuilder) that has not yet
/// been selected or fetched.
#[derive(Clone, Debug)]
pub(crate) enum AddedModule {
    Local {
        bucket: Bucket,
        bucket_id: String,
        is_target: bool,
        options: LocalModuleOptions,
    },
    Remote {
        module_key: ModuleKey,
        is_target: bool,
        options: RemoteModuleOptions,
    },
}

impl AddedModule {
    pub(crate) fn opaque_id(&self) -> String {
        match self {
            AddedModule::Local {
                bucket_id, options, ..
            } => match &options.full_name {
                Some(full_name) => full_name.to_string(),
                None => bucket_id.clone(),
            },
            AddedModule::Remote { module_key, .. } => module_key.full_name().to_string(),
        }
    }

    pub(crate) fn full_name(&self) -> Option<&ModuleFullName> {
        match self {
            AddedModule::Local { options, .. } => options.full_name.as_ref(),
            AddedModule::Remote { module_key, .. } => Some(module_key.full_name()),
        }
    }

    pub(crate) fn is_target(&self) -> bool {
        match self {
            AddedModule::Local { is_target, .. } | AddedModule::Remote { is_target, .. } => {
                *is_target
            },
        }
    }

    pub(crate) fn is_local(&self) -> bool {
        matches!(self, AddedModule::Local { .. })
    }

    fn remote_module_key(&self) -> Option<&ModuleKey> {
        match self {
            AddedModule::Remote { module_key, .. } => Some(module_key),
            AddedModule::Local { .. } => None,
        }
    }
}

/// Selects the single module to keep among modules sharing an opaque ID.
///
/// Target modules are preferred over non-targets. Among what remains the first local
/// module added wins. If there are only remote modules, duplicates by commit ID are
/// collapsed and the commit provider's create times decide according to `policy`. Ties
/// keep the module added first.
pub(crate) async fn select_added_module(
    mut added_modules: Vec<AddedModule>,
    commit_provider: &dyn CommitProvider,
    policy: RemoteTieBreakPolicy,
) -> Result<AddedModule, ModuleError> {
    if added_modules.len() <= 1 {
        return added_modules.pop().ok_or_else(|| {
            ModuleError::System("cannot select a module from an empty group".to_string())
        });
    }
    let opaque_id = added_modules[0].opaque_id();
    let target_count = added_modules.iter().filter(|m| m.is_target()).count();
    if target_count == 1 {
        debug!("Selected the target module for {}", opaque_id);
        metrics::RESOLUTIONS.with_label_values(&["target"]).inc();
        return added_modules
            .into_iter()
            .find(AddedModule::is_target)
            .ok_or_else(|| {
                ModuleError::System(format!("lost the target module for {}", opaque_id))
            });
    }
    if target_count > 1 {
        added_modules.retain(AddedModule::is_target);
    }

    if let Some(index) = added_modules.iter().position(AddedModule::is_local) {
        debug!("Selected the first local module for {}", opaque_id);
        metrics::RESOLUTIONS.with_label_values(&["local"]).inc();
        return Ok(added_modules.swap_remove(index));
    }
    select_remote_added_module(added_modules, commit_provider, policy).await
}

async fn select_remote_added_module(
    added_modules: Vec<AddedModule>,
    commit_provider: &dyn CommitProvider,
    policy: RemoteTieBreakPolicy,
) -> Result<AddedModule, ModuleError> {
    let full_names: BTreeSet<String> = added_modules
        .iter()
        .map(|added_module| {
            added_module
                .remote_module_key()
                .map(|module_key| module_key.full_name().to_string())
                .ok_or_else(|| {
                    ModuleError::System(format!(
                        "expected only remote modules for {}",
                        added_module.opaque_id()
                    ))
                })
        })
        .collect::<Result<_, _>>()?;
    if full_names.len() > 1 {
        return Err(ModuleError::System(format!(
            "multiple module names share an opaque ID: {}",
            full_names.into_iter().collect::<Vec<_>>().join(", ")
        )));
    }

    // Straight duplicates collapse onto the first one added.
    let mut seen_commit_ids = HashSet::new();
    let mut unique_added_modules: Vec<AddedModule> = added_modules
        .into_iter()
        .filter(|added_module| {
            added_module.remote_module_key().is_some_and(|module_key| {
                seen_commit_ids.insert(module_key.commit_id().to_string())
            })
        })
        .collect();
    if unique_added_modules.len() == 1 {
        metrics::RESOLUTIONS.with_label_values(&["same_commit"]).inc();
        return unique_added_modules.pop().ok_or_else(|| {
            ModuleError::System("lost the deduplicated remote module".to_string())
        });
    }

    let module_keys: Vec<ModuleKey> = unique_added_modules
        .iter()
        .filter_map(|added_module| added_module.remote_module_key().cloned())
        .collect();
    let commits = commit_provider
        .get_commits_for_module_keys(&module_keys)
        .await?;
    check_result_count("commits", module_keys.len(), &commits)?;

    let mut selected_index = 0;
    let mut selected_create_time = None;
    for (index, (commit, module_key)) in commits.iter().zip(&module_keys).enumerate() {
        if commit.module_key().commit_id() != module_key.commit_id() {
            return Err(ModuleError::System(format!(
                "commit provider returned commit {} for requested commit {}",
                commit.module_key().commit_id(),
                module_key.commit_id()
            )));
        }
        let create_time = commit.create_time().await?;
        let is_better = match selected_create_time {
            None => true,
            Some(selected) => match policy {
                RemoteTieBreakPolicy::LatestCreateTime => create_time > selected,
                RemoteTieBreakPolicy::EarliestCreateTime => create_time < selected,
            },
        };
        if is_better {
            selected_index = index;
            selected_create_time = Some(create_time);
        }
    }
    debug!(
        "Selected commit {} of {} among {} commits ({:?})",
        module_keys[selected_index].commit_id(),
        module_keys[selected_index].full_name(),
        module_keys.len(),
        policy
    );
    metrics::RESOLUTIONS.with_label_values(&["create_time"]).inc();
    Ok(unique_added_modules.swap_remove(selected_index))
}
