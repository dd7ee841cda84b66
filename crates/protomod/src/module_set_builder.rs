// Copyright © Aptos Foundation
// SPDX-License-Identifier: Apache-2.0

use crate::{
    added_module::{select_added_module, AddedModule, LocalModuleOptions, RemoteModuleOptions},
    config::ModuleSetBuilderConfig,
    error::ModuleError,
    full_name::ModuleFullName,
    metrics,
    module::{Module, ModuleSource},
    module_data::ModuleData,
    module_digest::{ModuleDigest, ModuleDigestType},
    module_key::ModuleKey,
    module_read_bucket::{FileType, ModuleReadBucket},
    module_set::ModuleSet,
    provider::{check_result_count, CommitProvider, ModuleDataProvider},
};
use petgraph::{algo::tarjan_scc, graph::NodeIndex, Graph};
use protomod_cas::{validate_path, Bucket};
use std::{
    collections::{BTreeMap, BTreeSet, VecDeque},
    sync::Arc,
};
use tracing::{debug, info};

/// Accumulates local and remote modules, then resolves them into a [`ModuleSet`].
///
/// Modules are added in any order. [`ModuleSetBuilder::build`] consumes the builder, so
/// a builder produces at most one module set.
pub struct ModuleSetBuilder {
    config: ModuleSetBuilderConfig,
    module_data_provider: Arc<dyn ModuleDataProvider>,
    commit_provider: Arc<dyn CommitProvider>,
    added_modules: Vec<AddedModule>,
}

impl ModuleSetBuilder {
    pub fn new(
        config: ModuleSetBuilderConfig,
        module_data_provider: Arc<dyn ModuleDataProvider>,
        commit_provider: Arc<dyn CommitProvider>,
    ) -> Self {
        Self {
            config,
            module_data_provider,
            commit_provider,
            added_modules: vec![],
        }
    }

    /// Adds a module read from `bucket`. `bucket_id` describes where the bucket lives and
    /// identifies the module if it has no full name.
    pub fn add_local_module(
        &mut self,
        bucket: impl Into<Bucket>,
        bucket_id: impl Into<String>,
        is_target: bool,
        options: LocalModuleOptions,
    ) -> Result<&mut Self, ModuleError> {
        let bucket_id = bucket_id.into();
        if bucket_id.is_empty() {
            return Err(ModuleError::MalformedInput(
                "local module has an empty bucket ID".to_string(),
            ));
        }
        validate_target_paths(&options.target_paths, &options.target_exclude_paths)?;
        match &options.full_name {
            Some(full_name) => {
                if options.declared_dep_full_names.contains(full_name) {
                    return Err(ModuleError::MalformedInput(format!(
                        "module {} declares a dependency on itself",
                        full_name
                    )));
                }
            },
            None => {
                if options.commit_id.is_some() {
                    return Err(ModuleError::MalformedInput(format!(
                        "module {} has a commit ID but no name",
                        bucket_id
                    )));
                }
            },
        }
        debug!(
            "Adding local module {} (target: {})",
            options
                .full_name
                .as_ref()
                .map(ToString::to_string)
                .unwrap_or_else(|| bucket_id.clone()),
            is_target
        );
        self.added_modules.push(AddedModule::Local {
            bucket: bucket.into(),
            bucket_id,
            is_target,
            options,
        });
        Ok(self)
    }

    /// Adds a module to be fetched from a registry.
    pub fn add_remote_module(
        &mut self,
        module_key: ModuleKey,
        is_target: bool,
        options: RemoteModuleOptions,
    ) -> Result<&mut Self, ModuleError> {
        validate_target_paths(&options.target_paths, &options.target_exclude_paths)?;
        debug!("Adding remote module {} (target: {})", module_key, is_target);
        self.added_modules.push(AddedModule::Remote {
            module_key,
            is_target,
            options,
        });
        Ok(self)
    }

    /// Resolves the added modules into a module set.
    ///
    /// Duplicates by opaque ID are resolved, remote modules are fetched in one batched
    /// provider call and verified against their expected digests, and the dependency
    /// graph is checked for cycles. Any failure aborts the build.
    pub async fn build(self) -> Result<ModuleSet, ModuleError> {
        let result = self.build_module_set().await;
        let outcome = match &result {
            Ok(_) => "success",
            Err(error) => error.get_label(),
        };
        metrics::BUILDS.with_label_values(&[outcome]).inc();
        result
    }

    async fn build_module_set(self) -> Result<ModuleSet, ModuleError> {
        let ModuleSetBuilder {
            config,
            module_data_provider,
            commit_provider,
            added_modules,
        } = self;
        if added_modules.is_empty() {
            debug!("No modules added, building an empty module set");
            return Ok(ModuleSet::new(vec![]));
        }
        let added_count = added_modules.len();

        let mut opaque_id_to_added_modules: BTreeMap<String, Vec<AddedModule>> = BTreeMap::new();
        for added_module in added_modules {
            opaque_id_to_added_modules
                .entry(added_module.opaque_id())
                .or_default()
                .push(added_module);
        }
        // Iterating the map yields the survivors sorted by opaque ID.
        let mut selected = Vec::with_capacity(opaque_id_to_added_modules.len());
        for (_, group) in opaque_id_to_added_modules {
            selected.push(
                select_added_module(group, commit_provider.as_ref(), config.remote_tie_break)
                    .await?,
            );
        }
        validate_declared_deps(&selected)?;

        let modules = materialize(&config, module_data_provider.as_ref(), selected).await?;
        let module_set = ModuleSet::new(modules);
        let deps = resolve_deps(&module_set).await?;
        for (module, module_deps) in module_set.modules().iter().zip(deps) {
            module.bind(Arc::downgrade(module_set.inner()), module_deps)?;
        }
        info!(
            "Built module set of {} modules from {} added modules ({} remote)",
            module_set.len(),
            added_count,
            module_set
                .modules()
                .iter()
                .filter(|module| !module.is_local())
                .count()
        );
        Ok(module_set)
    }
}

fn validate_target_paths(
    target_paths: &[String],
    target_exclude_paths: &[String],
) -> Result<(), ModuleError> {
    for path in target_paths.iter().chain(target_exclude_paths) {
        validate_path(path)?;
    }
    Ok(())
}

/// Every declared dependency of a local module must have survived selection.
fn validate_declared_deps(selected: &[AddedModule]) -> Result<(), ModuleError> {
    let full_names: BTreeSet<&ModuleFullName> =
        selected.iter().filter_map(AddedModule::full_name).collect();
    for added_module in selected {
        if let AddedModule::Local {
            bucket_id, options, ..
        } = added_module
        {
            for dep_full_name in &options.declared_dep_full_names {
                if !full_names.contains(dep_full_name) {
                    return Err(ModuleError::System(format!(
                        "module {} in {} declares dependency {} which was not added to the module set",
                        added_module.opaque_id(),
                        bucket_id,
                        dep_full_name
                    )));
                }
            }
        }
    }
    Ok(())
}

/// Turns the selected modules into modules, fetching all remote ones in a single
/// provider call.
async fn materialize(
    config: &ModuleSetBuilderConfig,
    module_data_provider: &dyn ModuleDataProvider,
    selected: Vec<AddedModule>,
) -> Result<Vec<Module>, ModuleError> {
    let remote_module_keys: Vec<ModuleKey> = selected
        .iter()
        .filter_map(|added_module| match added_module {
            AddedModule::Remote { module_key, .. } => Some(module_key.clone()),
            AddedModule::Local { .. } => None,
        })
        .collect();
    let module_datas = if remote_module_keys.is_empty() {
        vec![]
    } else {
        debug!("Fetching {} remote modules", remote_module_keys.len());
        module_data_provider
            .get_module_datas_for_module_keys(&remote_module_keys)
            .await?
    };
    check_result_count("module datas", remote_module_keys.len(), &module_datas)?;

    let mut module_datas = module_datas.into_iter();
    let mut modules = Vec::with_capacity(selected.len());
    for added_module in selected {
        let module = match added_module {
            AddedModule::Local {
                bucket,
                bucket_id,
                is_target,
                options,
            } => Module::new(
                bucket_id,
                options.full_name,
                options.commit_id,
                is_target,
                ModuleReadBucket::new_with_targeting(
                    bucket,
                    is_target,
                    options.target_paths,
                    options.target_exclude_paths,
                ),
                ModuleSource::Local {
                    declared_dep_full_names: options.declared_dep_full_names,
                },
            ),
            AddedModule::Remote {
                module_key,
                is_target,
                options,
            } => {
                let module_data = module_datas.next().ok_or_else(|| {
                    ModuleError::System(format!("no module data for {}", module_key))
                })?;
                verify_module_data_key(&module_key, &module_data).await?;
                check_not_self_dependent(&module_key, &module_data).await?;
                let module = Module::new(
                    String::new(),
                    Some(module_key.full_name().clone()),
                    Some(module_key.commit_id().to_string()),
                    is_target,
                    ModuleReadBucket::new_with_targeting(
                        Bucket::from(module_data.bucket().clone()),
                        is_target,
                        options.target_paths,
                        options.target_exclude_paths,
                    ),
                    ModuleSource::Remote { module_data },
                );
                if config.verify_remote_digests {
                    verify_module_content(&module_key, &module).await?;
                }
                module
            },
        };
        modules.push(module);
    }
    Ok(modules)
}

/// Checks that the provider returned data for the key that was asked for.
async fn verify_module_data_key(
    module_key: &ModuleKey,
    module_data: &ModuleData,
) -> Result<(), ModuleError> {
    let returned = module_data.module_key();
    if returned.full_name() != module_key.full_name()
        || returned.commit_id() != module_key.commit_id()
    {
        return Err(ModuleError::System(format!(
            "requested {} from module data provider, got {}",
            module_key, returned
        )));
    }
    let expected = module_key.digest().await?;
    let actual = returned.digest().await?;
    expected
        .verify(&actual, format!("module key {}", module_key))
        .inspect_err(|_| {
            metrics::VERIFICATION_FAILURES
                .with_label_values(&["key"])
                .inc();
        })
}

async fn check_not_self_dependent(
    module_key: &ModuleKey,
    module_data: &ModuleData,
) -> Result<(), ModuleError> {
    let declared = module_data.declared_dep_module_keys().await?;
    if declared
        .iter()
        .any(|dep_module_key| dep_module_key.full_name() == module_key.full_name())
    {
        return Err(ModuleError::MalformedInput(format!(
            "module {} declares a dependency on itself",
            module_key
        )));
    }
    Ok(())
}

/// Recomputes the digest of the fetched content and compares it with the expected one.
async fn verify_module_content(module_key: &ModuleKey, module: &Module) -> Result<(), ModuleError> {
    let expected = module_key.digest().await?;
    let actual = match expected.digest_type() {
        ModuleDigestType::B4 => module
            .read_bucket()
            .manifest()
            .await
            .map(|manifest| ModuleDigest::b4(manifest.digest())),
        ModuleDigestType::B5 => module.digest().await,
    }
    .map_err(ModuleError::into_verification_failure)?;
    expected
        .verify(&actual, format!("content of {}", module_key))
        .inspect_err(|_| {
            metrics::VERIFICATION_FAILURES
                .with_label_values(&["content"])
                .inc();
        })
}

/// Computes the dependencies of every module of the set, failing on cycles.
///
/// Edges come from declared dependencies and from imports. The returned dependencies are
/// the transitive closure over import edges only, as `(index, is_direct)` pairs sorted
/// by index.
async fn resolve_deps(module_set: &ModuleSet) -> Result<Vec<Vec<(usize, bool)>>, ModuleError> {
    let modules = module_set.modules();
    let mut import_edges: Vec<BTreeSet<usize>> = vec![BTreeSet::new(); modules.len()];
    let mut declared_edges: Vec<BTreeSet<usize>> = vec![BTreeSet::new(); modules.len()];

    for (index, module) in modules.iter().enumerate() {
        for (path, file_type) in module.read_bucket().file_paths().await? {
            if file_type != FileType::Proto {
                continue;
            }
            for import in module_set.get_imports_for_file_path(&path).await?.iter() {
                match module_set.get_module_for_file_path(import).await {
                    Ok(owner) => {
                        if let Some(owner_index) = module_set.index_for_opaque_id(owner.opaque_id())
                        {
                            if owner_index != index {
                                import_edges[index].insert(owner_index);
                            }
                        }
                    },
                    // Imports outside the set, such as well-known types, are not edges.
                    Err(error) if error.is_not_found() => {
                        debug!("{} imports {} which no module contains", path, import);
                    },
                    Err(error) => return Err(error),
                }
            }
        }

        let declared_full_names: Vec<ModuleFullName> = match module.module_data() {
            Some(module_data) => module_data
                .declared_dep_module_keys()
                .await?
                .iter()
                .map(|module_key| module_key.full_name().clone())
                .collect(),
            None => module.declared_dep_full_names().to_vec(),
        };
        for full_name in declared_full_names {
            if let Some(dep_index) = module_set.index_for_opaque_id(&full_name.to_string()) {
                if dep_index == index {
                    return Err(ModuleError::MalformedInput(format!(
                        "module {} declares a dependency on itself",
                        module.opaque_id()
                    )));
                }
                declared_edges[index].insert(dep_index);
            }
        }
    }

    check_acyclic(modules, &import_edges, &declared_edges)?;

    Ok(import_edges
        .iter()
        .map(|direct| {
            let mut reached = BTreeSet::new();
            let mut queue: VecDeque<usize> = direct.iter().copied().collect();
            while let Some(next) = queue.pop_front() {
                if reached.insert(next) {
                    queue.extend(import_edges[next].iter().copied());
                }
            }
            reached
                .into_iter()
                .map(|dep_index| (dep_index, direct.contains(&dep_index)))
                .collect()
        })
        .collect())
}

fn check_acyclic(
    modules: &[Module],
    import_edges: &[BTreeSet<usize>],
    declared_edges: &[BTreeSet<usize>],
) -> Result<(), ModuleError> {
    let mut graph: Graph<&str, ()> = Graph::new();
    let nodes: Vec<NodeIndex> = modules
        .iter()
        .map(|module| graph.add_node(module.opaque_id()))
        .collect();
    let edges: Vec<BTreeSet<usize>> = import_edges
        .iter()
        .zip(declared_edges)
        .map(|(imports, declared)| imports.union(declared).copied().collect())
        .collect();
    for (from, tos) in edges.iter().enumerate() {
        for to in tos {
            graph.add_edge(nodes[from], nodes[*to], ());
        }
    }

    // Self edges are rejected before this point, so cycles are exactly the strongly
    // connected components with more than one node.
    let cyclic_start = tarjan_scc(&graph)
        .into_iter()
        .filter(|component| component.len() > 1)
        .filter_map(|component| component.into_iter().map(NodeIndex::index).min())
        .min();
    match cyclic_start {
        None => Ok(()),
        Some(start) => {
            let cycle = find_cycle(&edges, start);
            let names: Vec<&str> = cycle
                .iter()
                .map(|index| modules[*index].opaque_id())
                .collect();
            Err(ModuleError::CycleDetected(names.join(" -> ")))
        },
    }
}

/// Finds a path from `start` back to `start`, visiting neighbors in ascending order.
fn find_cycle(edges: &[BTreeSet<usize>], start: usize) -> Vec<usize> {
    let mut visited = BTreeSet::new();
    let mut path = vec![start];
    if find_path_to(edges, start, start, &mut visited, &mut path) {
        path
    } else {
        vec![start]
    }
}

fn find_path_to(
    edges: &[BTreeSet<usize>],
    current: usize,
    target: usize,
    visited: &mut BTreeSet<usize>,
    path: &mut Vec<usize>,
) -> bool {
    for next in &edges[current] {
        if *next == target {
            path.push(target);
            return true;
        }
        if visited.insert(*next) {
            path.push(*next);
            if find_path_to(edges, *next, target, visited, path) {
                return true;
            }
            path.pop();
        }
    }
    false
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_find_cycle() {
        let edges = vec![
            BTreeSet::from([1]),
            BTreeSet::from([2, 3]),
            BTreeSet::from([0]),
            BTreeSet::new(),
        ];
        assert_eq!(find_cycle(&edges, 0), vec![0, 1, 2, 0]);
    }
}
