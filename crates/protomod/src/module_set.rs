// Copyright © Aptos Foundation
// SPDX-License-Identifier: Apache-2.0

use crate::{cache::Cache, error::ModuleError, full_name::ModuleFullName, module::Module};
use std::{
    collections::{BTreeMap, BTreeSet},
    fmt,
    sync::Arc,
};

/// An immutable, acyclic set of modules with unique opaque IDs, sorted by opaque ID.
///
/// Produced by [`ModuleSetBuilder::build`](crate::ModuleSetBuilder::build). Cloning is
/// cheap and clones share the per-path cache.
#[derive(Clone)]
pub struct ModuleSet {
    inner: Arc<ModuleSetInner>,
}

pub(crate) struct ModuleSetInner {
    pub(crate) modules: Vec<Module>,
    opaque_id_to_index: BTreeMap<String, usize>,
    cache: Cache,
}

impl ModuleSet {
    /// Creates a set over modules already sorted by unique opaque ID.
    pub(crate) fn new(modules: Vec<Module>) -> Self {
        let opaque_id_to_index = modules
            .iter()
            .enumerate()
            .map(|(index, module)| (module.opaque_id().to_string(), index))
            .collect();
        Self {
            inner: Arc::new(ModuleSetInner {
                modules,
                opaque_id_to_index,
                cache: Cache::default(),
            }),
        }
    }

    pub(crate) fn inner(&self) -> &Arc<ModuleSetInner> {
        &self.inner
    }

    pub fn modules(&self) -> &[Module] {
        &self.inner.modules
    }

    pub fn len(&self) -> usize {
        self.inner.modules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.modules.is_empty()
    }

    pub fn target_modules(&self) -> Vec<Module> {
        self.inner
            .modules
            .iter()
            .filter(|module| module.is_target())
            .cloned()
            .collect()
    }

    pub fn non_target_modules(&self) -> Vec<Module> {
        self.inner
            .modules
            .iter()
            .filter(|module| !module.is_target())
            .cloned()
            .collect()
    }

    pub fn get_module_for_opaque_id(&self, opaque_id: &str) -> Option<Module> {
        self.index_for_opaque_id(opaque_id)
            .map(|index| self.inner.modules[index].clone())
    }

    pub fn get_module_for_full_name(&self, full_name: &ModuleFullName) -> Option<Module> {
        self.get_module_for_opaque_id(&full_name.to_string())
    }

    pub fn get_module_for_commit_id(&self, commit_id: &str) -> Option<Module> {
        self.inner
            .modules
            .iter()
            .find(|module| module.commit_id() == Some(commit_id))
            .cloned()
    }

    pub(crate) fn index_for_opaque_id(&self, opaque_id: &str) -> Option<usize> {
        self.inner.opaque_id_to_index.get(opaque_id).copied()
    }

    /// The single module containing `path`.
    ///
    /// Fails with [`ModuleError::NotFound`] if no module contains the path and with
    /// [`ModuleError::Conflict`] if several do.
    pub async fn get_module_for_file_path(&self, path: &str) -> Result<Module, ModuleError> {
        self.inner
            .cache
            .get_module_for_file_path(&self.inner.modules, path)
            .await
    }

    /// The paths imported by the proto file at `path`, sorted.
    pub async fn get_imports_for_file_path(
        &self,
        path: &str,
    ) -> Result<Arc<BTreeSet<String>>, ModuleError> {
        self.inner
            .cache
            .get_imports_for_file_path(&self.inner.modules, path)
            .await
    }

    /// How many owning-module lookups were computed rather than served from the cache.
    pub fn module_for_file_path_computations(&self) -> usize {
        self.inner.cache.module_computations()
    }

    /// How many import scans were computed rather than served from the cache.
    pub fn imports_for_file_path_computations(&self) -> usize {
        self.inner.cache.import_computations()
    }
}

impl fmt::Debug for ModuleSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list().entries(self.inner.modules.iter()).finish()
    }
}
