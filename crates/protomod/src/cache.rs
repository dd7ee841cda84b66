// Copyright © Aptos Foundation
// SPDX-License-Identifier: Apache-2.0

use crate::{error::ModuleError, imports::parse_imports, metrics, module::Module};
use parking_lot::RwLock;
use std::{
    collections::{BTreeSet, HashMap},
    sync::{
        atomic::{AtomicUsize, Ordering},
        Arc,
    },
};
use tokio::sync::OnceCell;
use tracing::debug;

/// A memoized per-path result. The slot is empty until the first computation completes.
type Slot<T> = Arc<OnceCell<Result<T, ModuleError>>>;

#[derive(Default)]
struct CacheMaps {
    file_path_to_module: HashMap<String, Slot<Module>>,
    file_path_to_imports: HashMap<String, Slot<Arc<BTreeSet<String>>>>,
}

/// Per-path lookups over the modules of a module set.
///
/// Each path is computed at most once, including failures, which stay scoped to their
/// path. Concurrent callers for the same path wait on a single computation.
#[derive(Default)]
pub(crate) struct Cache {
    maps: RwLock<CacheMaps>,
    module_computations: AtomicUsize,
    import_computations: AtomicUsize,
}

impl Cache {
    pub(crate) async fn get_module_for_file_path(
        &self,
        modules: &[Module],
        path: &str,
    ) -> Result<Module, ModuleError> {
        let slot = self.get_or_insert_slot(
            path,
            |maps| &maps.file_path_to_module,
            |maps| &mut maps.file_path_to_module,
        );
        slot.get_or_init(|| async {
            self.module_computations.fetch_add(1, Ordering::SeqCst);
            metrics::CACHE_COMPUTATIONS
                .with_label_values(&["module_for_file_path"])
                .inc();
            compute_module_for_file_path(modules, path).await
        })
        .await
        .clone()
    }

    pub(crate) async fn get_imports_for_file_path(
        &self,
        modules: &[Module],
        path: &str,
    ) -> Result<Arc<BTreeSet<String>>, ModuleError> {
        let slot = self.get_or_insert_slot(
            path,
            |maps| &maps.file_path_to_imports,
            |maps| &mut maps.file_path_to_imports,
        );
        slot.get_or_init(|| async {
            self.import_computations.fetch_add(1, Ordering::SeqCst);
            metrics::CACHE_COMPUTATIONS
                .with_label_values(&["imports_for_file_path"])
                .inc();
            let module = self.get_module_for_file_path(modules, path).await?;
            let file = module.read_bucket().get_file(path).await?;
            let content = std::str::from_utf8(file.content()).map_err(|error| {
                ModuleError::MalformedInput(format!("{} is not valid UTF-8: {}", path, error))
            })?;
            Ok(Arc::new(parse_imports(content)))
        })
        .await
        .clone()
    }

    /// Number of times an owning module was computed rather than served from the cache.
    pub(crate) fn module_computations(&self) -> usize {
        self.module_computations.load(Ordering::SeqCst)
    }

    /// Number of times imports were computed rather than served from the cache.
    pub(crate) fn import_computations(&self) -> usize {
        self.import_computations.load(Ordering::SeqCst)
    }

    fn get_or_insert_slot<T>(
        &self,
        path: &str,
        get: impl Fn(&CacheMaps) -> &HashMap<String, Slot<T>>,
        get_mut: impl Fn(&mut CacheMaps) -> &mut HashMap<String, Slot<T>>,
    ) -> Slot<T> {
        {
            let maps = self.maps.read();
            if let Some(slot) = get(&*maps).get(path) {
                return slot.clone();
            }
        }
        // Another caller may have inserted the slot between the two locks.
        let mut maps = self.maps.write();
        get_mut(&mut *maps)
            .entry(path.to_string())
            .or_insert_with(|| Arc::new(OnceCell::new()))
            .clone()
    }
}

async fn compute_module_for_file_path(
    modules: &[Module],
    path: &str,
) -> Result<Module, ModuleError> {
    let mut owners = Vec::new();
    for module in modules {
        match module.read_bucket().stat_file_info(path).await {
            Ok(_) => owners.push(module.clone()),
            Err(error) if error.is_not_found() => {},
            Err(error) => return Err(error),
        }
    }
    match owners.len() {
        0 => Err(ModuleError::NotFound(path.to_string())),
        1 => Ok(owners.remove(0)),
        _ => {
            let mut opaque_ids: Vec<&str> = owners.iter().map(Module::opaque_id).collect();
            opaque_ids.sort_unstable();
            debug!("{} is contained in {} modules", path, opaque_ids.len());
            Err(ModuleError::Conflict(format!(
                "{} is contained in multiple modules: {}",
                path,
                opaque_ids.join(", ")
            )))
        },
    }
}
