// Copyright © Aptos Foundation
// SPDX-License-Identifier: Apache-2.0

use crate::{error::ModuleError, module_key::ModuleKey};
use protomod_cas::{CasError, MemoryBucket, RemoteBucket, SingleFlight};
use std::{fmt, future::Future, sync::Arc};

/// The content of a remote module as returned by a
/// [`ModuleDataProvider`](crate::ModuleDataProvider).
///
/// Neither the files nor the declared dependency keys are fetched until first used, and
/// each is fetched at most once.
#[derive(Clone)]
pub struct ModuleData {
    module_key: ModuleKey,
    bucket: RemoteBucket,
    declared_dep_module_keys: Arc<SingleFlight<Vec<ModuleKey>, ModuleError>>,
}

impl ModuleData {
    pub fn new<B, BFut, D, DFut>(module_key: ModuleKey, get_bucket: B, get_declared_deps: D) -> Self
    where
        B: Fn() -> BFut + Send + Sync + 'static,
        BFut: Future<Output = Result<MemoryBucket, CasError>> + Send + 'static,
        D: Fn() -> DFut + Send + Sync + 'static,
        DFut: Future<Output = Result<Vec<ModuleKey>, ModuleError>> + Send + 'static,
    {
        let bucket = RemoteBucket::new(module_key.commit_id(), get_bucket);
        Self {
            module_key,
            bucket,
            declared_dep_module_keys: Arc::new(SingleFlight::new(get_declared_deps)),
        }
    }

    pub fn module_key(&self) -> &ModuleKey {
        &self.module_key
    }

    /// The files of the module. Reading from the bucket triggers the fetch.
    pub fn bucket(&self) -> &RemoteBucket {
        &self.bucket
    }

    /// The keys of every dependency of the module, direct and transitive, as recorded at
    /// commit time.
    pub async fn declared_dep_module_keys(&self) -> Result<Vec<ModuleKey>, ModuleError> {
        self.declared_dep_module_keys.get().await
    }
}

impl fmt::Debug for ModuleData {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ModuleData")
            .field("module_key", &self.module_key)
            .field("bucket", &self.bucket)
            .finish()
    }
}
