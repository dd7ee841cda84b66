// Copyright © Aptos Foundation
// SPDX-License-Identifier: Apache-2.0

use crate::{error::ModuleError, module_key::ModuleKey};
use chrono::{DateTime, Utc};
use protomod_cas::SingleFlight;
use std::{fmt, future::Future, sync::Arc};

/// A commit of a module. The create time is only used to choose between commits of the
/// same module.
#[derive(Clone)]
pub struct Commit {
    module_key: ModuleKey,
    create_time: Arc<SingleFlight<DateTime<Utc>, ModuleError>>,
}

impl Commit {
    pub fn new(module_key: ModuleKey, create_time: DateTime<Utc>) -> Self {
        Self {
            module_key,
            create_time: Arc::new(SingleFlight::resolved(create_time)),
        }
    }

    pub fn new_lazy<F, Fut>(module_key: ModuleKey, get_create_time: F) -> Self
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<DateTime<Utc>, ModuleError>> + Send + 'static,
    {
        Self {
            module_key,
            create_time: Arc::new(SingleFlight::new(get_create_time)),
        }
    }

    pub fn module_key(&self) -> &ModuleKey {
        &self.module_key
    }

    pub async fn create_time(&self) -> Result<DateTime<Utc>, ModuleError> {
        self.create_time.get().await
    }
}

impl fmt::Debug for Commit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Commit")
            .field("module_key", &self.module_key)
            .field("create_time", &self.create_time.peek())
            .finish()
    }
}
