// Copyright © Aptos Foundation
// SPDX-License-Identifier: Apache-2.0

use protomod::{ModuleDigestType, ModuleError, PersistableConfig};
use serde::{Deserialize, Serialize};

/// The largest number of values registries accept in a single request.
pub const DEFAULT_MAX_BATCH_SIZE: usize = 250;

#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
#[serde(default, deny_unknown_fields)]
pub struct RegistryProviderConfig {
    /// Maximum number of keys, refs or blobs sent in one registry request
    pub max_batch_size: usize,
    /// The digest type requested for commits
    pub digest_type: ModuleDigestType,
}

impl Default for RegistryProviderConfig {
    fn default() -> Self {
        Self {
            max_batch_size: DEFAULT_MAX_BATCH_SIZE,
            digest_type: ModuleDigestType::B5,
        }
    }
}

impl RegistryProviderConfig {
    /// Validates the config
    pub fn sanitize(&self) -> Result<(), ModuleError> {
        if self.max_batch_size == 0 {
            return Err(ModuleError::MalformedInput(
                "max_batch_size must be positive".to_string(),
            ));
        }
        Ok(())
    }
}

impl PersistableConfig for RegistryProviderConfig {}
