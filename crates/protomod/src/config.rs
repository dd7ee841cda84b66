// Copyright © Aptos Foundation
// SPDX-License-Identifier: Apache-2.0

use crate::error::ModuleError;
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use std::{fs, path::Path};

pub trait PersistableConfig: Serialize + DeserializeOwned {
    /// Load the config from disk at the given path
    fn load_config<P: AsRef<Path>>(path: P) -> Result<Self, ModuleError> {
        let path_string = path.as_ref().display().to_string();
        let contents = fs::read_to_string(&path).map_err(|error| {
            ModuleError::Io(
                path_string.clone(),
                format!("failed to read config file: {}", error),
            )
        })?;
        Self::parse_serialized_config(&contents)
            .map_err(|error| ModuleError::Serialization(path_string, error.to_string()))
    }

    /// Save the config to disk at the given output path
    fn save_config<P: AsRef<Path>>(&self, output_file: P) -> Result<(), ModuleError> {
        let path_string = output_file.as_ref().display().to_string();
        let serialized_config = self.serialize_config()?;
        fs::write(output_file.as_ref(), serialized_config)
            .map_err(|error| ModuleError::Io(path_string, error.to_string()))
    }

    /// Serialize the config to a YAML string
    fn serialize_config(&self) -> Result<String, ModuleError> {
        serde_yaml::to_string(&self)
            .map_err(|error| ModuleError::Serialization("config".to_string(), error.to_string()))
    }

    /// Parse the config from the serialized string
    fn parse_serialized_config(serialized_config: &str) -> Result<Self, ModuleError> {
        serde_yaml::from_str(serialized_config)
            .map_err(|error| ModuleError::Serialization("config".to_string(), error.to_string()))
    }
}

/// Picks one commit when several commits of the same remote module are added.
#[derive(Clone, Copy, Debug, Default, Deserialize, Eq, PartialEq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RemoteTieBreakPolicy {
    /// The most recently created commit wins.
    #[default]
    LatestCreateTime,
    /// The oldest commit wins.
    EarliestCreateTime,
}

#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
#[serde(default, deny_unknown_fields)]
pub struct ModuleSetBuilderConfig {
    /// How to choose between commits of the same remote module
    pub remote_tie_break: RemoteTieBreakPolicy,
    /// Whether to recompute the digest of fetched remote modules and compare it with
    /// the expected digest
    pub verify_remote_digests: bool,
}

impl Default for ModuleSetBuilderConfig {
    fn default() -> Self {
        Self {
            remote_tie_break: RemoteTieBreakPolicy::LatestCreateTime,
            verify_remote_digests: true,
        }
    }
}

impl PersistableConfig for ModuleSetBuilderConfig {}

#[cfg(test)]
mod tests {
    use super::*;
    use claims::assert_err;

    #[test]
    fn test_partial_config_uses_defaults() {
        let config = ModuleSetBuilderConfig::parse_serialized_config(
            "remote_tie_break: earliest_create_time\n",
        )
        .unwrap();
        assert_eq!(config.remote_tie_break, RemoteTieBreakPolicy::EarliestCreateTime);
        assert!(config.verify_remote_digests);
    }

    #[test]
    fn test_unknown_fields_are_rejected() {
        assert_err!(ModuleSetBuilderConfig::parse_serialized_config(
            "verify_remote_digest: false\n"
        ));
    }

    #[test]
    fn test_save_and_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("builder.yaml");
        let config = ModuleSetBuilderConfig {
            remote_tie_break: RemoteTieBreakPolicy::EarliestCreateTime,
            verify_remote_digests: false,
        };
        config.save_config(&path).unwrap();
        assert_eq!(ModuleSetBuilderConfig::load_config(&path).unwrap(), config);
    }
}
