// Copyright © Aptos Foundation
// SPDX-License-Identifier: Apache-2.0

use crate::{
    config::PersistableConfig, error::ModuleError, full_name::ModuleFullName,
    module_digest::ModuleDigest, module_key::ModuleKey, module_set::ModuleSet,
};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

#[derive(Clone, Copy, Debug, Default, Deserialize, Eq, PartialEq, Serialize)]
pub enum LockFileVersion {
    #[default]
    #[serde(rename = "v2")]
    V2,
}

/// One pinned dependency. Holds exactly the fields of a [`ModuleKey`].
#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
#[serde(deny_unknown_fields)]
pub struct LockFileDep {
    pub name: ModuleFullName,
    pub commit: String,
    pub digest: ModuleDigest,
}

impl LockFileDep {
    pub async fn from_module_key(module_key: &ModuleKey) -> Result<Self, ModuleError> {
        Ok(Self {
            name: module_key.full_name().clone(),
            commit: module_key.commit_id().to_string(),
            digest: module_key.digest().await?,
        })
    }

    pub fn to_module_key(&self) -> Result<ModuleKey, ModuleError> {
        ModuleKey::new(self.name.clone(), self.commit.clone(), self.digest.clone())
    }
}

/// The pinned remote dependencies of a workspace, stored as YAML.
///
/// ```yaml
/// version: v2
/// deps:
///   - name: buf.build/acme/units
///     commit: 0123abcd
///     digest: b5:...
/// ```
#[derive(Clone, Debug, Default, Deserialize, Eq, PartialEq, Serialize)]
#[serde(deny_unknown_fields)]
pub struct LockFile {
    pub version: LockFileVersion,
    #[serde(default)]
    pub deps: Vec<LockFileDep>,
}

impl LockFile {
    /// Creates a lock file with deps sorted by name. Each module may appear once.
    pub fn new(mut deps: Vec<LockFileDep>) -> Result<Self, ModuleError> {
        deps.sort_by(|a, b| a.name.cmp(&b.name));
        let mut seen = BTreeSet::new();
        for dep in &deps {
            if !seen.insert(&dep.name) {
                return Err(ModuleError::MalformedInput(format!(
                    "{} is pinned more than once",
                    dep.name
                )));
            }
        }
        Ok(Self {
            version: LockFileVersion::V2,
            deps,
        })
    }

    pub async fn from_module_keys(module_keys: &[ModuleKey]) -> Result<Self, ModuleError> {
        let mut deps = Vec::with_capacity(module_keys.len());
        for module_key in module_keys {
            deps.push(LockFileDep::from_module_key(module_key).await?);
        }
        Self::new(deps)
    }

    /// Pins every remote module of the set that is not a target.
    pub async fn from_module_set(module_set: &ModuleSet) -> Result<Self, ModuleError> {
        let mut module_keys = Vec::new();
        for module in module_set.non_target_modules() {
            if !module.is_local() {
                module_keys.push(module.to_module_key().await?);
            }
        }
        Self::from_module_keys(&module_keys).await
    }

    pub fn module_keys(&self) -> Result<Vec<ModuleKey>, ModuleError> {
        self.deps.iter().map(LockFileDep::to_module_key).collect()
    }
}

impl PersistableConfig for LockFile {}

#[cfg(test)]
mod tests {
    use super::*;
    use claims::assert_err;
    use protomod_cas::{Digest, DigestType};

    fn module_key(name: &str, commit: &str) -> ModuleKey {
        let digest = ModuleDigest::b5(
            Digest::for_content(DigestType::Shake256, name.as_bytes()),
            &[],
        )
        .unwrap();
        ModuleKey::new(name.parse().unwrap(), commit, digest).unwrap()
    }

    #[tokio::test]
    async fn test_round_trip() {
        let keys = vec![
            module_key("buf.build/acme/weather", "c2"),
            module_key("buf.build/acme/units", "c1"),
        ];
        let lock_file = LockFile::from_module_keys(&keys).await.unwrap();
        let text = lock_file.serialize_config().unwrap();
        assert!(text.contains("version: v2"));
        assert!(text.contains("name: buf.build/acme/units"));

        let parsed = LockFile::parse_serialized_config(&text).unwrap();
        assert_eq!(parsed, lock_file);
        assert_eq!(parsed.serialize_config().unwrap(), text);

        let round_tripped = parsed.module_keys().unwrap();
        assert_eq!(round_tripped[0].full_name().to_string(), "buf.build/acme/units");
        assert_eq!(round_tripped[1].commit_id(), "c2");
        assert_eq!(
            round_tripped[1].digest().await.unwrap(),
            keys[0].digest().await.unwrap()
        );
    }

    #[tokio::test]
    async fn test_duplicates_are_rejected() {
        let keys = vec![
            module_key("buf.build/acme/units", "c1"),
            module_key("buf.build/acme/units", "c2"),
        ];
        assert_err!(LockFile::from_module_keys(&keys).await);
    }

    #[test]
    fn test_unknown_version_is_rejected() {
        assert_err!(LockFile::parse_serialized_config("version: v1\ndeps: []\n"));
        assert_err!(LockFile::parse_serialized_config(
            "version: v2\ndeps:\n  - name: buf.build/acme/units\n    commit: c1\n    digest: b5:00\n"
        ));
    }
}
