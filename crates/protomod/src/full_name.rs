// Copyright © Aptos Foundation
// SPDX-License-Identifier: Apache-2.0

use crate::error::ModuleError;
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{de, Deserialize, Deserializer, Serialize, Serializer};
use std::{fmt, str::FromStr};

static REGISTRY_REGEX: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^[a-zA-Z0-9]([a-zA-Z0-9.-]*[a-zA-Z0-9])?(:[0-9]{1,5})?$")
        .expect("registry pattern is valid")
});

/// The globally unique name of a module: `registry/owner/name`.
#[derive(Clone, Debug, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub struct ModuleFullName {
    registry: String,
    owner: String,
    name: String,
}

impl ModuleFullName {
    pub fn new(
        registry: impl Into<String>,
        owner: impl Into<String>,
        name: impl Into<String>,
    ) -> Result<Self, ModuleError> {
        let (registry, owner, name) = (registry.into(), owner.into(), name.into());
        if !REGISTRY_REGEX.is_match(&registry) {
            return Err(ModuleError::MalformedInput(format!(
                "invalid registry {:?}",
                registry
            )));
        }
        validate_component("owner", &owner)?;
        validate_component("name", &name)?;
        Ok(Self {
            registry,
            owner,
            name,
        })
    }

    pub fn registry(&self) -> &str {
        &self.registry
    }

    pub fn owner(&self) -> &str {
        &self.owner
    }

    pub fn name(&self) -> &str {
        &self.name
    }
}

fn validate_component(kind: &str, value: &str) -> Result<(), ModuleError> {
    if value.is_empty() {
        return Err(ModuleError::MalformedInput(format!("{} is empty", kind)));
    }
    if value
        .chars()
        .any(|c| c == '/' || c == ':' || c.is_whitespace())
    {
        return Err(ModuleError::MalformedInput(format!(
            "invalid {} {:?}",
            kind, value
        )));
    }
    Ok(())
}

impl fmt::Display for ModuleFullName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}/{}", self.registry, self.owner, self.name)
    }
}

impl FromStr for ModuleFullName {
    type Err = ModuleError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let components: Vec<&str> = s.split('/').collect();
        match components.as_slice() {
            [registry, owner, name] => ModuleFullName::new(*registry, *owner, *name),
            _ => Err(ModuleError::MalformedInput(format!(
                "module name {:?} is not of the form registry/owner/name",
                s
            ))),
        }
    }
}

impl Serialize for ModuleFullName {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for ModuleFullName {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        ModuleFullName::from_str(&s).map_err(de::Error::custom)
    }
}

/// A module name plus an optional reference: a label, a commit ID or a digest.
///
/// Without a reference the module's latest commit is meant.
#[derive(Clone, Debug, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub struct ModuleRef {
    full_name: ModuleFullName,
    reference: Option<String>,
}

impl ModuleRef {
    pub fn new(full_name: ModuleFullName, reference: Option<String>) -> Result<Self, ModuleError> {
        if let Some(reference) = &reference {
            if reference.is_empty() || reference.chars().any(char::is_whitespace) {
                return Err(ModuleError::MalformedInput(format!(
                    "invalid reference {:?} for {}",
                    reference, full_name
                )));
            }
        }
        Ok(Self {
            full_name,
            reference,
        })
    }

    pub fn full_name(&self) -> &ModuleFullName {
        &self.full_name
    }

    pub fn reference(&self) -> Option<&str> {
        self.reference.as_deref()
    }
}

impl fmt::Display for ModuleRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.reference {
            Some(reference) => write!(f, "{}:{}", self.full_name, reference),
            None => write!(f, "{}", self.full_name),
        }
    }
}

impl FromStr for ModuleRef {
    type Err = ModuleError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        // A port in the registry also uses ':', so split after the last '/'.
        let name_start = s.rfind('/').map(|index| index + 1).unwrap_or(0);
        match s[name_start..].find(':') {
            Some(offset) => {
                let split = name_start + offset;
                ModuleRef::new(s[..split].parse()?, Some(s[split + 1..].to_string()))
            },
            None => ModuleRef::new(s.parse()?, None),
        }
    }
}
