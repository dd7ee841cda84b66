// Copyright © Aptos Foundation
// SPDX-License-Identifier: Apache-2.0

use crate::error::ModuleError;
use protomod_cas::{Digest, DigestType};
use serde::{de, Deserialize, Deserializer, Serialize, Serializer};
use std::{fmt, str::FromStr};

/// How a [`ModuleDigest`] was computed.
#[derive(Clone, Copy, Debug, Eq, Hash, Ord, PartialEq, PartialOrd, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ModuleDigestType {
    /// The module's own file manifest only.
    B4,
    /// The module's file manifest combined with the digests of all its dependencies.
    B5,
}

impl ModuleDigestType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ModuleDigestType::B4 => "b4",
            ModuleDigestType::B5 => "b5",
        }
    }
}

impl fmt::Display for ModuleDigestType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ModuleDigestType {
    type Err = ModuleError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "b4" => Ok(ModuleDigestType::B4),
            "b5" => Ok(ModuleDigestType::B5),
            _ => Err(ModuleError::MalformedInput(format!(
                "unknown module digest type {:?}",
                s
            ))),
        }
    }
}

/// The digest of a module. The text form is `<type>:<hex>`, e.g. `b5:0a1b...`.
#[derive(Clone, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub struct ModuleDigest {
    digest_type: ModuleDigestType,
    digest: Digest,
}

impl ModuleDigest {
    pub fn new(digest_type: ModuleDigestType, digest: Digest) -> Self {
        Self {
            digest_type,
            digest,
        }
    }

    /// The B4 digest of a module whose file manifest has digest `file_digest`.
    pub fn b4(file_digest: Digest) -> Self {
        Self::new(ModuleDigestType::B4, file_digest)
    }

    /// The B5 digest of a module with file manifest digest `file_digest` and the given
    /// dependency digests. The order of `dep_digests` does not matter.
    pub fn b5(file_digest: Digest, dep_digests: &[ModuleDigest]) -> Result<Self, ModuleError> {
        let mut digests = Vec::with_capacity(dep_digests.len() + 1);
        digests.push(file_digest);
        for dep_digest in dep_digests {
            if dep_digest.digest_type != ModuleDigestType::B5 {
                return Err(ModuleError::MalformedInput(format!(
                    "cannot compute a b5 digest from dependency digest {}",
                    dep_digest
                )));
            }
            digests.push(dep_digest.digest.clone());
        }
        Ok(Self::new(
            ModuleDigestType::B5,
            Digest::for_digests(DigestType::Shake256, &digests)?,
        ))
    }

    pub fn digest_type(&self) -> ModuleDigestType {
        self.digest_type
    }

    pub fn digest(&self) -> &Digest {
        &self.digest
    }

    /// Fails with [`ModuleError::VerificationFailed`] unless `actual` equals `self`.
    pub fn verify(
        &self,
        actual: &ModuleDigest,
        context: impl Into<String>,
    ) -> Result<(), ModuleError> {
        if self == actual {
            return Ok(());
        }
        Err(ModuleError::VerificationFailed {
            context: context.into(),
            expected: self.to_string(),
            actual: actual.to_string(),
        })
    }
}

impl fmt::Display for ModuleDigest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.digest_type, hex::encode(self.digest.value()))
    }
}

impl fmt::Debug for ModuleDigest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ModuleDigest({})", self)
    }
}

impl FromStr for ModuleDigest {
    type Err = ModuleError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (digest_type, value) = s.split_once(':').ok_or_else(|| {
            ModuleError::MalformedInput(format!("{:?} is not of the form <type>:<hex>", s))
        })?;
        let digest_type = ModuleDigestType::from_str(digest_type)?;
        let value = hex::decode(value)
            .map_err(|error| ModuleError::MalformedInput(format!("{:?}: {}", s, error)))?;
        Ok(Self::new(
            digest_type,
            Digest::new(DigestType::Shake256, value)?,
        ))
    }
}

impl Serialize for ModuleDigest {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for ModuleDigest {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        ModuleDigest::from_str(&s).map_err(de::Error::custom)
    }
}
