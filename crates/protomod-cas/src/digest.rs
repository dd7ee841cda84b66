// Copyright © Aptos Foundation
// SPDX-License-Identifier: Apache-2.0

use crate::error::CasError;
use ::digest::{ExtendableOutput, Update, XofReader};
use serde::{de, Deserialize, Deserializer, Serialize, Serializer};
use sha3::Shake256;
use std::{
    fmt::{self, Debug, Display},
    str::FromStr,
};

/// Number of bytes produced by a SHAKE256 digest.
pub const SHAKE256_DIGEST_LENGTH: usize = 64;

/// The hash function used to produce a [`Digest`].
#[derive(Clone, Copy, Debug, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub enum DigestType {
    Shake256,
}

impl DigestType {
    pub fn as_str(&self) -> &'static str {
        match self {
            DigestType::Shake256 => "shake256",
        }
    }

    /// Length in bytes of digests of this type.
    pub fn length(&self) -> usize {
        match self {
            DigestType::Shake256 => SHAKE256_DIGEST_LENGTH,
        }
    }

    fn hash(&self, content: &[u8]) -> Vec<u8> {
        match self {
            DigestType::Shake256 => {
                let mut hasher = Shake256::default();
                hasher.update(content);
                let mut value = vec![0u8; SHAKE256_DIGEST_LENGTH];
                hasher.finalize_xof().read(&mut value);
                value
            },
        }
    }
}

impl Display for DigestType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DigestType {
    type Err = CasError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "shake256" => Ok(DigestType::Shake256),
            _ => Err(CasError::InvalidDigest(format!("unknown digest type {:?}", s))),
        }
    }
}

/// A content hash, tagged with the function that produced it.
///
/// The text form is `<type>:<lowercase hex>`, e.g. `shake256:ab12...`, and parses back
/// to an identical value. Ordering compares the type first and the raw bytes second.
#[derive(Clone, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub struct Digest {
    digest_type: DigestType,
    value: Vec<u8>,
}

impl Digest {
    /// Wraps an already computed hash value, checking its length.
    pub fn new(digest_type: DigestType, value: Vec<u8>) -> Result<Self, CasError> {
        if value.len() != digest_type.length() {
            return Err(CasError::InvalidDigest(format!(
                "expected {} bytes for a {} digest, got {}",
                digest_type.length(),
                digest_type,
                value.len()
            )));
        }
        Ok(Self { digest_type, value })
    }

    /// Hashes the given content.
    pub fn for_content(digest_type: DigestType, content: &[u8]) -> Self {
        Self {
            digest_type,
            value: digest_type.hash(content),
        }
    }

    /// Combines digests into a single digest.
    ///
    /// The values are sorted before being concatenated and hashed, so the result does
    /// not depend on the order of `digests`. Every input must be of `digest_type`.
    pub fn for_digests(digest_type: DigestType, digests: &[Digest]) -> Result<Self, CasError> {
        if let Some(mismatched) = digests.iter().find(|d| d.digest_type != digest_type) {
            return Err(CasError::MalformedInput(format!(
                "cannot combine a {} digest into a {} digest",
                mismatched.digest_type, digest_type
            )));
        }
        let mut values: Vec<&[u8]> = digests.iter().map(|digest| digest.value()).collect();
        values.sort_unstable();
        Ok(Self::for_content(digest_type, &values.concat()))
    }

    pub fn digest_type(&self) -> DigestType {
        self.digest_type
    }

    pub fn value(&self) -> &[u8] {
        &self.value
    }

    /// Returns `Ok(())` if `actual` equals `self`, else a mismatch error carrying both
    /// digests in full.
    pub fn verify(&self, actual: &Digest, context: impl Into<String>) -> Result<(), CasError> {
        if self == actual {
            return Ok(());
        }
        Err(CasError::DigestMismatch {
            context: context.into(),
            expected: self.to_string(),
            actual: actual.to_string(),
        })
    }
}

impl Display for Digest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.digest_type, hex::encode(&self.value))
    }
}

impl Debug for Digest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Digest({})", self)
    }
}

impl FromStr for Digest {
    type Err = CasError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (digest_type, value) = s.split_once(':').ok_or_else(|| {
            CasError::InvalidDigest(format!("{:?} is not of the form <type>:<hex>", s))
        })?;
        let digest_type = DigestType::from_str(digest_type)?;
        let value = hex::decode(value)
            .map_err(|error| CasError::InvalidDigest(format!("{:?}: {}", s, error)))?;
        Digest::new(digest_type, value)
    }
}

impl Serialize for Digest {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for Digest {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        Digest::from_str(&s).map_err(de::Error::custom)
    }
}
