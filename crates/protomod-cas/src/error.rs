// Copyright © Aptos Foundation
// SPDX-License-Identifier: Apache-2.0

use thiserror::Error;

/// Errors produced by the content-addressed storage layer.
///
/// Errors are `Clone` so they can be memoized alongside successful results
/// by [`crate::SingleFlight`].
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum CasError {
    #[error("Digest mismatch for {context}: expected {expected}, got {actual}")]
    DigestMismatch {
        context: String,
        expected: String,
        actual: String,
    },
    #[error("Invalid digest: {0}")]
    InvalidDigest(String),
    #[error("Error accessing {0}: {1}")]
    Io(String, String),
    #[error("Malformed input: {0}")]
    MalformedInput(String),
    #[error("{0} does not exist")]
    NotFound(String),
}

impl CasError {
    /// Returns a summary label for the error
    pub fn get_label(&self) -> &'static str {
        match self {
            CasError::DigestMismatch { .. } => "digest_mismatch",
            CasError::InvalidDigest(_) => "invalid_digest",
            CasError::Io(_, _) => "io",
            CasError::MalformedInput(_) => "malformed_input",
            CasError::NotFound(_) => "not_found",
        }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, CasError::NotFound(_))
    }

    pub(crate) fn from_io(path: impl Into<String>, error: std::io::Error) -> Self {
        let path = path.into();
        if error.kind() == std::io::ErrorKind::NotFound {
            CasError::NotFound(path)
        } else {
            CasError::Io(path, error.to_string())
        }
    }
}
