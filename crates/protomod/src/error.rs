// Copyright © Aptos Foundation
// SPDX-License-Identifier: Apache-2.0

use protomod_cas::CasError;
use thiserror::Error;

/// Errors produced while resolving, fetching and querying modules.
///
/// Errors are `Clone` so that memoized lookups can hand the same failure to every caller.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum ModuleError {
    #[error("Module set has already been built: {0}")]
    AlreadyBuilt(String),
    #[error("Content store error: {0}")]
    Cas(#[from] CasError),
    #[error("Conflict: {0}")]
    Conflict(String),
    #[error("Cycle detected: {0}")]
    CycleDetected(String),
    #[error("Error accessing {0}: {1}")]
    Io(String, String),
    #[error("Malformed input: {0}")]
    MalformedInput(String),
    #[error("{0} does not exist")]
    NotFound(String),
    #[error("Error serializing {0}: {1}")]
    Serialization(String, String),
    #[error("System error: {0}")]
    System(String),
    #[error("Verification failed for {context}: expected digest {expected}, got {actual}")]
    VerificationFailed {
        context: String,
        expected: String,
        actual: String,
    },
}

impl ModuleError {
    /// Returns a summary label for the error
    pub fn get_label(&self) -> &'static str {
        match self {
            ModuleError::AlreadyBuilt(_) => "already_built",
            ModuleError::Cas(error) => error.get_label(),
            ModuleError::Conflict(_) => "conflict",
            ModuleError::CycleDetected(_) => "cycle_detected",
            ModuleError::Io(_, _) => "io",
            ModuleError::MalformedInput(_) => "malformed_input",
            ModuleError::NotFound(_) => "not_found",
            ModuleError::Serialization(_, _) => "serialization",
            ModuleError::System(_) => "system",
            ModuleError::VerificationFailed { .. } => "verification_failed",
        }
    }

    pub fn is_not_found(&self) -> bool {
        match self {
            ModuleError::NotFound(_) => true,
            ModuleError::Cas(error) => error.is_not_found(),
            _ => false,
        }
    }

    /// Returns true for violated internal invariants, as opposed to bad input.
    pub fn is_system(&self) -> bool {
        matches!(self, ModuleError::System(_) | ModuleError::AlreadyBuilt(_))
    }

    /// Converts a content digest mismatch into a verification failure, leaving other
    /// errors unchanged.
    pub fn into_verification_failure(self) -> Self {
        match self {
            ModuleError::Cas(CasError::DigestMismatch {
                context,
                expected,
                actual,
            }) => ModuleError::VerificationFailed {
                context,
                expected,
                actual,
            },
            error => error,
        }
    }
}
