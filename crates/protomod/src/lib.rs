// Copyright © Aptos Foundation
// SPDX-License-Identifier: Apache-2.0

#![forbid(unsafe_code)]

//! Resolution of content-addressed protobuf modules into verified module sets.
//!
//! Modules are added to a [`ModuleSetBuilder`] from local buckets or as remote
//! [`ModuleKey`]s. Building selects one module per identity, fetches remote content
//! through a [`ModuleDataProvider`], verifies it against the expected digests and
//! produces an acyclic [`ModuleSet`].

mod added_module;
mod cache;
mod commit;
mod config;
mod error;
mod full_name;
mod imports;
mod lock_file;
pub mod metrics;
mod module;
mod module_data;
mod module_digest;
mod module_key;
mod module_read_bucket;
mod module_set;
mod module_set_builder;
mod provider;
#[cfg(any(test, feature = "testing"))]
pub mod testing;

pub use added_module::{LocalModuleOptions, RemoteModuleOptions};
pub use commit::Commit;
pub use config::{ModuleSetBuilderConfig, PersistableConfig, RemoteTieBreakPolicy};
pub use error::ModuleError;
pub use full_name::{ModuleFullName, ModuleRef};
pub use imports::parse_imports;
pub use lock_file::{LockFile, LockFileDep, LockFileVersion};
pub use module::{Module, ModuleDep};
pub use module_data::ModuleData;
pub use module_digest::{ModuleDigest, ModuleDigestType};
pub use module_key::ModuleKey;
pub use module_read_bucket::{
    FileInfo, FileType, ModuleFile, ModuleReadBucket, DOC_FILE_PATHS, LICENSE_FILE_PATH,
};
pub use module_set::ModuleSet;
pub use module_set_builder::ModuleSetBuilder;
pub use provider::{
    check_result_count, CommitProvider, ModuleDataProvider, ModuleKeyProvider,
    NopCommitProvider, NopModuleDataProvider,
};
