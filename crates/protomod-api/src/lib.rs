// Copyright © Aptos Foundation
// SPDX-License-Identifier: Apache-2.0

#![forbid(unsafe_code)]

//! Providers that resolve modules against remote registries through a
//! [`RegistryClient`].

mod batch;
mod client;
mod commit_provider;
mod config;
mod module_data_provider;
mod module_key_provider;
mod names;

pub use client::{ApiBlob, ApiCommit, ApiCommitNode, ApiModule, ApiOwner, RegistryClient};
pub use commit_provider::ApiCommitProvider;
pub use config::{RegistryProviderConfig, DEFAULT_MAX_BATCH_SIZE};
pub use module_data_provider::ApiModuleDataProvider;
pub use module_key_provider::ApiModuleKeyProvider;
