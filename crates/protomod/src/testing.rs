// Copyright © Aptos Foundation
// SPDX-License-Identifier: Apache-2.0

//! An in-memory registry for tests. It implements every provider trait and counts how
//! often each one is called.

use crate::{
    commit::Commit,
    error::ModuleError,
    full_name::{ModuleFullName, ModuleRef},
    module_data::ModuleData,
    module_digest::ModuleDigest,
    module_key::ModuleKey,
    module_read_bucket::ModuleReadBucket,
    provider::{CommitProvider, ModuleDataProvider, ModuleKeyProvider},
};
use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use parking_lot::Mutex;
use protomod_cas::{Bucket, MemoryBucket};
use std::{
    collections::BTreeMap,
    str::FromStr,
    sync::atomic::{AtomicUsize, Ordering},
};

#[derive(Clone)]
struct RegistryCommit {
    module_key: ModuleKey,
    digest: ModuleDigest,
    create_time: DateTime<Utc>,
    files: MemoryBucket,
    dep_module_keys: Vec<ModuleKey>,
}

#[derive(Default)]
struct RegistryState {
    commit_id_to_commit: BTreeMap<String, RegistryCommit>,
    label_to_commit_id: BTreeMap<(ModuleFullName, String), String>,
}

#[derive(Default)]
pub struct InMemoryRegistry {
    state: Mutex<RegistryState>,
    module_data_calls: AtomicUsize,
    commit_calls: AtomicUsize,
    module_key_calls: AtomicUsize,
    requested_commit_ids: Mutex<Vec<String>>,
}

impl InMemoryRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Stores a commit and returns its key. The digest is computed from `files` and the
    /// digests of `dep_module_keys`, which should list every transitive dependency.
    pub async fn push(
        &self,
        full_name: &str,
        commit_id: &str,
        create_time_seconds: i64,
        files: Vec<(&str, &str)>,
        dep_module_keys: &[ModuleKey],
    ) -> Result<ModuleKey, ModuleError> {
        let full_name = ModuleFullName::from_str(full_name)?;
        let files = MemoryBucket::new(
            files
                .into_iter()
                .map(|(path, content)| (path.to_string(), content.to_string())),
        )?;
        let file_digest = ModuleReadBucket::new(Bucket::from(files.clone()))
            .manifest()
            .await?
            .digest();
        let mut dep_digests = Vec::with_capacity(dep_module_keys.len());
        for dep_module_key in dep_module_keys {
            dep_digests.push(dep_module_key.digest().await?);
        }
        let digest = ModuleDigest::b5(file_digest, &dep_digests)?;
        let module_key = ModuleKey::new(full_name, commit_id, digest.clone())?;
        let create_time = Utc
            .timestamp_opt(create_time_seconds, 0)
            .single()
            .ok_or_else(|| {
                ModuleError::MalformedInput(format!("invalid timestamp {}", create_time_seconds))
            })?;
        self.state.lock().commit_id_to_commit.insert(
            commit_id.to_string(),
            RegistryCommit {
                module_key: module_key.clone(),
                digest,
                create_time,
                files,
                dep_module_keys: dep_module_keys.to_vec(),
            },
        );
        Ok(module_key)
    }

    /// Points `label` of the module at `commit_id`.
    pub fn label(&self, full_name: &ModuleFullName, label: &str, commit_id: &str) {
        self.state.lock().label_to_commit_id.insert(
            (full_name.clone(), label.to_string()),
            commit_id.to_string(),
        );
    }

    /// Replaces the stored files of a commit without updating its digest.
    pub fn tamper(&self, commit_id: &str, files: Vec<(&str, &str)>) -> Result<(), ModuleError> {
        let files = MemoryBucket::new(
            files
                .into_iter()
                .map(|(path, content)| (path.to_string(), content.to_string())),
        )?;
        let mut state = self.state.lock();
        let commit = state
            .commit_id_to_commit
            .get_mut(commit_id)
            .ok_or_else(|| ModuleError::NotFound(commit_id.to_string()))?;
        commit.files = files;
        Ok(())
    }

    /// Replaces the declared dependencies of a commit without updating its digest.
    pub fn tamper_deps(
        &self,
        commit_id: &str,
        dep_module_keys: Vec<ModuleKey>,
    ) -> Result<(), ModuleError> {
        let mut state = self.state.lock();
        let commit = state
            .commit_id_to_commit
            .get_mut(commit_id)
            .ok_or_else(|| ModuleError::NotFound(commit_id.to_string()))?;
        commit.dep_module_keys = dep_module_keys;
        Ok(())
    }

    pub fn module_data_calls(&self) -> usize {
        self.module_data_calls.load(Ordering::SeqCst)
    }

    pub fn commit_calls(&self) -> usize {
        self.commit_calls.load(Ordering::SeqCst)
    }

    pub fn module_key_calls(&self) -> usize {
        self.module_key_calls.load(Ordering::SeqCst)
    }

    /// Every commit ID requested from the module data provider, in request order.
    pub fn requested_commit_ids(&self) -> Vec<String> {
        self.requested_commit_ids.lock().clone()
    }

    fn get_commit(&self, module_key: &ModuleKey) -> Result<RegistryCommit, ModuleError> {
        let state = self.state.lock();
        state
            .commit_id_to_commit
            .get(module_key.commit_id())
            .filter(|commit| commit.module_key.full_name() == module_key.full_name())
            .cloned()
            .ok_or_else(|| ModuleError::NotFound(module_key.to_string()))
    }

    fn resolve(&self, module_ref: &ModuleRef) -> Result<ModuleKey, ModuleError> {
        let state = self.state.lock();
        let full_name = module_ref.full_name();
        let mut commits = state
            .commit_id_to_commit
            .values()
            .filter(|commit| commit.module_key.full_name() == full_name);
        let found = match module_ref.reference() {
            None => commits.max_by_key(|commit| commit.create_time),
            Some(reference) => {
                let commit_id = state
                    .label_to_commit_id
                    .get(&(full_name.clone(), reference.to_string()))
                    .map(String::as_str)
                    .unwrap_or(reference);
                let digest = ModuleDigest::from_str(reference).ok();
                commits.find(|commit| {
                    commit.module_key.commit_id() == commit_id
                        || digest.as_ref() == Some(&commit.digest)
                })
            },
        };
        found
            .map(|commit| commit.module_key.clone())
            .ok_or_else(|| ModuleError::NotFound(module_ref.to_string()))
    }
}

#[async_trait]
impl ModuleDataProvider for InMemoryRegistry {
    async fn get_module_datas_for_module_keys(
        &self,
        module_keys: &[ModuleKey],
    ) -> Result<Vec<ModuleData>, ModuleError> {
        self.module_data_calls.fetch_add(1, Ordering::SeqCst);
        self.requested_commit_ids
            .lock()
            .extend(module_keys.iter().map(|key| key.commit_id().to_string()));
        module_keys
            .iter()
            .map(|module_key| {
                let commit = self.get_commit(module_key)?;
                let files = commit.files;
                let dep_module_keys = commit.dep_module_keys;
                Ok(ModuleData::new(
                    commit.module_key,
                    move || {
                        let files = files.clone();
                        async move { Ok(files) }
                    },
                    move || {
                        let dep_module_keys = dep_module_keys.clone();
                        async move { Ok(dep_module_keys) }
                    },
                ))
            })
            .collect()
    }
}

#[async_trait]
impl CommitProvider for InMemoryRegistry {
    async fn get_commits_for_module_keys(
        &self,
        module_keys: &[ModuleKey],
    ) -> Result<Vec<Commit>, ModuleError> {
        self.commit_calls.fetch_add(1, Ordering::SeqCst);
        module_keys
            .iter()
            .map(|module_key| {
                let commit = self.get_commit(module_key)?;
                Ok(Commit::new(commit.module_key, commit.create_time))
            })
            .collect()
    }
}

#[async_trait]
impl ModuleKeyProvider for InMemoryRegistry {
    async fn get_module_keys_for_module_refs(
        &self,
        module_refs: &[ModuleRef],
    ) -> Result<Vec<ModuleKey>, ModuleError> {
        self.module_key_calls.fetch_add(1, Ordering::SeqCst);
        module_refs
            .iter()
            .map(|module_ref| self.resolve(module_ref))
            .collect()
    }
}
