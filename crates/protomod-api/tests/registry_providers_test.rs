// Copyright © Aptos Foundation
// SPDX-License-Identifier: Apache-2.0

use async_trait::async_trait;
use bytes::Bytes;
use chrono::{DateTime, TimeZone, Utc};
use claims::{assert_matches, assert_ok};
use parking_lot::Mutex;
use protomod::{
    CommitProvider, LocalModuleOptions, ModuleDataProvider, ModuleDigest, ModuleDigestType,
    ModuleError, ModuleFullName, ModuleKey, ModuleKeyProvider, ModuleRef, ModuleSetBuilder,
    ModuleSetBuilderConfig, RemoteModuleOptions,
};
use protomod_api::{
    ApiBlob, ApiCommit, ApiCommitNode, ApiCommitProvider, ApiModule, ApiModuleDataProvider,
    ApiModuleKeyProvider, ApiOwner, RegistryClient, RegistryProviderConfig,
};
use protomod_cas::{Blob, Bucket, CasError, Digest, Manifest, MemoryBucket};
use std::{collections::BTreeMap, sync::Arc};

#[derive(Clone)]
struct StoredCommit {
    commit: ApiCommit,
    manifest: Manifest,
    dep_commit_ids: Vec<String>,
}

#[derive(Default)]
struct FakeState {
    commits: BTreeMap<(String, String), StoredCommit>,
    modules: BTreeMap<(String, String), ApiModule>,
    owners: BTreeMap<(String, String), ApiOwner>,
    blobs: BTreeMap<(String, Digest), Bytes>,
    drop_last_result: bool,
}

/// A registry client over in-memory state that logs every call as
/// `(method, registry, request size)`.
#[derive(Default)]
struct FakeRegistryClient {
    state: Mutex<FakeState>,
    calls: Mutex<Vec<(String, String, usize)>>,
}

impl FakeRegistryClient {
    /// Stores a commit of `registry/owner/name`. `deps` lists the commit IDs of every
    /// transitive dependency on the same registry.
    fn push(
        &self,
        full_name: &str,
        commit_id: &str,
        create_time_seconds: i64,
        files: Vec<(&str, &str)>,
        deps: &[&str],
    ) -> ModuleKey {
        let full_name: ModuleFullName = full_name.parse().unwrap();
        let registry = full_name.registry().to_string();
        let bucket = MemoryBucket::new(
            files
                .iter()
                .map(|(path, content)| (path.to_string(), content.to_string())),
        )
        .unwrap();
        let manifest = bucket.manifest().unwrap();

        let mut state = self.state.lock();
        let dep_digests: Vec<ModuleDigest> = deps
            .iter()
            .map(|dep| {
                state.commits[&(registry.clone(), dep.to_string())]
                    .commit
                    .digest
                    .clone()
            })
            .collect();
        let digest = ModuleDigest::b5(manifest.digest(), &dep_digests).unwrap();
        for (_, content) in &files {
            let blob = Blob::new(content.to_string());
            state
                .blobs
                .insert((registry.clone(), blob.digest().clone()), blob.content().clone());
        }

        let owner_id = format!("owner-{}", full_name.owner());
        let module_id = format!("module-{}-{}", full_name.owner(), full_name.name());
        state
            .owners
            .insert((registry.clone(), owner_id.clone()), ApiOwner {
                id: owner_id.clone(),
                name: full_name.owner().to_string(),
            });
        state
            .modules
            .entry((registry.clone(), module_id.clone()))
            .or_insert_with(|| ApiModule {
                id: module_id.clone(),
                owner_id: owner_id.clone(),
                name: full_name.name().to_string(),
                deprecated: false,
            });
        state
            .commits
            .insert((registry, commit_id.to_string()), StoredCommit {
                commit: ApiCommit {
                    id: commit_id.to_string(),
                    owner_id,
                    module_id,
                    create_time: time(create_time_seconds),
                    digest: digest.clone(),
                },
                manifest,
                dep_commit_ids: deps.iter().map(|dep| dep.to_string()).collect(),
            });
        ModuleKey::new(full_name, commit_id, digest).unwrap()
    }

    fn deprecate(&self, full_name: &str) {
        let full_name: ModuleFullName = full_name.parse().unwrap();
        let module_id = format!("module-{}-{}", full_name.owner(), full_name.name());
        let mut state = self.state.lock();
        if let Some(module) = state
            .modules
            .get_mut(&(full_name.registry().to_string(), module_id))
        {
            module.deprecated = true;
        }
    }

    /// Replaces the stored content of every blob with `content`.
    fn corrupt_blobs(&self, content: &str) {
        let mut state = self.state.lock();
        for value in state.blobs.values_mut() {
            *value = Bytes::from(content.to_string());
        }
    }

    fn drop_last_result(&self) {
        self.state.lock().drop_last_result = true;
    }

    fn calls(&self, method: &str) -> Vec<(String, usize)> {
        self.calls
            .lock()
            .iter()
            .filter(|(call, _, _)| call == method)
            .map(|(_, registry, size)| (registry.clone(), *size))
            .collect()
    }

    fn record(&self, method: &str, registry: &str, size: usize) {
        self.calls
            .lock()
            .push((method.to_string(), registry.to_string(), size));
    }

    fn commit(&self, registry: &str, commit_id: &str) -> Result<StoredCommit, ModuleError> {
        self.state
            .lock()
            .commits
            .get(&(registry.to_string(), commit_id.to_string()))
            .cloned()
            .ok_or_else(|| ModuleError::NotFound(format!("commit {}", commit_id)))
    }

    fn truncate<T>(&self, mut results: Vec<T>) -> Vec<T> {
        if self.state.lock().drop_last_result {
            results.pop();
        }
        results
    }
}

#[async_trait]
impl RegistryClient for FakeRegistryClient {
    async fn get_commits(
        &self,
        registry: &str,
        commit_ids: &[String],
    ) -> Result<Vec<ApiCommit>, ModuleError> {
        self.record("get_commits", registry, commit_ids.len());
        let commits = commit_ids
            .iter()
            .map(|commit_id| Ok(self.commit(registry, commit_id)?.commit))
            .collect::<Result<Vec<_>, ModuleError>>()?;
        Ok(self.truncate(commits))
    }

    async fn resolve_commits(
        &self,
        registry: &str,
        module_refs: &[ModuleRef],
    ) -> Result<Vec<ApiCommit>, ModuleError> {
        self.record("resolve_commits", registry, module_refs.len());
        let state = self.state.lock();
        let mut commits = Vec::with_capacity(module_refs.len());
        for module_ref in module_refs {
            let full_name = module_ref.full_name();
            let module_id = format!("module-{}-{}", full_name.owner(), full_name.name());
            let mut candidates = state
                .commits
                .iter()
                .filter(|((commit_registry, _), stored)| {
                    commit_registry == registry && stored.commit.module_id == module_id
                })
                .map(|(_, stored)| &stored.commit);
            let commit = match module_ref.reference() {
                None => candidates.max_by_key(|commit| commit.create_time),
                Some(reference) => candidates.find(|commit| commit.id == reference),
            };
            commits.push(
                commit
                    .cloned()
                    .ok_or_else(|| ModuleError::NotFound(module_ref.to_string()))?,
            );
        }
        drop(state);
        Ok(self.truncate(commits))
    }

    async fn get_commit_nodes(
        &self,
        registry: &str,
        commit_ids: &[String],
        digest_type: ModuleDigestType,
    ) -> Result<Vec<ApiCommitNode>, ModuleError> {
        assert_eq!(digest_type, ModuleDigestType::B5);
        self.record("get_commit_nodes", registry, commit_ids.len());
        let mut nodes = Vec::with_capacity(commit_ids.len());
        for commit_id in commit_ids {
            let stored = self.commit(registry, commit_id)?;
            let dep_commits = stored
                .dep_commit_ids
                .iter()
                .map(|dep| Ok(self.commit(registry, dep)?.commit))
                .collect::<Result<Vec<_>, ModuleError>>()?;
            nodes.push(ApiCommitNode {
                commit: stored.commit,
                manifest: stored.manifest,
                dep_commits,
            });
        }
        Ok(self.truncate(nodes))
    }

    async fn get_blobs(
        &self,
        registry: &str,
        digests: &[Digest],
    ) -> Result<Vec<ApiBlob>, ModuleError> {
        self.record("get_blobs", registry, digests.len());
        let state = self.state.lock();
        digests
            .iter()
            .map(|digest| {
                state
                    .blobs
                    .get(&(registry.to_string(), digest.clone()))
                    .map(|content| ApiBlob {
                        digest: digest.clone(),
                        content: content.clone(),
                    })
                    .ok_or_else(|| ModuleError::NotFound(format!("blob {}", digest)))
            })
            .collect()
    }

    async fn get_modules(
        &self,
        registry: &str,
        module_ids: &[String],
    ) -> Result<Vec<ApiModule>, ModuleError> {
        self.record("get_modules", registry, module_ids.len());
        let state = self.state.lock();
        module_ids
            .iter()
            .map(|module_id| {
                state
                    .modules
                    .get(&(registry.to_string(), module_id.clone()))
                    .cloned()
                    .ok_or_else(|| ModuleError::NotFound(format!("module {}", module_id)))
            })
            .collect()
    }

    async fn get_owners(
        &self,
        registry: &str,
        owner_ids: &[String],
    ) -> Result<Vec<ApiOwner>, ModuleError> {
        self.record("get_owners", registry, owner_ids.len());
        let state = self.state.lock();
        owner_ids
            .iter()
            .map(|owner_id| {
                state
                    .owners
                    .get(&(registry.to_string(), owner_id.clone()))
                    .cloned()
                    .ok_or_else(|| ModuleError::NotFound(format!("owner {}", owner_id)))
            })
            .collect()
    }
}

fn time(seconds: i64) -> DateTime<Utc> {
    Utc.timestamp_opt(seconds, 0).unwrap()
}

fn config(max_batch_size: usize) -> RegistryProviderConfig {
    RegistryProviderConfig {
        max_batch_size,
        ..Default::default()
    }
}

fn data_provider(client: &Arc<FakeRegistryClient>) -> ApiModuleDataProvider {
    ApiModuleDataProvider::new(client.clone(), RegistryProviderConfig::default()).unwrap()
}

#[tokio::test]
async fn test_zero_batch_size_is_rejected() {
    let client = Arc::new(FakeRegistryClient::default());
    let error = ApiModuleDataProvider::new(client, config(0)).err().unwrap();
    assert_matches!(error, ModuleError::MalformedInput(_));
}

#[tokio::test]
async fn test_module_data_requests_are_chunked_per_registry() {
    let client = Arc::new(FakeRegistryClient::default());
    let mut keys: Vec<ModuleKey> = (0..600)
        .map(|i| {
            client.push(
                "buf.build/acme/big",
                &format!("c{:03}", i),
                i,
                vec![("big.proto", "syntax = \"proto3\";")],
                &[],
            )
        })
        .collect();
    let other = client.push(
        "other.dev/team/small",
        "s1",
        0,
        vec![("small.proto", "syntax = \"proto3\";")],
        &[],
    );
    keys.insert(300, other);

    let module_datas = data_provider(&client)
        .get_module_datas_for_module_keys(&keys)
        .await
        .unwrap();

    let returned: Vec<&str> = module_datas
        .iter()
        .map(|module_data| module_data.module_key().commit_id())
        .collect();
    let requested: Vec<&str> = keys.iter().map(|key| key.commit_id()).collect();
    assert_eq!(returned, requested);
    assert_eq!(
        module_datas[300].module_key().full_name().to_string(),
        "other.dev/team/small"
    );
    assert_eq!(client.calls("get_commit_nodes"), vec![
        ("buf.build".to_string(), 250),
        ("buf.build".to_string(), 250),
        ("buf.build".to_string(), 100),
        ("other.dev".to_string(), 1),
    ]);
    // One module per registry, so names resolve with a single lookup each.
    assert_eq!(client.calls("get_modules").len(), 2);
    assert!(client.calls("get_blobs").is_empty());
}

#[tokio::test]
async fn test_unknown_commit_fails_the_whole_request() {
    let client = Arc::new(FakeRegistryClient::default());
    let known = client.push("buf.build/acme/a", "a1", 0, vec![("a.proto", "a")], &[]);
    let unknown = ModuleKey::new(
        "buf.build/acme/b".parse().unwrap(),
        "missing",
        known.digest().await.unwrap(),
    )
    .unwrap();

    let error = data_provider(&client)
        .get_module_datas_for_module_keys(&[known, unknown])
        .await
        .err()
        .unwrap();
    assert!(error.is_not_found());
}

#[tokio::test]
async fn test_result_count_mismatch_is_a_system_error() {
    let client = Arc::new(FakeRegistryClient::default());
    let a = client.push("buf.build/acme/a", "a1", 0, vec![("a.proto", "a")], &[]);
    let b = client.push("buf.build/acme/b", "b1", 0, vec![("b.proto", "b")], &[]);
    client.drop_last_result();

    let error = data_provider(&client)
        .get_module_datas_for_module_keys(&[a.clone(), b.clone()])
        .await
        .err()
        .unwrap();
    assert!(error.is_system());

    let commit_provider =
        ApiCommitProvider::new(client.clone(), RegistryProviderConfig::default()).unwrap();
    let error = commit_provider
        .get_commits_for_module_keys(&[a, b])
        .await
        .err()
        .unwrap();
    assert!(error.is_system());
}

#[tokio::test]
async fn test_files_are_downloaded_lazily_and_once() {
    let client = Arc::new(FakeRegistryClient::default());
    let key = client.push(
        "buf.build/acme/files",
        "f1",
        0,
        vec![
            ("a.proto", "message A {}"),
            ("b.proto", "message B {}"),
            ("copy/a.proto", "message A {}"),
        ],
        &[],
    );
    let provider = ApiModuleDataProvider::new(client.clone(), config(1)).unwrap();
    let module_datas = provider
        .get_module_datas_for_module_keys(&[key])
        .await
        .unwrap();
    let bucket = Bucket::from(module_datas[0].bucket().clone());
    assert!(client.calls("get_blobs").is_empty());
    assert!(!module_datas[0].bucket().is_fetched());

    let object = bucket.get("copy/a.proto").await.unwrap();
    assert_eq!(object.content().as_ref(), b"message A {}");
    assert_eq!(bucket.paths().await.unwrap(), vec![
        "a.proto",
        "b.proto",
        "copy/a.proto"
    ]);
    assert_ok!(bucket.get("b.proto").await);

    // Two distinct blobs, one per request at a batch size of one.
    assert_eq!(client.calls("get_blobs"), vec![
        ("buf.build".to_string(), 1),
        ("buf.build".to_string(), 1),
    ]);
    assert_eq!(module_datas[0].bucket().fetch_count(), 1);
}

#[tokio::test]
async fn test_corrupted_blob_is_rejected() {
    let client = Arc::new(FakeRegistryClient::default());
    let key = client.push("buf.build/acme/a", "a1", 0, vec![("a.proto", "a")], &[]);
    client.corrupt_blobs("not a");

    let module_datas = data_provider(&client)
        .get_module_datas_for_module_keys(&[key])
        .await
        .unwrap();
    let error = Bucket::from(module_datas[0].bucket().clone())
        .get("a.proto")
        .await
        .unwrap_err();
    assert_matches!(error, CasError::DigestMismatch { .. });
}

#[tokio::test]
async fn test_deprecated_modules_still_resolve() {
    let client = Arc::new(FakeRegistryClient::default());
    let base = client.push("buf.build/acme/base", "b1", 0, vec![("base.proto", "b")], &[]);
    let app = client.push("buf.build/acme/app", "a1", 0, vec![("app.proto", "a")], &["b1"]);
    client.deprecate("buf.build/acme/app");

    let module_datas = data_provider(&client)
        .get_module_datas_for_module_keys(&[app.clone()])
        .await
        .unwrap();
    assert_eq!(module_datas[0].module_key().to_string(), app.to_string());
    let deps = module_datas[0].declared_dep_module_keys().await.unwrap();
    assert_eq!(deps.len(), 1);
    assert_eq!(deps[0].to_string(), base.to_string());
    assert_eq!(deps[0].digest().await.unwrap(), base.digest().await.unwrap());
}

#[tokio::test]
async fn test_commit_provider() {
    let client = Arc::new(FakeRegistryClient::default());
    let a = client.push("buf.build/acme/a", "a1", 100, vec![("a.proto", "a")], &[]);
    let b = client.push("other.dev/team/b", "b1", 200, vec![("b.proto", "b")], &[]);
    let c = client.push("buf.build/acme/c", "c1", 300, vec![("c.proto", "c")], &[]);

    let provider = ApiCommitProvider::new(client.clone(), config(1)).unwrap();
    let commits = provider
        .get_commits_for_module_keys(&[a.clone(), b.clone(), c.clone()])
        .await
        .unwrap();
    let keys: Vec<String> = commits
        .iter()
        .map(|commit| commit.module_key().to_string())
        .collect();
    assert_eq!(keys, vec![a.to_string(), b.to_string(), c.to_string()]);
    let mut create_times = Vec::new();
    for commit in &commits {
        create_times.push(commit.create_time().await.unwrap());
    }
    assert_eq!(create_times, vec![time(100), time(200), time(300)]);
    assert_eq!(client.calls("get_commits"), vec![
        ("buf.build".to_string(), 1),
        ("buf.build".to_string(), 1),
        ("other.dev".to_string(), 1),
    ]);
}

#[tokio::test]
async fn test_module_key_provider() {
    let client = Arc::new(FakeRegistryClient::default());
    let old = client.push("buf.build/acme/a", "a1", 100, vec![("a.proto", "old")], &[]);
    let new = client.push("buf.build/acme/a", "a2", 200, vec![("a.proto", "new")], &[]);

    let provider =
        ApiModuleKeyProvider::new(client.clone(), RegistryProviderConfig::default()).unwrap();
    let refs: Vec<ModuleRef> = vec![
        "buf.build/acme/a".parse().unwrap(),
        "buf.build/acme/a:a1".parse().unwrap(),
    ];
    let keys = provider
        .get_module_keys_for_module_refs(&refs)
        .await
        .unwrap();
    let keys: Vec<String> = keys.iter().map(ModuleKey::to_string).collect();
    assert_eq!(keys, vec![new.to_string(), old.to_string()]);

    let missing: ModuleRef = "buf.build/acme/a:nope".parse().unwrap();
    let error = provider
        .get_module_keys_for_module_refs(&[missing])
        .await
        .err()
        .unwrap();
    assert!(error.is_not_found());
}

#[tokio::test]
async fn test_build_with_registry_providers() {
    let client = Arc::new(FakeRegistryClient::default());
    client.push(
        "buf.build/acme/base",
        "b1",
        100,
        vec![("acme/base/v1/base.proto", "syntax = \"proto3\";\npackage acme.base.v1;\n")],
        &[],
    );
    let units = client.push(
        "buf.build/acme/units",
        "u1",
        100,
        vec![(
            "acme/units/v1/units.proto",
            "syntax = \"proto3\";\nimport \"acme/base/v1/base.proto\";\n",
        )],
        &["b1"],
    );

    let data_provider = Arc::new(data_provider(&client));
    let commit_provider = Arc::new(
        ApiCommitProvider::new(client.clone(), RegistryProviderConfig::default()).unwrap(),
    );
    let mut builder = ModuleSetBuilder::new(
        ModuleSetBuilderConfig::default(),
        data_provider.clone(),
        commit_provider,
    );
    let declared = data_provider
        .get_module_datas_for_module_keys(&[units.clone()])
        .await
        .unwrap()[0]
        .declared_dep_module_keys()
        .await
        .unwrap();
    builder
        .add_local_module(
            MemoryBucket::new(vec![(
                "app/v1/app.proto",
                "syntax = \"proto3\";\nimport \"acme/units/v1/units.proto\";\n",
            )])
            .unwrap(),
            "app",
            true,
            LocalModuleOptions::default(),
        )
        .unwrap()
        .add_remote_module(units, false, RemoteModuleOptions::default())
        .unwrap();
    for key in declared {
        builder
            .add_remote_module(key, false, RemoteModuleOptions::default())
            .unwrap();
    }
    let module_set = builder.build().await.unwrap();

    let app = module_set.get_module_for_opaque_id("app").unwrap();
    let deps: Vec<(String, bool)> = app
        .dep_modules()
        .unwrap()
        .iter()
        .map(|dep| (dep.module().opaque_id().to_string(), dep.is_direct()))
        .collect();
    assert_eq!(deps, vec![
        ("buf.build/acme/base".to_string(), false),
        ("buf.build/acme/units".to_string(), true),
    ]);
    // Verification downloaded both remote modules, once each.
    assert_eq!(client.calls("get_blobs").len(), 2);
}
