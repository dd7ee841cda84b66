// Copyright © Aptos Foundation
// SPDX-License-Identifier: Apache-2.0

use once_cell::sync::Lazy;
use prometheus::{register_int_counter_vec, IntCounterVec};

/// Provider calls made, by provider kind and registry
pub static PROVIDER_CALLS: Lazy<IntCounterVec> = Lazy::new(|| {
    register_int_counter_vec!(
        "protomod_provider_calls",
        "Number of provider calls made, by provider kind and registry",
        &["kind", "registry"]
    )
    .unwrap()
});

/// Keys requested from providers, by provider kind and registry
pub static PROVIDER_KEYS_REQUESTED: Lazy<IntCounterVec> = Lazy::new(|| {
    register_int_counter_vec!(
        "protomod_provider_keys_requested",
        "Number of keys requested from providers, by provider kind and registry",
        &["kind", "registry"]
    )
    .unwrap()
});

/// Module set builds, by outcome
pub static BUILDS: Lazy<IntCounterVec> = Lazy::new(|| {
    register_int_counter_vec!(
        "protomod_module_set_builds",
        "Number of module set builds, by outcome",
        &["outcome"]
    )
    .unwrap()
});

/// Duplicate module resolutions, by the rule that selected the winner
pub static RESOLUTIONS: Lazy<IntCounterVec> = Lazy::new(|| {
    register_int_counter_vec!(
        "protomod_module_resolutions",
        "Number of duplicate module groups resolved, by selection rule",
        &["rule"]
    )
    .unwrap()
});

/// Uncached per-path computations, by kind
pub static CACHE_COMPUTATIONS: Lazy<IntCounterVec> = Lazy::new(|| {
    register_int_counter_vec!(
        "protomod_cache_computations",
        "Number of per-path cache computations, by kind",
        &["kind"]
    )
    .unwrap()
});

/// Digest verification failures of remote modules
pub static VERIFICATION_FAILURES: Lazy<IntCounterVec> = Lazy::new(|| {
    register_int_counter_vec!(
        "protomod_verification_failures",
        "Number of remote module digest verification failures, by stage",
        &["stage"]
    )
    .unwrap()
});
