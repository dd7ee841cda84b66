// Copyright © Aptos Foundation
// SPDX-License-Identifier: Apache-2.0

use protomod::{metrics, ModuleError};
use std::collections::BTreeMap;

/// Groups `items` by registry, keeping each item's position in the input.
pub(crate) fn group_by_registry<'a, T>(
    items: &'a [T],
    registry: impl Fn(&T) -> &str,
) -> BTreeMap<String, Vec<(usize, &'a T)>> {
    let mut registry_to_items: BTreeMap<String, Vec<(usize, &'a T)>> = BTreeMap::new();
    for (index, item) in items.iter().enumerate() {
        registry_to_items
            .entry(registry(item).to_string())
            .or_default()
            .push((index, item));
    }
    registry_to_items
}

/// Collects per-position results into an input-ordered vector.
pub(crate) fn collect_positional<T>(
    kind: &str,
    results: Vec<Option<T>>,
) -> Result<Vec<T>, ModuleError> {
    results
        .into_iter()
        .enumerate()
        .map(|(index, result)| {
            result.ok_or_else(|| {
                ModuleError::System(format!("no {} result for position {}", kind, index))
            })
        })
        .collect()
}

pub(crate) fn record_call(kind: &str, registry: &str, keys: usize) {
    metrics::PROVIDER_CALLS
        .with_label_values(&[kind, registry])
        .inc();
    metrics::PROVIDER_KEYS_REQUESTED
        .with_label_values(&[kind, registry])
        .inc_by(keys as u64);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_group_by_registry_keeps_positions() {
        let items = vec!["a.com/x", "b.com/y", "a.com/z"];
        let groups = group_by_registry(&items, |item| item.split('/').next().unwrap());
        let a: Vec<usize> = groups["a.com"].iter().map(|(index, _)| *index).collect();
        let b: Vec<usize> = groups["b.com"].iter().map(|(index, _)| *index).collect();
        assert_eq!(a, vec![0, 2]);
        assert_eq!(b, vec![1]);
    }

    #[test]
    fn test_collect_positional() {
        assert_eq!(
            collect_positional("x", vec![Some(1), Some(2)]).unwrap(),
            vec![1, 2]
        );
        assert!(collect_positional("x", vec![Some(1), None]).unwrap_err().is_system());
    }
}
