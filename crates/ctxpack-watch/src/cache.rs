//! Session cache for incremental regeneration
//!
//! The cache holds everything the last successful regeneration produced:
//! the manifest, the contracts it was built from, and the bundles packed
//! from it. It is owned by the session and only touched while the session's
//! in-flight guard is held.

use ctxpack_core::path::normalize_key;
use ctxpack_core::{Bundle, Contract};
use ctxpack_graph::ProjectManifest;
use std::collections::{BTreeMap, BTreeSet};
use std::time::Instant;

/// State of the last successful regeneration
///
/// ## Usage
///
/// ```rust,ignore
/// let mut cache = WatchCache::new(manifest, contracts, bundles);
///
/// // Patch the graph after a change
/// cache.apply_contract("src/Button.tsx", Some(contract));
/// cache.manifest.relink();
///
/// // Bundles that need re-packing
/// let stale = cache.affected_roots(&changed);
/// ```
#[derive(Debug, Clone)]
pub struct WatchCache {
    /// Project graph
    pub manifest: ProjectManifest,

    /// Contracts by entry id
    pub contracts: BTreeMap<String, Contract>,

    /// Bundles by root entry id
    pub bundles: BTreeMap<String, Bundle>,

    /// When the cache was last reseeded by a full rebuild
    pub built_at: Instant,
}

impl WatchCache {
    /// Seed a cache from a full rebuild
    pub fn new(
        manifest: ProjectManifest,
        contracts: BTreeMap<String, Contract>,
        bundles: BTreeMap<String, Bundle>,
    ) -> Self {
        Self {
            manifest,
            contracts,
            bundles,
            built_at: Instant::now(),
        }
    }

    /// Replace or remove one entry's contract and manifest node.
    ///
    /// The manifest's usage edges are stale until relinked.
    pub fn apply_contract(&mut self, entry_id: &str, contract: Option<Contract>) {
        let key = normalize_key(entry_id);
        match contract {
            Some(contract) => {
                self.manifest.upsert(&contract);
                self.contracts.insert(key, contract);
            }
            None => {
                self.manifest.remove(&key);
                self.contracts.remove(&key);
            }
        }
    }

    /// Drop bundles whose entry is no longer a root, returning their ids
    pub fn drop_non_roots(&mut self) -> Vec<String> {
        let roots: BTreeSet<&String> = self.manifest.roots().iter().collect();
        let dropped: Vec<String> = self
            .bundles
            .keys()
            .filter(|id| !roots.contains(id))
            .cloned()
            .collect();

        for id in &dropped {
            self.bundles.remove(id);
        }
        dropped
    }

    /// Roots that must be (re-)packed after `changed` entries changed: roots
    /// without a bundle, and roots whose bundle contains a changed entry or a
    /// direct user of one.
    pub fn affected_roots(&self, changed: &BTreeSet<String>) -> Vec<String> {
        let mut affected: BTreeSet<String> = changed.clone();
        for key in changed {
            if let Some(node) = self.manifest.get(key) {
                affected.extend(node.used_by.iter().cloned());
            }
        }

        self.manifest
            .roots()
            .iter()
            .filter(|root| match self.bundles.get(*root) {
                None => true,
                Some(bundle) => bundle.touches(affected.iter()),
            })
            .cloned()
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ctxpack_core::{BundleGraph, BundleMeta, BundleNode, Composition};

    fn contract(entry: &str, components: &[&str]) -> Contract {
        Contract::new(entry, "uif:s", "uif:f").with_composition(Composition {
            components: components.iter().map(|s| s.to_string()).collect(),
            ..Composition::default()
        })
    }

    fn bundle(entry: &str, nodes: &[&str]) -> Bundle {
        Bundle {
            entry_id: entry.to_string(),
            depth: 2,
            bundle_hash: "uifb:test".into(),
            graph: BundleGraph {
                nodes: nodes.iter().map(|n| BundleNode::new(Contract::new(*n, "uif:s", "uif:f"))).collect(),
                edges: Vec::new(),
            },
            meta: BundleMeta::default(),
        }
    }

    fn cache() -> WatchCache {
        let contracts = vec![
            contract("App.tsx", &["Card"]),
            contract("Card.tsx", &[]),
            contract("Other.tsx", &[]),
        ];
        let manifest = ProjectManifest::from_contracts(&contracts);
        let contracts = contracts.into_iter().map(|c| (c.entry_id.clone(), c)).collect();
        let bundles = [
            ("App.tsx".to_string(), bundle("App.tsx", &["App.tsx", "Card.tsx"])),
            ("Other.tsx".to_string(), bundle("Other.tsx", &["Other.tsx"])),
        ]
        .into_iter()
        .collect();
        WatchCache::new(manifest, contracts, bundles)
    }

    #[test]
    fn affected_roots_follow_membership() {
        let cache = cache();
        let changed: BTreeSet<String> = ["Card.tsx".to_string()].into_iter().collect();
        assert_eq!(cache.affected_roots(&changed), vec!["App.tsx"]);

        let changed: BTreeSet<String> = ["Unrelated.ts".to_string()].into_iter().collect();
        assert!(cache.affected_roots(&changed).is_empty());
    }

    #[test]
    fn new_dependency_marks_its_user() {
        let mut cache = cache();
        cache.apply_contract("Other.tsx", Some(contract("Other.tsx", &["Badge"])));
        cache.apply_contract("Badge.tsx", Some(contract("Badge.tsx", &[])));
        cache.manifest.relink();

        let changed: BTreeSet<String> = ["Badge.tsx".to_string()].into_iter().collect();
        assert_eq!(cache.affected_roots(&changed), vec!["Other.tsx"]);
    }

    #[test]
    fn removal_promotes_and_drops_roots() {
        let mut cache = cache();
        cache.apply_contract("App.tsx", None);
        cache.manifest.relink();

        assert_eq!(cache.drop_non_roots(), vec!["App.tsx"]);
        // Card is a root now and has no bundle yet
        let changed: BTreeSet<String> = ["App.tsx".to_string()].into_iter().collect();
        assert_eq!(cache.affected_roots(&changed), vec!["Card.tsx"]);
    }
}
