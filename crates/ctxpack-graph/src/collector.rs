//! Bounded dependency collection
//!
//! Breadth-first traversal from one entry, level by level, bounded by depth
//! and node count. Unresolvable references are reported, not fatal.

use crate::manifest::ProjectManifest;
use crate::resolver::{resolve_dependency, resolve_key};
use ctxpack_core::path::is_package_specifier;
use ctxpack_core::MissingDependency;
use std::collections::{BTreeMap, BTreeSet, HashSet};

/// Reason recorded when the entry itself does not resolve
pub const REASON_ENTRY_NOT_FOUND: &str = "entry not found in project";

/// Reason recorded for third-party package references
pub const REASON_EXTERNAL: &str = "external package";

/// Reason recorded for references that match nothing in the project
pub const REASON_UNRESOLVED: &str = "no matching component in project";

/// Result of a collection
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Collected {
    /// Visited keys in visit order (entry first)
    pub visited: Vec<String>,

    /// Unresolved references, deduplicated by (name, referenced_by)
    pub missing: Vec<MissingDependency>,

    /// First node that referenced each visited key (absent for the entry)
    pub referrers: BTreeMap<String, String>,

    /// Whether the node cap stopped the traversal from admitting a node
    pub truncated: bool,
}

impl Collected {
    /// Whether `key` was visited
    pub fn contains(&self, key: &str) -> bool {
        self.visited.iter().any(|k| k == key)
    }

    /// The resolved entry key, if the entry resolved
    pub fn entry(&self) -> Option<&str> {
        self.visited.first().map(String::as_str)
    }
}

/// Collect everything reachable from `entry` within `depth` levels, admitting
/// at most `max_nodes` nodes (the entry included).
pub fn collect(entry: &str, manifest: &ProjectManifest, depth: usize, max_nodes: usize) -> Collected {
    let Some(entry_key) = resolve_key(manifest, entry) else {
        let reason = if is_package_specifier(entry) {
            REASON_EXTERNAL
        } else {
            REASON_ENTRY_NOT_FOUND
        };
        tracing::debug!(entry, reason, "Entry did not resolve");
        return Collected {
            visited: Vec::new(),
            missing: vec![MissingDependency::new(entry, reason, entry)],
            ..Collected::default()
        };
    };

    let mut collected = Collected::default();
    if max_nodes == 0 {
        collected.truncated = true;
        return collected;
    }

    let mut seen: HashSet<String> = HashSet::new();
    let mut missing_seen: BTreeSet<(String, String)> = BTreeSet::new();

    seen.insert(entry_key.clone());
    collected.visited.push(entry_key.clone());
    let mut frontier = vec![entry_key];

    for _level in 0..depth {
        if frontier.is_empty() {
            break;
        }

        let mut next = Vec::new();

        for key in &frontier {
            let Some(node) = manifest.get(key) else {
                continue;
            };

            for dep in &node.dependencies {
                match resolve_dependency(manifest, dep, key) {
                    Some(target) => {
                        if seen.contains(&target) {
                            continue;
                        }
                        if collected.visited.len() >= max_nodes {
                            collected.truncated = true;
                            continue;
                        }
                        seen.insert(target.clone());
                        collected.referrers.insert(target.clone(), key.clone());
                        collected.visited.push(target.clone());
                        next.push(target);
                    }
                    None => {
                        if node.helpers.iter().any(|h| h == dep) {
                            continue;
                        }
                        if !missing_seen.insert((dep.clone(), key.clone())) {
                            continue;
                        }
                        let reason = if is_package_specifier(dep) {
                            REASON_EXTERNAL
                        } else {
                            REASON_UNRESOLVED
                        };
                        collected.missing.push(MissingDependency::new(dep, reason, key));
                    }
                }
            }
        }

        frontier = next;
    }

    if collected.truncated {
        tracing::debug!(
            entry,
            max_nodes,
            "Node cap reached, traversal truncated"
        );
    }

    collected
}
