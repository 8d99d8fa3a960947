//! Bundle building primitives
//!
//! Edges, deterministic ordering and the bundle hash. Packing calls these in
//! a fixed order: sort nodes, build edges, hash.

use crate::provider::{FsSourceReader, SourceReader};
use ctxpack_core::hash::{file_hash, prefixed_digest, BUNDLE_HASH_PREFIX};
use ctxpack_core::path::normalize_key;
use ctxpack_core::{BundleNode, Contract, BUNDLE_SCHEMA_VERSION};
use ctxpack_graph::{resolve_dependency, ProjectManifest};
use std::collections::{BTreeSet, HashSet};
use std::path::Path;

/// Edges between nodes of the set, as sorted, de-duplicated `[from, to]`
/// pairs. References that resolve outside the set produce no edge.
pub fn build_edges(nodes: &[BundleNode], manifest: &ProjectManifest) -> Vec<[String; 2]> {
    let members: HashSet<String> = nodes.iter().map(|n| normalize_key(&n.entry_id)).collect();
    let mut edges: BTreeSet<[String; 2]> = BTreeSet::new();

    for node in nodes {
        let from = normalize_key(&node.entry_id);
        let Some(component) = manifest_node(manifest, &from) else {
            continue;
        };

        for dep in &component.dependencies {
            let Some(target) = resolve_dependency(manifest, dep, &from) else {
                continue;
            };
            let target = normalize_key(&target);
            if target != from && members.contains(&target) {
                edges.insert([from.clone(), target]);
            }
        }
    }

    edges.into_iter().collect()
}

fn manifest_node<'a>(manifest: &'a ProjectManifest, key: &str) -> Option<&'a ctxpack_graph::ComponentNode> {
    manifest.get(key).or_else(|| manifest.get(&normalize_key(key)))
}

/// Sort nodes by entry id
pub fn stable_sort(nodes: &mut [BundleNode]) {
    nodes.sort_by(|a, b| a.entry_id.cmp(&b.entry_id));
}

/// Bundle hash over `{schemaVersion, depth, nodes: [{entryId, semanticHash}]}`.
///
/// Order-sensitive: sort with [`stable_sort`] first.
pub fn compute_bundle_hash(nodes: &[BundleNode], depth: usize) -> String {
    let nodes: Vec<serde_json::Value> = nodes
        .iter()
        .map(|n| {
            serde_json::json!({
                "entryId": normalize_key(&n.entry_id),
                "semanticHash": n.contract.semantic_hash,
            })
        })
        .collect();

    let canonical = serde_json::json!({
        "schemaVersion": BUNDLE_SCHEMA_VERSION,
        "depth": depth,
        "nodes": nodes,
    });

    prefixed_digest(BUNDLE_HASH_PREFIX, canonical.to_string().as_bytes())
}

/// Whether a contract still matches the source at `project_root/entry_key`.
///
/// Read failures count as a mismatch.
pub async fn validate_hash_lock(contract: &Contract, entry_key: &str, project_root: &Path) -> bool {
    validate_hash_lock_with(&FsSourceReader, contract, entry_key, project_root).await
}

/// [`validate_hash_lock`] through an arbitrary source reader
pub async fn validate_hash_lock_with(
    reader: &dyn SourceReader,
    contract: &Contract,
    entry_key: &str,
    project_root: &Path,
) -> bool {
    match reader.read_full(entry_key, project_root).await {
        Ok(source) => file_hash(&source) == contract.file_hash,
        Err(e) => {
            tracing::debug!(entry = entry_key, error = %e, "Hash-lock read failed");
            false
        }
    }
}
