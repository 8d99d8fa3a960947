//! Project manifest
//!
//! The manifest is the project-wide graph: one node per contract, with raw
//! dependency references, resolved usage edges, and the derived root and
//! leaf sets. It is built fresh on full builds and patched in place on
//! incremental ones.

use crate::resolver::resolve_dependency;
use ctxpack_core::path::{file_name, file_stem, normalize_key, parent_dir};
use ctxpack_core::Contract;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;

/// A component in the manifest
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ComponentNode {
    /// Canonical entry id (same as the map key)
    pub entry_id: String,

    /// Description copied from the contract
    #[serde(default)]
    pub description: String,

    /// Raw dependency references, sorted
    #[serde(default)]
    pub dependencies: Vec<String>,

    /// Entries whose dependencies resolve to this one, sorted
    #[serde(default)]
    pub used_by: Vec<String>,

    /// Semantic hash copied from the contract
    pub semantic_hash: String,

    /// Same-file internal helper names (never reported as missing)
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub helpers: Vec<String>,
}

impl ComponentNode {
    /// Build a node from a contract (usage edges are filled in by relinking)
    pub fn from_contract(contract: &Contract) -> Self {
        Self {
            entry_id: normalize_key(&contract.entry_id),
            description: contract.description.clone(),
            dependencies: contract.dependency_refs(),
            used_by: Vec::new(),
            semantic_hash: contract.semantic_hash.clone(),
            helpers: contract.internal_helpers(),
        }
    }
}

/// Derived entry points and terminal nodes
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ManifestGraph {
    /// Entries nobody uses (bundle entry points)
    pub roots: Vec<String>,

    /// Entries that use nothing inside the project
    pub leaves: Vec<String>,
}

/// Project-wide component graph
///
/// Keys are always canonical: every insertion path normalizes them, so
/// lookups never need to scan.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProjectManifest {
    /// Components keyed by canonical entry id
    components: BTreeMap<String, ComponentNode>,

    /// Roots and leaves
    #[serde(default)]
    pub graph: ManifestGraph,

    /// Name search index: file stem (and directory name for `index` files)
    /// to matching keys, sorted
    #[serde(skip)]
    names: BTreeMap<String, Vec<String>>,
}

/// Names a key answers to in a bare-name search
fn search_names(key: &str) -> impl Iterator<Item = &str> {
    let stem = file_stem(key);
    let dir_name = if stem == "index" { file_name(parent_dir(key)) } else { "" };
    std::iter::once(stem).chain((!dir_name.is_empty()).then_some(dir_name))
}

impl ProjectManifest {
    /// Build a manifest from a full contract set
    pub fn from_contracts<'a>(contracts: impl IntoIterator<Item = &'a Contract>) -> Self {
        let mut manifest = Self::default();
        for contract in contracts {
            manifest.upsert(contract);
        }
        manifest.relink();
        manifest
    }

    /// Build a manifest directly from nodes
    pub fn from_nodes(nodes: impl IntoIterator<Item = ComponentNode>) -> Self {
        let mut manifest = Self::default();
        for node in nodes {
            manifest.insert_node(node);
        }
        manifest.relink();
        manifest
    }

    /// Load a persisted manifest
    pub fn from_file(path: &Path) -> Result<Self, ManifestError> {
        let contents = std::fs::read_to_string(path)
            .map_err(|e| ManifestError::IoError(path.display().to_string(), e.to_string()))?;

        Self::from_json(&contents)
    }

    /// Parse a manifest from JSON
    ///
    /// Keys are re-normalized and edges recomputed, so hand-written or
    /// foreign manifests behave like built ones.
    pub fn from_json(json: &str) -> Result<Self, ManifestError> {
        let parsed: Self = serde_json::from_str(json).map_err(|e| ManifestError::ParseError(e.to_string()))?;
        Ok(Self::from_nodes(parsed.components.into_values()))
    }

    /// Insert or replace the node for a contract.
    ///
    /// Usage edges and roots/leaves are stale until [`relink`](Self::relink).
    pub fn upsert(&mut self, contract: &Contract) {
        self.insert_node(ComponentNode::from_contract(contract));
    }

    /// Remove a node. Usage edges are stale until relinked.
    pub fn remove(&mut self, entry_id: &str) -> Option<ComponentNode> {
        let key = normalize_key(entry_id);
        let removed = self.components.remove(&key)?;
        self.unindex(&key);
        Some(removed)
    }

    fn insert_node(&mut self, mut node: ComponentNode) {
        node.entry_id = normalize_key(&node.entry_id);
        let key = node.entry_id.clone();
        if self.components.insert(key.clone(), node).is_none() {
            self.index(&key);
        }
    }

    fn index(&mut self, key: &str) {
        for name in search_names(key) {
            let keys = self.names.entry(name.to_string()).or_default();
            if let Err(pos) = keys.binary_search_by(|k| k.as_str().cmp(key)) {
                keys.insert(pos, key.to_string());
            }
        }
    }

    fn unindex(&mut self, key: &str) {
        for name in search_names(key) {
            if let Some(keys) = self.names.get_mut(name) {
                keys.retain(|k| k != key);
                if keys.is_empty() {
                    self.names.remove(name);
                }
            }
        }
    }

    /// First key, in lexicographic order, whose stem is `name` or which is
    /// the `index` file of a directory called `name`
    pub fn first_named(&self, name: &str) -> Option<&String> {
        self.names.get(name).and_then(|keys| keys.first())
    }

    /// Whether `key` is present
    pub fn contains_key(&self, key: &str) -> bool {
        self.components.contains_key(key)
    }

    /// Recompute usage edges, roots and leaves from raw dependencies
    pub fn relink(&mut self) {
        let mut used_by: BTreeMap<String, BTreeSet<String>> = BTreeMap::new();
        let mut has_internal_deps: BTreeSet<String> = BTreeSet::new();

        for (key, node) in &self.components {
            for dep in &node.dependencies {
                let Some(target) = resolve_dependency(self, dep, key) else {
                    continue;
                };
                if &target == key {
                    continue;
                }
                has_internal_deps.insert(key.clone());
                used_by.entry(target).or_default().insert(key.clone());
            }
        }

        let mut roots = Vec::new();
        let mut leaves = Vec::new();

        for (key, node) in self.components.iter_mut() {
            node.used_by = used_by
                .remove(key)
                .map(|users| users.into_iter().collect())
                .unwrap_or_default();

            if node.used_by.is_empty() {
                roots.push(key.clone());
            }
            if !has_internal_deps.contains(key) {
                leaves.push(key.clone());
            }
        }

        self.graph = ManifestGraph { roots, leaves };
    }

    /// Get a node by exact key
    pub fn get(&self, entry_id: &str) -> Option<&ComponentNode> {
        self.components.get(entry_id)
    }

    /// Whether the manifest has no components
    pub fn is_empty(&self) -> bool {
        self.components.is_empty()
    }

    /// Number of components
    pub fn len(&self) -> usize {
        self.components.len()
    }

    /// All keys in lexicographic order
    pub fn keys(&self) -> impl Iterator<Item = &String> {
        self.components.keys()
    }

    /// Entry points
    pub fn roots(&self) -> &[String] {
        &self.graph.roots
    }

    /// Terminal nodes
    pub fn leaves(&self) -> &[String] {
        &self.graph.leaves
    }
}

/// Manifest loading errors
#[derive(Debug, thiserror::Error)]
pub enum ManifestError {
    #[error("Failed to read manifest file {0}: {1}")]
    IoError(String, String),

    #[error("Failed to parse manifest JSON: {0}")]
    ParseError(String),
}

#[cfg(test)]
mod tests {
    use super::*;
    use ctxpack_core::Composition;
    use pretty_assertions::assert_eq;

    fn contract(entry: &str, components: &[&str], imports: &[&str]) -> Contract {
        Contract::new(entry, format!("uif:{}", entry), "uif:file").with_composition(Composition {
            components: components.iter().map(|s| s.to_string()).collect(),
            functions: Vec::new(),
            imports: imports.iter().map(|s| s.to_string()).collect(),
        })
    }

    #[test]
    fn roots_and_leaves() {
        let contracts = vec![
            contract("src/A.tsx", &["B"], &["./B", "left-pad"]),
            contract("src/B.tsx", &["C"], &["./C"]),
            contract("src/C.tsx", &[], &[]),
        ];
        let manifest = ProjectManifest::from_contracts(&contracts);

        assert_eq!(manifest.roots(), &["src/A.tsx".to_string()]);
        assert_eq!(manifest.leaves(), &["src/C.tsx".to_string()]);
        assert_eq!(manifest.get("src/B.tsx").unwrap().used_by, vec!["src/A.tsx"]);
        assert_eq!(manifest.get("src/C.tsx").unwrap().used_by, vec!["src/B.tsx"]);
    }

    #[test]
    fn patch_and_relink() {
        let contracts = vec![
            contract("src/A.tsx", &["B"], &[]),
            contract("src/B.tsx", &[], &[]),
        ];
        let mut manifest = ProjectManifest::from_contracts(&contracts);
        assert_eq!(manifest.roots(), &["src/A.tsx".to_string()]);

        // A stops using B: both become roots
        manifest.upsert(&contract("src/A.tsx", &[], &[]));
        manifest.relink();
        assert_eq!(manifest.roots().len(), 2);
        assert!(manifest.get("src/B.tsx").unwrap().used_by.is_empty());

        manifest.remove("src/B.tsx");
        manifest.relink();
        assert_eq!(manifest.len(), 1);
        assert_eq!(manifest.leaves(), &["src/A.tsx".to_string()]);
    }

    #[test]
    fn keys_are_normalized() {
        let contracts = vec![contract("src\\ui\\Button.tsx", &[], &[])];
        let manifest = ProjectManifest::from_contracts(&contracts);
        assert!(manifest.get("src/ui/Button.tsx").is_some());
    }

    #[test]
    fn self_reference_is_not_usage() {
        let contracts = vec![contract("src/Tree.tsx", &["Tree"], &[])];
        let manifest = ProjectManifest::from_contracts(&contracts);
        assert_eq!(manifest.roots(), &["src/Tree.tsx".to_string()]);
        assert_eq!(manifest.leaves(), &["src/Tree.tsx".to_string()]);
    }

    #[test]
    fn json_roundtrip() {
        let contracts = vec![contract("src/A.tsx", &["B"], &[]), contract("src/B.tsx", &[], &[])];
        let manifest = ProjectManifest::from_contracts(&contracts);
        let json = serde_json::to_string(&manifest).unwrap();
        assert!(json.contains("\"usedBy\""));
        assert_eq!(ProjectManifest::from_json(&json).unwrap(), manifest);
    }

    #[test]
    fn loaded_keys_are_normalized() {
        let json = r#"{
            "components": {
                "src\\A.tsx": {"entryId": "src\\A.tsx", "dependencies": ["B"], "semanticHash": "uif:a"},
                "./src/B.tsx": {"entryId": "./src/B.tsx", "semanticHash": "uif:b"}
            }
        }"#;
        let manifest = ProjectManifest::from_json(json).unwrap();

        assert_eq!(manifest.keys().collect::<Vec<_>>(), vec!["src/A.tsx", "src/B.tsx"]);
        assert!(manifest.contains_key("src/A.tsx"));
        assert_eq!(manifest.get("src/B.tsx").unwrap().used_by, vec!["src/A.tsx"]);
        assert_eq!(manifest.roots(), &["src/A.tsx".to_string()]);
    }

    #[test]
    fn relinks_thousands_of_components() {
        let count = 3000;
        let contracts: Vec<Contract> = (0..count)
            .map(|i| {
                let used: Vec<String> = (i + 1..(i + 3).min(count)).map(|j| format!("Widget{}", j)).collect();
                let used: Vec<&str> = used.iter().map(String::as_str).collect();
                contract(&format!("src/area{}/Widget{}.tsx", i % 50, i), &used, &["react", "clsx"])
            })
            .collect();

        let started = std::time::Instant::now();
        let mut manifest = ProjectManifest::from_contracts(&contracts);
        manifest.relink();
        assert!(started.elapsed() < std::time::Duration::from_secs(10));

        assert_eq!(manifest.len(), count);
        assert_eq!(manifest.roots(), &["src/area0/Widget0.tsx".to_string()]);
        assert_eq!(manifest.leaves(), &["src/area49/Widget2999.tsx".to_string()]);
        assert_eq!(
            manifest.get("src/area5/Widget5.tsx").unwrap().used_by,
            vec!["src/area3/Widget3.tsx", "src/area4/Widget4.tsx"]
        );
    }
}
