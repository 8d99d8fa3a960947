//! Bundle schema (stable v0.1)
//!
//! This is the on-disk and in-memory shape of a packed bundle.
//! Changing the hashed fields requires a new schema version.

use crate::contract::Contract;
use serde::{Deserialize, Serialize};

/// Bundle schema version, mixed into every bundle hash
pub const BUNDLE_SCHEMA_VERSION: &str = "0.1";

/// How much source text to attach to each bundle node
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CodeInclusion {
    /// Contracts only
    None,

    /// Contract plus the metadata header block
    #[default]
    Header,

    /// Contract plus the full source
    Full,
}

impl std::fmt::Display for CodeInclusion {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::None => write!(f, "none"),
            Self::Header => write!(f, "header"),
            Self::Full => write!(f, "full"),
        }
    }
}

impl std::str::FromStr for CodeInclusion {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "none" => Ok(Self::None),
            "header" => Ok(Self::Header),
            "full" => Ok(Self::Full),
            other => Err(format!("unknown code inclusion mode '{}'", other)),
        }
    }
}

/// A reference that could not be resolved to a graph node
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MissingDependency {
    /// The raw reference as written
    pub name: String,

    /// Why it is missing
    pub reason: String,

    /// Entry that referenced it
    pub referenced_by: String,

    /// Third-party package the reference belongs to (best effort)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub package_name: Option<String>,

    /// Declared version of that package (best effort)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
}

impl MissingDependency {
    /// Create a missing dependency without package information
    pub fn new(
        name: impl Into<String>,
        reason: impl Into<String>,
        referenced_by: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            reason: reason.into(),
            referenced_by: referenced_by.into(),
            package_name: None,
            version: None,
        }
    }

    /// Attach package information
    pub fn with_package(mut self, package_name: impl Into<String>, version: Option<String>) -> Self {
        self.package_name = Some(package_name.into());
        self.version = version;
        self
    }
}

/// One component inside a bundle
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BundleNode {
    /// Canonical entry id
    pub entry_id: String,

    /// The component's contract
    pub contract: Contract,

    /// Metadata header block, when header inclusion was requested
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub code_header: Option<String>,

    /// Full source, when full inclusion was requested
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub code: Option<String>,
}

impl BundleNode {
    /// Create a node carrying only its contract
    pub fn new(contract: Contract) -> Self {
        Self {
            entry_id: contract.entry_id.clone(),
            contract,
            code_header: None,
            code: None,
        }
    }

    /// Approximate size of this node once serialized, in characters
    pub fn approx_chars(&self) -> usize {
        serde_json::to_string(self).map(|s| s.len()).unwrap_or_default()
    }
}

/// Nodes and edges of a bundle
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BundleGraph {
    /// Nodes sorted by entry id
    pub nodes: Vec<BundleNode>,

    /// `[from, to]` pairs, lexicographically sorted
    pub edges: Vec<[String; 2]>,
}

/// Non-hashed bundle metadata
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BundleMeta {
    /// References that did not resolve
    #[serde(default)]
    pub missing: Vec<MissingDependency>,

    /// Producer identifier (`ctxpack@<version>`)
    #[serde(default)]
    pub source: String,
}

/// A depth- and size-bounded subgraph rooted at one entry point
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Bundle {
    /// Root entry id
    pub entry_id: String,

    /// Traversal depth used to build the bundle
    pub depth: usize,

    /// Deterministic content hash
    pub bundle_hash: String,

    /// Nodes and edges
    pub graph: BundleGraph,

    /// Missing references and producer
    pub meta: BundleMeta,
}

impl Bundle {
    /// Entry ids of every node in the bundle
    pub fn node_ids(&self) -> impl Iterator<Item = &str> {
        self.graph.nodes.iter().map(|n| n.entry_id.as_str())
    }

    /// Find a node by entry id
    pub fn node(&self, entry_id: &str) -> Option<&BundleNode> {
        self.graph
            .nodes
            .binary_search_by(|n| n.entry_id.as_str().cmp(entry_id))
            .ok()
            .map(|idx| &self.graph.nodes[idx])
    }

    /// Whether any node of this bundle is one of `entry_ids`
    pub fn touches<'a>(&self, mut entry_ids: impl Iterator<Item = &'a String>) -> bool {
        entry_ids.any(|id| self.node(id).is_some())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn bundle() -> Bundle {
        Bundle {
            entry_id: "src/App.tsx".into(),
            depth: 1,
            bundle_hash: "uifb:000".into(),
            graph: BundleGraph {
                nodes: vec![
                    BundleNode::new(Contract::new("src/App.tsx", "uif:a", "uif:fa")),
                    BundleNode::new(Contract::new("src/Button.tsx", "uif:b", "uif:fb")),
                ],
                edges: vec![["src/App.tsx".into(), "src/Button.tsx".into()]],
            },
            meta: BundleMeta::default(),
        }
    }

    #[test]
    fn code_inclusion_parse() {
        assert_eq!("FULL".parse::<CodeInclusion>().unwrap(), CodeInclusion::Full);
        assert_eq!(CodeInclusion::default(), CodeInclusion::Header);
        assert!("partial".parse::<CodeInclusion>().is_err());
    }

    #[test]
    fn node_lookup() {
        let bundle = bundle();
        assert!(bundle.node("src/Button.tsx").is_some());
        assert!(bundle.node("src/Missing.tsx").is_none());
        assert!(bundle.touches(["src/Button.tsx".to_string()].iter()));
        assert!(!bundle.touches(["src/Other.tsx".to_string()].iter()));
    }

    #[test]
    fn serialized_shape() {
        let json = serde_json::to_value(bundle()).unwrap();
        assert!(json.get("entryId").is_some());
        assert!(json.get("bundleHash").is_some());
        assert_eq!(json["graph"]["edges"][0][1], "src/Button.tsx");
        assert!(json["graph"]["nodes"][0].get("code").is_none());
        assert!(json["meta"]["missing"].as_array().unwrap().is_empty());
    }
}
