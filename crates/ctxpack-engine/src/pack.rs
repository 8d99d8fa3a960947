//! Pack orchestration
//!
//! Packing one entry runs Resolve, Collect, Load, Validate, Assemble,
//! Filter and Finalize in that order. Packing a whole project runs that
//! pipeline once per root and keeps going past individual failures.

use crate::builder::{build_edges, compute_bundle_hash, stable_sort, validate_hash_lock_with};
use crate::provider::{ContractProvider, SourceReader};
use ctxpack_core::path::normalize_key;
use ctxpack_core::{
    Bundle, BundleGraph, BundleMeta, BundleNode, CodeInclusion, Contract, MissingDependency,
    PackConfig,
};
use ctxpack_graph::{collect, resolve_key, suggest_keys, PackageMetadata, ProjectManifest};
use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;

/// Reason recorded for visited components that have no contract
pub const REASON_NO_CONTRACT: &str = "contract not found";

/// Maximum number of candidate keys reported for an unresolved entry
const MAX_CANDIDATES: usize = 5;

/// Per-pack settings
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PackOptions {
    pub depth: usize,
    pub max_nodes: usize,
    pub include_code: CodeInclusion,
    pub strict: bool,
    pub allow_missing: bool,
    pub hash_lock: bool,
}

impl Default for PackOptions {
    fn default() -> Self {
        Self::from(&PackConfig::default())
    }
}

impl From<&PackConfig> for PackOptions {
    fn from(config: &PackConfig) -> Self {
        Self {
            depth: config.depth,
            max_nodes: config.max_nodes,
            include_code: config.include_code,
            strict: config.strict,
            allow_missing: config.allow_missing,
            hash_lock: config.hash_lock,
        }
    }
}

/// Errors that abort a single pack
#[derive(Debug, thiserror::Error)]
pub enum PackError {
    #[error("Could not resolve entry '{input}'{}", candidate_hint(.candidates))]
    Resolution { input: String, candidates: Vec<String> },

    #[error("Integrity check failed for {entry_id}: {reason}")]
    Integrity { entry_id: String, reason: String },

    #[error("Bundle for {0} has no nodes")]
    EmptyBundle(String),

    #[error("I/O error: {0}")]
    Io(String),
}

fn candidate_hint(candidates: &[String]) -> String {
    if candidates.is_empty() {
        String::new()
    } else {
        format!(" (did you mean: {})", candidates.join(", "))
    }
}

/// A root that failed to pack
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PackFailure {
    pub entry_id: String,
    pub error: String,
}

/// Result of packing several roots
#[derive(Debug, Clone, Default)]
pub struct PackRun {
    /// Bundles keyed by entry id
    pub bundles: BTreeMap<String, Bundle>,

    /// Roots that failed, in the order they were attempted
    pub failures: Vec<PackFailure>,
}

impl PackRun {
    /// Whether every root packed
    pub fn is_clean(&self) -> bool {
        self.failures.is_empty()
    }
}

/// Bundle packer
pub struct Packer {
    provider: Arc<dyn ContractProvider>,
    reader: Arc<dyn SourceReader>,
    contracts: BTreeMap<String, Contract>,
    package_metadata: Option<PackageMetadata>,
}

impl Packer {
    /// Create a packer over a contract provider and a source reader
    pub fn new(provider: Arc<dyn ContractProvider>, reader: Arc<dyn SourceReader>) -> Self {
        Self {
            provider,
            reader,
            contracts: BTreeMap::new(),
            package_metadata: None,
        }
    }

    /// Contracts consulted before the provider
    pub fn with_contracts(mut self, contracts: impl IntoIterator<Item = Contract>) -> Self {
        self.contracts.extend(
            contracts
                .into_iter()
                .map(|c| (normalize_key(&c.entry_id), c)),
        );
        self
    }

    /// Project package metadata used to annotate third-party references
    pub fn with_package_metadata(mut self, metadata: PackageMetadata) -> Self {
        self.package_metadata = Some(metadata);
        self
    }

    /// Pack one entry
    pub async fn pack(
        &self,
        entry: &str,
        manifest: &ProjectManifest,
        options: &PackOptions,
        project_root: &Path,
    ) -> Result<Bundle, PackError> {
        // Resolve
        let Some(entry_key) = resolve_key(manifest, entry) else {
            return Err(PackError::Resolution {
                input: entry.to_string(),
                candidates: suggest_keys(manifest, entry, MAX_CANDIDATES),
            });
        };

        // Collect
        let collected = collect(&entry_key, manifest, options.depth, options.max_nodes);
        let mut missing = collected.missing;

        // Load
        let mut loaded: Vec<(String, Contract)> = Vec::with_capacity(collected.visited.len());
        for key in &collected.visited {
            match self.load_contract(key).await? {
                Some(contract) => loaded.push((key.clone(), contract)),
                None if options.strict => {
                    return Err(PackError::Integrity {
                        entry_id: key.clone(),
                        reason: REASON_NO_CONTRACT.to_string(),
                    });
                }
                None if !options.allow_missing => {
                    let referrer = collected.referrers.get(key).unwrap_or(key);
                    missing.push(MissingDependency::new(key, REASON_NO_CONTRACT, referrer));
                }
                None => {
                    tracing::debug!(entry = %key, "Dropping component without contract");
                }
            }
        }

        // Validate
        if options.hash_lock {
            for (key, contract) in &loaded {
                if !validate_hash_lock_with(self.reader.as_ref(), contract, key, project_root).await {
                    return Err(PackError::Integrity {
                        entry_id: key.clone(),
                        reason: "contract is stale (file hash does not match source)".to_string(),
                    });
                }
            }
        }

        // Assemble
        let mut nodes = Vec::with_capacity(loaded.len());
        for (key, contract) in loaded {
            let mut node = BundleNode::new(contract);
            node.entry_id = key;
            self.attach_code(&mut node, options.include_code, project_root).await;
            nodes.push(node);
        }

        if nodes.is_empty() {
            return Err(PackError::EmptyBundle(entry_key));
        }

        // Filter: only the referrer's own helpers can explain a missing name
        missing.retain(|m| {
            let referrer = normalize_key(&m.referenced_by);
            !nodes
                .iter()
                .any(|node| node.entry_id == referrer && node.contract.is_internal_helper(&m.name))
        });
        if let Some(metadata) = &self.package_metadata {
            for m in missing.iter_mut() {
                if let Some((package, version)) = metadata.lookup(&m.name) {
                    m.package_name = Some(package);
                    m.version = version;
                }
            }
        }
        missing.sort();
        missing.dedup();

        // Finalize
        stable_sort(&mut nodes);
        let edges = build_edges(&nodes, manifest);
        let bundle_hash = compute_bundle_hash(&nodes, options.depth);

        tracing::debug!(
            entry = %entry_key,
            nodes = nodes.len(),
            edges = edges.len(),
            missing = missing.len(),
            hash = %bundle_hash,
            "Packed bundle"
        );

        Ok(Bundle {
            entry_id: entry_key,
            depth: options.depth,
            bundle_hash,
            graph: BundleGraph { nodes, edges },
            meta: BundleMeta {
                missing,
                source: format!("ctxpack@{}", env!("CARGO_PKG_VERSION")),
            },
        })
    }

    /// Pack every root of the manifest in lexicographic order
    pub async fn pack_all(
        &self,
        manifest: &ProjectManifest,
        options: &PackOptions,
        project_root: &Path,
    ) -> PackRun {
        self.pack_roots(manifest.roots(), manifest, options, project_root).await
    }

    /// Pack the given roots, recording failures and continuing
    pub async fn pack_roots(
        &self,
        roots: &[String],
        manifest: &ProjectManifest,
        options: &PackOptions,
        project_root: &Path,
    ) -> PackRun {
        let mut ordered: Vec<&String> = roots.iter().collect();
        ordered.sort();
        ordered.dedup();

        let mut run = PackRun::default();
        for root in ordered {
            match self.pack(root, manifest, options, project_root).await {
                Ok(bundle) => {
                    run.bundles.insert(bundle.entry_id.clone(), bundle);
                }
                Err(e) => {
                    tracing::warn!(entry = %root, error = %e, "Failed to pack root");
                    run.failures.push(PackFailure {
                        entry_id: root.clone(),
                        error: e.to_string(),
                    });
                }
            }
        }

        tracing::info!(
            bundles = run.bundles.len(),
            failures = run.failures.len(),
            "Packed roots"
        );

        run
    }

    async fn load_contract(&self, key: &str) -> Result<Option<Contract>, PackError> {
        if let Some(contract) = self.contracts.get(key) {
            return Ok(Some(contract.clone()));
        }

        self.provider
            .get(key)
            .await
            .map_err(|e| PackError::Io(e.to_string()))
    }

    async fn attach_code(&self, node: &mut BundleNode, mode: CodeInclusion, project_root: &Path) {
        match mode {
            CodeInclusion::None => {}
            CodeInclusion::Header => {
                match self.reader.read_header(&node.entry_id, project_root).await {
                    Ok(header) => node.code_header = header,
                    Err(e) => tracing::debug!(entry = %node.entry_id, error = %e, "No header attached"),
                }
            }
            CodeInclusion::Full => {
                match self.reader.read_full(&node.entry_id, project_root).await {
                    Ok(code) => node.code = Some(code),
                    Err(e) => tracing::debug!(entry = %node.entry_id, error = %e, "No source attached"),
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::provider::{FsSourceReader, InMemoryContracts};
    use ctxpack_core::Composition;
    use pretty_assertions::assert_eq;

    fn contract(entry: &str, components: &[&str], imports: &[&str]) -> Contract {
        Contract::new(entry, format!("uif:{}", entry), "uif:f").with_composition(Composition {
            components: components.iter().map(|s| s.to_string()).collect(),
            functions: Vec::new(),
            imports: imports.iter().map(|s| s.to_string()).collect(),
        })
    }

    fn project() -> Vec<Contract> {
        vec![
            contract("A.tsx", &["B"], &["left-pad"]),
            contract("B.tsx", &["C"], &[]),
            contract("C.tsx", &[], &[]),
        ]
    }

    fn packer(contracts: Vec<Contract>) -> Packer {
        Packer::new(
            Arc::new(InMemoryContracts::from_contracts(contracts)),
            Arc::new(FsSourceReader),
        )
    }

    fn options() -> PackOptions {
        PackOptions {
            include_code: CodeInclusion::None,
            ..PackOptions::default()
        }
    }

    #[tokio::test]
    async fn packs_chain() {
        let manifest = ProjectManifest::from_contracts(&project());
        let bundle = packer(project())
            .pack("A", &manifest, &options(), Path::new("."))
            .await
            .unwrap();

        assert_eq!(bundle.entry_id, "A.tsx");
        assert_eq!(bundle.node_ids().collect::<Vec<_>>(), vec!["A.tsx", "B.tsx", "C.tsx"]);
        assert_eq!(
            bundle.graph.edges,
            vec![
                ["A.tsx".to_string(), "B.tsx".to_string()],
                ["B.tsx".to_string(), "C.tsx".to_string()],
            ]
        );
        assert_eq!(bundle.meta.missing.len(), 1);
        assert_eq!(bundle.meta.missing[0].name, "left-pad");
        assert!(bundle.meta.source.starts_with("ctxpack@"));
    }

    #[tokio::test]
    async fn depth_zero_has_no_edges() {
        let manifest = ProjectManifest::from_contracts(&project());
        let options = PackOptions { depth: 0, ..options() };
        let bundle = packer(project())
            .pack("A.tsx", &manifest, &options, Path::new("."))
            .await
            .unwrap();

        assert_eq!(bundle.graph.nodes.len(), 1);
        assert!(bundle.graph.edges.is_empty());
    }

    #[tokio::test]
    async fn unresolved_entry_suggests_candidates() {
        let manifest = ProjectManifest::from_contracts(&project());
        let err = packer(project())
            .pack("Ghost", &manifest, &options(), Path::new("."))
            .await
            .unwrap_err();

        match err {
            PackError::Resolution { input, candidates } => {
                assert_eq!(input, "Ghost");
                assert_eq!(candidates, vec!["A.tsx", "B.tsx", "C.tsx"]);
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test]
    async fn missing_contract_policies() {
        let manifest = ProjectManifest::from_contracts(&project());
        let without_c: Vec<Contract> = project().into_iter().filter(|c| c.entry_id != "C.tsx").collect();

        // Default: dropped silently
        let bundle = packer(without_c.clone())
            .pack("A.tsx", &manifest, &options(), Path::new("."))
            .await
            .unwrap();
        assert_eq!(bundle.graph.nodes.len(), 2);
        assert_eq!(bundle.meta.missing.len(), 1);

        // allow_missing = false: recorded
        let recorded = PackOptions { allow_missing: false, ..options() };
        let bundle = packer(without_c.clone())
            .pack("A.tsx", &manifest, &recorded, Path::new("."))
            .await
            .unwrap();
        let c_missing = bundle.meta.missing.iter().find(|m| m.name == "C.tsx").unwrap();
        assert_eq!(c_missing.reason, REASON_NO_CONTRACT);
        assert_eq!(c_missing.referenced_by, "B.tsx");

        // strict: fatal
        let strict = PackOptions { strict: true, ..options() };
        let err = packer(without_c)
            .pack("A.tsx", &manifest, &strict, Path::new("."))
            .await
            .unwrap_err();
        assert!(matches!(err, PackError::Integrity { ref entry_id, .. } if entry_id == "C.tsx"));
    }

    #[tokio::test]
    async fn empty_bundle() {
        let manifest = ProjectManifest::from_contracts(&project());
        let err = packer(Vec::new())
            .pack("A.tsx", &manifest, &options(), Path::new("."))
            .await
            .unwrap_err();
        assert!(matches!(err, PackError::EmptyBundle(_)));
    }

    #[tokio::test]
    async fn caller_contracts_take_precedence() {
        let manifest = ProjectManifest::from_contracts(&project());
        let override_a = Contract::new("A.tsx", "uif:override", "uif:f");
        let bundle = packer(project())
            .with_contracts(vec![override_a])
            .pack("A.tsx", &manifest, &options(), Path::new("."))
            .await
            .unwrap();
        assert_eq!(bundle.node("A.tsx").unwrap().contract.semantic_hash, "uif:override");
    }

    #[tokio::test]
    async fn helpers_filtered_and_packages_annotated() {
        let form = Contract::new("Form.tsx", "uif:s", "uif:f").with_composition(Composition {
            components: vec!["Row".into(), "Field".into()],
            functions: vec!["Field".into()],
            imports: vec!["Field".into(), "@mui/material/Button".into()],
        });
        let manifest = ProjectManifest::from_contracts(&[form.clone()]);
        let metadata = PackageMetadata::from_json(r#"{"dependencies":{"@mui/material":"5.15.0"}}"#).unwrap();

        let bundle = packer(vec![form])
            .with_package_metadata(metadata)
            .pack("Form", &manifest, &options(), Path::new("."))
            .await
            .unwrap();

        let names: Vec<&str> = bundle.meta.missing.iter().map(|m| m.name.as_str()).collect();
        assert_eq!(names, vec!["@mui/material/Button", "Row"]);
        let mui = &bundle.meta.missing[0];
        assert_eq!(mui.package_name.as_deref(), Some("@mui/material"));
        assert_eq!(mui.version.as_deref(), Some("5.15.0"));
    }

    #[tokio::test]
    async fn unrelated_local_function_does_not_hide_missing() {
        let a = contract("A.tsx", &["B", "Tooltip"], &[]);
        let b = Contract::new("B.tsx", "uif:b", "uif:f").with_composition(Composition {
            functions: vec!["Tooltip".into()],
            ..Composition::default()
        });
        let manifest = ProjectManifest::from_contracts(&[a.clone(), b.clone()]);

        let bundle = packer(vec![a, b.clone()])
            .pack("A", &manifest, &options(), Path::new("."))
            .await
            .unwrap();
        assert_eq!(bundle.meta.missing.len(), 1);
        assert_eq!(bundle.meta.missing[0].name, "Tooltip");
        assert_eq!(bundle.meta.missing[0].referenced_by, "A.tsx");

        // Once A declares Tooltip itself it is an internal helper
        let local = Contract::new("A.tsx", "uif:a", "uif:f").with_composition(Composition {
            components: vec!["B".into(), "Tooltip".into()],
            functions: vec!["Tooltip".into()],
            ..Composition::default()
        });
        let bundle = packer(vec![b])
            .with_contracts(vec![local])
            .pack("A", &manifest, &options(), Path::new("."))
            .await
            .unwrap();
        assert!(bundle.meta.missing.is_empty());
    }

    #[tokio::test]
    async fn pack_all_tolerates_failures() {
        let contracts = vec![
            contract("A.tsx", &[], &[]),
            contract("Z.tsx", &[], &[]),
        ];
        let manifest = ProjectManifest::from_contracts(&contracts);
        let packer = packer(vec![contract("Z.tsx", &[], &[])]);

        let run = packer.pack_all(&manifest, &options(), Path::new(".")).await;
        assert_eq!(run.bundles.keys().collect::<Vec<_>>(), vec!["Z.tsx"]);
        assert_eq!(run.failures.len(), 1);
        assert_eq!(run.failures[0].entry_id, "A.tsx");
        assert!(!run.is_clean());
    }
}
