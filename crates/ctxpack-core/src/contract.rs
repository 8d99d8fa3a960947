//! Contract types describing one UI component module
//!
//! Contracts are produced by an external extractor and consumed read-only.
//! They are replaced wholesale on re-extraction, never patched.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Declared public surface of a component
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Interface {
    /// Public input fields (name -> declared type)
    #[serde(default)]
    pub props: BTreeMap<String, String>,

    /// Emitted interaction events (name -> signature)
    #[serde(default)]
    pub emits: BTreeMap<String, String>,

    /// Internal state (name -> type)
    #[serde(default)]
    pub state: BTreeMap<String, String>,
}

/// What a component is built from
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Composition {
    /// Referenced sub-element names
    #[serde(default)]
    pub components: Vec<String>,

    /// Locally declared helper names
    #[serde(default)]
    pub functions: Vec<String>,

    /// Imported module specifiers
    #[serde(default)]
    pub imports: Vec<String>,
}

/// Structural descriptor of one source module
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Contract {
    /// Canonical, slash-normalized module identifier
    pub entry_id: String,

    /// Human-readable summary
    #[serde(default)]
    pub description: String,

    /// Referenced sub-elements, helpers and imports
    #[serde(default)]
    pub composition: Composition,

    /// Declared interface
    #[serde(default)]
    pub interface: Interface,

    /// Hash of structural meaning
    pub semantic_hash: String,

    /// Hash of raw source with the metadata header stripped
    pub file_hash: String,
}

impl Contract {
    /// Create a contract with empty composition and interface
    pub fn new(
        entry_id: impl Into<String>,
        semantic_hash: impl Into<String>,
        file_hash: impl Into<String>,
    ) -> Self {
        Self {
            entry_id: crate::path::normalize_key(&entry_id.into()),
            description: String::new(),
            composition: Composition::default(),
            interface: Interface::default(),
            semantic_hash: semantic_hash.into(),
            file_hash: file_hash.into(),
        }
    }

    /// Set the description
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    /// Set the composition
    pub fn with_composition(mut self, composition: Composition) -> Self {
        self.composition = composition;
        self
    }

    /// Set the interface
    pub fn with_interface(mut self, interface: Interface) -> Self {
        self.interface = interface;
        self
    }

    /// Raw dependency references: sub-elements and imports, sorted and deduplicated
    pub fn dependency_refs(&self) -> Vec<String> {
        let mut refs: Vec<String> = self
            .composition
            .components
            .iter()
            .chain(self.composition.imports.iter())
            .cloned()
            .collect();
        refs.sort();
        refs.dedup();
        refs
    }

    /// Names that are both used as sub-elements and declared locally.
    ///
    /// Such names never resolve to another module, so they are not
    /// reported as missing dependencies.
    pub fn internal_helpers(&self) -> Vec<String> {
        let mut helpers: Vec<String> = self
            .composition
            .components
            .iter()
            .filter(|name| self.composition.functions.contains(name))
            .cloned()
            .collect();
        helpers.sort();
        helpers.dedup();
        helpers
    }

    /// Whether `name` is a same-file internal helper
    pub fn is_internal_helper(&self, name: &str) -> bool {
        self.composition.components.iter().any(|c| c == name)
            && self.composition.functions.iter().any(|f| f == name)
    }
}
