//! Project graph construction and traversal
//!
//! This crate handles:
//! - Building the project manifest (components, usage edges, roots, leaves)
//! - Resolving textual references to canonical graph keys
//! - Bounded breadth-first dependency collection
//! - Best-effort package metadata for third-party references

pub mod collector;
pub mod manifest;
pub mod package;
pub mod resolver;

pub use collector::{collect, Collected, REASON_ENTRY_NOT_FOUND, REASON_EXTERNAL, REASON_UNRESOLVED};
pub use manifest::{ComponentNode, ManifestError, ManifestGraph, ProjectManifest};
pub use package::{package_name_of, PackageError, PackageMetadata};
pub use resolver::{
    find_component_by_name, resolve_dependency, resolve_key, suggest_keys, SOURCE_EXTENSIONS,
};
