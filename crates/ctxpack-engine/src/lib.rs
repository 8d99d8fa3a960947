//! ctxpack engine - bundle packing and comparison
//!
//! This crate implements the packing pipeline on top of the project graph:
//! - Contract and source collaborators
//! - Bundle building (edges, ordering, hashing, hash-lock)
//! - Pack orchestration for one entry or every root
//! - Snapshot diffing and violation classification
//! - Bundle persistence

pub mod builder;
pub mod diff;
pub mod integrity;
pub mod pack;
pub mod provider;
pub mod store;

pub use builder::{build_edges, compute_bundle_hash, stable_sort, validate_hash_lock};
pub use diff::{diff_snapshots, ChangeAxis, ChangeKind, NodeChange, SnapshotDiff};
pub use integrity::check_contracts;
pub use pack::{PackError, PackFailure, PackOptions, PackRun, Packer};
pub use provider::{
    ContractProvider, FsSourceReader, InMemoryContracts, ProviderError, SidecarStore, SourceReader,
    SIDECAR_DIR,
};
pub use store::{read_bundles, write_bundles, BundleIndex, IndexEntry, StoreError};
