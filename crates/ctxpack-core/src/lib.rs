//! ctxpack Core
//!
//! Core domain model with stable, versioned types.
//! Never rename diagnostic codes - they are part of the public API.

pub mod bundle;
pub mod config;
pub mod contract;
pub mod diagnostic;
pub mod hash;
pub mod path;
pub mod report;

pub use bundle::{
    Bundle, BundleGraph, BundleMeta, BundleNode, CodeInclusion, MissingDependency,
    BUNDLE_SCHEMA_VERSION,
};
pub use config::{Config, ConfigError, PackConfig, WatchConfig};
pub use contract::{Composition, Contract, Interface};
pub use diagnostic::{Diagnostic, DiagnosticCode, Location, Severity};
pub use report::{Report, ReportSummary, ReportVersion};
