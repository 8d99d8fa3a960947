//! Violation codes and diagnostics
//!
//! IMPORTANT: Diagnostic codes are versioned and stable.
//! NEVER rename or remove codes - they are part of the public API.
//! Add new codes with new names only.

use serde::{Deserialize, Serialize};

/// Diagnostic code registry (v1)
///
/// These codes are STABLE and VERSIONED.
/// Do NOT rename or remove codes - only add new ones.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DiagnosticCode {
    // Interface changes
    /// A public input field was removed
    PropRemoved,

    /// A public input field changed its declared type
    PropTypeChanged,

    /// A public input field was added
    PropAdded,

    /// An emitted event was removed
    EventRemoved,

    /// An emitted event changed its signature
    EventSignatureChanged,

    /// An emitted event was added
    EventAdded,

    // Internal changes
    /// Internal state was removed
    StateRemoved,

    /// Internal state changed its type
    StateTypeChanged,

    /// Internal state was added
    StateAdded,

    /// A local helper was removed
    HelperRemoved,

    /// A local helper was added
    HelperAdded,

    // Graph changes
    /// A bundle references something that could not be resolved
    MissingDependency,

    /// A bundle appeared
    BundleAdded,

    /// A bundle disappeared
    BundleRemoved,

    // Integrity
    /// A contract no longer matches its source
    StaleContract,
}

impl DiagnosticCode {
    /// Get the diagnostic code as a stable string identifier
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::PropRemoved => "PROP_REMOVED",
            Self::PropTypeChanged => "PROP_TYPE_CHANGED",
            Self::PropAdded => "PROP_ADDED",
            Self::EventRemoved => "EVENT_REMOVED",
            Self::EventSignatureChanged => "EVENT_SIGNATURE_CHANGED",
            Self::EventAdded => "EVENT_ADDED",
            Self::StateRemoved => "STATE_REMOVED",
            Self::StateTypeChanged => "STATE_TYPE_CHANGED",
            Self::StateAdded => "STATE_ADDED",
            Self::HelperRemoved => "HELPER_REMOVED",
            Self::HelperAdded => "HELPER_ADDED",
            Self::MissingDependency => "MISSING_DEPENDENCY",
            Self::BundleAdded => "BUNDLE_ADDED",
            Self::BundleRemoved => "BUNDLE_REMOVED",
            Self::StaleContract => "STALE_CONTRACT",
        }
    }
}

impl std::fmt::Display for DiagnosticCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Diagnostic severity level
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    /// Informational message, never a violation
    Info,

    /// Warning - should be reviewed but not blocking
    Warn,

    /// Error - breaking change
    Error,
}

impl Severity {
    /// Whether this severity counts as a violation
    pub fn is_violation(&self) -> bool {
        matches!(self, Self::Warn | Self::Error)
    }
}

impl std::fmt::Display for Severity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Info => write!(f, "info"),
            Self::Warn => write!(f, "warn"),
            Self::Error => write!(f, "error"),
        }
    }
}

/// Where a diagnostic applies
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Location {
    /// Entry id of the affected component
    pub file: String,

    /// Bundle the component was seen in, if any
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bundle: Option<String>,
}

impl Location {
    /// Create a location for a component
    pub fn new(file: impl Into<String>) -> Self {
        Self {
            file: file.into(),
            bundle: None,
        }
    }

    /// Create a location for a component inside a bundle
    pub fn in_bundle(file: impl Into<String>, bundle: impl Into<String>) -> Self {
        Self {
            file: file.into(),
            bundle: Some(bundle.into()),
        }
    }
}

/// A diagnostic message with structured metadata
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Diagnostic {
    /// Stable diagnostic code
    pub code: DiagnosticCode,

    /// Severity level
    pub severity: Severity,

    /// Human-readable message
    pub message: String,

    /// Affected component (best-effort)
    pub location: Option<Location>,

    /// Previous value (for change diagnostics)
    pub expected: Option<String>,

    /// Current value (for change diagnostics)
    pub actual: Option<String>,

    /// Bundles that contain the affected component
    pub impact: Vec<String>,
}

impl Diagnostic {
    /// Create a new diagnostic with minimal fields
    pub fn new(code: DiagnosticCode, severity: Severity, message: impl Into<String>) -> Self {
        Self {
            code,
            severity,
            message: message.into(),
            location: None,
            expected: None,
            actual: None,
            impact: Vec::new(),
        }
    }

    /// Set the location
    pub fn with_location(mut self, location: Location) -> Self {
        self.location = Some(location);
        self
    }

    /// Set previous/current values
    pub fn with_comparison(mut self, expected: impl Into<String>, actual: impl Into<String>) -> Self {
        self.expected = Some(expected.into());
        self.actual = Some(actual.into());
        self
    }

    /// Set impacted bundles
    pub fn with_impact(mut self, impact: Vec<String>) -> Self {
        self.impact = impact;
        self
    }
}
