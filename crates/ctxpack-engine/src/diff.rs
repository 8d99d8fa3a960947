//! Snapshot diffing
//!
//! Compares two sets of bundles keyed by entry id and classifies every
//! contract change. The comparison is pure: no I/O, and the result does not
//! depend on map iteration order.

use ctxpack_core::{Bundle, Contract, Diagnostic, DiagnosticCode, Location, Report, Severity};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

/// Which part of a contract changed
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChangeAxis {
    /// Public input fields
    Props,
    /// Emitted events
    Emits,
    /// Internal state
    State,
    /// Local helpers
    Helpers,
}

impl std::fmt::Display for ChangeAxis {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Props => write!(f, "prop"),
            Self::Emits => write!(f, "event"),
            Self::State => write!(f, "state"),
            Self::Helpers => write!(f, "helper"),
        }
    }
}

/// How a named member changed
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChangeKind {
    Added,
    Removed,
    Changed,
}

/// One member-level change to a component shared by both snapshots
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeChange {
    pub entry_id: String,
    pub axis: ChangeAxis,
    pub kind: ChangeKind,
    pub name: String,
    pub before: Option<String>,
    pub after: Option<String>,

    /// New-snapshot bundles containing the component
    pub impact: Vec<String>,
}

impl NodeChange {
    /// Diagnostic code and severity for this change
    pub fn classify(&self) -> (DiagnosticCode, Severity) {
        use ChangeAxis::*;
        use ChangeKind::*;

        match (self.axis, self.kind) {
            (Props, Removed) => (DiagnosticCode::PropRemoved, Severity::Error),
            (Props, Changed) => (DiagnosticCode::PropTypeChanged, Severity::Warn),
            (Props, Added) => (DiagnosticCode::PropAdded, Severity::Info),
            (Emits, Removed) => (DiagnosticCode::EventRemoved, Severity::Error),
            (Emits, Changed) => (DiagnosticCode::EventSignatureChanged, Severity::Warn),
            (Emits, Added) => (DiagnosticCode::EventAdded, Severity::Info),
            (State, Removed) => (DiagnosticCode::StateRemoved, Severity::Warn),
            (State, Changed) => (DiagnosticCode::StateTypeChanged, Severity::Info),
            (State, Added) => (DiagnosticCode::StateAdded, Severity::Info),
            (Helpers, Removed) => (DiagnosticCode::HelperRemoved, Severity::Error),
            (Helpers, Added | Changed) => (DiagnosticCode::HelperAdded, Severity::Info),
        }
    }

    fn to_diagnostic(&self) -> Diagnostic {
        let (code, severity) = self.classify();
        let verb = match self.kind {
            ChangeKind::Added => "was added",
            ChangeKind::Removed => "was removed",
            ChangeKind::Changed => "changed",
        };
        let message = format!("{} {} '{}' {}", self.entry_id, self.axis, self.name, verb);

        let mut location = Location::new(&self.entry_id);
        location.bundle = self.impact.first().cloned();

        let mut diagnostic = Diagnostic::new(code, severity, message)
            .with_location(location)
            .with_impact(self.impact.clone());

        if self.kind == ChangeKind::Changed {
            diagnostic = diagnostic.with_comparison(
                self.before.clone().unwrap_or_default(),
                self.after.clone().unwrap_or_default(),
            );
        }

        diagnostic
    }
}

/// Result of comparing two snapshots
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SnapshotDiff {
    /// Entry ids of bundles only in the new snapshot
    pub added: Vec<String>,

    /// Entry ids of bundles only in the old snapshot
    pub removed: Vec<String>,

    /// Member-level changes, sorted by entry id, axis and name
    pub changes: Vec<NodeChange>,

    /// Classified diagnostics (changes, missing dependencies, bundle churn)
    pub diagnostics: Vec<Diagnostic>,

    /// Number of bundles present in both snapshots
    pub compared: usize,
}

impl SnapshotDiff {
    /// Diagnostics that count as violations
    pub fn violations(&self) -> impl Iterator<Item = &Diagnostic> {
        self.diagnostics.iter().filter(|d| d.severity.is_violation())
    }

    /// Number of error diagnostics
    pub fn errors(&self) -> usize {
        self.count(Severity::Error)
    }

    /// Number of warning diagnostics
    pub fn warnings(&self) -> usize {
        self.count(Severity::Warn)
    }

    fn count(&self, severity: Severity) -> usize {
        self.diagnostics.iter().filter(|d| d.severity == severity).count()
    }

    /// Whether anything changed at all
    pub fn is_empty(&self) -> bool {
        self.added.is_empty() && self.removed.is_empty() && self.changes.is_empty()
    }

    /// Wrap the diagnostics in a report
    pub fn into_report(self) -> Report {
        let compared = self.compared;
        Report::from_diagnostics(self.diagnostics).with_bundles_compared(compared)
    }
}

/// Compare two snapshots of bundles keyed by entry id
pub fn diff_snapshots(old: &BTreeMap<String, Bundle>, new: &BTreeMap<String, Bundle>) -> SnapshotDiff {
    let mut diff = SnapshotDiff {
        added: new.keys().filter(|k| !old.contains_key(*k)).cloned().collect(),
        removed: old.keys().filter(|k| !new.contains_key(*k)).cloned().collect(),
        ..SnapshotDiff::default()
    };

    // First (old, new) contract pair per shared node, plus every bundle it appears in
    let mut shared: BTreeMap<&str, (&Contract, &Contract, Vec<String>)> = BTreeMap::new();

    for (bundle_id, new_bundle) in new {
        let Some(old_bundle) = old.get(bundle_id) else {
            continue;
        };
        diff.compared += 1;

        for new_node in &new_bundle.graph.nodes {
            let Some(old_node) = old_bundle.node(&new_node.entry_id) else {
                continue;
            };
            shared
                .entry(new_node.entry_id.as_str())
                .or_insert_with(|| (&old_node.contract, &new_node.contract, Vec::new()))
                .2
                .push(bundle_id.clone());
        }
    }

    for (entry_id, (before, after, impact)) in shared {
        compare_contracts(entry_id, before, after, &impact, &mut diff.changes);
    }

    for id in &diff.added {
        diff.diagnostics.push(
            Diagnostic::new(DiagnosticCode::BundleAdded, Severity::Info, format!("Bundle {} was added", id))
                .with_location(Location::in_bundle(id, id)),
        );
    }
    for id in &diff.removed {
        diff.diagnostics.push(
            Diagnostic::new(DiagnosticCode::BundleRemoved, Severity::Info, format!("Bundle {} was removed", id))
                .with_location(Location::in_bundle(id, id)),
        );
    }

    diff.diagnostics
        .extend(diff.changes.iter().map(NodeChange::to_diagnostic));

    for (bundle_id, bundle) in new {
        for missing in &bundle.meta.missing {
            diff.diagnostics.push(
                Diagnostic::new(
                    DiagnosticCode::MissingDependency,
                    Severity::Warn,
                    format!(
                        "'{}' referenced by {} is missing: {}",
                        missing.name, missing.referenced_by, missing.reason
                    ),
                )
                .with_location(Location::in_bundle(&missing.referenced_by, bundle_id))
                .with_impact(vec![bundle_id.clone()]),
            );
        }
    }

    diff
}

fn compare_contracts(
    entry_id: &str,
    before: &Contract,
    after: &Contract,
    impact: &[String],
    changes: &mut Vec<NodeChange>,
) {
    let axes = [
        (ChangeAxis::Props, &before.interface.props, &after.interface.props),
        (ChangeAxis::Emits, &before.interface.emits, &after.interface.emits),
        (ChangeAxis::State, &before.interface.state, &after.interface.state),
    ];

    for (axis, old_members, new_members) in axes {
        compare_members(entry_id, axis, old_members, new_members, impact, changes);
    }

    let old_helpers: BTreeSet<&String> = before.composition.functions.iter().collect();
    let new_helpers: BTreeSet<&String> = after.composition.functions.iter().collect();

    for name in old_helpers.difference(&new_helpers) {
        changes.push(change(entry_id, ChangeAxis::Helpers, ChangeKind::Removed, name, None, None, impact));
    }
    for name in new_helpers.difference(&old_helpers) {
        changes.push(change(entry_id, ChangeAxis::Helpers, ChangeKind::Added, name, None, None, impact));
    }
}

fn compare_members(
    entry_id: &str,
    axis: ChangeAxis,
    old_members: &BTreeMap<String, String>,
    new_members: &BTreeMap<String, String>,
    impact: &[String],
    changes: &mut Vec<NodeChange>,
) {
    for (name, old_type) in old_members {
        match new_members.get(name) {
            None => changes.push(change(
                entry_id,
                axis,
                ChangeKind::Removed,
                name,
                Some(old_type),
                None,
                impact,
            )),
            Some(new_type) if new_type != old_type => changes.push(change(
                entry_id,
                axis,
                ChangeKind::Changed,
                name,
                Some(old_type),
                Some(new_type),
                impact,
            )),
            Some(_) => {}
        }
    }

    for (name, new_type) in new_members {
        if !old_members.contains_key(name) {
            changes.push(change(entry_id, axis, ChangeKind::Added, name, None, Some(new_type), impact));
        }
    }
}

fn change(
    entry_id: &str,
    axis: ChangeAxis,
    kind: ChangeKind,
    name: &str,
    before: Option<&String>,
    after: Option<&String>,
    impact: &[String],
) -> NodeChange {
    NodeChange {
        entry_id: entry_id.to_string(),
        axis,
        kind,
        name: name.to_string(),
        before: before.cloned(),
        after: after.cloned(),
        impact: impact.to_vec(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ctxpack_core::{BundleGraph, BundleMeta, BundleNode, Interface, MissingDependency};
    use pretty_assertions::assert_eq;

    fn button(props: &[(&str, &str)], functions: &[&str]) -> Contract {
        let mut contract = Contract::new("src/Button.tsx", "uif:s", "uif:f");
        contract.interface = Interface {
            props: props.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect(),
            ..Interface::default()
        };
        contract.composition.functions = functions.iter().map(|s| s.to_string()).collect();
        contract
    }

    fn snapshot(bundles: &[(&str, Vec<Contract>)]) -> BTreeMap<String, Bundle> {
        bundles
            .iter()
            .map(|(id, contracts)| {
                let mut nodes: Vec<BundleNode> = contracts.iter().cloned().map(BundleNode::new).collect();
                nodes.sort_by(|a, b| a.entry_id.cmp(&b.entry_id));
                let bundle = Bundle {
                    entry_id: id.to_string(),
                    depth: 2,
                    bundle_hash: "uifb:test".into(),
                    graph: BundleGraph { nodes, edges: Vec::new() },
                    meta: BundleMeta::default(),
                };
                (id.to_string(), bundle)
            })
            .collect()
    }

    #[test]
    fn removed_prop_is_one_error() {
        let old = snapshot(&[("src/App.tsx", vec![button(&[("label", "string"), ("size", "number")], &[])])]);
        let new = snapshot(&[("src/App.tsx", vec![button(&[("label", "string")], &[])])]);

        let diff = diff_snapshots(&old, &new);
        assert_eq!(diff.errors(), 1);
        assert_eq!(diff.warnings(), 0);
        assert_eq!(diff.changes[0].name, "size");
        assert_eq!(diff.changes[0].kind, ChangeKind::Removed);
        assert_eq!(diff.diagnostics[0].code, DiagnosticCode::PropRemoved);
    }

    #[test]
    fn added_prop_is_not_a_violation() {
        let old = snapshot(&[("src/App.tsx", vec![button(&[("label", "string")], &[])])]);
        let new = snapshot(&[("src/App.tsx", vec![button(&[("label", "string"), ("icon", "string")], &[])])]);

        let diff = diff_snapshots(&old, &new);
        assert_eq!(diff.violations().count(), 0);
        assert_eq!(diff.changes.len(), 1);
        assert!(!diff.into_report().has_errors());
    }

    #[test]
    fn classification_table() {
        let mut before = button(&[("label", "string"), ("size", "number")], &["format", "clamp"]);
        before.interface.emits.insert("onClick".into(), "() => void".into());
        before.interface.emits.insert("onHover".into(), "() => void".into());
        before.interface.state.insert("open".into(), "boolean".into());
        before.interface.state.insert("count".into(), "number".into());

        let mut after = button(&[("label", "ReactNode")], &["format"]);
        after.interface.emits.insert("onClick".into(), "(e: MouseEvent) => void".into());
        after.interface.state.insert("count".into(), "bigint".into());

        let diff = diff_snapshots(
            &snapshot(&[("src/App.tsx", vec![before])]),
            &snapshot(&[("src/App.tsx", vec![after])]),
        );

        let codes: Vec<(DiagnosticCode, Severity)> =
            diff.diagnostics.iter().map(|d| (d.code, d.severity)).collect();
        assert_eq!(
            codes,
            vec![
                (DiagnosticCode::PropTypeChanged, Severity::Warn),
                (DiagnosticCode::PropRemoved, Severity::Error),
                (DiagnosticCode::EventSignatureChanged, Severity::Warn),
                (DiagnosticCode::EventRemoved, Severity::Error),
                (DiagnosticCode::StateTypeChanged, Severity::Info),
                (DiagnosticCode::StateRemoved, Severity::Warn),
                (DiagnosticCode::HelperRemoved, Severity::Error),
            ]
        );
        assert_eq!(diff.diagnostics[0].expected.as_deref(), Some("string"));
        assert_eq!(diff.diagnostics[0].actual.as_deref(), Some("ReactNode"));
    }

    #[test]
    fn shared_component_reported_once() {
        let old = snapshot(&[
            ("src/App.tsx", vec![button(&[("label", "string")], &[])]),
            ("src/Settings.tsx", vec![button(&[("label", "string")], &[])]),
        ]);
        let new = snapshot(&[
            ("src/App.tsx", vec![button(&[], &[])]),
            ("src/Settings.tsx", vec![button(&[], &[])]),
        ]);

        let diff = diff_snapshots(&old, &new);
        assert_eq!(diff.errors(), 1);
        assert_eq!(diff.compared, 2);
        assert_eq!(diff.diagnostics[0].impact, vec!["src/App.tsx", "src/Settings.tsx"]);
    }

    #[test]
    fn bundle_churn_and_missing() {
        let old = snapshot(&[("src/Old.tsx", vec![button(&[], &[])])]);
        let mut new = snapshot(&[("src/New.tsx", vec![button(&[], &[])])]);
        new.get_mut("src/New.tsx")
            .unwrap()
            .meta
            .missing
            .push(MissingDependency::new("left-pad", "external package", "src/New.tsx"));

        let diff = diff_snapshots(&old, &new);
        assert_eq!(diff.added, vec!["src/New.tsx"]);
        assert_eq!(diff.removed, vec!["src/Old.tsx"]);
        assert_eq!(diff.warnings(), 1);
        assert_eq!(diff.errors(), 0);

        let report = diff.into_report();
        assert_eq!(report.summary.total, 1);
        assert_eq!(report.summary.info, 2);
    }

    #[test]
    fn identical_snapshots() {
        let snap = snapshot(&[("src/App.tsx", vec![button(&[("label", "string")], &["fmt"])])]);
        let diff = diff_snapshots(&snap, &snap);
        assert!(diff.is_empty());
        assert!(diff.diagnostics.is_empty());
    }
}
