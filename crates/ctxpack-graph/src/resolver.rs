//! Reference resolution
//!
//! Maps user input and raw import references onto canonical manifest keys.
//! Resolution is a pure lookup against the manifest's key set and never
//! touches the filesystem.

use crate::manifest::{ComponentNode, ProjectManifest};
use ctxpack_core::path::{file_stem, is_package_specifier, is_relative, join_key, normalize_key, parent_dir};

/// Extensions tried, in order, when a reference omits one
pub const SOURCE_EXTENSIONS: [&str; 4] = [".tsx", ".ts", ".jsx", ".js"];

/// Resolve user input (a path or a bare component name) to a manifest key.
///
/// Tries the exact key, then a separator-insensitive match, then a name
/// search over all keys in lexicographic order.
pub fn resolve_key(manifest: &ProjectManifest, input: &str) -> Option<String> {
    let normalized = normalize_key(input);
    if normalized.is_empty() {
        return None;
    }

    if let Some(key) = lookup_exact(manifest, &normalized) {
        return Some(key);
    }

    find_by_name(manifest, &normalized)
}

/// Resolve a raw dependency reference written inside `from_key`.
///
/// Candidates relative to the referencing file's directory are tried
/// first (as written, with each source extension, then as a directory
/// index). Non-relative references then try the same candidates relative
/// to the project root. Last comes the name search. Multi-segment package
/// specifiers such as `@mui/material/Button` never fall back to it.
pub fn resolve_dependency(manifest: &ProjectManifest, raw_ref: &str, from_key: &str) -> Option<String> {
    let from = normalize_key(from_key);
    let base = join_key(parent_dir(&from), raw_ref);

    if let Some(key) = first_candidate(manifest, &base) {
        return Some(key);
    }

    let rooted = normalize_key(raw_ref);
    if !is_relative(raw_ref) && rooted != base {
        if let Some(key) = first_candidate(manifest, &rooted) {
            return Some(key);
        }
    }

    if is_package_specifier(raw_ref) && raw_ref.contains('/') {
        return None;
    }

    find_by_name(manifest, &rooted)
}

/// Find a component by bare name (`Button` matches `src/ui/Button.tsx` and
/// `src/ui/Button/index.tsx`).
pub fn find_component_by_name<'a>(manifest: &'a ProjectManifest, name: &str) -> Option<&'a ComponentNode> {
    find_by_name(manifest, name).and_then(|key| manifest.get(&key))
}

/// Up to `limit` keys to suggest when `input` does not resolve: keys whose
/// stem contains the input's stem (case-insensitive) first, then the rest in
/// lexicographic order.
pub fn suggest_keys(manifest: &ProjectManifest, input: &str, limit: usize) -> Vec<String> {
    let normalized = normalize_key(input);
    let wanted = file_stem(&normalized).to_lowercase();

    let (mut similar, rest): (Vec<&String>, Vec<&String>) = manifest
        .keys()
        .partition(|key| !wanted.is_empty() && file_stem(key).to_lowercase().contains(&wanted));

    similar.extend(rest);
    similar.into_iter().take(limit).cloned().collect()
}

/// Candidate keys for a base path, in priority order
fn candidate_keys(base: &str) -> Vec<String> {
    let mut candidates = Vec::with_capacity(1 + SOURCE_EXTENSIONS.len() * 2);
    candidates.push(base.to_string());
    candidates.extend(SOURCE_EXTENSIONS.iter().map(|ext| format!("{}{}", base, ext)));
    candidates.extend(SOURCE_EXTENSIONS.iter().map(|ext| format!("{}/index{}", base, ext)));
    candidates
}

fn first_candidate(manifest: &ProjectManifest, base: &str) -> Option<String> {
    if base.is_empty() {
        return None;
    }

    candidate_keys(base)
        .iter()
        .find_map(|candidate| lookup_exact(manifest, candidate))
}

fn lookup_exact(manifest: &ProjectManifest, normalized: &str) -> Option<String> {
    manifest
        .contains_key(normalized)
        .then(|| normalized.to_string())
}

fn find_by_name(manifest: &ProjectManifest, reference: &str) -> Option<String> {
    let wanted = file_stem(reference);
    if wanted.is_empty() {
        return None;
    }

    manifest.first_named(wanted).cloned()
}
