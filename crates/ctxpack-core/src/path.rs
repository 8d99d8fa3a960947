//! Slash-normalized project keys
//!
//! Every graph key is a project-relative path using `/` separators, with no
//! leading `./` and no `.` or `..` segments. These helpers produce and take
//! apart such keys without touching the filesystem.

/// Normalize a textual path into canonical key form.
///
/// Backslashes become slashes, empty and `.` segments are dropped and `..`
/// pops the previous segment (or is dropped at the top).
pub fn normalize_key(input: &str) -> String {
    let unified = input.replace('\\', "/");
    let mut segments: Vec<&str> = Vec::new();

    for segment in unified.split('/') {
        match segment {
            "" | "." => {}
            ".." => {
                segments.pop();
            }
            other => segments.push(other),
        }
    }

    segments.join("/")
}

/// Directory part of a key (`""` for top-level keys).
pub fn parent_dir(key: &str) -> &str {
    match key.rfind('/') {
        Some(idx) => &key[..idx],
        None => "",
    }
}

/// Last path segment of a key.
pub fn file_name(key: &str) -> &str {
    match key.rfind('/') {
        Some(idx) => &key[idx + 1..],
        None => key,
    }
}

/// File name without its final extension.
pub fn file_stem(key: &str) -> &str {
    let name = file_name(key);
    match name.rfind('.') {
        Some(0) | None => name,
        Some(idx) => &name[..idx],
    }
}

/// Join a reference onto a directory and normalize the result.
pub fn join_key(dir: &str, reference: &str) -> String {
    if dir.is_empty() {
        normalize_key(reference)
    } else {
        normalize_key(&format!("{}/{}", dir, reference))
    }
}

/// Whether a reference is written relative to the referencing file.
pub fn is_relative(reference: &str) -> bool {
    reference.starts_with("./") || reference.starts_with("../") || reference == "." || reference == ".."
}

/// Whether a reference looks like a bare third-party package specifier
/// (`react`, `left-pad`, `@scope/pkg/sub`).
pub fn is_package_specifier(reference: &str) -> bool {
    if reference.is_empty() || is_relative(reference) || reference.starts_with('/') {
        return false;
    }
    if reference.contains('\\') {
        return false;
    }

    let first = reference.chars().next().unwrap_or_default();
    if first == '@' {
        return reference.contains('/');
    }

    // Component names are PascalCase and file references carry an extension.
    first.is_ascii_lowercase() && file_stem(reference) == file_name(reference)
}
