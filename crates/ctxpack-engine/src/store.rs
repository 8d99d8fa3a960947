//! Bundle persistence
//!
//! Bundles are grouped by the directory of their entry and written to
//! `<out>/<dir>/context.json` as a JSON array. `<out>/context_main.json`
//! indexes every directory file with its bundle count and an approximate
//! token count.

use ctxpack_core::path::parent_dir;
use ctxpack_core::Bundle;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

/// Per-directory bundle file name
pub const BUNDLE_FILE_NAME: &str = "context.json";

/// Index file name at the output root
pub const INDEX_FILE_NAME: &str = "context_main.json";

/// Directory key used for entries at the project root
const ROOT_DIR_KEY: &str = ".";

/// Characters per token for the size estimate
const CHARS_PER_TOKEN: usize = 4;

/// One indexed directory
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IndexEntry {
    /// Entry directory (`.` for the project root)
    pub dir: String,

    /// Bundle file relative to the output directory
    pub file: String,

    /// Number of bundles in the file
    pub bundles: usize,

    /// Serialized characters divided by four
    pub approx_tokens: usize,
}

/// The companion index written next to the bundle files
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BundleIndex {
    /// When the index was written (RFC 3339)
    pub generated_at: String,

    /// Total number of bundles
    pub total_bundles: usize,

    /// Indexed directories, sorted
    pub directories: Vec<IndexEntry>,
}

impl BundleIndex {
    /// Sum of all approximate token counts
    pub fn approx_tokens(&self) -> usize {
        self.directories.iter().map(|d| d.approx_tokens).sum()
    }
}

/// Bundle store errors
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("Failed to access {0}: {1}")]
    IoError(String, String),

    #[error("Failed to parse {0}: {1}")]
    ParseError(String, String),

    #[error("Failed to serialize bundles: {0}")]
    SerializeError(String),
}

fn dir_key(entry_id: &str) -> String {
    match parent_dir(entry_id) {
        "" => ROOT_DIR_KEY.to_string(),
        dir => dir.to_string(),
    }
}

fn relative_file(dir: &str) -> String {
    if dir == ROOT_DIR_KEY {
        BUNDLE_FILE_NAME.to_string()
    } else {
        format!("{}/{}", dir, BUNDLE_FILE_NAME)
    }
}

fn io_error(path: &Path, e: impl std::fmt::Display) -> StoreError {
    StoreError::IoError(path.display().to_string(), e.to_string())
}

/// Write bundles and the index under `out`.
///
/// Directory files listed in a previous index but absent from this write are
/// removed, so the output always mirrors the given bundle set.
pub async fn write_bundles(out: &Path, bundles: &BTreeMap<String, Bundle>) -> Result<BundleIndex, StoreError> {
    tokio::fs::create_dir_all(out).await.map_err(|e| io_error(out, e))?;

    let mut grouped: BTreeMap<String, Vec<&Bundle>> = BTreeMap::new();
    for bundle in bundles.values() {
        grouped.entry(dir_key(&bundle.entry_id)).or_default().push(bundle);
    }

    let previous = read_index(out).await.ok().flatten();

    let mut directories = Vec::with_capacity(grouped.len());
    for (dir, group) in &grouped {
        let file = relative_file(dir);
        let path = out.join(&file);

        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await.map_err(|e| io_error(parent, e))?;
        }

        let json = serde_json::to_string_pretty(group).map_err(|e| StoreError::SerializeError(e.to_string()))?;
        let approx_tokens = json.chars().count() / CHARS_PER_TOKEN;
        tokio::fs::write(&path, json).await.map_err(|e| io_error(&path, e))?;

        directories.push(IndexEntry {
            dir: dir.clone(),
            file,
            bundles: group.len(),
            approx_tokens,
        });
    }

    if let Some(previous) = previous {
        for stale in previous.directories.iter().filter(|d| !grouped.contains_key(&d.dir)) {
            let path = out.join(&stale.file);
            match tokio::fs::remove_file(&path).await {
                Ok(()) => tracing::debug!(file = %stale.file, "Removed stale bundle file"),
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(e) => return Err(io_error(&path, e)),
            }
        }
    }

    let index = BundleIndex {
        generated_at: chrono::Utc::now().to_rfc3339(),
        total_bundles: bundles.len(),
        directories,
    };

    let index_path = out.join(INDEX_FILE_NAME);
    let json = serde_json::to_string_pretty(&index).map_err(|e| StoreError::SerializeError(e.to_string()))?;
    tokio::fs::write(&index_path, json).await.map_err(|e| io_error(&index_path, e))?;

    tracing::info!(
        bundles = index.total_bundles,
        directories = index.directories.len(),
        out = %out.display(),
        "Wrote bundles"
    );

    Ok(index)
}

/// Read the index under `out`, if one exists
pub async fn read_index(out: &Path) -> Result<Option<BundleIndex>, StoreError> {
    let path = out.join(INDEX_FILE_NAME);
    let contents = match tokio::fs::read_to_string(&path).await {
        Ok(contents) => contents,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
        Err(e) => return Err(io_error(&path, e)),
    };

    serde_json::from_str(&contents)
        .map(Some)
        .map_err(|e| StoreError::ParseError(path.display().to_string(), e.to_string()))
}

/// Read every persisted bundle under `out`, keyed by entry id.
///
/// Files are located through the index when present, otherwise by walking
/// `out` for bundle files. A missing `out` yields an empty snapshot.
pub async fn read_bundles(out: &Path) -> Result<BTreeMap<String, Bundle>, StoreError> {
    if !out.exists() {
        return Ok(BTreeMap::new());
    }

    let files: Vec<PathBuf> = match read_index(out).await? {
        Some(index) => index.directories.iter().map(|d| out.join(&d.file)).collect(),
        None => {
            let root = out.to_path_buf();
            tokio::task::spawn_blocking(move || find_bundle_files(&root))
                .await
                .map_err(|e| io_error(out, e))??
        }
    };

    let mut bundles = BTreeMap::new();
    for path in files {
        let contents = tokio::fs::read_to_string(&path).await.map_err(|e| io_error(&path, e))?;
        let group: Vec<Bundle> = serde_json::from_str(&contents)
            .map_err(|e| StoreError::ParseError(path.display().to_string(), e.to_string()))?;
        for bundle in group {
            bundles.insert(bundle.entry_id.clone(), bundle);
        }
    }

    Ok(bundles)
}

fn find_bundle_files(out: &Path) -> Result<Vec<PathBuf>, StoreError> {
    let mut files = Vec::new();
    for entry in walkdir::WalkDir::new(out).sort_by_file_name() {
        let entry = entry.map_err(|e| io_error(out, e))?;
        if entry.file_type().is_file() && entry.file_name() == BUNDLE_FILE_NAME {
            files.push(entry.into_path());
        }
    }
    Ok(files)
}

#[cfg(test)]
mod tests {
    use super::*;
    use ctxpack_core::{BundleGraph, BundleMeta, BundleNode, Contract};
    use pretty_assertions::assert_eq;

    fn bundle(entry: &str) -> Bundle {
        Bundle {
            entry_id: entry.to_string(),
            depth: 2,
            bundle_hash: format!("uifb:{}", entry.len()),
            graph: BundleGraph {
                nodes: vec![BundleNode::new(Contract::new(entry, "uif:s", "uif:f"))],
                edges: Vec::new(),
            },
            meta: BundleMeta::default(),
        }
    }

    fn snapshot(entries: &[&str]) -> BTreeMap<String, Bundle> {
        entries.iter().map(|e| (e.to_string(), bundle(e))).collect()
    }

    #[tokio::test]
    async fn write_then_read() {
        let dir = tempfile::tempdir().unwrap();
        let out = dir.path().join("bundles");
        let bundles = snapshot(&["App.tsx", "src/pages/Home.tsx", "src/pages/About.tsx"]);

        let index = write_bundles(&out, &bundles).await.unwrap();
        assert_eq!(index.total_bundles, 3);
        let dirs: Vec<(&str, usize)> = index.directories.iter().map(|d| (d.dir.as_str(), d.bundles)).collect();
        assert_eq!(dirs, vec![(".", 1), ("src/pages", 2)]);
        assert!(out.join("context.json").exists());
        assert!(out.join("src/pages/context.json").exists());
        assert!(index.approx_tokens() > 0);

        assert_eq!(read_bundles(&out).await.unwrap(), bundles);
    }

    #[tokio::test]
    async fn stale_directories_are_removed() {
        let dir = tempfile::tempdir().unwrap();
        let out = dir.path().join("bundles");

        write_bundles(&out, &snapshot(&["src/a/A.tsx", "src/b/B.tsx"])).await.unwrap();
        write_bundles(&out, &snapshot(&["src/a/A.tsx"])).await.unwrap();

        assert!(!out.join("src/b/context.json").exists());
        assert_eq!(read_bundles(&out).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn read_without_index() {
        let dir = tempfile::tempdir().unwrap();
        let out = dir.path().join("bundles");
        write_bundles(&out, &snapshot(&["src/A.tsx", "lib/B.tsx"])).await.unwrap();
        std::fs::remove_file(out.join(INDEX_FILE_NAME)).unwrap();

        let bundles = read_bundles(&out).await.unwrap();
        assert_eq!(bundles.keys().collect::<Vec<_>>(), vec!["lib/B.tsx", "src/A.tsx"]);

        assert!(read_bundles(&dir.path().join("absent")).await.unwrap().is_empty());
    }
}
