//! Transient watch status file
//!
//! While a watch session runs, `<root>/.ctxpack/watch-status.json` reflects
//! the latest regeneration. The file is removed when the session exits.

use crate::session::{WatchError, WatchStats};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Status file location relative to the project root
pub const STATUS_FILE: &str = ".ctxpack/watch-status.json";

/// Contents of the status file
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WatchStatus {
    /// Process running the session
    pub pid: u32,

    /// Last update (RFC 3339)
    pub updated_at: String,

    /// Bundles currently cached
    pub bundles: usize,

    /// Session counters
    pub stats: WatchStats,
}

impl WatchStatus {
    /// Status for the current process
    pub fn new(bundles: usize, stats: WatchStats) -> Self {
        Self {
            pid: std::process::id(),
            updated_at: chrono::Utc::now().to_rfc3339(),
            bundles,
            stats,
        }
    }
}

/// Absolute status file path for a project root
pub fn status_path(root: &Path) -> PathBuf {
    root.join(STATUS_FILE)
}

/// Write the status file, creating `.ctxpack/` if needed
pub async fn write_status(root: &Path, status: &WatchStatus) -> Result<(), WatchError> {
    let path = status_path(root);
    if let Some(parent) = path.parent() {
        tokio::fs::create_dir_all(parent)
            .await
            .map_err(|e| WatchError::Io(format!("{}: {}", parent.display(), e)))?;
    }

    let json = serde_json::to_string_pretty(status).map_err(|e| WatchError::Io(e.to_string()))?;
    tokio::fs::write(&path, json)
        .await
        .map_err(|e| WatchError::Io(format!("{}: {}", path.display(), e)))
}

/// Remove the status file. A missing file is not an error.
pub async fn remove_status(root: &Path) -> Result<(), WatchError> {
    let path = status_path(root);
    match tokio::fs::remove_file(&path).await {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(WatchError::Io(format!("{}: {}", path.display(), e))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn write_and_remove() {
        let dir = tempfile::tempdir().unwrap();
        let stats = WatchStats {
            regenerations: 3,
            ..WatchStats::default()
        };

        write_status(dir.path(), &WatchStatus::new(2, stats.clone())).await.unwrap();
        let written: WatchStatus =
            serde_json::from_str(&std::fs::read_to_string(status_path(dir.path())).unwrap()).unwrap();
        assert_eq!(written.bundles, 2);
        assert_eq!(written.stats, stats);
        assert_eq!(written.pid, std::process::id());

        remove_status(dir.path()).await.unwrap();
        assert!(!status_path(dir.path()).exists());
        remove_status(dir.path()).await.unwrap();
    }
}
