//! Filesystem watcher
//!
//! Wraps `notify::RecommendedWatcher` (inotify on Linux, FSEvents on macOS)
//! over the project root. The watcher callback translates raw events into
//! project-relative [`FileEvent`]s and forwards them on an unbounded channel,
//! so nothing blocks on the OS watcher thread.

use crate::session::{WatchError, IGNORE_SENTINEL};
use ctxpack_core::path::{file_name, normalize_key};
use ctxpack_core::WatchConfig;
use ctxpack_engine::SIDECAR_DIR;
use notify::event::{ModifyKind, RenameMode};
use notify::{EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use std::path::{Path, PathBuf};
use tokio::sync::mpsc::{unbounded_channel, UnboundedReceiver, UnboundedSender};

/// Directories never watched
const SKIPPED_DIRS: &[&str] = &["node_modules", ".git", "dist", "build"];

/// Tool state directory; only contract sidecars inside it are of interest
const STATE_DIR: &str = ".ctxpack";

/// Kind of change
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileEventKind {
    Change,
    Add,
    Remove,
}

/// A change to one watched file, keyed by project-relative path
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileEvent {
    pub path: String,
    pub kind: FileEventKind,
}

/// Decides which project-relative paths are relevant
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WatchFilter {
    extensions: Vec<String>,
}

impl Default for WatchFilter {
    fn default() -> Self {
        Self::from_config(&WatchConfig::default())
    }
}

impl WatchFilter {
    pub fn from_config(config: &WatchConfig) -> Self {
        Self {
            extensions: config
                .extensions
                .iter()
                .map(|ext| ext.trim_start_matches('.').to_ascii_lowercase())
                .collect(),
        }
    }

    /// Map a project-relative path to the key that should be marked pending.
    ///
    /// Sources with a watched extension map to themselves, the ignore
    /// sentinel maps to itself, and a contract sidecar maps to the entry it
    /// describes. Everything else is ignored.
    pub fn classify(&self, relative: &str) -> Option<String> {
        let key = normalize_key(relative);
        if key.is_empty() {
            return None;
        }

        if let Some(sidecar) = key.strip_prefix(SIDECAR_DIR).and_then(|rest| rest.strip_prefix('/')) {
            return sidecar
                .strip_suffix(".json")
                .filter(|entry| self.has_extension(entry))
                .map(str::to_string);
        }

        if key.split('/').any(|segment| segment == STATE_DIR || SKIPPED_DIRS.contains(&segment)) {
            return None;
        }

        if file_name(&key) == IGNORE_SENTINEL || self.has_extension(&key) {
            Some(key)
        } else {
            None
        }
    }

    /// Whether a project-relative path is relevant
    pub fn accepts(&self, relative: &str) -> bool {
        self.classify(relative).is_some()
    }

    fn has_extension(&self, key: &str) -> bool {
        let name = file_name(key);
        match name.rfind('.') {
            Some(idx) if idx > 0 => {
                let ext = name[idx + 1..].to_ascii_lowercase();
                self.extensions.iter().any(|e| *e == ext)
            }
            _ => false,
        }
    }
}

/// Recursive watch over a project root.
///
/// Events stop when the watcher is dropped.
pub struct FsWatcher {
    _watcher: RecommendedWatcher,
    root: PathBuf,
}

impl FsWatcher {
    /// Start watching `root`, returning the watcher and its event stream
    pub fn start(root: &Path, filter: WatchFilter) -> Result<(Self, UnboundedReceiver<FileEvent>), WatchError> {
        let root = canonicalize_or_keep(root);
        let (tx, rx) = unbounded_channel();

        let cb_root = root.clone();
        let mut watcher = RecommendedWatcher::new(
            move |res: Result<notify::Event, notify::Error>| match res {
                Ok(event) => forward(&cb_root, &filter, &event, &tx),
                Err(e) => tracing::warn!(error = %e, "Watcher error"),
            },
            notify::Config::default(),
        )
        .map_err(|e| WatchError::Watcher(e.to_string()))?;

        watcher
            .watch(&root, RecursiveMode::Recursive)
            .map_err(|e| WatchError::Watcher(format!("{}: {}", root.display(), e)))?;

        tracing::info!(root = %root.display(), "Watching for changes");
        Ok((Self { _watcher: watcher, root }, rx))
    }

    /// Canonical root being watched
    pub fn root(&self) -> &Path {
        &self.root
    }
}

fn forward(root: &Path, filter: &WatchFilter, event: &notify::Event, tx: &UnboundedSender<FileEvent>) {
    for file_event in translate(root, filter, event) {
        tracing::debug!(path = %file_event.path, kind = ?file_event.kind, "File event");
        // A closed receiver means the session is shutting down
        let _ = tx.send(file_event);
    }
}

/// Translate one raw notify event into relevant file events
pub fn translate(root: &Path, filter: &WatchFilter, event: &notify::Event) -> Vec<FileEvent> {
    let kinds: Vec<FileEventKind> = match event.kind {
        EventKind::Create(_) => vec![FileEventKind::Add; event.paths.len()],
        EventKind::Remove(_) => vec![FileEventKind::Remove; event.paths.len()],
        EventKind::Modify(ModifyKind::Name(RenameMode::From)) => vec![FileEventKind::Remove; event.paths.len()],
        EventKind::Modify(ModifyKind::Name(RenameMode::To)) => vec![FileEventKind::Add; event.paths.len()],
        EventKind::Modify(ModifyKind::Name(RenameMode::Both)) => {
            let mut kinds = vec![FileEventKind::Remove];
            kinds.resize(event.paths.len(), FileEventKind::Add);
            kinds
        }
        EventKind::Modify(ModifyKind::Metadata(_)) | EventKind::Access(_) => return Vec::new(),
        EventKind::Modify(_) | EventKind::Any | EventKind::Other => vec![FileEventKind::Change; event.paths.len()],
    };

    event
        .paths
        .iter()
        .zip(kinds)
        .filter_map(|(path, kind)| {
            let relative = relative_key(root, path)?;
            let key = filter.classify(&relative)?;
            Some(FileEvent { path: key, kind })
        })
        .collect()
}

fn relative_key(root: &Path, path: &Path) -> Option<String> {
    let relative = match path.strip_prefix(root) {
        Ok(relative) => relative.to_path_buf(),
        // Removed files cannot be canonicalized; fall back to the parent
        Err(_) => {
            let parent = canonicalize_or_keep(path.parent()?);
            parent.strip_prefix(root).ok()?.join(path.file_name()?)
        }
    };
    Some(normalize_key(&relative.to_string_lossy()))
}

/// Canonicalize a path, returning it unchanged if canonicalization fails
fn canonicalize_or_keep(path: &Path) -> PathBuf {
    path.canonicalize().unwrap_or_else(|_| path.to_path_buf())
}
