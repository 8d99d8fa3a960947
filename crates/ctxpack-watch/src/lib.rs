//! Watch mode for ctxpack
//!
//! This crate keeps bundles current while sources change:
//! - Filesystem watching with extension filtering
//! - Debounced regeneration with a single-slot in-flight guard
//! - Incremental re-packing of affected bundles, full rebuild as fallback
//! - Strict-mode violation counters and a status file
//!
//! ## Usage
//!
//! ```rust,ignore
//! use ctxpack_watch::{run_debounce_loop, FsWatcher, SessionOptions, WatchFilter, WatchSession};
//!
//! let session = Arc::new(WatchSession::new(root, provider, reader, SessionOptions::from_config(&config)));
//! session.initial_build().await?;
//!
//! let (_watcher, events) = FsWatcher::start(&root, WatchFilter::from_config(&config.watch))?;
//! run_debounce_loop(session, events, Duration::from_millis(500)).await;
//! ```

pub mod cache;
pub mod debounce;
pub mod session;
pub mod status;
pub mod watcher;

pub use cache::WatchCache;
pub use debounce::{run_debounce_loop, LoopSummary};
pub use session::{RegenOutcome, SessionOptions, WatchError, WatchSession, WatchStats, IGNORE_SENTINEL};
pub use status::{remove_status, status_path, write_status, WatchStatus, STATUS_FILE};
pub use watcher::{FileEvent, FileEventKind, FsWatcher, WatchFilter};
