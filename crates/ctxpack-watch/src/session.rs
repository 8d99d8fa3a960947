//! Watch session
//!
//! A session owns the cache, the pending change set and the counters. At most
//! one regeneration runs at a time: the cache sits behind an async mutex that
//! doubles as the in-flight guard. A caller that arrives while a regeneration
//! is running waits for the guard, then re-checks the pending set, so a burst
//! of changes during a regeneration produces exactly one follow-up cycle.

use crate::cache::WatchCache;
use crate::status::{write_status, WatchStatus};
use ctxpack_core::path::{file_name, normalize_key};
use ctxpack_core::{Bundle, Config, Contract};
use ctxpack_engine::{
    diff_snapshots, write_bundles, ContractProvider, PackOptions, PackRun, Packer, SourceReader,
};
use ctxpack_graph::{PackageMetadata, ProjectManifest};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::{Mutex, RwLock};

/// File whose change forces a full rebuild
pub const IGNORE_SENTINEL: &str = ".ctxpackignore";

/// Watch errors
#[derive(Debug, thiserror::Error)]
pub enum WatchError {
    #[error("Watcher error: {0}")]
    Watcher(String),

    #[error("I/O error: {0}")]
    Io(String),

    #[error("Provider error: {0}")]
    Provider(String),
}

/// Session counters
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WatchStats {
    /// Event-triggered regeneration cycles that ran (skips excluded)
    pub regenerations: u64,

    /// Cycles that used the incremental path
    pub incremental: u64,

    /// Cycles that rebuilt everything
    pub full_rebuilds: u64,

    /// Strict mode: accumulated violations (errors + warnings)
    pub total: usize,

    /// Strict mode: accumulated errors
    pub errors: usize,

    /// Strict mode: accumulated warnings
    pub warnings: usize,

    /// Failed cycles plus roots that failed to pack
    pub failures: usize,

    /// Most recent failure
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_error: Option<String>,
}

/// What a regeneration request did
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RegenOutcome {
    /// Nothing pending and the cache was valid
    Skipped,

    /// Patched the cache and re-packed affected roots
    Incremental { repacked: usize, dropped: usize },

    /// Rebuilt everything from the provider
    Full { bundles: usize },

    /// The cycle failed; the cache was discarded
    Failed(String),
}

/// Session settings
#[derive(Debug, Clone, Default)]
pub struct SessionOptions {
    /// Options for every pack
    pub pack: PackOptions,

    /// Accumulate violations into the counters
    pub strict: bool,

    /// Persist bundles here after each regeneration
    pub out_dir: Option<PathBuf>,

    /// Write the status file after each regeneration
    pub status_file: bool,
}

impl SessionOptions {
    /// Session settings from a loaded config
    pub fn from_config(config: &Config) -> Self {
        Self {
            pack: PackOptions::from(&config.pack),
            strict: config.watch.strict,
            out_dir: Some(config.out_path()),
            status_file: config.watch.status_file,
        }
    }
}

/// A long-running watch session over one project
pub struct WatchSession {
    root: PathBuf,
    provider: Arc<dyn ContractProvider>,
    reader: Arc<dyn SourceReader>,
    options: SessionOptions,
    package_metadata: Option<PackageMetadata>,

    /// In-flight guard; `None` means the next cycle must rebuild fully
    cache: Mutex<Option<WatchCache>>,
    pending: Mutex<BTreeSet<String>>,
    stats: RwLock<WatchStats>,
}

impl WatchSession {
    /// Create a session; nothing is built until [`initial_build`](Self::initial_build)
    /// or the first regeneration
    pub fn new(
        root: impl Into<PathBuf>,
        provider: Arc<dyn ContractProvider>,
        reader: Arc<dyn SourceReader>,
        options: SessionOptions,
    ) -> Self {
        Self {
            root: root.into(),
            provider,
            reader,
            options,
            package_metadata: None,
            cache: Mutex::new(None),
            pending: Mutex::new(BTreeSet::new()),
            stats: RwLock::new(WatchStats::default()),
        }
    }

    /// Annotate missing third-party references with package metadata
    pub fn with_package_metadata(mut self, metadata: Option<PackageMetadata>) -> Self {
        self.package_metadata = metadata;
        self
    }

    /// Project root
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Snapshot of the counters
    pub async fn stats(&self) -> WatchStats {
        self.stats.read().await.clone()
    }

    /// Number of pending changes
    pub async fn pending_len(&self) -> usize {
        self.pending.lock().await.len()
    }

    /// Bundles currently cached, waiting for any running regeneration
    pub async fn bundles(&self) -> BTreeMap<String, Bundle> {
        self.cache
            .lock()
            .await
            .as_ref()
            .map(|cache| cache.bundles.clone())
            .unwrap_or_default()
    }

    /// Record a changed path (project-relative)
    pub async fn record_change(&self, path: &str) {
        let key = normalize_key(path);
        if key.is_empty() {
            return;
        }
        self.pending.lock().await.insert(key);
    }

    /// Build everything once before watching. Not counted as a regeneration.
    pub async fn initial_build(&self) -> Result<usize, WatchError> {
        let mut guard = self.cache.lock().await;
        let (cache, run) = self.full_rebuild().await?;
        let bundles = cache.bundles.len();

        self.record_pack_failures(&run).await;
        self.persist(&cache).await?;
        *guard = Some(cache);

        tracing::info!(bundles, "Initial build complete");
        Ok(bundles)
    }

    /// Run one regeneration cycle, waiting for any cycle already in flight
    pub async fn regenerate(&self) -> RegenOutcome {
        let mut guard = self.cache.lock().await;

        let changed = {
            let mut pending = self.pending.lock().await;
            if pending.is_empty() && guard.is_some() {
                tracing::debug!("Nothing pending, skipping regeneration");
                return RegenOutcome::Skipped;
            }
            std::mem::take(&mut *pending)
        };

        let sentinel_changed = changed.iter().any(|path| file_name(path) == IGNORE_SENTINEL);

        let result = match guard.take() {
            Some(cache) if !sentinel_changed => self.incremental(cache, &changed).await,
            _ => self.full(&changed).await,
        };

        let outcome = match result {
            Ok((cache, outcome)) => {
                *guard = Some(cache);
                outcome
            }
            Err(e) => {
                tracing::warn!(error = %e, "Regeneration failed; next cycle rebuilds fully");
                let mut stats = self.stats.write().await;
                stats.failures += 1;
                stats.last_error = Some(e.to_string());
                RegenOutcome::Failed(e.to_string())
            }
        };

        {
            let mut stats = self.stats.write().await;
            stats.regenerations += 1;
            match &outcome {
                RegenOutcome::Incremental { .. } => stats.incremental += 1,
                RegenOutcome::Full { .. } => stats.full_rebuilds += 1,
                _ => {}
            }
        }

        if self.options.status_file {
            let bundles = guard.as_ref().map(|c| c.bundles.len()).unwrap_or_default();
            let status = WatchStatus::new(bundles, self.stats().await);
            if let Err(e) = write_status(&self.root, &status).await {
                tracing::warn!(error = %e, "Failed to write watch status");
            }
        }

        tracing::info!(changed = changed.len(), outcome = ?outcome, "Regeneration finished");
        outcome
    }

    async fn incremental(
        &self,
        mut cache: WatchCache,
        changed: &BTreeSet<String>,
    ) -> Result<(WatchCache, RegenOutcome), WatchError> {
        for key in changed {
            let contract = self
                .provider
                .get(key)
                .await
                .map_err(|e| WatchError::Provider(e.to_string()))?;
            cache.apply_contract(key, contract);
        }
        cache.manifest.relink();

        let dropped = cache.drop_non_roots();
        let roots = cache.affected_roots(changed);

        let previous: BTreeMap<String, Bundle> = roots
            .iter()
            .filter_map(|root| cache.bundles.get(root).map(|b| (root.clone(), b.clone())))
            .collect();

        let run = self
            .packer(cache.contracts.values().cloned())
            .pack_roots(&roots, &cache.manifest, &self.options.pack, &self.root)
            .await;

        for failure in &run.failures {
            cache.bundles.remove(&failure.entry_id);
        }
        let repacked = run.bundles.len();
        self.accumulate_violations(&previous, &run.bundles).await;
        cache.bundles.extend(run.bundles.clone());

        self.record_pack_failures(&run).await;
        self.persist(&cache).await?;

        tracing::debug!(repacked, dropped = dropped.len(), "Incremental regeneration");
        Ok((
            cache,
            RegenOutcome::Incremental {
                repacked,
                dropped: dropped.len(),
            },
        ))
    }

    async fn full(&self, changed: &BTreeSet<String>) -> Result<(WatchCache, RegenOutcome), WatchError> {
        tracing::debug!(changed = changed.len(), "Full rebuild");
        let (cache, run) = self.full_rebuild().await?;

        self.accumulate_violations(&BTreeMap::new(), &cache.bundles).await;
        self.record_pack_failures(&run).await;
        self.persist(&cache).await?;

        let bundles = cache.bundles.len();
        Ok((cache, RegenOutcome::Full { bundles }))
    }

    async fn full_rebuild(&self) -> Result<(WatchCache, PackRun), WatchError> {
        let entries = self
            .provider
            .list()
            .await
            .map_err(|e| WatchError::Provider(e.to_string()))?;

        let mut contracts: BTreeMap<String, Contract> = BTreeMap::new();
        for entry_id in entries {
            let contract = self
                .provider
                .get(&entry_id)
                .await
                .map_err(|e| WatchError::Provider(e.to_string()))?;
            if let Some(contract) = contract {
                contracts.insert(normalize_key(&entry_id), contract);
            }
        }

        let manifest = ProjectManifest::from_contracts(contracts.values());
        let run = self
            .packer(contracts.values().cloned())
            .pack_all(&manifest, &self.options.pack, &self.root)
            .await;

        let cache = WatchCache::new(manifest, contracts, run.bundles.clone());
        Ok((cache, run))
    }

    fn packer(&self, contracts: impl IntoIterator<Item = Contract>) -> Packer {
        let packer = Packer::new(self.provider.clone(), self.reader.clone()).with_contracts(contracts);
        match &self.package_metadata {
            Some(metadata) => packer.with_package_metadata(metadata.clone()),
            None => packer,
        }
    }

    async fn accumulate_violations(&self, old: &BTreeMap<String, Bundle>, new: &BTreeMap<String, Bundle>) {
        if !self.options.strict {
            return;
        }

        let diff = diff_snapshots(old, new);
        let (errors, warnings) = (diff.errors(), diff.warnings());
        if errors + warnings == 0 {
            return;
        }

        for violation in diff.violations() {
            tracing::warn!(code = %violation.code, "{}", violation.message);
        }

        let mut stats = self.stats.write().await;
        stats.errors += errors;
        stats.warnings += warnings;
        stats.total += errors + warnings;
    }

    async fn record_pack_failures(&self, run: &PackRun) {
        let Some(last) = run.failures.last() else {
            return;
        };

        let mut stats = self.stats.write().await;
        stats.failures += run.failures.len();
        stats.last_error = Some(format!("{}: {}", last.entry_id, last.error));
    }

    async fn persist(&self, cache: &WatchCache) -> Result<(), WatchError> {
        let Some(out) = &self.options.out_dir else {
            return Ok(());
        };

        write_bundles(out, &cache.bundles)
            .await
            .map(|_| ())
            .map_err(|e| WatchError::Io(e.to_string()))
    }
}
