//! Contract and source collaborators
//!
//! The packer never extracts contracts or reads sources itself. It asks a
//! [`ContractProvider`] for contracts and a [`SourceReader`] for source text,
//! so tests can run entirely in memory.

use ctxpack_core::hash::metadata_header;
use ctxpack_core::path::normalize_key;
use ctxpack_core::Contract;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::RwLock;

/// Directory, relative to the project root, holding contract sidecars
pub const SIDECAR_DIR: &str = ".ctxpack/contracts";

/// Errors raised by collaborators
#[derive(Debug, thiserror::Error)]
pub enum ProviderError {
    #[error("Failed to read {0}: {1}")]
    IoError(String, String),

    #[error("Invalid contract in {0}: {1}")]
    ParseError(String, String),

    #[error("Failed to write {0}: {1}")]
    WriteError(String, String),
}

/// Source of contracts keyed by entry id
#[async_trait::async_trait]
pub trait ContractProvider: Send + Sync {
    /// Provider name for logs
    fn name(&self) -> &'static str;

    /// Fetch the contract for an entry. `Ok(None)` means no contract exists.
    async fn get(&self, entry_id: &str) -> Result<Option<Contract>, ProviderError>;

    /// Every entry id that has a contract
    async fn list(&self) -> Result<Vec<String>, ProviderError>;
}

/// Source text for entries
#[async_trait::async_trait]
pub trait SourceReader: Send + Sync {
    /// The metadata header block of an entry's source, if it has one
    async fn read_header(&self, entry_id: &str, root: &Path) -> Result<Option<String>, ProviderError>;

    /// The entry's full source
    async fn read_full(&self, entry_id: &str, root: &Path) -> Result<String, ProviderError>;
}

/// Contracts held in memory
///
/// Cloning shares the underlying map, so a test can keep a handle and
/// mutate contracts while a session reads them.
#[derive(Clone, Default)]
pub struct InMemoryContracts {
    contracts: Arc<RwLock<BTreeMap<String, Contract>>>,
}

impl InMemoryContracts {
    /// Create an empty provider
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a provider pre-filled with contracts
    pub fn from_contracts(contracts: impl IntoIterator<Item = Contract>) -> Self {
        let map = contracts
            .into_iter()
            .map(|c| (normalize_key(&c.entry_id), c))
            .collect();
        Self {
            contracts: Arc::new(RwLock::new(map)),
        }
    }

    /// Insert or replace a contract
    pub async fn insert(&self, contract: Contract) {
        self.contracts
            .write()
            .await
            .insert(normalize_key(&contract.entry_id), contract);
    }

    /// Remove a contract
    pub async fn remove(&self, entry_id: &str) -> Option<Contract> {
        self.contracts.write().await.remove(&normalize_key(entry_id))
    }

    /// Number of contracts
    pub async fn len(&self) -> usize {
        self.contracts.read().await.len()
    }

    /// Whether no contracts are held
    pub async fn is_empty(&self) -> bool {
        self.contracts.read().await.is_empty()
    }
}

#[async_trait::async_trait]
impl ContractProvider for InMemoryContracts {
    fn name(&self) -> &'static str {
        "memory"
    }

    async fn get(&self, entry_id: &str) -> Result<Option<Contract>, ProviderError> {
        Ok(self.contracts.read().await.get(&normalize_key(entry_id)).cloned())
    }

    async fn list(&self) -> Result<Vec<String>, ProviderError> {
        Ok(self.contracts.read().await.keys().cloned().collect())
    }
}

/// Contracts stored as JSON sidecars under `<root>/.ctxpack/contracts/`
///
/// The sidecar for `src/ui/Button.tsx` lives at
/// `<root>/.ctxpack/contracts/src/ui/Button.tsx.json`.
#[derive(Debug, Clone)]
pub struct SidecarStore {
    dir: PathBuf,
}

impl SidecarStore {
    /// Sidecar store for a project root
    pub fn new(project_root: &Path) -> Self {
        Self {
            dir: project_root.join(SIDECAR_DIR),
        }
    }

    /// Directory holding the sidecars
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Sidecar path for an entry
    pub fn sidecar_path(&self, entry_id: &str) -> PathBuf {
        self.dir.join(format!("{}.json", normalize_key(entry_id)))
    }

    /// Write a contract's sidecar, creating directories as needed
    pub async fn save(&self, contract: &Contract) -> Result<(), ProviderError> {
        let path = self.sidecar_path(&contract.entry_id);
        let display = path.display().to_string();

        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| ProviderError::WriteError(display.clone(), e.to_string()))?;
        }

        let json = serde_json::to_string_pretty(contract)
            .map_err(|e| ProviderError::WriteError(display.clone(), e.to_string()))?;

        tokio::fs::write(&path, json)
            .await
            .map_err(|e| ProviderError::WriteError(display, e.to_string()))
    }

    /// Delete a contract's sidecar. Deleting an absent sidecar is not an error.
    pub async fn delete(&self, entry_id: &str) -> Result<(), ProviderError> {
        let path = self.sidecar_path(entry_id);
        match tokio::fs::remove_file(&path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(ProviderError::WriteError(path.display().to_string(), e.to_string())),
        }
    }
}

#[async_trait::async_trait]
impl ContractProvider for SidecarStore {
    fn name(&self) -> &'static str {
        "sidecar"
    }

    async fn get(&self, entry_id: &str) -> Result<Option<Contract>, ProviderError> {
        let path = self.sidecar_path(entry_id);
        let display = path.display().to_string();

        let contents = match tokio::fs::read_to_string(&path).await {
            Ok(contents) => contents,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(ProviderError::IoError(display, e.to_string())),
        };

        let mut contract: Contract = serde_json::from_str(&contents)
            .map_err(|e| ProviderError::ParseError(display, e.to_string()))?;
        contract.entry_id = normalize_key(entry_id);

        Ok(Some(contract))
    }

    async fn list(&self) -> Result<Vec<String>, ProviderError> {
        let dir = self.dir.clone();
        if !dir.exists() {
            return Ok(Vec::new());
        }

        let display = dir.display().to_string();
        tokio::task::spawn_blocking(move || list_sidecars(&dir))
            .await
            .map_err(|e| ProviderError::IoError(display, e.to_string()))?
    }
}

fn list_sidecars(dir: &Path) -> Result<Vec<String>, ProviderError> {
    let mut entries = Vec::new();

    for entry in walkdir::WalkDir::new(dir).follow_links(false) {
        let entry = entry.map_err(|e| ProviderError::IoError(dir.display().to_string(), e.to_string()))?;
        if !entry.file_type().is_file() {
            continue;
        }

        let Ok(relative) = entry.path().strip_prefix(dir) else {
            continue;
        };
        let relative = relative.to_string_lossy();
        if let Some(entry_id) = relative.strip_suffix(".json") {
            entries.push(normalize_key(entry_id));
        }
    }

    entries.sort();
    Ok(entries)
}

/// Reads sources from disk relative to the project root
#[derive(Debug, Clone, Copy, Default)]
pub struct FsSourceReader;

#[async_trait::async_trait]
impl SourceReader for FsSourceReader {
    async fn read_header(&self, entry_id: &str, root: &Path) -> Result<Option<String>, ProviderError> {
        let source = self.read_full(entry_id, root).await?;
        Ok(metadata_header(&source).map(str::to_string))
    }

    async fn read_full(&self, entry_id: &str, root: &Path) -> Result<String, ProviderError> {
        let path = root.join(normalize_key(entry_id));
        tokio::fs::read_to_string(&path)
            .await
            .map_err(|e| ProviderError::IoError(path.display().to_string(), e.to_string()))
    }
}
