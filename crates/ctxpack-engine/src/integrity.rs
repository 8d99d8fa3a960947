//! Project-wide hash-lock check

use crate::builder::validate_hash_lock_with;
use crate::provider::{ContractProvider, ProviderError, SourceReader};
use ctxpack_core::{Diagnostic, DiagnosticCode, Location, Severity};
use std::path::Path;

/// Verify every contract the provider lists against its current source.
///
/// Returns one `STALE_CONTRACT` error per contract whose file hash no longer
/// matches (unreadable sources included).
pub async fn check_contracts(
    provider: &dyn ContractProvider,
    reader: &dyn SourceReader,
    project_root: &Path,
) -> Result<Vec<Diagnostic>, ProviderError> {
    let mut diagnostics = Vec::new();
    let entries = provider.list().await?;

    for entry_id in &entries {
        let Some(contract) = provider.get(entry_id).await? else {
            continue;
        };

        if !validate_hash_lock_with(reader, &contract, entry_id, project_root).await {
            diagnostics.push(
                Diagnostic::new(
                    DiagnosticCode::StaleContract,
                    Severity::Error,
                    format!("Contract for {} no longer matches its source", entry_id),
                )
                .with_location(Location::new(entry_id))
                .with_comparison(contract.file_hash.clone(), "<changed>"),
            );
        }
    }

    tracing::info!(
        checked = entries.len(),
        stale = diagnostics.len(),
        provider = provider.name(),
        "Hash-lock check complete"
    );

    Ok(diagnostics)
}
