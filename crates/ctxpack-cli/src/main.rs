use anyhow::Result;
use clap::{Parser, Subcommand};
use colored::Colorize;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use ctxpack_core::path::normalize_key;
use ctxpack_core::{CodeInclusion, Config, Contract, Report, Severity};
use ctxpack_engine::{
    check_contracts, diff_snapshots, read_bundles, write_bundles, ContractProvider, FsSourceReader,
    PackOptions, Packer, SidecarStore,
};
use ctxpack_graph::{PackageMetadata, ProjectManifest};
use ctxpack_watch::{remove_status, run_debounce_loop, FsWatcher, SessionOptions, WatchFilter, WatchSession};

/// ctxpack - Dependency-aware context bundles for UI components
#[derive(Parser)]
#[command(name = "ctxpack")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Project root (default: current directory)
    #[arg(short = 'C', long, global = true)]
    root: Option<PathBuf>,

    /// Path to config file (default: <root>/ctxpack.toml)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Enable debug logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

/// Pack settings that override the config file
#[derive(clap::Args, Debug, Clone, Default)]
struct PackArgs {
    /// Maximum traversal depth
    #[arg(short, long)]
    depth: Option<usize>,

    /// Maximum nodes per bundle
    #[arg(long)]
    max_nodes: Option<usize>,

    /// Source attached to each node: none, header or full
    #[arg(long)]
    include_code: Option<CodeInclusion>,

    /// Fail when a visited component has no contract
    #[arg(long)]
    strict: bool,

    /// Record components without a contract as missing instead of dropping them
    #[arg(long)]
    report_missing: bool,

    /// Verify contracts against their sources before packing
    #[arg(long)]
    hash_lock: bool,
}

impl PackArgs {
    fn apply(&self, options: &mut PackOptions) {
        if let Some(depth) = self.depth {
            options.depth = depth;
        }
        if let Some(max_nodes) = self.max_nodes {
            options.max_nodes = max_nodes;
        }
        if let Some(include_code) = self.include_code {
            options.include_code = include_code;
        }
        options.strict |= self.strict;
        options.allow_missing &= !self.report_missing;
        options.hash_lock |= self.hash_lock;
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Pack one entry (printed as JSON) or every root (written to the output directory)
    Pack {
        /// Entry path or component name; every root when omitted
        entry: Option<String>,

        #[command(flatten)]
        pack: PackArgs,

        /// Output directory for bundles (overrides config)
        #[arg(short, long)]
        out: Option<PathBuf>,
    },

    /// Keep bundles current while sources change
    Watch {
        #[command(flatten)]
        pack: PackArgs,

        /// Quiet period before regenerating, in milliseconds
        #[arg(long)]
        debounce_ms: Option<u64>,

        /// Accumulate breaking changes between regenerations
        #[arg(long)]
        strict_watch: bool,

        /// Output directory for bundles (overrides config)
        #[arg(short, long)]
        out: Option<PathBuf>,
    },

    /// Compare two persisted bundle directories
    Diff {
        /// Previous bundle directory
        old: PathBuf,

        /// Current bundle directory
        new: PathBuf,

        /// Write report.json here
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Verify every contract against its current source
    Check {
        /// Write report.json here
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let level = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level)))
        .init();

    let root = cli.root.clone().unwrap_or_else(|| PathBuf::from("."));
    let mut config = match &cli.config {
        Some(path) => Config::from_file(path)?,
        None => Config::load_or_default(&root)?,
    };
    if cli.root.is_some() || cli.config.is_none() {
        config.project_root = root;
    }

    tracing::debug!(root = %config.project_root.display(), "Loaded configuration");

    match cli.command {
        Commands::Pack { entry, pack, out } => {
            if let Some(out) = out {
                config.out_dir = out;
            }
            pack_command(&config, entry.as_deref(), &pack).await
        }
        Commands::Watch {
            pack,
            debounce_ms,
            strict_watch,
            out,
        } => {
            if let Some(out) = out {
                config.out_dir = out;
            }
            if let Some(debounce_ms) = debounce_ms {
                config.watch.debounce_ms = debounce_ms;
            }
            config.watch.strict |= strict_watch;
            watch_command(&config, &pack).await
        }
        Commands::Diff { old, new, output } => diff_command(&old, &new, output.as_deref()).await,
        Commands::Check { output } => check_command(&config, output.as_deref()).await,
    }
}

/// Every contract the sidecar store knows, keyed by entry id
async fn load_contracts(store: &SidecarStore) -> Result<BTreeMap<String, Contract>> {
    let mut contracts = BTreeMap::new();
    for entry_id in store.list().await? {
        if let Some(contract) = store.get(&entry_id).await? {
            contracts.insert(normalize_key(&entry_id), contract);
        }
    }
    Ok(contracts)
}

/// Pack command - build one bundle or all of them
async fn pack_command(config: &Config, entry: Option<&str>, args: &PackArgs) -> Result<()> {
    let root = &config.project_root;
    let store = SidecarStore::new(root);
    let contracts = load_contracts(&store).await?;
    if contracts.is_empty() {
        return Err(anyhow::anyhow!(
            "No contracts found under {}. Run the extractor first.",
            store.dir().display()
        ));
    }

    let manifest = ProjectManifest::from_contracts(contracts.values());
    let mut options = PackOptions::from(&config.pack);
    args.apply(&mut options);

    let mut packer = Packer::new(Arc::new(store), Arc::new(FsSourceReader)).with_contracts(contracts.into_values());
    if let Some(metadata) = PackageMetadata::load(root) {
        packer = packer.with_package_metadata(metadata);
    }

    if let Some(entry) = entry {
        let bundle = packer.pack(entry, &manifest, &options, root).await?;
        println!("{}", serde_json::to_string_pretty(&bundle)?);
        return Ok(());
    }

    let run = packer.pack_all(&manifest, &options, root).await;
    let out = config.out_path();
    let index = write_bundles(&out, &run.bundles).await?;

    println!(
        "{} {} bundles ({} directories, ~{} tokens) to {}",
        "Wrote".green().bold(),
        index.total_bundles,
        index.directories.len(),
        index.approx_tokens(),
        out.display()
    );

    if !run.is_clean() {
        eprintln!("{}", format!("{} roots failed to pack:", run.failures.len()).red().bold());
        for failure in &run.failures {
            eprintln!("  {} {}", failure.entry_id.yellow(), failure.error);
        }
        std::process::exit(1);
    }

    Ok(())
}

/// Watch command - regenerate bundles on change until Ctrl-C
async fn watch_command(config: &Config, args: &PackArgs) -> Result<()> {
    let root = config.project_root.clone();

    let mut options = SessionOptions::from_config(config);
    args.apply(&mut options.pack);

    let session = Arc::new(
        WatchSession::new(
            &root,
            Arc::new(SidecarStore::new(&root)),
            Arc::new(FsSourceReader),
            options,
        )
        .with_package_metadata(PackageMetadata::load(&root)),
    );

    match session.initial_build().await {
        Ok(bundles) => println!("{} {} bundles", "Built".green().bold(), bundles),
        Err(e) => eprintln!("{} {}", "Initial build failed:".yellow(), e),
    }

    let (watcher, events) = FsWatcher::start(&root, WatchFilter::from_config(&config.watch))?;
    let debounce = Duration::from_millis(config.watch.debounce_ms);
    let handle = tokio::spawn(run_debounce_loop(session.clone(), events, debounce));

    println!(
        "{} {} (debounce {}ms, Ctrl-C to stop)",
        "Watching".cyan().bold(),
        watcher.root().display(),
        debounce.as_millis()
    );

    tokio::signal::ctrl_c().await?;

    // Closing the watcher ends the event stream
    drop(watcher);
    let summary = handle.await?;
    remove_status(&root).await?;

    let stats = session.stats().await;
    println!();
    println!("{}", "Watch session ended".bold());
    println!("  Events:        {}", summary.events);
    println!("  Regenerations: {} ({} incremental)", stats.regenerations, stats.incremental);
    if config.watch.strict {
        println!(
            "  Violations:    {} ({} errors, {} warnings)",
            stats.total,
            stats.errors.to_string().red(),
            stats.warnings.to_string().yellow()
        );
    }
    if let Some(last_error) = &stats.last_error {
        println!("  Failures:      {} (last: {})", stats.failures.to_string().red(), last_error);
    }

    Ok(())
}

/// Diff command - compare two bundle snapshots
async fn diff_command(old: &Path, new: &Path, output: Option<&Path>) -> Result<()> {
    let before = read_bundles(old).await?;
    let after = read_bundles(new).await?;

    let diff = diff_snapshots(&before, &after);
    tracing::debug!(
        added = diff.added.len(),
        removed = diff.removed.len(),
        changes = diff.changes.len(),
        "Compared snapshots"
    );

    let report = diff.into_report();
    finish_report(&report, "Bundle Diff Report", output)
}

/// Check command - hash-lock every contract
async fn check_command(config: &Config, output: Option<&Path>) -> Result<()> {
    let root = &config.project_root;
    let store = SidecarStore::new(root);
    let diagnostics = check_contracts(&store, &FsSourceReader, root).await?;

    let report = Report::from_diagnostics(diagnostics);
    finish_report(&report, "Contract Freshness Report", output)
}

fn finish_report(report: &Report, title: &str, output: Option<&Path>) -> Result<()> {
    if let Some(path) = output {
        report.save_to_file(path)?;
        eprintln!("{} {}", "Report saved to:".green(), path.display());
    }

    print_report_summary(report, title);

    if report.has_errors() {
        std::process::exit(1);
    }

    Ok(())
}

/// Print report summary to stdout
fn print_report_summary(report: &Report, title: &str) {
    println!("\n{}", "=".repeat(60).bright_blue());
    println!("{}", title.bold().bright_blue());
    println!("{}", "=".repeat(60).bright_blue());
    println!();

    println!("Version: {}", report.version);
    println!("Timestamp: {}", report.timestamp);
    println!();

    println!("{}", "Summary:".bold());
    println!("  Total violations: {}", report.summary.total);

    if report.summary.errors > 0 {
        println!("  Errors:   {}", report.summary.errors.to_string().red().bold());
    } else {
        println!("  Errors:   {}", report.summary.errors.to_string().green());
    }

    if report.summary.warnings > 0 {
        println!("  Warnings: {}", report.summary.warnings.to_string().yellow());
    } else {
        println!("  Warnings: {}", report.summary.warnings.to_string().green());
    }

    println!("  Info:     {}", report.summary.info);
    if report.summary.bundles_compared > 0 {
        println!("  Bundles compared: {}", report.summary.bundles_compared);
    }
    println!();

    if report.diagnostics.is_empty() {
        println!("{}", "✓ No issues found!".green().bold());
    } else {
        println!("{}", "Diagnostics:".bold());
        for diag in &report.diagnostics {
            let severity_str = match diag.severity {
                Severity::Error => "ERROR".red().bold(),
                Severity::Warn => "WARN".yellow().bold(),
                Severity::Info => "INFO".cyan(),
            };

            println!("  [{}] {}: {}", severity_str, diag.code, diag.message);

            if let Some(loc) = &diag.location {
                match &loc.bundle {
                    Some(bundle) => println!("    at {} (in {})", loc.file, bundle),
                    None => println!("    at {}", loc.file),
                }
            }

            if let Some(exp) = &diag.expected {
                println!("    Before: {}", exp);
            }
            if let Some(act) = &diag.actual {
                println!("    After:  {}", act);
            }

            if diag.impact.len() > 1 {
                println!("    Impact: {} bundles", diag.impact.len());
                for bundle in &diag.impact {
                    println!("      - {}", bundle);
                }
            }
        }
    }

    println!();
    println!("{}", "=".repeat(60).bright_blue());
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn verify_cli() {
        use clap::CommandFactory;
        Cli::command().debug_assert();
    }

    #[test]
    fn pack_flags_override_config() {
        let cli = Cli::try_parse_from([
            "ctxpack",
            "pack",
            "src/App.tsx",
            "--depth",
            "4",
            "--include-code",
            "full",
            "--report-missing",
        ])
        .unwrap();

        let Commands::Pack { entry, pack, .. } = cli.command else {
            panic!("expected pack");
        };
        assert_eq!(entry.as_deref(), Some("src/App.tsx"));

        let mut options = PackOptions::default();
        pack.apply(&mut options);
        assert_eq!(options.depth, 4);
        assert_eq!(options.include_code, CodeInclusion::Full);
        assert!(!options.allow_missing);
        assert_eq!(options.max_nodes, 100);
    }

    #[test]
    fn diff_takes_two_directories() {
        let cli = Cli::try_parse_from(["ctxpack", "-v", "diff", "old", "new"]).unwrap();
        assert!(cli.verbose);
        assert!(matches!(cli.command, Commands::Diff { .. }));
        assert!(Cli::try_parse_from(["ctxpack", "diff", "old"]).is_err());
    }
}
