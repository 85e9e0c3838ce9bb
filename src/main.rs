//! modvfs - Merge prioritized mod folders into one virtual data directory.
//!
//! Usage:
//!   modvfs dump --mod Base=/game/Data --mod ModA=/mods/ModA
//!   modvfs conflicts --mod ... [--plugin PluginX.esp ...]
//!   modvfs export --mod ... [-o mapping.json]
//!   modvfs --help
//!
//! Mods are listed lowest priority first; later `--mod` flags win conflicts.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use clap::{Args, Parser, Subcommand, ValueEnum};
use color_eyre::eyre::{Context, Result, bail, eyre};
use serde::Serialize;
use tokio_util::sync::CancellationToken;
use tracing::info;
use tracing_subscriber::{EnvFilter, Registry, fmt, layer::SubscriberExt, util::SubscriberInitExt};

use modvfs_core::{IngestConfig, WalkerKind};
use modvfs_scan::OriginSource;
use modvfs_tree::{
    Contribution, DirectoryEntry, IngestReport, IngestStatsSnapshot, MappingEntry, OriginTable,
    ingest_all,
};

#[derive(Parser)]
#[command(
    name = "modvfs",
    version,
    about = "Merge prioritized mod folders into one virtual data directory",
    long_about = "modvfs builds the merged view a mod manager would expose: every \
                  virtual path resolves to the highest-priority mod providing it, \
                  with the shadowed providers kept as alternatives."
)]
struct Cli {
    /// Increase log verbosity (-v info, -vv debug). MODVFS_LOG overrides.
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Number of mods walked concurrently (0 = one per CPU)
    #[arg(short = 'j', long, global = true, default_value = "0")]
    threads: usize,

    /// Directory walking strategy
    #[arg(long, global = true, default_value = "batched")]
    walker: WalkerArg,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Print the path to mod mapping of every loose file
    Dump {
        #[command(flatten)]
        merge: MergeArgs,

        /// Output file (defaults to stdout)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// List files provided by more than one mod
    Conflicts {
        #[command(flatten)]
        merge: MergeArgs,

        /// Maximum number of conflicts to show
        #[arg(short = 'n', long, default_value = "50")]
        top: usize,

        /// Output format
        #[arg(short, long, default_value = "text")]
        format: OutputFormat,
    },

    /// Export mapping, conflicts and counters to JSON
    Export {
        #[command(flatten)]
        merge: MergeArgs,

        /// Output file (defaults to stdout)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
}

#[derive(Args)]
struct MergeArgs {
    /// A mod as NAME=PATH; repeat in ascending priority
    #[arg(short = 'm', long = "mod", value_name = "NAME=PATH", required = true, value_parser = parse_mod)]
    mods: Vec<ModArg>,

    /// Plugin load order used to rank archives; repeat in load order
    #[arg(short = 'p', long = "plugin", value_name = "PLUGIN")]
    plugins: Vec<String>,

    /// Ignore archives found in mod folders
    #[arg(long)]
    no_archives: bool,
}

#[derive(Debug, Clone)]
struct ModArg {
    name: String,
    path: PathBuf,
}

#[derive(Debug, Clone, Copy, ValueEnum, Default)]
enum OutputFormat {
    #[default]
    Text,
    Json,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum WalkerArg {
    Batched,
    Sequential,
}

impl From<WalkerArg> for WalkerKind {
    fn from(arg: WalkerArg) -> Self {
        match arg {
            WalkerArg::Batched => WalkerKind::Batched,
            WalkerArg::Sequential => WalkerKind::Sequential,
        }
    }
}

fn main() -> Result<()> {
    color_eyre::install()?;

    let cli = Cli::parse();
    init_logging(cli.verbose);

    let config = IngestConfig::builder()
        .threads(cli.threads)
        .walker(WalkerKind::from(cli.walker))
        .build()
        .context("Invalid configuration")?;

    match cli.command {
        Command::Dump { merge, output } => run_dump(&config, &merge, output),
        Command::Conflicts { merge, top, format } => run_conflicts(&config, &merge, top, format),
        Command::Export { merge, output } => run_export(&config, &merge, output),
    }
}

fn init_logging(verbose: u8) {
    let filter = EnvFilter::try_from_env("MODVFS_LOG").unwrap_or_else(|_| {
        EnvFilter::new(match verbose {
            0 => "warn",
            1 => "info",
            _ => "debug",
        })
    });

    Registry::default()
        .with(filter)
        .with(fmt::layer().with_target(false).with_writer(std::io::stderr))
        .init();
}

/// Parse `NAME=PATH`.
fn parse_mod(s: &str) -> Result<ModArg, String> {
    let (name, path) = s
        .split_once('=')
        .ok_or_else(|| format!("expected NAME=PATH, got `{s}`"))?;
    if name.trim().is_empty() {
        return Err(format!("empty mod name in `{s}`"));
    }
    Ok(ModArg {
        name: name.trim().to_string(),
        path: PathBuf::from(path),
    })
}

/// Build the merged tree: loose files first, all mods at once, then each
/// mod's archives.
fn build_tree(config: &IngestConfig, merge: &MergeArgs) -> Result<(Arc<DirectoryEntry>, IngestReport)> {
    let mut sources = Vec::with_capacity(merge.mods.len());
    for (priority, m) in merge.mods.iter().enumerate() {
        if sources.iter().any(|s: &OriginSource| s.name == m.name) {
            bail!("mod `{}` listed twice", m.name);
        }
        let path = m
            .path
            .canonicalize()
            .with_context(|| format!("Invalid path for mod `{}`: {}", m.name, m.path.display()))?;
        let priority = i32::try_from(priority).map_err(|_| eyre!("too many mods"))?;
        sources.push(OriginSource::new(m.name.as_str(), path, priority));
    }

    let root = DirectoryEntry::from_config(config);
    eprintln!("Merging {} mods...", sources.len());
    let report = ingest_all(&root, &sources, config, None, &CancellationToken::new());

    if !merge.no_archives {
        for source in &sources {
            let archives = find_archives(config, &source.path)?;
            if archives.is_empty() {
                continue;
            }
            let enabled: Vec<String> = archives
                .iter()
                .filter_map(|p| p.file_name().map(|n| n.to_string_lossy().into_owned()))
                .collect();
            info!(origin = %source.name, archives = archives.len(), "reading archives");
            root.add_from_all_bsas(
                &source.name,
                &source.path,
                &archives,
                &enabled,
                &merge.plugins,
                source.priority,
            );
        }
    }

    let stats = root.context().stats().snapshot();
    eprintln!(
        "{} files from {} mods ({} entries unreadable, {} archives read, {} failed) in {:.2}s",
        root.file_count_recursive(),
        report.origins_ingested,
        report.warning_count(),
        stats.archives_read,
        stats.archives_failed,
        report.elapsed.as_secs_f64()
    );
    Ok((root, report))
}

/// Archives directly inside a mod folder, sorted by name.
fn find_archives(config: &IngestConfig, dir: &Path) -> Result<Vec<PathBuf>> {
    let mut archives = Vec::new();
    for entry in fs::read_dir(dir).with_context(|| format!("Cannot read {}", dir.display()))? {
        let entry = entry?;
        if !entry.file_type()?.is_file() {
            continue;
        }
        if config.is_archive_name(&entry.file_name().to_string_lossy()) {
            archives.push(entry.path());
        }
    }
    archives.sort();
    Ok(archives)
}

fn write_output(output: Option<PathBuf>, contents: &[u8]) -> Result<()> {
    match output {
        Some(path) => {
            fs::write(&path, contents).with_context(|| format!("Cannot write {}", path.display()))?;
            eprintln!("Written to {}", path.display());
        }
        None => {
            use std::io::Write;
            std::io::stdout().write_all(contents)?;
        }
    }
    Ok(())
}

fn run_dump(config: &IngestConfig, merge: &MergeArgs, output: Option<PathBuf>) -> Result<()> {
    let (root, _) = build_tree(config, merge)?;

    match output {
        Some(path) => {
            root.dump(&path).context("Dump failed")?;
            eprintln!("Dumped to {}", path.display());
        }
        None => {
            let mut out = Vec::new();
            root.dump_to(&mut out)?;
            write_output(None, &out)?;
        }
    }
    Ok(())
}

/// One conflicting virtual path, for display and export.
#[derive(Debug, Serialize)]
struct ConflictReport {
    path: String,
    winner: ProviderReport,
    alternatives: Vec<ProviderReport>,
}

#[derive(Debug, Serialize)]
struct ProviderReport {
    origin: String,
    archive: Option<String>,
    size: Option<u64>,
}

impl ProviderReport {
    fn new(contribution: &Contribution, origins: &OriginTable) -> Self {
        Self {
            origin: origins
                .find_by_id(contribution.origin)
                .map(|o| o.name().to_string())
                .unwrap_or_else(|| contribution.origin.to_string()),
            archive: contribution.archive_name().map(str::to_string),
            size: contribution.size,
        }
    }

    fn label(&self) -> String {
        match &self.archive {
            Some(archive) => format!("{} ({archive})", self.origin),
            None => self.origin.clone(),
        }
    }
}

fn conflict_reports(root: &DirectoryEntry) -> Vec<ConflictReport> {
    let origins = root.origin_table();
    root.conflicts()
        .into_iter()
        .filter_map(|(path, file)| {
            let winner = file.winner()?;
            Some(ConflictReport {
                path,
                winner: ProviderReport::new(&winner, origins),
                alternatives: file
                    .alternatives()
                    .iter()
                    .map(|alt| ProviderReport::new(alt, origins))
                    .collect(),
            })
        })
        .collect()
}

fn run_conflicts(
    config: &IngestConfig,
    merge: &MergeArgs,
    top_n: usize,
    format: OutputFormat,
) -> Result<()> {
    let (root, _) = build_tree(config, merge)?;
    let conflicts = conflict_reports(&root);

    match format {
        OutputFormat::Text => {
            println!();
            println!("{}", "─".repeat(70));
            println!(" Conflict Report");
            println!("{}", "─".repeat(70));
            println!();

            if conflicts.is_empty() {
                println!(" No conflicts found.");
            } else {
                let shadowed: u64 = conflicts
                    .iter()
                    .flat_map(|c| &c.alternatives)
                    .filter_map(|alt| alt.size)
                    .sum();
                println!(
                    " {} files provided by more than one mod ({} shadowed)",
                    conflicts.len(),
                    format_size(shadowed)
                );
                println!();

                for conflict in conflicts.iter().take(top_n) {
                    println!(
                        " {}  {}",
                        conflict.path,
                        conflict.winner.size.map(format_size).unwrap_or_default()
                    );
                    println!("   winner: {}", conflict.winner.label());
                    for alt in &conflict.alternatives {
                        println!("   over:   {}", alt.label());
                    }
                }

                let remaining = conflicts.len().saturating_sub(top_n);
                if remaining > 0 {
                    println!();
                    println!(" ... and {remaining} more");
                }
            }
            println!();
        }
        OutputFormat::Json => {
            let shown: Vec<_> = conflicts.iter().take(top_n).collect();
            println!("{}", serde_json::to_string_pretty(&shown)?);
        }
    }
    Ok(())
}

#[derive(Serialize)]
struct Export {
    mapping: Vec<MappingEntry>,
    conflicts: Vec<ConflictReport>,
    stats: IngestStatsSnapshot,
}

fn run_export(config: &IngestConfig, merge: &MergeArgs, output: Option<PathBuf>) -> Result<()> {
    let (root, _) = build_tree(config, merge)?;

    let export = Export {
        mapping: root.mapping(),
        conflicts: conflict_reports(&root),
        stats: root.context().stats().snapshot(),
    };
    let json = serde_json::to_string_pretty(&export)?;
    write_output(output, json.as_bytes())
}

/// Format size in human-readable form.
fn format_size(bytes: u64) -> String {
    humansize::format_size(bytes, humansize::BINARY)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_mod() {
        let m = parse_mod("Mod A=/mods/Mod A").unwrap();
        assert_eq!(m.name, "Mod A");
        assert_eq!(m.path, PathBuf::from("/mods/Mod A"));

        assert!(parse_mod("no-separator").is_err());
        assert!(parse_mod("=/path").is_err());
    }

    #[test]
    fn test_cli_parses() {
        let cli = Cli::try_parse_from([
            "modvfs",
            "-v",
            "conflicts",
            "--mod",
            "A=/a",
            "--mod",
            "B=/b",
            "--plugin",
            "PluginX.esp",
        ])
        .unwrap();
        assert_eq!(cli.verbose, 1);
        match cli.command {
            Command::Conflicts { merge, top, .. } => {
                assert_eq!(merge.mods.len(), 2);
                assert_eq!(merge.plugins, vec!["PluginX.esp"]);
                assert_eq!(top, 50);
            }
            _ => panic!("expected conflicts"),
        }
    }
}
