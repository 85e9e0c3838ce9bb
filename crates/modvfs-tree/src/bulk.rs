//! Cancellable multi-origin ingestion on a worker pool.

use std::sync::Arc;
use std::time::{Duration, Instant};

use compact_str::CompactString;
use rayon::prelude::*;
use serde::Serialize;
use tokio::sync::broadcast;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use modvfs_core::{IngestConfig, ScanWarning};
use modvfs_scan::{OriginSnapshot, OriginSource, ProgressTracker, ProgressVisitor, ScanProgress, worker_pool};

use crate::directory::DirectoryEntry;
use crate::ingest::InsertVisitor;
use crate::stats::IngestStatsSnapshot;

/// Progress events published during [`ingest_all`].
pub type IngestProgress = ScanProgress;

/// How the walk of one ingested origin went.
#[derive(Debug, Clone, Serialize)]
pub struct OriginOutcome {
    pub name: CompactString,
    /// Files reported by the walk.
    pub files: u64,
    /// Entries below the root that could not be read and were skipped.
    pub warnings: Vec<ScanWarning>,
}

/// Outcome of a bulk ingestion.
#[derive(Debug, Clone, Serialize)]
pub struct IngestReport {
    /// Origins walked to completion.
    pub origins_ingested: usize,
    /// Origins not ingested: unreadable roots or cancelled before start.
    pub origins_skipped: usize,
    /// Whether the token was cancelled during the run.
    pub cancelled: bool,
    /// Per-origin results of the ingested origins, in source order.
    pub origins: Vec<OriginOutcome>,
    /// Counters of the whole tree after the run.
    pub stats: IngestStatsSnapshot,
    pub elapsed: Duration,
}

/// Walk every source straight into `root`, several origins at a time.
///
/// Each origin runs on one worker; `config.threads` bounds how many run at
/// once. The token is checked before each origin starts, so a cancelled run
/// leaves fully ingested origins plus the ones already in progress.
pub fn ingest_all(
    root: &Arc<DirectoryEntry>,
    sources: &[OriginSource],
    config: &IngestConfig,
    progress: Option<&broadcast::Sender<IngestProgress>>,
    cancel: &CancellationToken,
) -> IngestReport {
    let start = Instant::now();
    let tracker = ProgressTracker::new(sources.len());

    // Events go nowhere when the caller does not listen.
    let (fallback, _) = broadcast::channel(1);
    let sender = progress.unwrap_or(&fallback);

    let job = || {
        sources
            .par_iter()
            .map(|source| {
                if cancel.is_cancelled() {
                    debug!(origin = %source.name, "ingestion cancelled before origin started");
                    return None;
                }
                ingest_one(root, source, &tracker, sender, config.progress_interval)
            })
            .collect::<Vec<_>>()
    };

    let outcomes = match worker_pool(config.threads) {
        Some(pool) => pool.install(job),
        None => job(),
    };
    let origins: Vec<OriginOutcome> = outcomes.into_iter().flatten().collect();

    let report = IngestReport {
        origins_ingested: origins.len(),
        origins_skipped: sources.len() - origins.len(),
        cancelled: cancel.is_cancelled(),
        origins,
        stats: root.context().stats().snapshot(),
        elapsed: start.elapsed(),
    };
    info!(
        ingested = report.origins_ingested,
        skipped = report.origins_skipped,
        cancelled = report.cancelled,
        warnings = report.warning_count(),
        files = root.registry().len(),
        elapsed_ms = report.elapsed.as_millis() as u64,
        "bulk ingestion finished"
    );
    report
}

impl IngestReport {
    /// Entries skipped across every ingested origin.
    pub fn warning_count(&self) -> usize {
        self.origins.iter().map(|o| o.warnings.len()).sum()
    }
}

fn ingest_one(
    root: &Arc<DirectoryEntry>,
    source: &OriginSource,
    tracker: &ProgressTracker,
    sender: &broadcast::Sender<IngestProgress>,
    interval: u64,
) -> Option<OriginOutcome> {
    let origin = root.create_origin(&source.name, &source.path, source.priority);
    let mut inserter = InsertVisitor::new(root, &origin);
    let result = {
        let mut visitor = ProgressVisitor::new(&mut inserter, tracker, sender, &source.name, interval);
        root.context().walker().walk(&source.path, &mut visitor)
    };

    tracker.record_origin();
    let _ = sender.send(tracker.snapshot(&source.name));
    root.set_populated();

    match result {
        Ok(summary) => {
            debug!(
                origin = %source.name,
                files = summary.files,
                warnings = summary.warnings.len(),
                "origin ingested"
            );
            Some(OriginOutcome {
                name: source.name.clone(),
                files: summary.files,
                warnings: summary.warnings,
            })
        }
        Err(err) => {
            warn!(origin = %source.name, path = %source.path.display(), error = %err, "skipping origin");
            None
        }
    }
}

/// Merge snapshots produced by
/// [`SnapshotScanner`](modvfs_scan::SnapshotScanner) into `root`.
pub fn merge_snapshots(root: &Arc<DirectoryEntry>, snapshots: &[OriginSnapshot]) {
    for snapshot in snapshots {
        root.add_from_list(
            &snapshot.source.name,
            &snapshot.source.path,
            &snapshot.root,
            snapshot.source.priority,
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    fn sources(temp: &TempDir) -> Vec<OriginSource> {
        ["ModA", "ModB"]
            .iter()
            .enumerate()
            .map(|(i, name)| {
                let dir = temp.path().join(name);
                fs::create_dir_all(dir.join("textures")).unwrap();
                fs::write(dir.join("textures/shared.dds"), name).unwrap();
                fs::write(dir.join(format!("{name}.esp")), "p").unwrap();
                OriginSource::new(*name, dir, i as i32)
            })
            .collect()
    }

    #[test]
    fn test_ingest_all_merges_every_origin() {
        let temp = TempDir::new().unwrap();
        let config = IngestConfig::builder().threads(2usize).build().unwrap();
        let root = DirectoryEntry::from_config(&config);

        let report = ingest_all(&root, &sources(&temp), &config, None, &CancellationToken::new());

        assert_eq!(report.origins_ingested, 2);
        assert!(!report.cancelled);
        assert_eq!(report.warning_count(), 0);
        let walked: Vec<_> = report.origins.iter().map(|o| (o.name.as_str(), o.files)).collect();
        assert_eq!(walked, vec![("ModA", 2), ("ModB", 2)]);
        assert_eq!(report.stats.origins_created, 2);
        let shared = root.find_file("textures/shared.dds").unwrap();
        let winner = root.origin_table().get_by_id(shared.origin().unwrap()).unwrap();
        assert_eq!(winner.name(), "ModB");
        assert!(root.is_populated());
    }

    #[test]
    fn test_batched_ingest_with_more_origins_than_threads() {
        let temp = TempDir::new().unwrap();
        let sources: Vec<_> = (0..6)
            .map(|i| {
                let dir = temp.path().join(format!("Mod{i}"));
                fs::create_dir_all(dir.join("meshes")).unwrap();
                fs::write(dir.join("meshes").join(format!("own{i}.nif")), "x").unwrap();
                fs::write(dir.join("meshes/shared.nif"), "y").unwrap();
                OriginSource::new(format!("Mod{i}"), dir, i)
            })
            .collect();
        let config = IngestConfig::builder()
            .threads(2usize)
            .walker(modvfs_core::WalkerKind::Batched)
            .build()
            .unwrap();
        let root = DirectoryEntry::from_config(&config);

        let report = ingest_all(&root, &sources, &config, None, &CancellationToken::new());

        assert_eq!(report.origins_ingested, 6);
        assert_eq!(report.warning_count(), 0);
        assert!(report.origins.iter().all(|o| o.files == 2));
        assert_eq!(root.file_count_recursive(), 7);
        let shared = root.find_file("meshes/shared.nif").unwrap();
        assert_eq!(shared.alternatives().len(), 5);
    }

    #[test]
    fn test_cancelled_ingest_skips_everything() {
        let temp = TempDir::new().unwrap();
        let config = IngestConfig::default();
        let root = DirectoryEntry::from_config(&config);
        let cancel = CancellationToken::new();
        cancel.cancel();

        let report = ingest_all(&root, &sources(&temp), &config, None, &cancel);
        assert!(report.cancelled);
        assert_eq!(report.origins_skipped, 2);
        assert!(report.origins.is_empty());
        assert!(root.registry().is_empty());
    }

    #[test]
    fn test_progress_events() {
        let temp = TempDir::new().unwrap();
        let config = IngestConfig::builder().progress_interval(1u64).build().unwrap();
        let root = DirectoryEntry::from_config(&config);
        let (tx, mut rx) = broadcast::channel(64);

        ingest_all(&root, &sources(&temp), &config, Some(&tx), &CancellationToken::new());

        let mut events = Vec::new();
        while let Ok(event) = rx.try_recv() {
            events.push(event);
        }
        assert!(events.iter().all(|e| e.origins_total == 2));
        assert_eq!(events.iter().map(|e| e.files_scanned).max(), Some(4));
        assert_eq!(events.iter().map(|e| e.origins_done).max(), Some(2));
    }

    #[test]
    fn test_merge_snapshots_matches_direct_ingest() {
        let temp = TempDir::new().unwrap();
        let config = IngestConfig::default();
        let sources = sources(&temp);

        let direct = DirectoryEntry::from_config(&config);
        ingest_all(&direct, &sources, &config, None, &CancellationToken::new());

        let snapshots = modvfs_scan::scan_snapshots(&sources, &config, &CancellationToken::new());
        let merged = DirectoryEntry::from_config(&config);
        merge_snapshots(&merged, &snapshots);

        assert_eq!(direct.mapping(), merged.mapping());
    }
}
