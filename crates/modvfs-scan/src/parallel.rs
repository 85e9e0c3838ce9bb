//! Walk several origins concurrently on a bounded worker pool.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::SystemTime;

use compact_str::CompactString;
use rayon::prelude::*;
use tokio::sync::broadcast;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use modvfs_core::{IngestConfig, SnapshotDir};

use crate::progress::{ProgressTracker, ScanProgress};
use crate::snapshot::SnapshotBuilder;
use crate::walker::{DirectoryWalker, WalkSummary, WalkVisitor, walker_for};

/// Default channel buffer size for progress updates.
pub const PROGRESS_CHANNEL_SIZE: usize = 100;

/// One physical origin to be walked.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OriginSource {
    /// Origin name, unique per merge tree.
    pub name: CompactString,
    /// Directory holding the origin's loose files.
    pub path: PathBuf,
    /// Larger values win conflicts.
    pub priority: i32,
}

impl OriginSource {
    pub fn new(name: impl Into<CompactString>, path: impl Into<PathBuf>, priority: i32) -> Self {
        Self {
            name: name.into(),
            path: path.into(),
            priority,
        }
    }
}

/// The result of walking one origin.
#[derive(Debug, Clone)]
pub struct OriginSnapshot {
    pub source: OriginSource,
    pub root: SnapshotDir,
    pub summary: WalkSummary,
}

/// Build the worker pool for a batch; `None` means "use the current pool".
pub fn worker_pool(threads: usize) -> Option<rayon::ThreadPool> {
    let mut builder = rayon::ThreadPoolBuilder::new().thread_name(|i| format!("modvfs-walk-{i}"));
    if threads > 0 {
        builder = builder.num_threads(threads);
    }
    match builder.build() {
        Ok(pool) => Some(pool),
        Err(err) => {
            warn!(error = %err, "failed to build worker pool, using the global pool");
            None
        }
    }
}

/// Wraps a visitor and publishes progress every `interval` files.
pub struct ProgressVisitor<'a, V: WalkVisitor + ?Sized> {
    inner: &'a mut V,
    tracker: &'a ProgressTracker,
    sender: &'a broadcast::Sender<ScanProgress>,
    origin: &'a str,
    interval: u64,
}

impl<'a, V: WalkVisitor + ?Sized> ProgressVisitor<'a, V> {
    pub fn new(
        inner: &'a mut V,
        tracker: &'a ProgressTracker,
        sender: &'a broadcast::Sender<ScanProgress>,
        origin: &'a str,
        interval: u64,
    ) -> Self {
        Self {
            inner,
            tracker,
            sender,
            origin,
            interval: interval.max(1),
        }
    }
}

impl<V: WalkVisitor + ?Sized> WalkVisitor for ProgressVisitor<'_, V> {
    fn on_directory_start(&mut self, name: &str) {
        self.inner.on_directory_start(name);
    }

    fn on_directory_end(&mut self, name: &str) {
        self.inner.on_directory_end(name);
    }

    fn on_file(&mut self, name: &str, modified: SystemTime, size: u64) {
        self.inner.on_file(name, modified, size);
        if self.tracker.record_file() % self.interval == 0 {
            // No receivers is fine.
            let _ = self.sender.send(self.tracker.snapshot(self.origin));
        }
    }
}

/// Walks many origins into snapshots, several at a time.
pub struct SnapshotScanner {
    walker: Arc<dyn DirectoryWalker>,
    threads: usize,
    progress_interval: u64,
    progress_tx: broadcast::Sender<ScanProgress>,
}

impl SnapshotScanner {
    /// Create a scanner using the configured walker and worker count.
    pub fn new(config: &IngestConfig) -> Self {
        Self::with_walker(walker_for(config), config.threads, config.progress_interval)
    }

    pub fn with_walker(
        walker: Arc<dyn DirectoryWalker>,
        threads: usize,
        progress_interval: u64,
    ) -> Self {
        let (progress_tx, _) = broadcast::channel(PROGRESS_CHANNEL_SIZE);
        Self {
            walker,
            threads,
            progress_interval,
            progress_tx,
        }
    }

    /// Subscribe to scan progress updates.
    pub fn subscribe(&self) -> broadcast::Receiver<ScanProgress> {
        self.progress_tx.subscribe()
    }

    /// Walk every source and return the snapshots in source order.
    ///
    /// Sources whose root cannot be read are logged and left out. The token
    /// is checked before each origin starts; origins already running finish.
    pub fn scan_all(
        &self,
        sources: &[OriginSource],
        cancel: &CancellationToken,
    ) -> Vec<OriginSnapshot> {
        let tracker = ProgressTracker::new(sources.len());

        let job = || {
            sources
                .par_iter()
                .map(|source| self.scan_one(source, &tracker, cancel))
                .collect::<Vec<_>>()
        };

        let results = match worker_pool(self.threads) {
            Some(pool) => pool.install(job),
            None => job(),
        };

        results.into_iter().flatten().collect()
    }

    fn scan_one(
        &self,
        source: &OriginSource,
        tracker: &ProgressTracker,
        cancel: &CancellationToken,
    ) -> Option<OriginSnapshot> {
        if cancel.is_cancelled() {
            debug!(origin = %source.name, "scan cancelled before origin started");
            return None;
        }

        let mut builder = SnapshotBuilder::new();
        let result = {
            let mut visitor = ProgressVisitor::new(
                &mut builder,
                tracker,
                &self.progress_tx,
                &source.name,
                self.progress_interval,
            );
            self.walker.walk(&source.path, &mut visitor)
        };
        tracker.record_origin();
        let _ = self.progress_tx.send(tracker.snapshot(&source.name));

        match result {
            Ok(summary) => {
                debug!(origin = %source.name, files = summary.files, "origin walked");
                Some(OriginSnapshot {
                    source: source.clone(),
                    root: builder.finish(),
                    summary,
                })
            }
            Err(err) => {
                warn!(origin = %source.name, error = %err, "skipping origin");
                None
            }
        }
    }
}

/// Walk every source concurrently with the configured walker and worker count.
pub fn scan_snapshots(
    sources: &[OriginSource],
    config: &IngestConfig,
    cancel: &CancellationToken,
) -> Vec<OriginSnapshot> {
    SnapshotScanner::new(config).scan_all(sources, cancel)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn test_scan_all_keeps_source_order() {
        let temp = TempDir::new().unwrap();
        let mut sources = Vec::new();
        for (i, name) in ["ModA", "ModB", "ModC"].iter().enumerate() {
            let dir = temp.path().join(name);
            fs::create_dir_all(dir.join("meshes")).unwrap();
            fs::write(dir.join("meshes").join(format!("{name}.nif")), "x").unwrap();
            sources.push(OriginSource::new(*name, dir, i as i32));
        }
        sources.push(OriginSource::new("Missing", temp.path().join("nope"), 9));

        let config = IngestConfig::builder().threads(2usize).build().unwrap();
        let scanner = SnapshotScanner::new(&config);
        let snapshots = scanner.scan_all(&sources, &CancellationToken::new());

        let names: Vec<_> = snapshots.iter().map(|s| s.source.name.as_str()).collect();
        assert_eq!(names, vec!["ModA", "ModB", "ModC"]);
        assert!(snapshots.iter().all(|s| s.root.file_count() == 1));
    }

    #[test]
    fn test_batched_walks_on_a_busy_pool() {
        let temp = TempDir::new().unwrap();
        let mut sources = Vec::new();
        for i in 0..6 {
            let dir = temp.path().join(format!("Mod{i}"));
            fs::create_dir_all(dir.join("meshes/armor")).unwrap();
            fs::create_dir_all(dir.join("textures")).unwrap();
            fs::write(dir.join("meshes/armor/iron.nif"), "iron").unwrap();
            fs::write(dir.join("textures/sky.dds"), "sky").unwrap();
            fs::write(dir.join("plugin.esp"), "p").unwrap();
            sources.push(OriginSource::new(format!("Mod{i}"), dir, i));
        }

        let config = IngestConfig::builder()
            .threads(2usize)
            .walker(modvfs_core::WalkerKind::Batched)
            .build()
            .unwrap();
        let snapshots = SnapshotScanner::new(&config).scan_all(&sources, &CancellationToken::new());

        assert_eq!(snapshots.len(), 6);
        for snapshot in &snapshots {
            assert_eq!(snapshot.root.file_count(), 3, "{}", snapshot.source.name);
            assert_eq!(snapshot.summary.files, 3);
            assert!(!snapshot.summary.has_warnings());
        }
    }

    #[test]
    fn test_cancelled_scan_walks_nothing() {
        let temp = TempDir::new().unwrap();
        let sources = vec![OriginSource::new("ModA", temp.path(), 0)];
        let cancel = CancellationToken::new();
        cancel.cancel();

        let scanner = SnapshotScanner::new(&IngestConfig::default());
        assert!(scanner.scan_all(&sources, &cancel).is_empty());
    }

    #[test]
    fn test_progress_is_published() {
        let temp = TempDir::new().unwrap();
        fs::write(temp.path().join("a.txt"), "a").unwrap();
        let sources = vec![OriginSource::new("ModA", temp.path(), 0)];

        let config = IngestConfig::builder().progress_interval(1u64).build().unwrap();
        let scanner = SnapshotScanner::new(&config);
        let mut rx = scanner.subscribe();
        scanner.scan_all(&sources, &CancellationToken::new());

        let mut last = None;
        while let Ok(progress) = rx.try_recv() {
            last = Some(progress);
        }
        let last = last.expect("progress published");
        assert_eq!(last.origins_done, 1);
        assert_eq!(last.files_scanned, 1);
    }
}
