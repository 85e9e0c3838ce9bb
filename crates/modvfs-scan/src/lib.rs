//! Filesystem walking engine for modvfs.
//!
//! This crate enumerates physical origin directories and reports what it
//! finds to a caller-supplied visitor. It never interprets the data.
//!
//! # Overview
//!
//! - [`DirectoryWalker`] is the three-callback contract: directory start,
//!   directory end, file. Two implementations are provided, selected once
//!   through [`walker_for`]:
//!   - [`JwalkWalker`] batches and prefetches directory reads on rayon
//!   - [`WalkdirWalker`] iterates one directory at a time
//! - [`SnapshotBuilder`] turns a walk into a [`SnapshotDir`] so it can be
//!   merged later without touching the disk again.
//! - [`SnapshotScanner`] walks several origins concurrently, with progress
//!   updates via broadcast channels and cancellation between origins.
//!
//! # Example
//!
//! ```rust,no_run
//! use modvfs_scan::{IngestConfig, take_snapshot, walker_for};
//!
//! let walker = walker_for(&IngestConfig::default());
//! let (snapshot, summary) = take_snapshot(walker.as_ref(), "/mods/ModA".as_ref()).unwrap();
//!
//! println!("{} files, {} skipped", snapshot.file_count(), summary.warnings.len());
//! ```

mod batched;
mod parallel;
mod progress;
mod sequential;
mod snapshot;
mod walker;

pub use batched::JwalkWalker;
pub use parallel::{
    OriginSnapshot, OriginSource, PROGRESS_CHANNEL_SIZE, ProgressVisitor, SnapshotScanner,
    scan_snapshots, worker_pool,
};
pub use progress::{ProgressTracker, ScanProgress};
pub use sequential::WalkdirWalker;
pub use snapshot::{SnapshotBuilder, take_snapshot};
pub use walker::{
    DirectoryWalker, FnVisitor, WalkOptions, WalkSummary, WalkVisitor, walker_for,
};

// Re-export core types for convenience
pub use modvfs_core::{IngestConfig, ScanError, ScanWarning, SnapshotDir, SnapshotFile, WalkerKind};
