//! The modvfs merge tree.
//!
//! Many prioritized origins (mod folders and archives) are merged into one
//! case-insensitive virtual directory tree. Every virtual path resolves to a
//! single [`FileEntry`] that knows its winning contribution and the
//! alternatives it shadows.
//!
//! # Overview
//!
//! - [`DirectoryEntry`] is a tree node. Ingestion, search, removal, conflict
//!   queries and the dump live here.
//! - [`FileRegistry`] owns every [`FileEntry`] by [`FileIndex`]; directories
//!   only hold indices, so an identity survives any origin churn.
//! - [`OriginTable`] owns one [`FilesOrigin`] per source, by id and by name.
//! - [`ingest_all`] walks many origins concurrently on a worker pool, with
//!   progress events and cancellation between origins.
//!
//! # Example
//!
//! ```rust,no_run
//! use std::path::Path;
//! use modvfs_tree::{DirectoryEntry, IngestConfig};
//!
//! let root = DirectoryEntry::from_config(&IngestConfig::default());
//! root.add_from_origin("Base", Path::new("/game/Data"), 0);
//! root.add_from_origin("ModA", Path::new("/mods/ModA"), 1);
//!
//! for (path, file) in root.conflicts() {
//!     println!("{path}: {} alternatives", file.alternatives().len());
//! }
//! root.dump(Path::new("/tmp/vfs.txt")).unwrap();
//! ```
//!
//! Larger priorities win. Between contributions of equal priority, loose
//! files beat archive contents, then the higher archive load-order rank
//! wins, then the most recent insertion.

mod bulk;
mod context;
mod directory;
mod dump;
mod file;
mod ingest;
mod origin;
mod registry;
mod stats;

pub use bulk::{IngestProgress, IngestReport, OriginOutcome, ingest_all, merge_snapshots};
pub use context::TreeContext;
pub use directory::{DirectoryEntry, SearchHit};
pub use dump::MappingEntry;
pub use file::{Contribution, FileEntry, RankKey};
pub use ingest::archive_order;
pub use origin::{FilesOrigin, OriginTable};
pub use registry::FileRegistry;
pub use stats::{IngestStats, IngestStatsSnapshot};

// Re-export core types for convenience
pub use modvfs_core::{
    ArchiveTag, DumpError, FileIndex, IngestConfig, OriginId, UNRANKED_ORDER, VfsError,
};
pub use modvfs_scan::OriginSource;
