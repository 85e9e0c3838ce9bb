//! Core types and traits for modvfs.
//!
//! This crate provides the value types shared by the walker, the archive
//! readers and the merge tree: identifiers, snapshot trees, errors and the
//! ingestion configuration.

mod config;
mod error;
mod ids;
mod snapshot;

pub use config::{IngestConfig, IngestConfigBuilder, WalkerKind};
pub use error::{ArchiveError, DumpError, ScanError, ScanWarning, VfsError, WarningKind};
pub use ids::{ArchiveTag, FileIndex, OriginId, UNRANKED_ORDER, fold_key, split_first_component};
pub use snapshot::{SnapshotDir, SnapshotFile};
