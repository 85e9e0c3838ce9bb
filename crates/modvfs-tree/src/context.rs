//! State shared by every node of one merge tree.

use std::sync::Arc;

use modvfs_archive::{ArchiveReader, ArchiveReaders};
use modvfs_core::IngestConfig;
use modvfs_scan::{DirectoryWalker, walker_for};

use crate::origin::OriginTable;
use crate::registry::FileRegistry;
use crate::stats::IngestStats;

/// The registry, origin table and collaborators of a merge tree.
///
/// Created once and handed to the root; every directory keeps a handle, so
/// any node can resolve files and origins without walking up.
pub struct TreeContext {
    registry: Arc<FileRegistry>,
    walker: Arc<dyn DirectoryWalker>,
    archives: Arc<dyn ArchiveReader>,
    stats: IngestStats,
}

impl TreeContext {
    pub fn new(
        registry: Arc<FileRegistry>,
        walker: Arc<dyn DirectoryWalker>,
        archives: Arc<dyn ArchiveReader>,
    ) -> Self {
        Self {
            registry,
            walker,
            archives,
            stats: IngestStats::default(),
        }
    }

    /// A fresh registry and origin table, the configured walker and the
    /// built-in archive readers.
    pub fn from_config(config: &IngestConfig) -> Self {
        let registry = Arc::new(FileRegistry::new(Arc::new(OriginTable::new())));
        Self::new(registry, walker_for(config), Arc::new(ArchiveReaders::builtin()))
    }

    pub fn registry(&self) -> &Arc<FileRegistry> {
        &self.registry
    }

    pub fn origins(&self) -> &Arc<OriginTable> {
        self.registry.origins()
    }

    pub fn walker(&self) -> &Arc<dyn DirectoryWalker> {
        &self.walker
    }

    pub fn archives(&self) -> &Arc<dyn ArchiveReader> {
        &self.archives
    }

    pub fn stats(&self) -> &IngestStats {
        &self.stats
    }
}

impl std::fmt::Debug for TreeContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TreeContext")
            .field("files", &self.registry.len())
            .field("origins", &self.origins().len())
            .field("stats", &self.stats.snapshot())
            .finish_non_exhaustive()
    }
}
