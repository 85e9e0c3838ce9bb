//! The file registry: owner of every virtual file's identity.

use std::collections::{BTreeSet, HashMap};
use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};
use std::sync::{Arc, Weak};

use compact_str::CompactString;
use dashmap::DashMap;
use tracing::trace;

use modvfs_core::{FileIndex, OriginId, VfsError};

use crate::directory::DirectoryEntry;
use crate::file::FileEntry;
use crate::origin::OriginTable;

/// Registry of virtual files, keyed by [`FileIndex`].
///
/// Directories hold indices only; the registry holds the entries. Lookups are
/// lock-free per shard, so the tree can be queried while it is being filled.
#[derive(Debug)]
pub struct FileRegistry {
    files: DashMap<FileIndex, Arc<FileEntry>>,
    next_index: AtomicU32,
    next_sequence: AtomicU64,
    origins: Arc<OriginTable>,
}

impl FileRegistry {
    pub fn new(origins: Arc<OriginTable>) -> Self {
        Self {
            files: DashMap::new(),
            next_index: AtomicU32::new(0),
            next_sequence: AtomicU64::new(0),
            origins,
        }
    }

    /// The origin table shared with this registry.
    pub fn origins(&self) -> &Arc<OriginTable> {
        &self.origins
    }

    /// Allocate a new identity and register a file under it.
    pub fn create_file(
        &self,
        name: &str,
        key: CompactString,
        parent: Weak<DirectoryEntry>,
    ) -> Arc<FileEntry> {
        let index = FileIndex(self.next_index.fetch_add(1, Ordering::Relaxed));
        let file = Arc::new(FileEntry::new(index, name, key, parent));
        self.files.insert(index, Arc::clone(&file));
        file
    }

    /// Look up a file; removed identities yield `None`.
    pub fn get_file(&self, index: FileIndex) -> Option<Arc<FileEntry>> {
        self.files.get(&index).map(|entry| Arc::clone(entry.value()))
    }

    /// Look up a file that must exist.
    pub fn file(&self, index: FileIndex) -> Result<Arc<FileEntry>, VfsError> {
        self.get_file(index).ok_or(VfsError::UnknownFile { index })
    }

    /// Remove a single file, whoever contributes it. Returns whether it existed.
    pub fn remove_file(&self, index: FileIndex) -> bool {
        let Some((_, file)) = self.files.remove(&index) else {
            return false;
        };

        let contributors: BTreeSet<OriginId> =
            file.contributions().iter().map(|c| c.origin).collect();
        for id in &contributors {
            if let Some(origin) = self.origins.find_by_id(*id) {
                origin.remove_file(index);
            }
        }

        if let Some(parent) = file.parent() {
            parent.detach_file(file.key(), index);
            for id in contributors {
                parent.prune_origin(id);
            }
        }
        trace!(index = %index, name = file.name(), "file removed");
        true
    }

    /// Drop `origin`'s contribution from each file; files left with no
    /// contribution are deleted.
    pub fn remove_origin_multi(&self, indices: &[FileIndex], origin: OriginId) {
        let mut parents: HashMap<*const DirectoryEntry, Arc<DirectoryEntry>> = HashMap::new();

        for &index in indices {
            let Some(file) = self.get_file(index) else {
                continue;
            };
            let emptied = file.remove_origin(origin);
            let parent = file.parent();

            // Another origin may have contributed since; only an entry that
            // is still empty under its directory's lock is deleted.
            let deleted = emptied
                && match &parent {
                    Some(parent) => parent.detach_if_empty(&file),
                    None => file.is_empty(),
                };
            if deleted {
                self.files.remove(&index);
            }
            if let Some(parent) = parent {
                parents.entry(Arc::as_ptr(&parent)).or_insert(parent);
            }
        }

        for parent in parents.into_values() {
            parent.prune_origin(origin);
        }
    }

    /// Next insertion sequence number, used to break ranking ties.
    pub(crate) fn next_sequence(&self) -> u64 {
        self.next_sequence.fetch_add(1, Ordering::Relaxed)
    }

    pub fn len(&self) -> usize {
        self.files.len()
    }

    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }
}
