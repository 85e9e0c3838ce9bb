//! Directory nodes of the merge tree.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};
use std::time::SystemTime;

use compact_str::CompactString;
use parking_lot::RwLock;
use tracing::{trace, warn};

use modvfs_core::{ArchiveTag, FileIndex, IngestConfig, OriginId, fold_key, split_first_component};

use crate::context::TreeContext;
use crate::file::{Contribution, FileEntry};
use crate::origin::{FilesOrigin, OriginTable};
use crate::registry::FileRegistry;

/// Result of [`DirectoryEntry::search_file`].
#[derive(Debug, Clone)]
pub enum SearchHit {
    File(Arc<FileEntry>),
    /// The path ended with a separator and named a directory.
    Directory(Arc<DirectoryEntry>),
}

/// One node of the merge tree.
///
/// A node owns its subdirectories; files are owned by the registry and
/// referenced here by index. Each of the three collections has its own lock.
pub struct DirectoryEntry {
    name: CompactString,
    key: CompactString,
    parent: Weak<DirectoryEntry>,
    context: Arc<TreeContext>,
    /// Origins contributing anything below this node.
    origins: RwLock<BTreeSet<OriginId>>,
    files: RwLock<BTreeMap<CompactString, FileIndex>>,
    subdirs: RwLock<BTreeMap<CompactString, Arc<DirectoryEntry>>>,
    populated: AtomicBool,
}

impl DirectoryEntry {
    fn new(name: &str, parent: Weak<DirectoryEntry>, context: Arc<TreeContext>) -> Self {
        Self {
            name: CompactString::new(name),
            key: fold_key(name),
            parent,
            context,
            origins: RwLock::new(BTreeSet::new()),
            files: RwLock::new(BTreeMap::new()),
            subdirs: RwLock::new(BTreeMap::new()),
            populated: AtomicBool::new(false),
        }
    }

    /// Create the root of a new tree.
    pub fn new_root(context: Arc<TreeContext>) -> Arc<Self> {
        Arc::new(Self::new("", Weak::new(), context))
    }

    /// Create an empty tree using the walker and archive readers `config` selects.
    pub fn from_config(config: &IngestConfig) -> Arc<Self> {
        Self::new_root(Arc::new(TreeContext::from_config(config)))
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    pub fn parent(&self) -> Option<Arc<DirectoryEntry>> {
        self.parent.upgrade()
    }

    pub fn context(&self) -> &Arc<TreeContext> {
        &self.context
    }

    pub fn registry(&self) -> &Arc<FileRegistry> {
        self.context.registry()
    }

    pub fn origin_table(&self) -> &Arc<OriginTable> {
        self.context.origins()
    }

    /// True once an ingestion pass has completed on this node.
    pub fn is_populated(&self) -> bool {
        self.populated.load(Ordering::Acquire)
    }

    pub(crate) fn set_populated(&self) {
        self.populated.store(true, Ordering::Release);
    }

    /// Record one origin's file in this directory.
    ///
    /// Lookup runs under the shared lock; only a missing key takes the
    /// exclusive lock, and the key is checked again once it is held. The
    /// contribution is added while the lock is still held, so a concurrent
    /// removal cannot delete the file between lookup and insertion.
    pub fn insert_file(
        self: &Arc<Self>,
        name: &str,
        origin: &FilesOrigin,
        modified: SystemTime,
        archive: Option<ArchiveTag>,
        size: Option<u64>,
        compressed_size: Option<u64>,
    ) -> Arc<FileEntry> {
        let key = fold_key(name);
        let registry = self.registry();
        let stats = self.context.stats();
        let contribution = Contribution::new(
            origin.id(),
            archive,
            size,
            compressed_size,
            modified,
            registry.next_sequence(),
        );

        let existing = {
            let files = self.files.read();
            files
                .get(&key)
                .and_then(|index| registry.get_file(*index))
                .inspect(|file| file.add_origin(contribution.clone(), registry.origins()))
        };
        let file = match existing {
            Some(file) => {
                stats.file_existing();
                file
            }
            None => {
                let mut files = self.files.write();
                let file = match files.get(&key).and_then(|index| registry.get_file(*index)) {
                    Some(file) => {
                        stats.file_existing();
                        file
                    }
                    None => {
                        let file = registry.create_file(name, key.clone(), Arc::downgrade(self));
                        files.insert(key, file.index());
                        stats.file_created();
                        file
                    }
                };
                file.add_origin(contribution, registry.origins());
                file
            }
        };

        origin.add_file(file.index());
        self.propagate_origin(origin.id());
        file
    }

    /// Return the child directory called `name`, creating it if needed.
    pub fn get_or_create_subdirectory(self: &Arc<Self>, name: &str) -> Arc<DirectoryEntry> {
        let key = fold_key(name);
        if let Some(dir) = self.subdirs.read().get(&key) {
            return Arc::clone(dir);
        }

        let mut subdirs = self.subdirs.write();
        if let Some(dir) = subdirs.get(&key) {
            return Arc::clone(dir);
        }
        let dir = Arc::new(Self::new(
            name,
            Arc::downgrade(self),
            Arc::clone(&self.context),
        ));
        subdirs.insert(key, Arc::clone(&dir));
        self.context.stats().dir_created();
        dir
    }

    /// Mark `origin` as contributing to this node and every ancestor.
    pub fn propagate_origin(&self, origin: OriginId) {
        if !insert_origin(&self.origins, origin) {
            return;
        }
        let mut parent = self.parent();
        while let Some(dir) = parent {
            // Ancestors above an already-marked node are marked too.
            if !insert_origin(&dir.origins, origin) {
                break;
            }
            parent = dir.parent();
        }
    }

    /// Remove `origin` from this node and its ancestors for as long as
    /// nothing below them still comes from it.
    pub(crate) fn prune_origin(&self, origin: OriginId) {
        if !self.release_origin(origin) {
            return;
        }
        let mut parent = self.parent();
        while let Some(dir) = parent {
            if !dir.release_origin(origin) {
                break;
            }
            parent = dir.parent();
        }
    }

    fn release_origin(&self, origin: OriginId) -> bool {
        if self.contributes(origin) {
            return false;
        }
        self.origins.write().remove(&origin)
    }

    /// Whether a file here or a subdirectory's origin set still names `origin`.
    fn contributes(&self, origin: OriginId) -> bool {
        let indices: Vec<FileIndex> = self.files.read().values().copied().collect();
        let registry = self.registry();
        if indices
            .into_iter()
            .filter_map(|index| registry.get_file(index))
            .any(|file| file.has_origin(origin))
        {
            return true;
        }
        self.subdirectories()
            .iter()
            .any(|dir| dir.origins.read().contains(&origin))
    }

    fn lookup_file(&self, key: &str) -> Option<Arc<FileEntry>> {
        let index = self.files.read().get(key).copied()?;
        self.registry().get_file(index)
    }

    /// Resolve a `/`- or `\`-separated path to a file or, with a trailing
    /// separator, to a directory.
    pub fn search_file(self: &Arc<Self>, path: &str) -> Option<SearchHit> {
        if path.is_empty() {
            return Some(SearchHit::Directory(Arc::clone(self)));
        }
        let (first, rest) = split_first_component(path);
        match rest {
            None => self.lookup_file(&fold_key(first)).map(SearchHit::File),
            Some(rest) if first.is_empty() => self.search_file(rest),
            Some(rest) => self.find_subdirectory(first)?.search_file(rest),
        }
    }

    /// Resolve a path to a file; directories yield `None`.
    pub fn find_file(self: &Arc<Self>, path: &str) -> Option<Arc<FileEntry>> {
        match self.search_file(path)? {
            SearchHit::File(file) => Some(file),
            SearchHit::Directory(_) => None,
        }
    }

    /// Whether this directory directly holds a file called `name`.
    pub fn has_file(&self, name: &str) -> bool {
        self.files.read().contains_key(fold_key(name).as_str())
    }

    pub fn file_index(&self, name: &str) -> Option<FileIndex> {
        self.files.read().get(fold_key(name).as_str()).copied()
    }

    /// Files directly in this directory, ordered by key.
    pub fn get_files(&self) -> Vec<Arc<FileEntry>> {
        let indices: Vec<FileIndex> = self.files.read().values().copied().collect();
        let registry = self.registry();
        indices
            .into_iter()
            .filter_map(|index| registry.get_file(index))
            .collect()
    }

    /// Lowercase keys of the files map, in order.
    pub fn file_keys(&self) -> Vec<CompactString> {
        self.files.read().keys().cloned().collect()
    }

    pub fn file_count(&self) -> usize {
        self.files.read().len()
    }

    pub fn file_count_recursive(&self) -> usize {
        self.file_count()
            + self
                .subdirectories()
                .iter()
                .map(|dir| dir.file_count_recursive())
                .sum::<usize>()
    }

    pub fn find_subdirectory(&self, name: &str) -> Option<Arc<DirectoryEntry>> {
        self.subdirs.read().get(fold_key(name).as_str()).cloned()
    }

    /// Follow a separated path of directory names.
    pub fn find_subdirectory_recursive(self: &Arc<Self>, path: &str) -> Option<Arc<DirectoryEntry>> {
        if path.is_empty() {
            return Some(Arc::clone(self));
        }
        let (first, rest) = split_first_component(path);
        if first.is_empty() {
            return self.find_subdirectory_recursive(rest.unwrap_or_default());
        }
        let dir = self.find_subdirectory(first)?;
        match rest {
            Some(rest) => dir.find_subdirectory_recursive(rest),
            None => Some(dir),
        }
    }

    /// Child directories, ordered by key.
    pub fn subdirectories(&self) -> Vec<Arc<DirectoryEntry>> {
        self.subdirs.read().values().cloned().collect()
    }

    /// Remove one file of this directory by name, returning the origin that
    /// provided it.
    pub fn remove(&self, name: &str) -> Option<OriginId> {
        let Some(index) = self.file_index(name) else {
            warn!(dir = %self.name, file = name, "cannot remove missing file");
            return None;
        };
        let origin = self.registry().get_file(index).and_then(|file| file.origin());
        self.registry().remove_file(index);
        origin
    }

    /// Remove the file at `path`, whoever contributes it.
    pub fn remove_file(&self, path: &str) -> bool {
        let (first, rest) = split_first_component(path);
        match rest {
            None => match self.file_index(first) {
                Some(index) => self.registry().remove_file(index),
                None => {
                    warn!(dir = %self.name, file = first, "cannot remove missing file");
                    false
                }
            },
            Some(rest) if first.is_empty() => self.remove_file(rest),
            Some(rest) => match self.find_subdirectory(first) {
                Some(dir) => dir.remove_file(rest),
                None => {
                    warn!(dir = %self.name, path, "cannot remove file, no such directory");
                    false
                }
            },
        }
    }

    /// Remove the directory at `path` together with everything below it.
    pub fn remove_dir(&self, path: &str) -> bool {
        let (first, rest) = split_first_component(path);
        match rest {
            Some(rest) if first.is_empty() => self.remove_dir(rest),
            Some(rest) if !rest.is_empty() => match self.find_subdirectory(first) {
                Some(dir) => dir.remove_dir(rest),
                None => {
                    warn!(dir = %self.name, path, "cannot remove directory, no such parent");
                    false
                }
            },
            _ => {
                let Some(dir) = self.subdirs.write().remove(fold_key(first).as_str()) else {
                    warn!(dir = %self.name, path, "cannot remove missing directory");
                    return false;
                };
                let touched = dir.origins();
                dir.remove_dir_recursive();
                for origin in touched {
                    self.prune_origin(origin);
                }
                true
            }
        }
    }

    /// Delete every file and subdirectory below this node, deepest first.
    pub fn remove_dir_recursive(&self) {
        let subdirs = std::mem::take(&mut *self.subdirs.write());
        for dir in subdirs.into_values() {
            dir.remove_dir_recursive();
        }

        let files = std::mem::take(&mut *self.files.write());
        let registry = self.registry();
        for index in files.into_values() {
            registry.remove_file(index);
        }
        self.origins.write().clear();
        trace!(dir = %self.name, "directory emptied");
    }

    /// Unlink `file` if it is still listed here and still has no contribution.
    ///
    /// The emptiness check runs under the exclusive lock that `insert_file`
    /// holds while contributing, so a file gaining a contribution is kept.
    pub(crate) fn detach_if_empty(&self, file: &FileEntry) -> bool {
        let mut files = self.files.write();
        if files.get(file.key()) != Some(&file.index()) || !file.is_empty() {
            return false;
        }
        files.remove(file.key());
        true
    }

    pub(crate) fn detach_file(&self, key: &str, index: FileIndex) {
        let mut files = self.files.write();
        if files.get(key) == Some(&index) {
            files.remove(key);
        }
    }

    /// Some origin providing a loose file in this subtree.
    pub fn any_origin(&self) -> Option<OriginId> {
        let loose = self
            .get_files()
            .iter()
            .filter_map(|file| file.winner())
            .find(|winner| !winner.is_from_archive())
            .map(|winner| winner.origin);
        loose.or_else(|| {
            self.subdirectories()
                .iter()
                .find_map(|dir| dir.any_origin())
        })
    }

    pub fn has_contents_from_origin(&self, origin: OriginId) -> bool {
        self.origins.read().contains(&origin)
    }

    /// Origins contributing to this subtree, in id order.
    pub fn origins(&self) -> Vec<OriginId> {
        self.origins.read().iter().copied().collect()
    }

    pub fn is_empty(&self) -> bool {
        self.files.read().is_empty() && self.subdirs.read().is_empty()
    }

    /// Re-sort every file's contributions under the current priorities.
    pub fn sort_origins_recursive(&self) {
        let origins = self.origin_table();
        for file in self.get_files() {
            file.sort_origins(origins);
        }
        for dir in self.subdirectories() {
            dir.sort_origins_recursive();
        }
    }

    /// Every file below this node that has at least one alternative, with
    /// its path from the tree root.
    pub fn conflicts(&self) -> Vec<(String, Arc<FileEntry>)> {
        let mut out = Vec::new();
        self.collect_conflicts(&mut out);
        out
    }

    fn collect_conflicts(&self, out: &mut Vec<(String, Arc<FileEntry>)>) {
        for file in self.get_files() {
            if file.has_alternatives() {
                out.push((file.relative_path(), file));
            }
        }
        for dir in self.subdirectories() {
            dir.collect_conflicts(out);
        }
    }
}

fn insert_origin(set: &RwLock<BTreeSet<OriginId>>, origin: OriginId) -> bool {
    if set.read().contains(&origin) {
        return false;
    }
    set.write().insert(origin)
}

impl std::fmt::Debug for DirectoryEntry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DirectoryEntry")
            .field("name", &self.name)
            .field("files", &self.file_count())
            .field("subdirs", &self.subdirs.read().len())
            .field("origins", &self.origins())
            .finish_non_exhaustive()
    }
}
