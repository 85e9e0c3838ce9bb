//! Origins and the table that owns them.

use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicI32, AtomicU32, Ordering};
use std::sync::{Arc, Weak};

use compact_str::CompactString;
use parking_lot::{Mutex, RwLock};
use tracing::debug;

use modvfs_core::{FileIndex, OriginId, VfsError, fold_key};

use crate::registry::FileRegistry;

/// One prioritized source of files: a mod folder or an archive-only source.
#[derive(Debug)]
pub struct FilesOrigin {
    id: OriginId,
    name: RwLock<CompactString>,
    path: RwLock<PathBuf>,
    priority: AtomicI32,
    disabled: AtomicBool,
    files: Mutex<HashSet<FileIndex>>,
    /// Folded names of archives already ingested for this origin.
    archives: Mutex<HashSet<CompactString>>,
    registry: Weak<FileRegistry>,
}

impl FilesOrigin {
    fn new(
        id: OriginId,
        name: &str,
        path: PathBuf,
        priority: i32,
        registry: Weak<FileRegistry>,
    ) -> Self {
        Self {
            id,
            name: RwLock::new(CompactString::new(name)),
            path: RwLock::new(path),
            priority: AtomicI32::new(priority),
            disabled: AtomicBool::new(false),
            files: Mutex::new(HashSet::new()),
            archives: Mutex::new(HashSet::new()),
            registry,
        }
    }

    pub fn id(&self) -> OriginId {
        self.id
    }

    pub fn name(&self) -> CompactString {
        self.name.read().clone()
    }

    pub fn path(&self) -> PathBuf {
        self.path.read().clone()
    }

    /// Larger values win conflicts.
    pub fn priority(&self) -> i32 {
        self.priority.load(Ordering::Acquire)
    }

    /// Change the priority. Existing files keep their order until
    /// [`DirectoryEntry::sort_origins_recursive`](crate::DirectoryEntry::sort_origins_recursive)
    /// runs.
    pub fn set_priority(&self, priority: i32) {
        self.priority.store(priority, Ordering::Release);
    }

    pub fn is_enabled(&self) -> bool {
        !self.disabled.load(Ordering::Acquire)
    }

    /// Enable or disable the origin.
    ///
    /// Disabling drops every contribution this origin currently makes; files
    /// left without contributions are deleted. The record itself stays.
    pub fn enable(&self, enabled: bool) {
        self.disabled.store(!enabled, Ordering::Release);
        if enabled {
            return;
        }

        let files: Vec<FileIndex> = self.files.lock().drain().collect();
        self.archives.lock().clear();

        if files.is_empty() {
            return;
        }
        debug!(origin = %self.name(), files = files.len(), "disabling origin");
        if let Some(registry) = self.registry.upgrade() {
            registry.remove_origin_multi(&files, self.id);
        }
    }

    /// Files this origin currently contributes, in index order.
    pub fn files(&self) -> Vec<FileIndex> {
        let mut files: Vec<_> = self.files.lock().iter().copied().collect();
        files.sort_unstable();
        files
    }

    pub fn file_count(&self) -> usize {
        self.files.lock().len()
    }

    pub fn contributes(&self, index: FileIndex) -> bool {
        self.files.lock().contains(&index)
    }

    pub(crate) fn add_file(&self, index: FileIndex) {
        self.files.lock().insert(index);
    }

    pub(crate) fn remove_file(&self, index: FileIndex) {
        self.files.lock().remove(&index);
    }

    /// Whether an archive with this file name was already ingested.
    pub fn contains_archive(&self, archive_name: &str) -> bool {
        self.archives.lock().contains(&fold_key(archive_name))
    }

    pub(crate) fn add_archive(&self, archive_name: &str) {
        self.archives.lock().insert(fold_key(archive_name));
    }

    fn set_name(&self, new_name: &str) {
        let old = std::mem::replace(&mut *self.name.write(), CompactString::new(new_name));

        let mut path = self.path.write();
        if path.file_name().is_some_and(|n| n == old.as_str()) {
            path.set_file_name(new_name);
        }
    }
}

#[derive(Debug, Default)]
struct OriginMaps {
    by_id: HashMap<OriginId, Arc<FilesOrigin>>,
    by_name: HashMap<CompactString, OriginId>,
}

/// Every origin of one merge tree, by id and by name.
#[derive(Debug, Default)]
pub struct OriginTable {
    inner: RwLock<OriginMaps>,
    next_id: AtomicU32,
}

impl OriginTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Return the origin called `name`, creating it if needed.
    ///
    /// The flag is true when this call created the origin. An existing
    /// origin keeps its path and priority.
    pub fn get_or_create(
        &self,
        name: &str,
        path: impl AsRef<Path>,
        priority: i32,
        registry: &Arc<FileRegistry>,
    ) -> (Arc<FilesOrigin>, bool) {
        if let Some(origin) = self.find_by_name(name) {
            return (origin, false);
        }

        let mut maps = self.inner.write();
        // Another thread may have won the race.
        if let Some(id) = maps.by_name.get(name) {
            if let Some(origin) = maps.by_id.get(id) {
                return (Arc::clone(origin), false);
            }
        }

        let id = OriginId(self.next_id.fetch_add(1, Ordering::Relaxed));
        let origin = Arc::new(FilesOrigin::new(
            id,
            name,
            path.as_ref().to_path_buf(),
            priority,
            Arc::downgrade(registry),
        ));
        maps.by_name.insert(CompactString::new(name), id);
        maps.by_id.insert(id, Arc::clone(&origin));
        (origin, true)
    }

    pub fn get_by_id(&self, id: OriginId) -> Result<Arc<FilesOrigin>, VfsError> {
        self.find_by_id(id).ok_or(VfsError::UnknownOrigin { id })
    }

    pub fn get_by_name(&self, name: &str) -> Result<Arc<FilesOrigin>, VfsError> {
        self.find_by_name(name)
            .ok_or_else(|| VfsError::UnknownOriginName {
                name: name.to_string(),
            })
    }

    pub fn find_by_id(&self, id: OriginId) -> Option<Arc<FilesOrigin>> {
        self.inner.read().by_id.get(&id).cloned()
    }

    pub fn find_by_name(&self, name: &str) -> Option<Arc<FilesOrigin>> {
        let maps = self.inner.read();
        let id = maps.by_name.get(name)?;
        maps.by_id.get(id).cloned()
    }

    pub fn exists(&self, name: &str) -> bool {
        self.inner.read().by_name.contains_key(name)
    }

    /// Priority of an origin; unknown ids rank below everything.
    pub fn priority_of(&self, id: OriginId) -> i32 {
        self.inner
            .read()
            .by_id
            .get(&id)
            .map_or(i32::MIN, |origin| origin.priority())
    }

    /// Move the name index entry from `old_name` to `new_name`.
    pub fn change_name_lookup(&self, old_name: &str, new_name: &str) -> Result<(), VfsError> {
        let mut maps = self.inner.write();
        Self::rekey(&mut maps, old_name, new_name).map(|_| ())
    }

    fn rekey(maps: &mut OriginMaps, old_name: &str, new_name: &str) -> Result<OriginId, VfsError> {
        if old_name != new_name && maps.by_name.contains_key(new_name) {
            return Err(VfsError::DuplicateOriginName {
                name: new_name.to_string(),
            });
        }
        let id = maps
            .by_name
            .remove(old_name)
            .ok_or_else(|| VfsError::UnknownOriginName {
                name: old_name.to_string(),
            })?;
        maps.by_name.insert(CompactString::new(new_name), id);
        Ok(id)
    }

    /// Rename an origin. Its path follows when it ends with the old name.
    pub fn rename(&self, id: OriginId, new_name: &str) -> Result<(), VfsError> {
        let mut maps = self.inner.write();
        let origin = maps
            .by_id
            .get(&id)
            .cloned()
            .ok_or(VfsError::UnknownOrigin { id })?;
        let old_name = origin.name();
        Self::rekey(&mut maps, &old_name, new_name)?;
        origin.set_name(new_name);
        debug!(origin = %id, from = %old_name, to = new_name, "origin renamed");
        Ok(())
    }

    pub fn set_priority(&self, id: OriginId, priority: i32) -> Result<(), VfsError> {
        self.get_by_id(id)?.set_priority(priority);
        Ok(())
    }

    /// Disable an origin and forget it entirely.
    pub fn purge(&self, id: OriginId) -> Result<(), VfsError> {
        let origin = self.get_by_id(id)?;
        origin.enable(false);

        let mut maps = self.inner.write();
        maps.by_id.remove(&id);
        let name = origin.name();
        if maps.by_name.get(&name) == Some(&id) {
            maps.by_name.remove(&name);
        }
        Ok(())
    }

    /// All origins, lowest priority first, ties by id.
    pub fn origins(&self) -> Vec<Arc<FilesOrigin>> {
        let mut origins: Vec<_> = self.inner.read().by_id.values().cloned().collect();
        origins.sort_by_key(|o| (o.priority(), o.id()));
        origins
    }

    pub fn len(&self) -> usize {
        self.inner.read().by_id.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fixture() -> (Arc<OriginTable>, Arc<FileRegistry>) {
        let origins = Arc::new(OriginTable::new());
        let registry = Arc::new(FileRegistry::new(Arc::clone(&origins)));
        (origins, registry)
    }

    #[test]
    fn test_get_or_create_is_idempotent() {
        let (origins, registry) = fixture();
        let (first, created) = origins.get_or_create("ModA", "/mods/ModA", 1, &registry);
        assert!(created);
        let (second, created) = origins.get_or_create("ModA", "/elsewhere", 7, &registry);
        assert!(!created);

        assert_eq!(first.id(), second.id());
        assert_eq!(second.priority(), 1);
        assert_eq!(origins.len(), 1);
    }

    #[test]
    fn test_lookup_errors() {
        let (origins, _registry) = fixture();
        assert_eq!(
            origins.get_by_id(OriginId(42)).unwrap_err(),
            VfsError::UnknownOrigin { id: OriginId(42) }
        );
        assert!(origins.get_by_name("nope").is_err());
        assert!(origins.find_by_name("nope").is_none());
        assert!(!origins.exists("nope"));
    }

    #[test]
    fn test_rename_updates_lookup_and_path() {
        let (origins, registry) = fixture();
        let (origin, _) = origins.get_or_create("ModA", "/mods/ModA", 1, &registry);
        origins.get_or_create("ModB", "/mods/ModB", 2, &registry);

        assert_eq!(
            origins.rename(origin.id(), "ModB"),
            Err(VfsError::DuplicateOriginName {
                name: "ModB".to_string()
            })
        );

        origins.rename(origin.id(), "ModA Renamed").unwrap();
        assert!(!origins.exists("ModA"));
        assert_eq!(origins.get_by_name("ModA Renamed").unwrap().id(), origin.id());
        assert_eq!(origin.path(), PathBuf::from("/mods/ModA Renamed"));
    }

    #[test]
    fn test_rename_keeps_unrelated_path() {
        let (origins, registry) = fixture();
        let (origin, _) = origins.get_or_create("Data", "", 0, &registry);
        origins.rename(origin.id(), "Base").unwrap();
        assert_eq!(origin.path(), PathBuf::new());
    }

    #[test]
    fn test_origins_sorted_by_priority() {
        let (origins, registry) = fixture();
        origins.get_or_create("High", "", 5, &registry);
        origins.get_or_create("Low", "", -1, &registry);
        origins.get_or_create("Mid", "", 2, &registry);

        let names: Vec<_> = origins.origins().iter().map(|o| o.name()).collect();
        assert_eq!(names, vec!["Low", "Mid", "High"]);
    }

    #[test]
    fn test_archive_names_are_case_insensitive() {
        let (origins, registry) = fixture();
        let (origin, _) = origins.get_or_create("ModA", "", 0, &registry);
        origin.add_archive("ModA - Main.BSA");
        assert!(origin.contains_archive("moda - main.bsa"));

        origin.enable(false);
        assert!(!origin.contains_archive("ModA - Main.bsa"));
        assert!(!origin.is_enabled());
    }

    #[test]
    fn test_purge_forgets_origin() {
        let (origins, registry) = fixture();
        let (origin, _) = origins.get_or_create("ModA", "", 0, &registry);
        origins.purge(origin.id()).unwrap();
        assert!(origins.is_empty());
        assert!(origins.purge(origin.id()).is_err());
    }
}
