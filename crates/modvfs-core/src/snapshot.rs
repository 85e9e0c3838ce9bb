//! Snapshot trees: plain, pre-walked directory structures.
//!
//! A snapshot is what a walker or an archive reader hands to the merge tree
//! when the data was enumerated ahead of time. It owns nothing but names and
//! metadata, so it can be built on a worker thread and merged later.

use std::time::SystemTime;

use compact_str::CompactString;
use serde::{Deserialize, Serialize};

use crate::ids::split_first_component;

/// A single file in a snapshot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SnapshotFile {
    /// File name (not full path).
    pub name: CompactString,
    /// Last modification time.
    pub modified: SystemTime,
    /// Size in bytes, `None` when unknown.
    pub size: Option<u64>,
    /// Stored size inside an archive, `None` for loose files or when unknown.
    pub compressed_size: Option<u64>,
}

impl SnapshotFile {
    /// Create a loose file entry.
    pub fn new(name: impl Into<CompactString>, modified: SystemTime, size: u64) -> Self {
        Self {
            name: name.into(),
            modified,
            size: Some(size),
            compressed_size: None,
        }
    }

    /// Create an entry for a file stored in an archive.
    pub fn packed(
        name: impl Into<CompactString>,
        modified: SystemTime,
        size: u64,
        compressed_size: u64,
    ) -> Self {
        Self {
            name: name.into(),
            modified,
            size: Some(size),
            compressed_size: Some(compressed_size),
        }
    }
}

/// A directory in a snapshot, with its files and subdirectories.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SnapshotDir {
    /// Directory name (empty for the root).
    pub name: CompactString,
    /// Files directly inside this directory.
    pub files: Vec<SnapshotFile>,
    /// Subdirectories.
    pub dirs: Vec<SnapshotDir>,
}

impl SnapshotDir {
    /// Create an empty directory.
    pub fn new(name: impl Into<CompactString>) -> Self {
        Self {
            name: name.into(),
            files: Vec::new(),
            dirs: Vec::new(),
        }
    }

    /// Get a subdirectory by exact name, creating it if missing.
    pub fn dir_mut(&mut self, name: &str) -> &mut SnapshotDir {
        let pos = match self.dirs.iter().position(|d| d.name == name) {
            Some(pos) => pos,
            None => {
                self.dirs.push(SnapshotDir::new(name));
                self.dirs.len() - 1
            }
        };
        &mut self.dirs[pos]
    }

    /// Insert a file at a `/`- or `\`-separated relative path, creating
    /// intermediate directories. The file's own name is replaced by the last
    /// path component.
    pub fn insert_path(&mut self, path: &str, mut file: SnapshotFile) {
        match split_first_component(path) {
            (name, None) => {
                file.name = name.into();
                self.files.push(file);
            }
            ("", Some(rest)) => self.insert_path(rest, file),
            (dir, Some(rest)) => self.dir_mut(dir).insert_path(rest, file),
        }
    }

    /// Ensure a directory exists at a relative path.
    pub fn ensure_dir(&mut self, path: &str) -> &mut SnapshotDir {
        match split_first_component(path) {
            ("", None) => self,
            (name, None) => self.dir_mut(name),
            ("", Some(rest)) => self.ensure_dir(rest),
            (dir, Some(rest)) => self.dir_mut(dir).ensure_dir(rest),
        }
    }

    /// Total number of files in this subtree.
    pub fn file_count(&self) -> u64 {
        self.files.len() as u64 + self.dirs.iter().map(SnapshotDir::file_count).sum::<u64>()
    }

    /// Total number of directories below this one.
    pub fn dir_count(&self) -> u64 {
        self.dirs.iter().map(|d| d.dir_count() + 1).sum()
    }

    /// Check whether the subtree holds no files at all.
    pub fn is_empty(&self) -> bool {
        self.files.is_empty() && self.dirs.iter().all(SnapshotDir::is_empty)
    }

    /// Sort files and directories by name, recursively.
    ///
    /// Walk order is not stable between runs; sorting makes two snapshots of
    /// the same tree compare equal.
    pub fn sort_by_name(&mut self) {
        self.files.sort_by(|a, b| a.name.cmp(&b.name));
        self.dirs.sort_by(|a, b| a.name.cmp(&b.name));
        for dir in &mut self.dirs {
            dir.sort_by_name();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_insert_path_creates_dirs() {
        let mut root = SnapshotDir::new("");
        root.insert_path(
            "meshes/armor/iron.nif",
            SnapshotFile::new("", SystemTime::UNIX_EPOCH, 10),
        );
        root.insert_path("readme.txt", SnapshotFile::new("", SystemTime::UNIX_EPOCH, 1));

        assert_eq!(root.files.len(), 1);
        assert_eq!(root.files[0].name, "readme.txt");
        assert_eq!(root.dirs[0].name, "meshes");
        assert_eq!(root.dirs[0].dirs[0].files[0].name, "iron.nif");
        assert_eq!(root.file_count(), 2);
        assert_eq!(root.dir_count(), 2);
    }

    #[test]
    fn test_dir_mut_reuses_existing() {
        let mut root = SnapshotDir::new("");
        root.dir_mut("textures");
        root.dir_mut("textures");
        assert_eq!(root.dirs.len(), 1);
    }

    #[test]
    fn test_is_empty_ignores_empty_dirs() {
        let mut root = SnapshotDir::new("");
        root.ensure_dir("a/b/c");
        assert!(root.is_empty());
        assert_eq!(root.dir_count(), 3);
    }
}
