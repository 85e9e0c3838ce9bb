//! Collect a walk into a [`SnapshotDir`].

use std::path::Path;
use std::time::SystemTime;

use modvfs_core::{ScanError, SnapshotDir, SnapshotFile};

use crate::walker::{DirectoryWalker, WalkSummary, WalkVisitor};

/// Visitor that assembles walk events into a snapshot tree.
#[derive(Debug)]
pub struct SnapshotBuilder {
    stack: Vec<SnapshotDir>,
}

impl SnapshotBuilder {
    pub fn new() -> Self {
        Self {
            stack: vec![SnapshotDir::new("")],
        }
    }

    /// Close any directories left open and return the root.
    pub fn finish(mut self) -> SnapshotDir {
        while self.stack.len() > 1 {
            self.pop_into_parent();
        }
        self.stack.pop().unwrap_or_default()
    }

    fn pop_into_parent(&mut self) {
        if self.stack.len() < 2 {
            return;
        }
        if let Some(dir) = self.stack.pop() {
            if let Some(parent) = self.stack.last_mut() {
                parent.dirs.push(dir);
            }
        }
    }
}

impl Default for SnapshotBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl WalkVisitor for SnapshotBuilder {
    fn on_directory_start(&mut self, name: &str) {
        self.stack.push(SnapshotDir::new(name));
    }

    fn on_directory_end(&mut self, _name: &str) {
        self.pop_into_parent();
    }

    fn on_file(&mut self, name: &str, modified: SystemTime, size: u64) {
        if let Some(dir) = self.stack.last_mut() {
            dir.files.push(SnapshotFile::new(name, modified, size));
        }
    }
}

/// Walk `root` and return its snapshot.
pub fn take_snapshot(
    walker: &dyn DirectoryWalker,
    root: &Path,
) -> Result<(SnapshotDir, WalkSummary), ScanError> {
    let mut builder = SnapshotBuilder::new();
    let summary = walker.walk(root, &mut builder)?;
    Ok((builder.finish(), summary))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builder_nests_directories() {
        let mut builder = SnapshotBuilder::new();
        builder.on_file("top.txt", SystemTime::UNIX_EPOCH, 1);
        builder.on_directory_start("a");
        builder.on_directory_start("b");
        builder.on_file("deep.txt", SystemTime::UNIX_EPOCH, 2);
        builder.on_directory_end("b");
        builder.on_directory_end("a");

        let root = builder.finish();
        assert_eq!(root.files[0].name, "top.txt");
        assert_eq!(root.dirs[0].name, "a");
        assert_eq!(root.dirs[0].dirs[0].files[0].size, Some(2));
    }

    #[test]
    fn test_unbalanced_end_is_ignored() {
        let mut builder = SnapshotBuilder::new();
        builder.on_directory_end("stray");
        builder.on_file("kept.txt", SystemTime::UNIX_EPOCH, 1);
        let root = builder.finish();
        assert_eq!(root.files.len(), 1);
    }
}
