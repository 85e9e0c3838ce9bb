//! Ingestion entry points: walked folders, snapshots and archives.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::SystemTime;

use tracing::{debug, trace, warn};

use modvfs_archive::ArchiveReader;
use modvfs_core::{ArchiveTag, SnapshotDir, UNRANKED_ORDER};
use modvfs_scan::WalkVisitor;

use crate::directory::DirectoryEntry;
use crate::origin::FilesOrigin;

/// Plugin extensions ignored when matching archive names to plugins.
const PLUGIN_EXTENSIONS: [&str; 3] = ["esp", "esm", "esl"];

/// Feeds walk events into the merge tree on behalf of one origin.
pub(crate) struct InsertVisitor<'a> {
    stack: Vec<Arc<DirectoryEntry>>,
    origin: &'a FilesOrigin,
}

impl<'a> InsertVisitor<'a> {
    pub(crate) fn new(root: &Arc<DirectoryEntry>, origin: &'a FilesOrigin) -> Self {
        Self {
            stack: vec![Arc::clone(root)],
            origin,
        }
    }

    fn current(&self) -> &Arc<DirectoryEntry> {
        // The root is never popped.
        &self.stack[self.stack.len() - 1]
    }
}

impl WalkVisitor for InsertVisitor<'_> {
    fn on_directory_start(&mut self, name: &str) {
        let dir = self.current().get_or_create_subdirectory(name);
        self.stack.push(dir);
    }

    fn on_directory_end(&mut self, _name: &str) {
        if self.stack.len() > 1 {
            self.stack.pop();
        }
    }

    fn on_file(&mut self, name: &str, modified: SystemTime, size: u64) {
        self.current()
            .insert_file(name, self.origin, modified, None, Some(size), None);
    }
}

impl DirectoryEntry {
    /// Get or create the origin `name` and make sure it is enabled.
    pub fn create_origin(&self, name: &str, path: &Path, priority: i32) -> Arc<FilesOrigin> {
        let (origin, created) =
            self.origin_table()
                .get_or_create(name, path, priority, self.registry());
        if created {
            self.context().stats().origin_created();
            debug!(origin = name, id = %origin.id(), priority, "origin created");
        } else {
            self.context().stats().origin_existing();
        }
        origin.enable(true);
        origin
    }

    /// Walk `path` and merge everything found as origin `name`.
    ///
    /// Unreadable subdirectories are skipped by the walker; an unreadable
    /// root is logged and leaves the origin without files.
    pub fn add_from_origin(self: &Arc<Self>, name: &str, path: &Path, priority: i32) {
        let origin = self.create_origin(name, path, priority);
        let mut visitor = InsertVisitor::new(self, &origin);

        match self.context().walker().walk(path, &mut visitor) {
            Ok(summary) => debug!(
                origin = name,
                files = summary.files,
                skipped = summary.warnings.len(),
                "origin ingested"
            ),
            Err(err) => warn!(origin = name, path = %path.display(), error = %err, "cannot walk origin"),
        }
        self.set_populated();
    }

    /// Merge a pre-walked snapshot as origin `name`. The snapshot root maps
    /// to this directory.
    pub fn add_from_list(
        self: &Arc<Self>,
        name: &str,
        path: &Path,
        snapshot: &SnapshotDir,
        priority: i32,
    ) {
        let origin = self.create_origin(name, path, priority);
        insert_snapshot(self, snapshot, &origin, None);
        debug!(origin = name, files = snapshot.file_count(), "snapshot merged");
        self.set_populated();
    }

    /// Merge one archive as origin `name`, tagged with the given order rank.
    pub fn add_from_bsa(
        self: &Arc<Self>,
        name: &str,
        path: &Path,
        archive_path: &Path,
        priority: i32,
        order: i32,
    ) {
        let origin = self.create_origin(name, path, priority);
        self.ingest_archive(&origin, archive_path, order);
        self.set_populated();
    }

    /// Merge every enabled archive in `archive_paths` as origin `name`.
    ///
    /// `enabled_archives` holds archive file names (case-insensitive); the
    /// order rank of each archive comes from [`archive_order`].
    pub fn add_from_all_bsas(
        self: &Arc<Self>,
        name: &str,
        path: &Path,
        archive_paths: &[PathBuf],
        enabled_archives: &[String],
        load_order: &[String],
        priority: i32,
    ) {
        let origin = self.create_origin(name, path, priority);

        for archive_path in archive_paths {
            let archive_name = archive_file_name(archive_path);
            if !enabled_archives
                .iter()
                .any(|enabled| enabled.eq_ignore_ascii_case(&archive_name))
            {
                trace!(origin = name, archive = %archive_name, "archive not enabled");
                continue;
            }
            let order = archive_order(&archive_name, load_order);
            self.ingest_archive(&origin, archive_path, order);
        }
        self.set_populated();
    }

    fn ingest_archive(self: &Arc<Self>, origin: &FilesOrigin, archive_path: &Path, order: i32) {
        let stats = self.context().stats();
        let archive_name = archive_file_name(archive_path);

        if origin.contains_archive(&archive_name) {
            stats.archive_skipped();
            debug!(origin = %origin.name(), archive = %archive_name, "archive already ingested");
            return;
        }

        match self.context().archives().read_index(archive_path) {
            Ok(index) => {
                let tag = ArchiveTag::new(archive_name.as_str(), order);
                insert_snapshot(self, &index, origin, Some(&tag));
                origin.add_archive(&archive_name);
                stats.archive_read();
                debug!(
                    origin = %origin.name(),
                    archive = %archive_name,
                    order,
                    files = index.file_count(),
                    "archive ingested"
                );
            }
            Err(err) => {
                stats.archive_failed();
                warn!(origin = %origin.name(), archive = %archive_path.display(), error = %err, "skipping archive");
            }
        }
    }
}

fn insert_snapshot(
    dir: &Arc<DirectoryEntry>,
    snapshot: &SnapshotDir,
    origin: &FilesOrigin,
    archive: Option<&ArchiveTag>,
) {
    for file in &snapshot.files {
        dir.insert_file(
            &file.name,
            origin,
            file.modified,
            archive.cloned(),
            file.size,
            file.compressed_size,
        );
    }
    for child in &snapshot.dirs {
        let subdir = dir.get_or_create_subdirectory(&child.name);
        insert_snapshot(&subdir, child, origin, archive);
    }
}

fn archive_file_name(path: &Path) -> String {
    path.file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_default()
}

/// Load-order rank of an archive.
///
/// An archive belongs to a plugin when its name starts with `"<plugin> - "`
/// or `"<plugin>."` (case-insensitive, plugin extension ignored). The longest
/// matching plugin wins; the rank is its position in `load_order`.
/// Unmatched archives get [`UNRANKED_ORDER`].
pub fn archive_order(archive_name: &str, load_order: &[String]) -> i32 {
    let archive = archive_name.to_lowercase();
    let mut best: Option<(usize, usize)> = None;

    for (position, plugin) in load_order.iter().enumerate() {
        let stem = plugin_stem(plugin).to_lowercase();
        if stem.is_empty() {
            continue;
        }
        let belongs = archive
            .strip_prefix(stem.as_str())
            .is_some_and(|rest| rest.starts_with(" - ") || rest.starts_with('.'));
        if belongs && best.is_none_or(|(len, _)| stem.len() > len) {
            best = Some((stem.len(), position));
        }
    }

    best.map_or(UNRANKED_ORDER, |(_, position)| {
        i32::try_from(position).unwrap_or(i32::MAX)
    })
}

fn plugin_stem(plugin: &str) -> &str {
    match plugin.rsplit_once('.') {
        Some((stem, ext)) if PLUGIN_EXTENSIONS.iter().any(|e| ext.eq_ignore_ascii_case(e)) => stem,
        _ => plugin,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn order(names: &[&str]) -> Vec<String> {
        names.iter().map(|n| n.to_string()).collect()
    }

    #[test]
    fn test_archive_order_matches_plugin_prefix() {
        let load_order = order(&["PluginX", "PluginY.esp"]);
        assert_eq!(archive_order("PluginX - Main.bsa", &load_order), 0);
        assert_eq!(archive_order("pluginy - textures.ba2", &load_order), 1);
        assert_eq!(archive_order("PluginY.bsa", &load_order), 1);
    }

    #[test]
    fn test_archive_order_unmatched() {
        let load_order = order(&["PluginX"]);
        assert_eq!(archive_order("Other - Main.bsa", &load_order), UNRANKED_ORDER);
        assert_eq!(archive_order("PluginXtra.bsa", &load_order), UNRANKED_ORDER);
        assert_eq!(archive_order("PluginX - Main.bsa", &[]), UNRANKED_ORDER);
    }

    #[test]
    fn test_archive_order_prefers_longest_plugin() {
        let load_order = order(&["Foo Bar", "Foo"]);
        assert_eq!(archive_order("Foo Bar - Main.bsa", &load_order), 0);
        assert_eq!(archive_order("Foo - Main.bsa", &load_order), 1);
    }

    #[test]
    fn test_plugin_stem() {
        assert_eq!(plugin_stem("Skyrim.esm"), "Skyrim");
        assert_eq!(plugin_stem("Patch.ESL"), "Patch");
        assert_eq!(plugin_stem("Mod.v2"), "Mod.v2");
    }
}
