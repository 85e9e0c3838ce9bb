//! Export of the merged path to origin mapping.

use std::fs::File;
use std::io::{self, BufWriter, Write};
use std::path::Path;

use compact_str::CompactString;
use serde::Serialize;
use tracing::debug;

use modvfs_core::{DumpError, OriginId};

use crate::directory::DirectoryEntry;
use crate::file::FileEntry;

/// One loose file of the merged tree and the origin it resolves to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MappingEntry {
    pub path: String,
    pub origin: CompactString,
}

impl DirectoryEntry {
    /// Write the mapping of every loose file to `path`, one
    /// `path<TAB>origin` line per file.
    pub fn dump(&self, path: &Path) -> Result<(), DumpError> {
        let file = File::create(path).map_err(|source| DumpError::Open {
            path: path.to_path_buf(),
            source,
        })?;
        let mut writer = BufWriter::new(file);

        self.dump_to(&mut writer)
            .and_then(|()| writer.flush())
            .map_err(|source| DumpError::Write {
                path: path.to_path_buf(),
                source,
            })?;

        debug!(path = %path.display(), "tree dumped");
        Ok(())
    }

    /// Write the dump to any sink. A directory's own files come before its
    /// subdirectories; files from archives are left out.
    pub fn dump_to(&self, writer: &mut dyn Write) -> io::Result<()> {
        self.for_each_loose_file("", &mut |path: &str, origin: &str| {
            writeln!(writer, "{path}\t{origin}")
        })
    }

    /// The dump as values, in dump order.
    pub fn mapping(&self) -> Vec<MappingEntry> {
        let mut entries = Vec::new();
        // Infallible: the callback never errors.
        let _ = self.for_each_loose_file("", &mut |path: &str, origin: &str| {
            entries.push(MappingEntry {
                path: path.to_string(),
                origin: CompactString::new(origin),
            });
            Ok(())
        });
        entries
    }

    fn for_each_loose_file(
        &self,
        prefix: &str,
        f: &mut dyn FnMut(&str, &str) -> io::Result<()>,
    ) -> io::Result<()> {
        let origins = self.origin_table();
        for file in self.get_files() {
            let Some(origin) = loose_winner(&file) else {
                continue;
            };
            let name = origins
                .find_by_id(origin)
                .map(|o| o.name())
                .unwrap_or_default();
            f(&format!("{prefix}{}", file.name()), &name)?;
        }
        for dir in self.subdirectories() {
            dir.for_each_loose_file(&format!("{prefix}{}/", dir.name()), f)?;
        }
        Ok(())
    }
}

fn loose_winner(file: &FileEntry) -> Option<OriginId> {
    file.winner()
        .filter(|winner| !winner.is_from_archive())
        .map(|winner| winner.origin)
}
