//! Zip central-directory reader.

use std::fs::File;
use std::io::BufReader;
use std::path::Path;
use std::time::UNIX_EPOCH;

use tracing::warn;
use zip::ZipArchive;

use modvfs_core::{ArchiveError, SnapshotDir, SnapshotFile};

use crate::ArchiveReader;

/// Reads names and sizes from a zip file's central directory.
///
/// Entry data is never decompressed.
#[derive(Debug, Clone, Copy, Default)]
pub struct ZipIndexReader;

impl ZipIndexReader {
    pub fn new() -> Self {
        Self
    }
}

impl ArchiveReader for ZipIndexReader {
    fn read_index(&self, path: &Path) -> Result<SnapshotDir, ArchiveError> {
        let file = File::open(path).map_err(|source| ArchiveError::Open {
            path: path.to_path_buf(),
            source,
        })?;
        let modified = file
            .metadata()
            .and_then(|m| m.modified())
            .unwrap_or(UNIX_EPOCH);

        let malformed = |message: String| ArchiveError::Malformed {
            path: path.to_path_buf(),
            message,
        };

        let mut archive =
            ZipArchive::new(BufReader::new(file)).map_err(|e| malformed(e.to_string()))?;

        let archive_name = path
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_default();
        let mut root = SnapshotDir::new(archive_name);

        for i in 0..archive.len() {
            let entry = archive.by_index_raw(i).map_err(|e| malformed(e.to_string()))?;

            if entry.enclosed_name().is_none() {
                warn!(archive = %path.display(), entry = entry.name(), "skipping entry with unsafe path");
                continue;
            }

            if entry.is_dir() {
                root.ensure_dir(entry.name().trim_end_matches(['/', '\\']));
                continue;
            }

            root.insert_path(
                entry.name(),
                SnapshotFile::packed("", modified, entry.size(), entry.compressed_size()),
            );
        }

        Ok(root)
    }
}
