//! Archive index readers for modvfs.
//!
//! The merge tree treats archives as opaque, read-only tree sources: a reader
//! turns an archive path into a [`SnapshotDir`] of names and sizes without
//! extracting anything. Any container format can be plugged in through
//! [`ArchiveReader`]; [`ZipIndexReader`] is provided for zip files.
//!
//! ```rust,no_run
//! use modvfs_archive::{ArchiveReader, ArchiveReaders, ZipIndexReader};
//!
//! let readers = ArchiveReaders::new().with_reader("zip", ZipIndexReader::new());
//! let index = readers.read_index("/mods/ModA/Textures.zip".as_ref()).unwrap();
//! println!("{} files", index.file_count());
//! ```

mod zip_index;

use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;

use modvfs_core::{ArchiveError, SnapshotDir};

pub use zip_index::ZipIndexReader;

/// Reads the file index of an archive.
pub trait ArchiveReader: Send + Sync {
    /// Return the archive's folder/file tree. The root is named after the
    /// archive file; files carry the archive's modification time.
    fn read_index(&self, path: &Path) -> Result<SnapshotDir, ArchiveError>;
}

/// Dispatches to a reader by file extension (case-insensitive).
#[derive(Clone, Default)]
pub struct ArchiveReaders {
    readers: HashMap<String, Arc<dyn ArchiveReader>>,
}

impl ArchiveReaders {
    pub fn new() -> Self {
        Self::default()
    }

    /// Readers for every format this crate understands.
    pub fn builtin() -> Self {
        Self::new().with_reader("zip", ZipIndexReader::new())
    }

    /// Register a reader for an extension (without the dot).
    pub fn with_reader(mut self, extension: &str, reader: impl ArchiveReader + 'static) -> Self {
        self.readers
            .insert(extension.to_ascii_lowercase(), Arc::new(reader));
        self
    }

    /// Check whether a reader is registered for this path's extension.
    pub fn supports(&self, path: &Path) -> bool {
        self.reader_for(path).is_some()
    }

    fn reader_for(&self, path: &Path) -> Option<&Arc<dyn ArchiveReader>> {
        let extension = path.extension()?.to_str()?.to_ascii_lowercase();
        self.readers.get(&extension)
    }
}

impl ArchiveReader for ArchiveReaders {
    fn read_index(&self, path: &Path) -> Result<SnapshotDir, ArchiveError> {
        match self.reader_for(path) {
            Some(reader) => reader.read_index(path),
            None => Err(ArchiveError::Malformed {
                path: path.to_path_buf(),
                message: "no reader registered for this archive type".to_string(),
            }),
        }
    }
}

impl std::fmt::Debug for ArchiveReaders {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut extensions: Vec<_> = self.readers.keys().collect();
        extensions.sort();
        f.debug_struct("ArchiveReaders")
            .field("extensions", &extensions)
            .finish()
    }
}
