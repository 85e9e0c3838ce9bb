//! Sequential walker on top of walkdir.

use std::path::Path;
use std::time::UNIX_EPOCH;

use tracing::warn;
use walkdir::WalkDir;

use modvfs_core::{ScanError, ScanWarning, WarningKind};

use crate::walker::{DirStack, DirectoryWalker, WalkOptions, WalkSummary, WalkVisitor, check_root};

/// Walker that reads one directory at a time on the calling thread.
#[derive(Debug, Clone, Default)]
pub struct WalkdirWalker {
    options: WalkOptions,
}

impl WalkdirWalker {
    /// Create a new walker.
    pub fn new(options: WalkOptions) -> Self {
        Self { options }
    }
}

impl DirectoryWalker for WalkdirWalker {
    fn walk(&self, root: &Path, visitor: &mut dyn WalkVisitor) -> Result<WalkSummary, ScanError> {
        check_root(root)?;

        let walker = WalkDir::new(root)
            .follow_links(self.options.follow_symlinks)
            .min_depth(1)
            .max_depth(self.options.depth_limit());

        let mut summary = WalkSummary::default();
        let mut stack = DirStack::default();

        for entry_result in walker {
            let entry = match entry_result {
                Ok(e) => e,
                Err(err) => {
                    let path = err.path().map(|p| p.to_path_buf()).unwrap_or_default();
                    warn!(path = %path.display(), error = %err, "skipping unreadable directory");
                    let warning = match err.io_error() {
                        Some(io) => ScanWarning::from_io(path, io),
                        None => ScanWarning::new(path, err.to_string(), WarningKind::ReadError),
                    };
                    summary.warnings.push(warning);
                    continue;
                }
            };

            stack.close_to(entry.depth(), visitor);

            let file_name = entry.file_name().to_string_lossy();

            if entry.file_type().is_dir() {
                summary.directories += 1;
                stack.enter(&file_name, visitor);
                continue;
            }

            let metadata = match entry.metadata() {
                Ok(m) => m,
                Err(err) => {
                    warn!(path = %entry.path().display(), error = %err, "skipping file without metadata");
                    summary.warnings.push(ScanWarning::new(
                        entry.path(),
                        err.to_string(),
                        WarningKind::MetadataError,
                    ));
                    continue;
                }
            };

            let size = metadata.len();
            summary.files += 1;
            summary.bytes += size;
            visitor.on_file(
                &file_name,
                metadata.modified().unwrap_or(UNIX_EPOCH),
                size,
            );
        }

        stack.finish(visitor);
        Ok(summary)
    }
}
