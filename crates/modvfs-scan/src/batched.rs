//! JWalk-based walker: directory reads are batched and prefetched in
//! parallel, results are consumed in depth-first order.

use std::path::{Path, PathBuf};
use std::time::{Duration, UNIX_EPOCH};

use jwalk::{Parallelism, WalkDir};
use tracing::{debug, warn};

use modvfs_core::{ScanError, ScanWarning, WarningKind};

use crate::walker::{DirStack, DirectoryWalker, WalkOptions, WalkSummary, WalkVisitor, check_root};

/// High-throughput walker using jwalk for parallel directory reads.
#[derive(Debug, Clone, Default)]
pub struct JwalkWalker {
    options: WalkOptions,
}

impl JwalkWalker {
    /// Create a new walker.
    pub fn new(options: WalkOptions) -> Self {
        Self { options }
    }

    /// Pick where directory reads run.
    ///
    /// A walk started on a rayon worker must not queue its reads on that
    /// worker's own pool: every sibling worker may be blocked in a walk too.
    fn parallelism(&self) -> Parallelism {
        match rayon::current_thread_index() {
            Some(_) => Parallelism::RayonNewPool(self.options.read_threads),
            None => Parallelism::RayonDefaultPool {
                busy_timeout: Duration::from_secs(1),
            },
        }
    }
}

fn aborted(root: &Path, err: &jwalk::Error) -> ScanError {
    ScanError::Aborted {
        path: root.to_path_buf(),
        reason: err.to_string(),
    }
}

fn read_warning(path: PathBuf, err: &jwalk::Error) -> ScanWarning {
    match err.io_error() {
        Some(io) => ScanWarning::from_io(path, io),
        None => ScanWarning::new(path, err.to_string(), WarningKind::ReadError),
    }
}

impl DirectoryWalker for JwalkWalker {
    fn walk(&self, root: &Path, visitor: &mut dyn WalkVisitor) -> Result<WalkSummary, ScanError> {
        check_root(root)?;

        let walker = WalkDir::new(root)
            .parallelism(self.parallelism())
            .skip_hidden(false)
            .follow_links(self.options.follow_symlinks)
            .min_depth(1)
            .max_depth(self.options.depth_limit());

        let mut summary = WalkSummary::default();
        let mut stack = DirStack::default();

        for entry_result in walker {
            let mut entry = match entry_result {
                Ok(e) => e,
                Err(err) if err.is_busy() => {
                    stack.finish(visitor);
                    return Err(aborted(root, &err));
                }
                Err(err) => {
                    let path = err.path().map(|p| p.to_path_buf()).unwrap_or_default();
                    warn!(path = %path.display(), error = %err, "skipping unreadable entry");
                    summary.warnings.push(read_warning(path, &err));
                    continue;
                }
            };

            let depth = entry.depth();
            stack.close_to(depth, visitor);

            let file_name = entry.file_name().to_string_lossy().into_owned();

            if entry.file_type().is_dir() {
                summary.directories += 1;
                stack.enter(&file_name, visitor);
                if let Some(err) = entry.read_children_error.take() {
                    if err.is_busy() {
                        stack.finish(visitor);
                        return Err(aborted(root, &err));
                    }
                    let path = entry.path();
                    warn!(path = %path.display(), error = %err, "skipping unreadable directory");
                    summary.warnings.push(read_warning(path, &err));
                }
                continue;
            }

            let metadata = match entry.metadata() {
                Ok(m) => m,
                Err(err) => {
                    let path = entry.path();
                    warn!(path = %path.display(), error = %err, "skipping file without metadata");
                    summary.warnings.push(ScanWarning::new(
                        path,
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
        debug!(root = %root.display(), files = summary.files, warnings = summary.warnings.len(), "walk finished");
        Ok(summary)
    }
}
