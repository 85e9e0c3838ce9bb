//! The walker contract shared by every traversal strategy.

use std::path::Path;
use std::sync::Arc;
use std::time::SystemTime;

use compact_str::CompactString;

use modvfs_core::{IngestConfig, ScanError, ScanWarning, WalkerKind};

use crate::batched::JwalkWalker;
use crate::sequential::WalkdirWalker;

/// Receives the events of a depth-first walk.
///
/// `on_directory_start` is called before a directory's contents are
/// reported and `on_directory_end` after all of them. Siblings arrive in no
/// particular order. The root directory itself produces no events.
pub trait WalkVisitor {
    fn on_directory_start(&mut self, name: &str);
    fn on_directory_end(&mut self, name: &str);
    fn on_file(&mut self, name: &str, modified: SystemTime, size: u64);
}

/// A visitor assembled from three closures.
pub struct FnVisitor<S, E, F> {
    start: S,
    end: E,
    file: F,
}

impl<S, E, F> FnVisitor<S, E, F>
where
    S: FnMut(&str),
    E: FnMut(&str),
    F: FnMut(&str, SystemTime, u64),
{
    pub fn new(start: S, end: E, file: F) -> Self {
        Self { start, end, file }
    }
}

impl<S, E, F> WalkVisitor for FnVisitor<S, E, F>
where
    S: FnMut(&str),
    E: FnMut(&str),
    F: FnMut(&str, SystemTime, u64),
{
    fn on_directory_start(&mut self, name: &str) {
        (self.start)(name)
    }

    fn on_directory_end(&mut self, name: &str) {
        (self.end)(name)
    }

    fn on_file(&mut self, name: &str, modified: SystemTime, size: u64) {
        (self.file)(name, modified, size)
    }
}

/// Counters and skipped paths collected during a walk.
#[derive(Debug, Clone, Default)]
pub struct WalkSummary {
    /// Directories entered (root excluded).
    pub directories: u64,
    /// Files reported.
    pub files: u64,
    /// Sum of reported file sizes.
    pub bytes: u64,
    /// Directories or entries that could not be read.
    pub warnings: Vec<ScanWarning>,
}

impl WalkSummary {
    /// Check if anything was skipped.
    pub fn has_warnings(&self) -> bool {
        !self.warnings.is_empty()
    }
}

/// Enumerates a physical directory tree and reports it to a visitor.
///
/// A missing or non-directory root, or a walk that cannot make progress,
/// is an error. Unreadable entries below the root are logged, recorded in the
/// summary and skipped.
pub trait DirectoryWalker: Send + Sync {
    fn walk(&self, root: &Path, visitor: &mut dyn WalkVisitor) -> Result<WalkSummary, ScanError>;
}

/// Options common to every walker.
#[derive(Debug, Clone, Copy, Default)]
pub struct WalkOptions {
    /// Follow symbolic links.
    pub follow_symlinks: bool,
    /// Maximum depth below the root (None = unlimited).
    pub max_depth: Option<u32>,
    /// Threads for a walk's private read pool (0 = rayon default).
    pub read_threads: usize,
}

impl WalkOptions {
    pub fn from_config(config: &IngestConfig) -> Self {
        Self {
            follow_symlinks: config.follow_symlinks,
            max_depth: config.max_depth,
            read_threads: config.threads,
        }
    }

    pub(crate) fn depth_limit(&self) -> usize {
        self.max_depth.map(|d| d as usize).unwrap_or(usize::MAX)
    }
}

/// Build the walker selected by the configuration.
pub fn walker_for(config: &IngestConfig) -> Arc<dyn DirectoryWalker> {
    let options = WalkOptions::from_config(config);
    match config.walker {
        WalkerKind::Batched => Arc::new(JwalkWalker::new(options)),
        WalkerKind::Sequential => Arc::new(WalkdirWalker::new(options)),
    }
}

/// Check that a walk root exists and is a directory.
pub(crate) fn check_root(root: &Path) -> Result<(), ScanError> {
    let metadata = std::fs::metadata(root).map_err(|e| ScanError::io(root, e))?;
    if !metadata.is_dir() {
        return Err(ScanError::NotADirectory {
            path: root.to_path_buf(),
        });
    }
    Ok(())
}

/// Turns a flat, depth-annotated, pre-order entry stream into balanced
/// start/end events.
#[derive(Debug, Default)]
pub(crate) struct DirStack {
    open: Vec<CompactString>,
}

impl DirStack {
    /// Close directories until the parent of an entry at `depth` is on top.
    pub fn close_to(&mut self, depth: usize, visitor: &mut dyn WalkVisitor) {
        let parent_depth = depth.saturating_sub(1);
        while self.open.len() > parent_depth {
            if let Some(name) = self.open.pop() {
                visitor.on_directory_end(&name);
            }
        }
    }

    pub fn enter(&mut self, name: &str, visitor: &mut dyn WalkVisitor) {
        visitor.on_directory_start(name);
        self.open.push(CompactString::new(name));
    }

    pub fn finish(&mut self, visitor: &mut dyn WalkVisitor) {
        self.close_to(1, visitor);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Default)]
    struct Recorder(Vec<String>);

    impl WalkVisitor for Recorder {
        fn on_directory_start(&mut self, name: &str) {
            self.0.push(format!("+{name}"));
        }
        fn on_directory_end(&mut self, name: &str) {
            self.0.push(format!("-{name}"));
        }
        fn on_file(&mut self, name: &str, _modified: SystemTime, _size: u64) {
            self.0.push(name.to_string());
        }
    }

    #[test]
    fn test_dir_stack_balances_events() {
        let mut rec = Recorder::default();
        let mut stack = DirStack::default();

        // a/        depth 1
        // a/b/      depth 2
        // a/b/f     depth 3
        // c/        depth 1
        stack.close_to(1, &mut rec);
        stack.enter("a", &mut rec);
        stack.close_to(2, &mut rec);
        stack.enter("b", &mut rec);
        stack.close_to(3, &mut rec);
        rec.on_file("f", SystemTime::UNIX_EPOCH, 0);
        stack.close_to(1, &mut rec);
        stack.enter("c", &mut rec);
        stack.finish(&mut rec);

        assert_eq!(rec.0, vec!["+a", "+b", "f", "-b", "-a", "+c", "-c"]);
    }

    #[test]
    fn test_fn_visitor_forwards() {
        let mut files = 0;
        let mut dirs = 0;
        {
            let mut visitor = FnVisitor::new(|_| dirs += 1, |_| {}, |_, _, _| files += 1);
            visitor.on_directory_start("x");
            visitor.on_file("y", SystemTime::UNIX_EPOCH, 3);
        }
        assert_eq!(dirs, 1);
        assert_eq!(files, 1);
    }
}
