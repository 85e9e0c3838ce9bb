//! Error types for walking, archive reading and merge-tree queries.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::ids::{FileIndex, OriginId};

/// Errors that stop a walk.
///
/// Unreadable entries below the root never surface as a `ScanError`; they are
/// reported as [`ScanWarning`]s and the affected subtree is skipped.
#[derive(Debug, Error)]
pub enum ScanError {
    /// Permission denied for a path.
    #[error("Permission denied: {path}")]
    PermissionDenied { path: PathBuf },

    /// Path not found.
    #[error("Path not found: {path}")]
    NotFound { path: PathBuf },

    /// Generic I/O error.
    #[error("I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Root path is not a directory.
    #[error("Root path is not a directory: {path}")]
    NotADirectory { path: PathBuf },

    /// The walk could not make progress and was abandoned part way.
    #[error("Walk of {path} aborted: {reason}")]
    Aborted { path: PathBuf, reason: String },
}

impl ScanError {
    /// Create an I/O error with path context.
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        let path = path.into();
        match source.kind() {
            std::io::ErrorKind::PermissionDenied => Self::PermissionDenied { path },
            std::io::ErrorKind::NotFound => Self::NotFound { path },
            _ => Self::Io { path, source },
        }
    }
}

/// Kind of scan warning.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum WarningKind {
    /// Permission was denied.
    PermissionDenied,
    /// Error reading a directory.
    ReadError,
    /// Error reading metadata.
    MetadataError,
}

/// Non-fatal warning encountered during a walk.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScanWarning {
    /// Path where the warning occurred.
    pub path: PathBuf,
    /// Human-readable message.
    pub message: String,
    /// Kind of warning.
    pub kind: WarningKind,
}

impl ScanWarning {
    /// Create a new scan warning.
    pub fn new(path: impl Into<PathBuf>, message: impl Into<String>, kind: WarningKind) -> Self {
        Self {
            path: path.into(),
            message: message.into(),
            kind,
        }
    }

    /// Create a warning from an I/O error, classifying permission problems.
    pub fn from_io(path: impl Into<PathBuf>, error: &std::io::Error) -> Self {
        let kind = match error.kind() {
            std::io::ErrorKind::PermissionDenied => WarningKind::PermissionDenied,
            _ => WarningKind::ReadError,
        };
        Self::new(path, format!("Read error: {error}"), kind)
    }
}

/// Errors produced while opening or parsing an archive.
#[derive(Debug, Error)]
pub enum ArchiveError {
    /// The archive file could not be opened.
    #[error("Failed to open archive {path}: {source}")]
    Open {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The archive was opened but its index could not be parsed.
    #[error("Malformed archive {path}: {message}")]
    Malformed { path: PathBuf, message: String },
}

/// Caller errors raised by merge-tree accessors.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum VfsError {
    /// No origin is registered under this id.
    #[error("Unknown origin id {id}")]
    UnknownOrigin { id: OriginId },

    /// No origin is registered under this name.
    #[error("Unknown origin: {name}")]
    UnknownOriginName { name: String },

    /// Another origin already uses this name.
    #[error("An origin named {name} already exists")]
    DuplicateOriginName { name: String },

    /// The file index is not (or no longer) registered.
    #[error("Unknown file index {index}")]
    UnknownFile { index: FileIndex },
}

/// Errors writing a dump of the merged tree.
#[derive(Debug, Error)]
pub enum DumpError {
    /// The destination could not be created.
    #[error("Failed to open dump destination {path}: {source}")]
    Open {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Writing failed part way through.
    #[error("Failed to write dump to {path}: {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scan_error_io() {
        let err = ScanError::io(
            "/test/path",
            std::io::Error::new(std::io::ErrorKind::PermissionDenied, "denied"),
        );
        assert!(matches!(err, ScanError::PermissionDenied { .. }));
    }

    #[test]
    fn test_aborted_walk_names_root() {
        let err = ScanError::Aborted {
            path: PathBuf::from("/mods/ModA"),
            reason: "thread-pool busy".to_string(),
        };
        assert_eq!(err.to_string(), "Walk of /mods/ModA aborted: thread-pool busy");
    }

    #[test]
    fn test_scan_warning_from_io() {
        let error = std::io::Error::new(std::io::ErrorKind::PermissionDenied, "denied");
        let warning = ScanWarning::from_io("/test/path", &error);
        assert_eq!(warning.kind, WarningKind::PermissionDenied);
        assert!(warning.message.contains("denied"));
    }

    #[test]
    fn test_vfs_error_display() {
        let err = VfsError::UnknownOrigin { id: OriginId(7) };
        assert_eq!(err.to_string(), "Unknown origin id #7");
    }
}
