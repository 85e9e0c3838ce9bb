//! Identifiers and small value types shared by every modvfs crate.

use std::fmt;

use compact_str::CompactString;
use serde::{Deserialize, Serialize};

/// Stable identifier of an origin (a mod folder or an archive-only source).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct OriginId(pub u32);

impl OriginId {
    /// Create a new OriginId from a u32.
    pub fn new(id: u32) -> Self {
        Self(id)
    }
}

impl fmt::Display for OriginId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Stable identity of a virtual file inside a file registry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct FileIndex(pub u32);

impl FileIndex {
    /// Create a new FileIndex from a u32.
    pub fn new(index: u32) -> Self {
        Self(index)
    }
}

impl fmt::Display for FileIndex {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Rank given to archives whose name matches no plugin in the load order.
pub const UNRANKED_ORDER: i32 = -1;

/// Archive provenance of a contribution.
///
/// Loose files carry no tag; files read out of an archive carry the archive's
/// file name and its load-order rank.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ArchiveTag {
    /// Archive file name, e.g. `PluginX - Main.bsa`.
    pub name: CompactString,
    /// Rank derived from the plugin load order; [`UNRANKED_ORDER`] when unmatched.
    pub order: i32,
}

impl ArchiveTag {
    /// Create a new archive tag.
    pub fn new(name: impl Into<CompactString>, order: i32) -> Self {
        Self {
            name: name.into(),
            order,
        }
    }

    /// Create a tag for an archive that matched no plugin.
    pub fn unranked(name: impl Into<CompactString>) -> Self {
        Self::new(name, UNRANKED_ORDER)
    }
}

/// Case-folded lookup key for a file or directory name.
///
/// Every map in the merge tree is keyed by this value; the original spelling
/// is kept separately for display.
pub fn fold_key(name: &str) -> CompactString {
    if name.chars().any(char::is_uppercase) {
        CompactString::from(name.to_lowercase())
    } else {
        CompactString::new(name)
    }
}

/// Split a virtual path at its first separator (`/` or `\`).
///
/// Returns the first component and the remainder, if any. A trailing
/// separator yields `Some("")` as the remainder.
pub fn split_first_component(path: &str) -> (&str, Option<&str>) {
    match path.find(['/', '\\']) {
        Some(pos) => (&path[..pos], Some(&path[pos + 1..])),
        None => (path, None),
    }
}
