//! Virtual files and the conflict ordering of their contributions.

use std::cmp::Ordering;
use std::sync::{Arc, Weak};
use std::time::SystemTime;

use compact_str::CompactString;
use parking_lot::Mutex;
use serde::Serialize;

use modvfs_core::{ArchiveTag, FileIndex, OriginId};

use crate::directory::DirectoryEntry;
use crate::origin::OriginTable;

/// One origin's claim on a virtual path.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Contribution {
    /// The contributing origin.
    pub origin: OriginId,
    /// Archive provenance; `None` for loose files.
    pub archive: Option<ArchiveTag>,
    /// Size in bytes, `None` when unknown.
    pub size: Option<u64>,
    /// Stored size inside the archive, `None` when not applicable.
    pub compressed_size: Option<u64>,
    /// Modification time reported by the source.
    pub modified: SystemTime,
    sequence: u64,
}

impl Contribution {
    pub fn new(
        origin: OriginId,
        archive: Option<ArchiveTag>,
        size: Option<u64>,
        compressed_size: Option<u64>,
        modified: SystemTime,
        sequence: u64,
    ) -> Self {
        Self {
            origin,
            archive,
            size,
            compressed_size,
            modified,
            sequence,
        }
    }

    /// Insertion sequence; later insertions win otherwise equal ties.
    pub fn sequence(&self) -> u64 {
        self.sequence
    }

    pub fn is_from_archive(&self) -> bool {
        self.archive.is_some()
    }

    /// Name of the source archive, if any.
    pub fn archive_name(&self) -> Option<&str> {
        self.archive.as_ref().map(|a| a.name.as_str())
    }

    /// Same origin and same archive (or both loose).
    fn same_source(&self, other: &Contribution) -> bool {
        self.origin == other.origin
            && match (&self.archive, &other.archive) {
                (None, None) => true,
                (Some(a), Some(b)) => a.name.eq_ignore_ascii_case(&b.name),
                _ => false,
            }
    }
}

/// Sort key of a contribution; the larger key wins.
///
/// Compared field by field: origin priority, then loose files over archive
/// contents, then archive load-order rank, then insertion sequence.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct RankKey {
    priority: i32,
    loose: bool,
    order: i32,
    sequence: u64,
}

impl RankKey {
    pub fn of(contribution: &Contribution, origins: &OriginTable) -> Self {
        Self {
            priority: origins.priority_of(contribution.origin),
            loose: contribution.archive.is_none(),
            order: contribution.archive.as_ref().map_or(i32::MIN, |a| a.order),
            sequence: contribution.sequence,
        }
    }
}

#[derive(Debug, Default)]
struct Contributions {
    winner: Option<Contribution>,
    /// Sorted by descending [`RankKey`]: the first entry is the runner-up.
    alternatives: Vec<Contribution>,
}

impl Contributions {
    /// Remove the contribution from the same source, promoting the best
    /// alternative if it was the winner.
    fn take_source(&mut self, contribution: &Contribution) -> Option<Contribution> {
        if self
            .winner
            .as_ref()
            .is_some_and(|w| w.same_source(contribution))
        {
            let previous = self.winner.take();
            if !self.alternatives.is_empty() {
                self.winner = Some(self.alternatives.remove(0));
            }
            return previous;
        }
        let pos = self
            .alternatives
            .iter()
            .position(|alt| alt.same_source(contribution))?;
        Some(self.alternatives.remove(pos))
    }

    /// Returns true if the new contribution became the winner.
    fn insert(&mut self, contribution: Contribution, origins: &OriginTable) -> bool {
        let key = RankKey::of(&contribution, origins);
        match self.winner.take() {
            None => {
                self.winner = Some(contribution);
                true
            }
            Some(current) if key > RankKey::of(&current, origins) => {
                self.alternatives.insert(0, current);
                self.winner = Some(contribution);
                true
            }
            Some(current) => {
                self.winner = Some(current);
                let pos = self
                    .alternatives
                    .iter()
                    .position(|alt| key > RankKey::of(alt, origins))
                    .unwrap_or(self.alternatives.len());
                self.alternatives.insert(pos, contribution);
                false
            }
        }
    }
}

/// A merged file: one virtual path, one winner, any number of alternatives.
///
/// The identity (`index`) never changes while contributions come and go.
#[derive(Debug)]
pub struct FileEntry {
    index: FileIndex,
    name: CompactString,
    key: CompactString,
    parent: Weak<DirectoryEntry>,
    contributions: Mutex<Contributions>,
    file_time: Mutex<SystemTime>,
}

impl FileEntry {
    pub(crate) fn new(
        index: FileIndex,
        name: impl Into<CompactString>,
        key: CompactString,
        parent: Weak<DirectoryEntry>,
    ) -> Self {
        Self {
            index,
            name: name.into(),
            key,
            parent,
            contributions: Mutex::new(Contributions::default()),
            file_time: Mutex::new(SystemTime::UNIX_EPOCH),
        }
    }

    pub fn index(&self) -> FileIndex {
        self.index
    }

    /// Name with its original case.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Lowercase lookup key.
    pub fn key(&self) -> &str {
        &self.key
    }

    /// The directory holding this file, while the tree is alive.
    pub fn parent(&self) -> Option<Arc<DirectoryEntry>> {
        self.parent.upgrade()
    }

    /// Origin of the winning contribution.
    pub fn origin(&self) -> Option<OriginId> {
        self.contributions.lock().winner.as_ref().map(|w| w.origin)
    }

    pub fn winner(&self) -> Option<Contribution> {
        self.contributions.lock().winner.clone()
    }

    /// Losing contributions, best first.
    pub fn alternatives(&self) -> Vec<Contribution> {
        self.contributions.lock().alternatives.clone()
    }

    /// Winner followed by the alternatives.
    pub fn contributions(&self) -> Vec<Contribution> {
        let state = self.contributions.lock();
        state
            .winner
            .iter()
            .chain(state.alternatives.iter())
            .cloned()
            .collect()
    }

    pub fn has_origin(&self, origin: OriginId) -> bool {
        let state = self.contributions.lock();
        state.winner.as_ref().is_some_and(|w| w.origin == origin)
            || state.alternatives.iter().any(|alt| alt.origin == origin)
    }

    pub fn has_alternatives(&self) -> bool {
        !self.contributions.lock().alternatives.is_empty()
    }

    /// Archive of the winning contribution, if it came from one.
    pub fn archive(&self) -> Option<ArchiveTag> {
        self.contributions
            .lock()
            .winner
            .as_ref()
            .and_then(|w| w.archive.clone())
    }

    pub fn is_from_archive(&self) -> bool {
        self.contributions
            .lock()
            .winner
            .as_ref()
            .is_some_and(Contribution::is_from_archive)
    }

    pub fn file_size(&self) -> Option<u64> {
        self.contributions.lock().winner.as_ref().and_then(|w| w.size)
    }

    pub fn compressed_size(&self) -> Option<u64> {
        self.contributions
            .lock()
            .winner
            .as_ref()
            .and_then(|w| w.compressed_size)
    }

    pub fn file_time(&self) -> SystemTime {
        *self.file_time.lock()
    }

    /// Refresh the cached modification time without touching the tree.
    pub fn set_file_time(&self, time: SystemTime) {
        *self.file_time.lock() = time;
    }

    /// `/`-separated path from the tree root.
    pub fn relative_path(&self) -> String {
        let mut parts = vec![self.name.to_string()];
        let mut dir = self.parent();
        while let Some(current) = dir {
            if current.parent().is_none() {
                break;
            }
            parts.push(current.name().to_string());
            dir = current.parent();
        }
        parts.reverse();
        parts.join("/")
    }

    /// Record a contribution. A second contribution from the same origin and
    /// archive replaces the first and keeps its insertion sequence.
    pub fn add_origin(&self, mut contribution: Contribution, origins: &OriginTable) {
        let mut state = self.contributions.lock();
        if let Some(previous) = state.take_source(&contribution) {
            contribution.sequence = previous.sequence;
        }
        let modified = contribution.modified;
        let won = state.insert(contribution, origins);
        let time = if won {
            Some(modified)
        } else {
            state.winner.as_ref().map(|w| w.modified)
        };
        drop(state);

        if let Some(time) = time {
            self.set_file_time(time);
        }
    }

    /// Drop every contribution of `origin`. Returns true if none remain.
    pub fn remove_origin(&self, origin: OriginId) -> bool {
        let mut state = self.contributions.lock();
        state.alternatives.retain(|alt| alt.origin != origin);
        if state.winner.as_ref().is_some_and(|w| w.origin == origin) {
            state.winner = if state.alternatives.is_empty() {
                None
            } else {
                Some(state.alternatives.remove(0))
            };
            if let Some(time) = state.winner.as_ref().map(|w| w.modified) {
                drop(state);
                self.set_file_time(time);
                return false;
            }
        }
        state.winner.is_none()
    }

    /// Re-sort winner and alternatives under the current priorities.
    pub fn sort_origins(&self, origins: &OriginTable) {
        let mut state = self.contributions.lock();
        let mut all: Vec<Contribution> = state
            .winner
            .take()
            .into_iter()
            .chain(state.alternatives.drain(..))
            .collect();
        all.sort_by(|a, b| compare_desc(a, b, origins));

        let mut all = all.into_iter();
        state.winner = all.next();
        state.alternatives = all.collect();
        let time = state.winner.as_ref().map(|w| w.modified);
        drop(state);

        if let Some(time) = time {
            self.set_file_time(time);
        }
    }

    pub fn is_empty(&self) -> bool {
        self.contributions.lock().winner.is_none()
    }
}

fn compare_desc(a: &Contribution, b: &Contribution, origins: &OriginTable) -> Ordering {
    RankKey::of(b, origins).cmp(&RankKey::of(a, origins))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::FileRegistry;

    fn table_with(priorities: &[(&str, i32)]) -> (Arc<FileRegistry>, Vec<OriginId>) {
        let origins = Arc::new(OriginTable::new());
        let registry = Arc::new(FileRegistry::new(Arc::clone(&origins)));
        let ids = priorities
            .iter()
            .map(|(name, priority)| {
                origins
                    .get_or_create(name, "", *priority, &registry)
                    .0
                    .id()
            })
            .collect();
        (registry, ids)
    }

    fn loose(origin: OriginId, seq: u64) -> Contribution {
        Contribution::new(origin, None, Some(1), None, SystemTime::UNIX_EPOCH, seq)
    }

    fn detached() -> FileEntry {
        FileEntry::new(FileIndex(0), "f.txt", "f.txt".into(), Weak::new())
    }

    #[test]
    fn test_higher_priority_wins() {
        let (registry, ids) = table_with(&[("A", 1), ("B", 2)]);
        let file = detached();
        file.add_origin(loose(ids[0], 1), registry.origins());
        file.add_origin(loose(ids[1], 2), registry.origins());

        assert_eq!(file.origin(), Some(ids[1]));
        let alternatives: Vec<_> = file.alternatives().iter().map(|c| c.origin).collect();
        assert_eq!(alternatives, vec![ids[0]]);
    }

    #[test]
    fn test_same_source_is_not_duplicated() {
        let (registry, ids) = table_with(&[("A", 1)]);
        let file = detached();
        file.add_origin(loose(ids[0], 1), registry.origins());
        file.add_origin(loose(ids[0], 5), registry.origins());

        assert_eq!(file.contributions().len(), 1);
        assert_eq!(file.winner().unwrap().sequence(), 1);
    }

    #[test]
    fn test_loose_beats_archive_at_equal_priority() {
        let (registry, ids) = table_with(&[("A", 1)]);
        let file = detached();
        let packed = Contribution::new(
            ids[0],
            Some(ArchiveTag::new("A.bsa", 3)),
            Some(1),
            Some(1),
            SystemTime::UNIX_EPOCH,
            2,
        );
        file.add_origin(loose(ids[0], 1), registry.origins());
        file.add_origin(packed, registry.origins());

        assert!(!file.is_from_archive());
        assert_eq!(file.alternatives()[0].archive_name(), Some("A.bsa"));
    }

    #[test]
    fn test_remove_origin_promotes_runner_up() {
        let (registry, ids) = table_with(&[("A", 1), ("B", 2), ("C", 3)]);
        let file = detached();
        for (seq, id) in ids.iter().enumerate() {
            file.add_origin(loose(*id, seq as u64), registry.origins());
        }

        assert!(!file.remove_origin(ids[2]));
        assert_eq!(file.origin(), Some(ids[1]));
        assert!(!file.remove_origin(ids[0]));
        assert!(file.alternatives().is_empty());
        assert!(file.remove_origin(ids[1]));
        assert!(file.is_empty());
    }

    #[test]
    fn test_sort_origins_after_priority_change() {
        let (registry, ids) = table_with(&[("A", 1), ("B", 2)]);
        let file = detached();
        file.add_origin(loose(ids[0], 1), registry.origins());
        file.add_origin(loose(ids[1], 2), registry.origins());

        registry
            .origins()
            .find_by_id(ids[0])
            .unwrap()
            .set_priority(10);
        file.sort_origins(registry.origins());

        assert_eq!(file.origin(), Some(ids[0]));
        assert_eq!(file.alternatives()[0].origin, ids[1]);
    }
}
