//! Ingestion counters.

use std::sync::atomic::{AtomicU64, Ordering};

use serde::{Deserialize, Serialize};

/// Counters updated by every ingestion call.
#[derive(Debug, Default)]
pub struct IngestStats {
    origins_created: AtomicU64,
    origins_existing: AtomicU64,
    files_created: AtomicU64,
    files_existing: AtomicU64,
    dirs_created: AtomicU64,
    archives_read: AtomicU64,
    archives_skipped: AtomicU64,
    archives_failed: AtomicU64,
}

/// Point-in-time copy of [`IngestStats`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct IngestStatsSnapshot {
    pub origins_created: u64,
    pub origins_existing: u64,
    pub files_created: u64,
    pub files_existing: u64,
    pub dirs_created: u64,
    pub archives_read: u64,
    pub archives_skipped: u64,
    pub archives_failed: u64,
}

macro_rules! counter {
    ($($field:ident => $inc:ident),* $(,)?) => {
        impl IngestStats {
            $(
                pub(crate) fn $inc(&self) {
                    self.$field.fetch_add(1, Ordering::Relaxed);
                }
            )*

            pub fn snapshot(&self) -> IngestStatsSnapshot {
                IngestStatsSnapshot {
                    $($field: self.$field.load(Ordering::Relaxed),)*
                }
            }
        }
    };
}

counter! {
    origins_created => origin_created,
    origins_existing => origin_existing,
    files_created => file_created,
    files_existing => file_existing,
    dirs_created => dir_created,
    archives_read => archive_read,
    archives_skipped => archive_skipped,
    archives_failed => archive_failed,
}

impl IngestStatsSnapshot {
    /// Total file contributions recorded.
    pub fn contributions(&self) -> u64 {
        self.files_created + self.files_existing
    }
}
