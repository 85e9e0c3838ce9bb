//! Progress reporting for multi-origin walks and ingestion.

use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::time::{Duration, Instant};

use compact_str::CompactString;

/// Progress information while origins are being walked.
#[derive(Debug, Clone)]
pub struct ScanProgress {
    /// Origins fully processed so far.
    pub origins_done: usize,
    /// Origins requested.
    pub origins_total: usize,
    /// Files seen so far, across all origins.
    pub files_scanned: u64,
    /// Origin that triggered this update.
    pub current_origin: CompactString,
    /// Time elapsed since the batch started.
    pub elapsed: Duration,
}

impl ScanProgress {
    /// Create initial progress state.
    pub fn new(origins_total: usize) -> Self {
        Self {
            origins_done: 0,
            origins_total,
            files_scanned: 0,
            current_origin: CompactString::default(),
            elapsed: Duration::ZERO,
        }
    }

    /// Calculate scan rate in files per second.
    pub fn files_per_second(&self) -> f64 {
        if self.elapsed.as_secs_f64() > 0.0 {
            self.files_scanned as f64 / self.elapsed.as_secs_f64()
        } else {
            0.0
        }
    }

    /// Fraction of origins completed, in `0.0..=1.0`.
    pub fn fraction(&self) -> f64 {
        if self.origins_total == 0 {
            1.0
        } else {
            self.origins_done as f64 / self.origins_total as f64
        }
    }
}

/// Thread-safe progress counter shared by the workers of one batch.
#[derive(Debug)]
pub struct ProgressTracker {
    start_time: Instant,
    origins_total: usize,
    origins_done: AtomicUsize,
    files_scanned: AtomicU64,
}

impl ProgressTracker {
    pub fn new(origins_total: usize) -> Self {
        Self {
            start_time: Instant::now(),
            origins_total,
            origins_done: Default::default(),
            files_scanned: Default::default(),
        }
    }

    /// Record one file; returns the new total.
    pub fn record_file(&self) -> u64 {
        self.files_scanned.fetch_add(1, Ordering::Relaxed) + 1
    }

    pub fn record_origin(&self) {
        self.origins_done.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self, current_origin: &str) -> ScanProgress {
        ScanProgress {
            origins_done: self.origins_done.load(Ordering::Relaxed),
            origins_total: self.origins_total,
            files_scanned: self.files_scanned.load(Ordering::Relaxed),
            current_origin: CompactString::new(current_origin),
            elapsed: self.start_time.elapsed(),
        }
    }
}
