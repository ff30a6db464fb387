//! Observability counters for the file handler

use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};

/// Metrics handle for recording counters
#[derive(Debug, Default)]
pub struct Metrics {
    files_served: AtomicU64,
    bytes_served: AtomicU64,
    files_not_found: AtomicU64,
    entries_swept: AtomicU64,
}

impl Metrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn file_served(&self, bytes: usize) {
        self.files_served.fetch_add(1, Ordering::Relaxed);
        self.bytes_served.fetch_add(bytes as u64, Ordering::Relaxed);
        tracing::trace!(counter = "files_served", bytes, "Metric incremented");
    }

    pub fn file_not_found(&self) {
        self.files_not_found.fetch_add(1, Ordering::Relaxed);
        tracing::trace!(counter = "files_not_found", "Metric incremented");
    }

    pub fn entries_swept(&self, count: usize) {
        self.entries_swept.fetch_add(count as u64, Ordering::Relaxed);
        tracing::debug!(counter = "entries_swept", count, "Metric incremented");
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            files_served: self.files_served.load(Ordering::Relaxed),
            bytes_served: self.bytes_served.load(Ordering::Relaxed),
            files_not_found: self.files_not_found.load(Ordering::Relaxed),
            entries_swept: self.entries_swept.load(Ordering::Relaxed),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct MetricsSnapshot {
    pub files_served: u64,
    pub bytes_served: u64,
    pub files_not_found: u64,
    pub entries_swept: u64,
}
