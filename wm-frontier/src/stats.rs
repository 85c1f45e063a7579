//! Crawl statistics and the exit-code severity table (SPEC_FULL §11
//! "`Statistics` counters"; spec.md §4.10 exit code mapping).

use std::sync::atomic::{AtomicU64, AtomicU8, Ordering};
use std::time::Instant;

/// Running counters for one crawl, safe to update from every worker
/// concurrently (spec.md §5 "Statistics counters use atomic increments").
pub struct Statistics {
    started_at: Instant,
    files: AtomicU64,
    bytes: AtomicU64,
    duplicate_bytes: AtomicU64,
    status_2xx: AtomicU64,
    status_4xx: AtomicU64,
    status_5xx: AtomicU64,
    errors: AtomicU64,
    skipped: AtomicU64,
    exit_category: AtomicU8,
}

impl Statistics {
    #[must_use]
    pub fn new() -> Self {
        Self {
            started_at: Instant::now(),
            files: AtomicU64::new(0),
            bytes: AtomicU64::new(0),
            duplicate_bytes: AtomicU64::new(0),
            status_2xx: AtomicU64::new(0),
            status_4xx: AtomicU64::new(0),
            status_5xx: AtomicU64::new(0),
            errors: AtomicU64::new(0),
            skipped: AtomicU64::new(0),
            exit_category: AtomicU8::new(0),
        }
    }

    pub fn record_file(&self, bytes: u64) {
        self.files.fetch_add(1, Ordering::Relaxed);
        self.bytes.fetch_add(bytes, Ordering::Relaxed);
    }

    pub fn record_duplicate(&self, bytes: u64) {
        self.duplicate_bytes.fetch_add(bytes, Ordering::Relaxed);
    }

    pub fn record_status(&self, status_code: u16) {
        match status_code {
            200..=299 => self.status_2xx.fetch_add(1, Ordering::Relaxed),
            400..=499 => self.status_4xx.fetch_add(1, Ordering::Relaxed),
            500..=599 => self.status_5xx.fetch_add(1, Ordering::Relaxed),
            _ => return,
        };
    }

    pub fn record_error(&self) {
        self.errors.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_skipped(&self) {
        self.skipped.fetch_add(1, Ordering::Relaxed);
    }

    /// Folds one more exit-code category into the running result: the
    /// lowest nonzero category wins when several occurred (spec.md
    /// §4.10), so e.g. a crawl that hits both a network failure (4) and
    /// a server error (8) exits 4.
    pub fn note_exit_category(&self, category: u8) {
        if category == 0 {
            return;
        }
        let mut current = self.exit_category.load(Ordering::Relaxed);
        loop {
            if current != 0 && current <= category {
                return;
            }
            match self.exit_category.compare_exchange_weak(
                current,
                category,
                Ordering::Relaxed,
                Ordering::Relaxed,
            ) {
                Ok(_) => return,
                Err(observed) => current = observed,
            }
        }
    }

    /// The process exit code for the crawl so far: 0 if nothing in the
    /// severity table was observed, else the lowest-numbered category
    /// seen (spec.md §4.10's "lowest wins").
    #[must_use]
    pub fn exit_code(&self) -> u8 {
        self.exit_category.load(Ordering::Relaxed)
    }

    #[must_use]
    pub fn files(&self) -> u64 {
        self.files.load(Ordering::Relaxed)
    }

    #[must_use]
    pub fn bytes(&self) -> u64 {
        self.bytes.load(Ordering::Relaxed)
    }

    #[must_use]
    pub fn elapsed(&self) -> std::time::Duration {
        self.started_at.elapsed()
    }
}

impl Default for Statistics {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exit_code_keeps_lowest_nonzero_category_seen() {
        let stats = Statistics::new();
        stats.note_exit_category(4);
        stats.note_exit_category(8);
        stats.note_exit_category(7);
        assert_eq!(stats.exit_code(), 4);
    }

    #[test]
    fn zero_category_never_overwrites_a_recorded_failure() {
        let stats = Statistics::new();
        stats.note_exit_category(4);
        stats.note_exit_category(0);
        assert_eq!(stats.exit_code(), 4);
    }

    #[test]
    fn no_errors_means_exit_code_zero() {
        let stats = Statistics::new();
        assert_eq!(stats.exit_code(), 0);
    }

    #[test]
    fn file_and_byte_counters_accumulate() {
        let stats = Statistics::new();
        stats.record_file(100);
        stats.record_file(50);
        assert_eq!(stats.files(), 2);
        assert_eq!(stats.bytes(), 150);
    }
}
