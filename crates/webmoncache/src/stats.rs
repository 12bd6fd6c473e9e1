//! Monitor statistics tracking

use std::sync::atomic::{AtomicU64, Ordering};

/// Counters for monitor activity
#[derive(Debug, Default)]
pub struct MonitorStats {
    observations: AtomicU64,
    promotions: AtomicU64,
    insertions: AtomicU64,
    evictions: AtomicU64,
    dropped: AtomicU64,
    imported: AtomicU64,
    skipped_lines: AtomicU64,
}

impl MonitorStats {
    /// Create new stats tracker
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a request handed to the monitor
    pub fn record_observation(&self) {
        self.observations.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a known entry moving to the head
    pub fn record_promotion(&self) {
        self.promotions.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a new entry
    pub fn record_insertion(&self) {
        self.insertions.fetch_add(1, Ordering::Relaxed);
    }

    /// Record an eviction
    pub fn record_eviction(&self) {
        self.evictions.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a request that left no entry (no host, or out of memory)
    pub fn record_dropped(&self) {
        self.dropped.fetch_add(1, Ordering::Relaxed);
    }

    /// Record snapshot import results
    pub fn record_import(&self, imported: u64, skipped: u64) {
        self.imported.fetch_add(imported, Ordering::Relaxed);
        self.skipped_lines.fetch_add(skipped, Ordering::Relaxed);
    }

    /// Requests handed to the monitor
    pub fn observations(&self) -> u64 {
        self.observations.load(Ordering::Relaxed)
    }

    /// Known entries moved to the head
    pub fn promotions(&self) -> u64 {
        self.promotions.load(Ordering::Relaxed)
    }

    /// New entries
    pub fn insertions(&self) -> u64 {
        self.insertions.load(Ordering::Relaxed)
    }

    /// Entries evicted to stay within capacity
    pub fn evictions(&self) -> u64 {
        self.evictions.load(Ordering::Relaxed)
    }

    /// Requests that left no entry
    pub fn dropped(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }

    /// Snapshot records restored
    pub fn imported(&self) -> u64 {
        self.imported.load(Ordering::Relaxed)
    }

    /// Snapshot lines rejected
    pub fn skipped_lines(&self) -> u64 {
        self.skipped_lines.load(Ordering::Relaxed)
    }

    /// Fraction of entry updates that hit an existing entry (0.0 to 1.0)
    pub fn promotion_ratio(&self) -> f64 {
        let promotions = self.promotions();
        let total = promotions + self.insertions();
        if total == 0 {
            0.0
        } else {
            promotions as f64 / total as f64
        }
    }

    /// Reset all statistics
    pub fn reset(&self) {
        self.observations.store(0, Ordering::Relaxed);
        self.promotions.store(0, Ordering::Relaxed);
        self.insertions.store(0, Ordering::Relaxed);
        self.evictions.store(0, Ordering::Relaxed);
        self.dropped.store(0, Ordering::Relaxed);
        self.imported.store(0, Ordering::Relaxed);
        self.skipped_lines.store(0, Ordering::Relaxed);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stats_basic() {
        let stats = MonitorStats::new();

        stats.record_promotion();
        stats.record_promotion();
        stats.record_insertion();
        stats.record_import(3, 2);

        assert_eq!(stats.promotions(), 2);
        assert_eq!(stats.insertions(), 1);
        assert_eq!(stats.imported(), 3);
        assert_eq!(stats.skipped_lines(), 2);
        assert_eq!(stats.promotion_ratio(), 2.0 / 3.0);
    }

    #[test]
    fn test_stats_reset() {
        let stats = MonitorStats::new();

        stats.record_observation();
        stats.record_promotion();
        stats.record_dropped();
        stats.reset();

        assert_eq!(stats.observations(), 0);
        assert_eq!(stats.promotions(), 0);
        assert_eq!(stats.dropped(), 0);
        assert_eq!(stats.promotion_ratio(), 0.0);
    }
}
