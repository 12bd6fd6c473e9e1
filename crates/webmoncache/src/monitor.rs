//! WebMonitor: recent-domain and recent-search queues behind one lock
//!
//! Every read and write of either queue, and of the capacity settings,
//! goes through a single `parking_lot::Mutex`. Work that allocates or
//! parses (extraction, key construction, snapshot parsing) happens before
//! the lock is taken, so critical sections are O(1) per entry.

use std::net::Ipv4Addr;

use parking_lot::Mutex;
use tracing::{debug, trace, warn};
use webmon::{
    extract_url, format_snapshot, parse_record, search_term, snapshot_lines, Observation,
    QueueKind, Result, Timestamp,
};

use crate::config::{validate_capacity, MonitorConfig};
use crate::recent::{EntryKey, Observed, RecencyCache};
use crate::stats::MonitorStats;

/// Administrative request: resize one queue and refill it from a snapshot
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ControlMessage {
    /// Queue to replace
    pub queue: QueueKind,
    /// New capacity; must be at least 1
    pub capacity: i64,
    /// Snapshot text, one `seconds address value` record per line
    pub snapshot: String,
}

/// Outcome of a snapshot import
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ImportSummary {
    /// Records inserted or promoted
    pub imported: usize,
    /// Lines that did not parse
    pub skipped: usize,
    /// Records lost to allocation failure
    pub dropped: usize,
}

struct Queues {
    config: MonitorConfig,
    domains: RecencyCache,
    searches: RecencyCache,
}

impl Queues {
    fn new(config: MonitorConfig) -> Self {
        Self {
            config,
            domains: RecencyCache::new(config.max_domains),
            searches: RecencyCache::new(config.max_searches),
        }
    }

    fn get(&self, kind: QueueKind) -> &RecencyCache {
        match kind {
            QueueKind::Domains => &self.domains,
            QueueKind::Searches => &self.searches,
        }
    }

    fn get_mut(&mut self, kind: QueueKind) -> &mut RecencyCache {
        match kind {
            QueueKind::Domains => &mut self.domains,
            QueueKind::Searches => &mut self.searches,
        }
    }

    /// Swap in a queue built outside the lock, then record its capacity
    fn replace(&mut self, kind: QueueKind, cache: RecencyCache) {
        let capacity = cache.capacity();
        *self.get_mut(kind) = cache;
        self.config.set_capacity(kind, capacity);
    }
}

/// Shared recent-activity monitor
pub struct WebMonitor {
    queues: Mutex<Queues>,
    stats: MonitorStats,
}

impl WebMonitor {
    /// Create a monitor with empty queues
    pub fn new(config: MonitorConfig) -> Self {
        Self {
            queues: Mutex::new(Queues::new(config)),
            stats: MonitorStats::new(),
        }
    }

    /// Record a raw request from `source`, timestamped now
    ///
    /// # Returns
    /// * `bool` - true if a domain entry was inserted or promoted
    pub fn observe_request(&self, source: Ipv4Addr, payload: &[u8]) -> bool {
        self.observe_request_at(source, payload, Timestamp::now())
    }

    /// Record a raw request from `source` seen at `at`.
    ///
    /// Requests without a `Host` header leave no entry. A search term, if
    /// the request carries one, goes to the search queue.
    pub fn observe_request_at(&self, source: Ipv4Addr, payload: &[u8], at: Timestamp) -> bool {
        self.stats.record_observation();

        let target = extract_url(payload, payload.len());
        if target.host.is_empty() {
            trace!(%source, "request without host");
            self.stats.record_dropped();
            return false;
        }

        // A host containing a tab would not survive a report round trip
        let domain_key = match EntryKey::try_new(source, &target.host) {
            Ok(key) => key,
            Err(e) => {
                debug!(%source, error = %e, "dropping observation");
                self.stats.record_dropped();
                return false;
            }
        };

        let search_key = search_term(&target.host, &target.path)
            .and_then(|term| EntryKey::try_new(source, &term).ok());

        let mut queues = self.queues.lock();
        let recorded = self.apply(&mut queues.domains, domain_key, at).is_ok();
        if let Some(key) = search_key {
            let _ = self.apply(&mut queues.searches, key, at);
        }
        recorded
    }

    /// Record `value` from `source` in one queue
    ///
    /// # Errors
    /// [`webmon::Error::AllocationFailed`] if the entry could not be stored;
    /// the queue is unchanged. [`webmon::Error::Parse`] if `value` contains
    /// a snapshot separator.
    pub fn observe(
        &self,
        kind: QueueKind,
        source: Ipv4Addr,
        value: &str,
        at: Timestamp,
    ) -> Result<Observed> {
        let key = EntryKey::try_new(source, value)?;
        let mut queues = self.queues.lock();
        self.apply(queues.get_mut(kind), key, at)
    }

    fn apply(&self, cache: &mut RecencyCache, key: EntryKey, at: Timestamp) -> Result<Observed> {
        match cache.observe(key, at) {
            Ok(outcome) => {
                match &outcome {
                    Observed::Promoted => self.stats.record_promotion(),
                    Observed::Inserted { evicted } => {
                        self.stats.record_insertion();
                        if evicted.is_some() {
                            self.stats.record_eviction();
                        }
                    }
                }
                Ok(outcome)
            }
            Err(e) => {
                warn!(error = %e, "dropping observation");
                self.stats.record_dropped();
                Err(e)
            }
        }
    }

    /// Point-in-time copy of one queue, least recently seen first
    pub fn entries(&self, kind: QueueKind) -> Vec<Observation> {
        self.queues.lock().get(kind).entries()
    }

    /// Tab-separated report of one queue, least recently seen first
    pub fn report(&self, kind: QueueKind) -> String {
        format_snapshot(&self.entries(kind))
    }

    /// Empty one queue and change its capacity.
    ///
    /// # Errors
    /// [`webmon::Error::InvalidCapacity`] for capacities below 1; the queue
    /// and its configuration are left as they were.
    pub fn reconfigure(&self, kind: QueueKind, capacity: i64) -> Result<()> {
        let capacity = validate_capacity(capacity)?;
        let cache = RecencyCache::new(capacity);
        self.queues.lock().replace(kind, cache);
        debug!(queue = %kind, capacity = capacity.get(), "queue reconfigured");
        Ok(())
    }

    /// Replace one queue with the contents of a snapshot.
    ///
    /// The queue is emptied and resized to `max_capacity`, then every valid
    /// line is observed in order with its recorded timestamp. Malformed lines
    /// are skipped.
    ///
    /// # Errors
    /// [`webmon::Error::InvalidCapacity`] for capacities below 1, in which
    /// case nothing changes.
    pub fn import(&self, kind: QueueKind, text: &str, max_capacity: i64) -> Result<ImportSummary> {
        let capacity = validate_capacity(max_capacity)?;

        let mut summary = ImportSummary::default();
        let mut records = Vec::new();
        for line in snapshot_lines(text) {
            let record = match parse_record(line) {
                Ok(record) => record,
                Err(e) => {
                    trace!(line, error = %e, "skipping snapshot line");
                    summary.skipped += 1;
                    continue;
                }
            };
            match EntryKey::try_new(record.source, &record.value) {
                Ok(key) => records.push((key, record.timestamp)),
                Err(_) => summary.dropped += 1,
            }
        }

        let cache = RecencyCache::new(capacity);
        {
            let mut queues = self.queues.lock();
            queues.replace(kind, cache);
            let cache = queues.get_mut(kind);
            for (key, at) in records {
                match self.apply(cache, key, at) {
                    Ok(_) => summary.imported += 1,
                    Err(_) => summary.dropped += 1,
                }
            }
        }

        self.stats
            .record_import(summary.imported as u64, summary.skipped as u64);
        debug!(
            queue = %kind,
            capacity = capacity.get(),
            imported = summary.imported,
            skipped = summary.skipped,
            "snapshot imported"
        );
        Ok(summary)
    }

    /// Apply a control message: reconfigure its queue, then import its snapshot
    pub fn restore(&self, message: &ControlMessage) -> Result<ImportSummary> {
        self.import(message.queue, &message.snapshot, message.capacity)
    }

    /// Current capacities
    pub fn config(&self) -> MonitorConfig {
        self.queues.lock().config
    }

    /// Number of entries in one queue
    pub fn len(&self, kind: QueueKind) -> usize {
        self.queues.lock().get(kind).len()
    }

    /// Whether one queue is empty
    pub fn is_empty(&self, kind: QueueKind) -> bool {
        self.queues.lock().get(kind).is_empty()
    }

    /// Get monitor statistics
    pub fn stats(&self) -> &MonitorStats {
        &self.stats
    }
}

impl Default for WebMonitor {
    fn default() -> Self {
        Self::new(MonitorConfig::default())
    }
}
