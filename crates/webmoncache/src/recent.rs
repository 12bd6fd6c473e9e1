//! Fixed-capacity recency queue keyed by (source address, value)
//!
//! Entries live in an arena (`Vec<Option<Node>>`) and are linked into a
//! doubly-linked list by index; an ahash index maps each key to its slot.
//! Head is the most recently observed entry, tail the least.
//!
//! All storage a new entry needs is reserved before it is linked, so an
//! allocation failure leaves both the index and the list untouched.

use std::collections::HashMap;
use std::fmt;
use std::net::Ipv4Addr;
use std::num::NonZeroUsize;

use ahash::RandomState;
use tracing::trace;
use webmon::{
    Error, Observation, Result, Timestamp, FIELD_SEPARATORS, LINE_SEPARATORS, MAX_VALUE_LEN,
};

/// Slots allocated up front; larger queues grow through fallible reservation
const PRESIZED_SLOTS: usize = 64;

/// Index key: source address plus observed value
#[derive(Debug, PartialEq, Eq, Hash)]
pub struct EntryKey {
    source: Ipv4Addr,
    value: String,
}

impl EntryKey {
    /// Build a key, reserving the value's storage fallibly.
    ///
    /// Values longer than [`MAX_VALUE_LEN`] are cut at a character boundary.
    ///
    /// # Errors
    /// [`Error::Parse`] if the value contains a snapshot separator, since
    /// it could not be reported and restored as a single field.
    pub fn try_new(source: Ipv4Addr, value: &str) -> Result<Self> {
        let is_separator = |c: char| FIELD_SEPARATORS.contains(&c) || LINE_SEPARATORS.contains(&c);
        if value.contains(is_separator) {
            return Err(Error::Parse(format!("value {:?} contains a separator", value)));
        }

        let mut end = value.len().min(MAX_VALUE_LEN);
        while !value.is_char_boundary(end) {
            end -= 1;
        }

        let mut owned = String::new();
        owned.try_reserve_exact(end)?;
        owned.push_str(&value[..end]);

        Ok(Self {
            source,
            value: owned,
        })
    }

    fn try_clone(&self) -> Result<Self> {
        Self::try_new(self.source, &self.value)
    }

    /// Requesting host
    pub fn source(&self) -> Ipv4Addr {
        self.source
    }

    /// Domain name or search term
    pub fn value(&self) -> &str {
        &self.value
    }
}

impl fmt::Display for EntryKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{}", self.source, self.value)
    }
}

/// Outcome of [`RecencyCache::observe`]
#[derive(Debug, PartialEq, Eq)]
pub enum Observed {
    /// Key was present; its timestamp was refreshed and it moved to the head
    Promoted,
    /// Key was new and is now at the head
    Inserted {
        /// Least recently used key dropped to stay within capacity
        evicted: Option<EntryKey>,
    },
}

/// Node in the recency list
struct Node {
    key: EntryKey,
    last_seen: Timestamp,
    prev: Option<usize>,
    next: Option<usize>,
}

/// Recency queue with fixed capacity
pub struct RecencyCache {
    map: HashMap<EntryKey, usize, RandomState>,
    nodes: Vec<Option<Node>>,
    head: Option<usize>,
    tail: Option<usize>,
    free_list: Vec<usize>,
    capacity: NonZeroUsize,
}

impl RecencyCache {
    /// Create an empty queue holding at most `capacity` entries
    pub fn new(capacity: NonZeroUsize) -> Self {
        // One spare slot: a new entry is linked before the tail is evicted
        let slots = capacity.get().saturating_add(1).min(PRESIZED_SLOTS);

        Self {
            map: HashMap::with_capacity_and_hasher(slots, RandomState::new()),
            nodes: Vec::with_capacity(slots),
            head: None,
            tail: None,
            free_list: Vec::with_capacity(slots),
            capacity,
        }
    }

    /// Record that `key` was seen at `at`.
    ///
    /// A known key has its timestamp refreshed (never moved backwards) and
    /// is promoted to the head. A new key is inserted at the head, evicting
    /// the tail when the queue grows past capacity.
    ///
    /// # Errors
    /// [`webmon::Error::AllocationFailed`] if a new entry cannot be stored.
    /// The queue is unchanged in that case.
    pub fn observe(&mut self, key: EntryKey, at: Timestamp) -> Result<Observed> {
        if let Some(&idx) = self.map.get(&key) {
            if let Some(node) = &mut self.nodes[idx] {
                node.last_seen = node.last_seen.max(at);
            }
            self.move_to_front(idx);
            return Ok(Observed::Promoted);
        }

        // Reserve everything up front so a failure leaves no partial entry
        reservation_point()?;
        self.map.try_reserve(1)?;
        reservation_point()?;
        if self.free_list.is_empty() {
            self.nodes.try_reserve(1)?;
        }
        reservation_point()?;
        self.free_list.try_reserve(1)?;
        reservation_point()?;
        let index_key = key.try_clone()?;

        let idx = self.alloc_node();
        self.nodes[idx] = Some(Node {
            key,
            last_seen: at,
            prev: None,
            next: self.head,
        });

        if let Some(head_idx) = self.head {
            if let Some(head) = &mut self.nodes[head_idx] {
                head.prev = Some(idx);
            }
        }

        self.head = Some(idx);
        if self.tail.is_none() {
            self.tail = Some(idx);
        }

        self.map.insert(index_key, idx);

        let evicted = if self.map.len() > self.capacity.get() {
            self.evict()
        } else {
            None
        };

        Ok(Observed::Inserted { evicted })
    }

    /// Timestamp of `key` without promoting it
    pub fn peek(&self, key: &EntryKey) -> Option<Timestamp> {
        let idx = *self.map.get(key)?;
        self.nodes[idx].as_ref().map(|node| node.last_seen)
    }

    /// Whether `key` is present
    pub fn contains(&self, key: &EntryKey) -> bool {
        self.map.contains_key(key)
    }

    /// Entries from least to most recently observed
    pub fn iter(&self) -> impl Iterator<Item = (&EntryKey, Timestamp)> + '_ {
        std::iter::successors(self.tail, move |&idx| {
            self.nodes[idx].as_ref().and_then(|node| node.prev)
        })
        .filter_map(move |idx| self.nodes[idx].as_ref().map(|node| (&node.key, node.last_seen)))
    }

    /// Point-in-time copy of all entries, least recently observed first
    pub fn entries(&self) -> Vec<Observation> {
        self.iter()
            .map(|(key, last_seen)| Observation {
                source: key.source,
                value: key.value.clone(),
                last_seen,
            })
            .collect()
    }

    /// Number of entries
    pub fn len(&self) -> usize {
        self.map.len()
    }

    /// Whether the queue is empty
    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }

    /// Maximum number of entries
    pub fn capacity(&self) -> NonZeroUsize {
        self.capacity
    }

    /// Verify that the index and the list describe the same entries.
    ///
    /// Walks the list from head to tail checking back-links, the index and
    /// the length bound. Returns false on the first inconsistency.
    pub fn check_invariants(&self) -> bool {
        let mut count = 0;
        let mut prev = None;
        let mut cursor = self.head;

        while let Some(idx) = cursor {
            let node = match &self.nodes[idx] {
                Some(node) => node,
                None => return false,
            };
            if node.prev != prev || self.map.get(&node.key) != Some(&idx) {
                return false;
            }
            count += 1;
            if count > self.map.len() {
                return false;
            }
            prev = Some(idx);
            cursor = node.next;
        }

        let live_slots = self.nodes.iter().filter(|slot| slot.is_some()).count();

        self.tail == prev
            && count == self.map.len()
            && live_slots == count
            && count <= self.capacity.get()
    }

    fn move_to_front(&mut self, idx: usize) {
        if self.head == Some(idx) {
            return;
        }

        self.unlink(idx);

        if let Some(node) = &mut self.nodes[idx] {
            node.prev = None;
            node.next = self.head;
        }

        if let Some(head_idx) = self.head {
            if let Some(head) = &mut self.nodes[head_idx] {
                head.prev = Some(idx);
            }
        }

        self.head = Some(idx);
        if self.tail.is_none() {
            self.tail = Some(idx);
        }
    }

    fn unlink(&mut self, idx: usize) {
        let (prev, next) = match &self.nodes[idx] {
            Some(node) => (node.prev, node.next),
            None => return,
        };

        match prev {
            Some(prev_idx) => {
                if let Some(prev_node) = &mut self.nodes[prev_idx] {
                    prev_node.next = next;
                }
            }
            None => self.head = next,
        }

        match next {
            Some(next_idx) => {
                if let Some(next_node) = &mut self.nodes[next_idx] {
                    next_node.prev = prev;
                }
            }
            None => self.tail = prev,
        }
    }

    fn evict(&mut self) -> Option<EntryKey> {
        let tail_idx = self.tail?;

        // Only reached with at least two linked entries
        debug_assert!(
            self.nodes[tail_idx].as_ref().map_or(false, |node| node.prev.is_some()),
            "evicting the only entry of a recency queue"
        );

        self.unlink(tail_idx);
        let node = self.nodes[tail_idx].take()?;
        self.free_list.push(tail_idx);
        self.map.remove(&node.key);

        trace!(key = %node.key, "evicted least recently seen entry");
        Some(node.key)
    }

    fn alloc_node(&mut self) -> usize {
        if let Some(idx) = self.free_list.pop() {
            idx
        } else {
            let idx = self.nodes.len();
            self.nodes.push(None);
            idx
        }
    }
}

#[cfg(not(test))]
#[inline(always)]
fn reservation_point() -> Result<()> {
    Ok(())
}

#[cfg(test)]
thread_local! {
    static RESERVATIONS_LEFT: std::cell::Cell<Option<usize>> = const { std::cell::Cell::new(None) };
}

/// Fails once the budget set by [`fail_reservations_after`] is spent
#[cfg(test)]
fn reservation_point() -> Result<()> {
    RESERVATIONS_LEFT.with(|left| match left.get() {
        Some(0) => Err(Error::AllocationFailed),
        Some(n) => {
            left.set(Some(n - 1));
            Ok(())
        }
        None => Ok(()),
    })
}

/// Let `n` more reservation steps succeed on this thread, then fail every
/// one after. `None` removes the limit.
#[cfg(test)]
pub(crate) fn fail_reservations_after(n: Option<usize>) {
    RESERVATIONS_LEFT.with(|left| left.set(n));
}

impl fmt::Debug for RecencyCache {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RecencyCache")
            .field("len", &self.len())
            .field("capacity", &self.capacity)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn cap(n: usize) -> NonZeroUsize {
        NonZeroUsize::new(n).unwrap()
    }

    fn key(last_octet: u8, value: &str) -> EntryKey {
        EntryKey::try_new(Ipv4Addr::new(10, 0, 0, last_octet), value).unwrap()
    }

    fn at(secs: i64) -> Timestamp {
        Timestamp::from_secs(secs)
    }

    fn values(cache: &RecencyCache) -> Vec<String> {
        cache.iter().map(|(k, _)| k.to_string()).collect()
    }

    #[test]
    fn test_recent_basic() {
        let mut cache = RecencyCache::new(cap(2));

        assert_eq!(cache.observe(key(1, "a.com"), at(1)).unwrap(), Observed::Inserted { evicted: None });
        assert_eq!(cache.observe(key(2, "b.com"), at(2)).unwrap(), Observed::Inserted { evicted: None });

        assert_eq!(cache.len(), 2);
        assert_eq!(cache.peek(&key(1, "a.com")), Some(at(1)));
        assert_eq!(values(&cache), vec!["10.0.0.1@a.com", "10.0.0.2@b.com"]);
        assert!(cache.check_invariants());
    }

    #[test]
    fn test_recent_eviction() {
        let mut cache = RecencyCache::new(cap(2));

        cache.observe(key(1, "a.com"), at(1)).unwrap();
        cache.observe(key(1, "b.com"), at(2)).unwrap();
        let outcome = cache.observe(key(1, "c.com"), at(3)).unwrap();

        assert_eq!(outcome, Observed::Inserted { evicted: Some(key(1, "a.com")) });
        assert!(!cache.contains(&key(1, "a.com")));
        assert_eq!(values(&cache), vec!["10.0.0.1@b.com", "10.0.0.1@c.com"]);
        assert!(cache.check_invariants());
    }

    #[test]
    fn test_recent_promote() {
        let mut cache = RecencyCache::new(cap(2));

        cache.observe(key(1, "a.com"), at(1)).unwrap();
        cache.observe(key(1, "b.com"), at(2)).unwrap();
        assert_eq!(cache.observe(key(1, "a.com"), at(3)).unwrap(), Observed::Promoted);
        cache.observe(key(1, "c.com"), at(4)).unwrap(); // Should evict b.com

        assert_eq!(cache.len(), 2);
        assert!(!cache.contains(&key(1, "b.com")));
        assert_eq!(cache.peek(&key(1, "a.com")), Some(at(3)));
        assert_eq!(values(&cache), vec!["10.0.0.1@a.com", "10.0.0.1@c.com"]);
        assert!(cache.check_invariants());
    }

    #[test]
    fn test_recent_same_value_different_source() {
        let mut cache = RecencyCache::new(cap(5));

        cache.observe(key(1, "example.com"), at(100)).unwrap();
        cache.observe(key(2, "example.com"), at(200)).unwrap();

        assert_eq!(cache.len(), 2);
        assert_eq!(values(&cache), vec!["10.0.0.1@example.com", "10.0.0.2@example.com"]);
    }

    #[test]
    fn test_recent_timestamp_never_decreases() {
        let mut cache = RecencyCache::new(cap(3));

        cache.observe(key(1, "a.com"), at(50)).unwrap();
        cache.observe(key(1, "b.com"), at(60)).unwrap();
        assert_eq!(cache.observe(key(1, "a.com"), at(10)).unwrap(), Observed::Promoted);

        // Promoted to the head, but the older timestamp is not taken
        assert_eq!(cache.peek(&key(1, "a.com")), Some(at(50)));
        assert_eq!(values(&cache), vec!["10.0.0.1@b.com", "10.0.0.1@a.com"]);
    }

    #[test]
    fn test_recent_capacity_one() {
        let mut cache = RecencyCache::new(cap(1));

        cache.observe(key(1, "a.com"), at(1)).unwrap();
        assert!(cache.check_invariants());

        for (i, value) in ["b.com", "c.com", "d.com"].iter().enumerate() {
            let outcome = cache.observe(key(1, value), at(2 + i as i64)).unwrap();
            assert!(matches!(outcome, Observed::Inserted { evicted: Some(_) }));
            assert_eq!(cache.len(), 1);
            assert_eq!(cache.head, cache.tail);
            assert!(cache.check_invariants());
        }

        assert_eq!(cache.observe(key(1, "d.com"), at(9)).unwrap(), Observed::Promoted);
        assert_eq!(values(&cache), vec!["10.0.0.1@d.com"]);
        assert!(cache.check_invariants());
    }

    #[test]
    fn test_recent_capacity_two_relinks_tail() {
        let mut cache = RecencyCache::new(cap(2));

        cache.observe(key(1, "a.com"), at(1)).unwrap();
        cache.observe(key(1, "b.com"), at(2)).unwrap();
        // Promote the tail, then push a new key: the old head becomes the tail and is evicted
        cache.observe(key(1, "a.com"), at(3)).unwrap();
        assert_eq!(values(&cache), vec!["10.0.0.1@b.com", "10.0.0.1@a.com"]);
        assert!(cache.check_invariants());

        let outcome = cache.observe(key(1, "c.com"), at(4)).unwrap();
        assert_eq!(outcome, Observed::Inserted { evicted: Some(key(1, "b.com")) });
        assert_eq!(values(&cache), vec!["10.0.0.1@a.com", "10.0.0.1@c.com"]);
        assert!(cache.check_invariants());
    }

    #[test]
    fn test_recent_slots_are_reused() {
        let mut cache = RecencyCache::new(cap(3));

        for i in 0..100u8 {
            cache.observe(key(i, "x.com"), at(i as i64)).unwrap();
        }

        assert_eq!(cache.len(), 3);
        assert!(cache.nodes.len() <= 4);
        assert!(cache.check_invariants());
    }

    #[test]
    fn test_recent_huge_capacity_grows_on_demand() {
        let mut cache = RecencyCache::new(cap(usize::MAX));
        assert!(cache.nodes.capacity() <= PRESIZED_SLOTS);

        for i in 0..200u8 {
            cache.observe(key(i, "grow.com"), at(i as i64)).unwrap();
        }

        assert_eq!(cache.len(), 200);
        assert_eq!(cache.capacity(), cap(usize::MAX));
        assert!(cache.check_invariants());
    }

    #[test]
    fn test_recent_allocation_failure_leaves_queue_intact() {
        // Every reservation step in turn: map, arena, free list, index key
        for step in 0..4 {
            let mut cache = RecencyCache::new(cap(2));
            cache.observe(key(1, "a.com"), at(1)).unwrap();
            cache.observe(key(1, "b.com"), at(2)).unwrap();

            fail_reservations_after(Some(step));
            let result = cache.observe(key(1, "c.com"), at(3));
            fail_reservations_after(None);

            assert!(matches!(result, Err(Error::AllocationFailed)), "step {}", step);
            assert_eq!(cache.len(), 2);
            assert!(!cache.contains(&key(1, "c.com")));
            assert_eq!(values(&cache), vec!["10.0.0.1@a.com", "10.0.0.1@b.com"]);
            assert!(cache.check_invariants());

            // The queue still works once memory is available again
            cache.observe(key(1, "c.com"), at(4)).unwrap();
            assert_eq!(values(&cache), vec!["10.0.0.1@b.com", "10.0.0.1@c.com"]);
            assert!(cache.check_invariants());
        }
    }

    #[test]
    fn test_recent_promotion_needs_no_allocation() {
        let mut cache = RecencyCache::new(cap(2));
        cache.observe(key(1, "a.com"), at(1)).unwrap();
        cache.observe(key(1, "b.com"), at(2)).unwrap();

        fail_reservations_after(Some(0));
        let result = cache.observe(key(1, "a.com"), at(3));
        fail_reservations_after(None);

        assert_eq!(result.unwrap(), Observed::Promoted);
        assert_eq!(values(&cache), vec!["10.0.0.1@b.com", "10.0.0.1@a.com"]);
    }

    #[test]
    fn test_entry_key_rejects_separators() {
        for value in ["a\tb", "a b", "a\nb", "a\rb"] {
            assert!(
                matches!(EntryKey::try_new(Ipv4Addr::LOCALHOST, value), Err(Error::Parse(_))),
                "accepted {:?}",
                value
            );
        }
        assert!(EntryKey::try_new(Ipv4Addr::LOCALHOST, "rust+books").is_ok());
    }

    #[test]
    fn test_recent_entries_snapshot() {
        let mut cache = RecencyCache::new(cap(3));

        cache.observe(key(1, "a.com"), at(1)).unwrap();
        cache.observe(key(2, "b.com"), at(2)).unwrap();

        let entries = cache.entries();
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].source, Ipv4Addr::new(10, 0, 0, 1));
        assert_eq!(entries[0].value, "a.com");
        assert_eq!(entries[1].last_seen, at(2));
    }

    #[test]
    fn test_entry_key_bounds_value() {
        let long = "é".repeat(MAX_VALUE_LEN);
        let key = EntryKey::try_new(Ipv4Addr::LOCALHOST, &long).unwrap();
        assert!(key.value().len() <= MAX_VALUE_LEN);
        assert_eq!(key.to_string(), format!("127.0.0.1@{}", key.value()));
    }

    #[test]
    fn test_check_invariants_detects_broken_links() {
        let mut cache = RecencyCache::new(cap(3));
        cache.observe(key(1, "a.com"), at(1)).unwrap();
        cache.observe(key(1, "b.com"), at(2)).unwrap();
        assert!(cache.check_invariants());

        // A tail with no predecessor while two entries are indexed
        let tail = cache.tail.unwrap();
        cache.nodes[tail].as_mut().unwrap().prev = None;
        assert!(!cache.check_invariants());
    }

    proptest! {
        #[test]
        fn prop_index_and_list_agree(
            ops in prop::collection::vec((0u8..8, 0usize..6), 0..200),
            capacity in 1usize..6,
        ) {
            let names = ["a", "b", "c", "d", "e", "f"];
            let mut cache = RecencyCache::new(cap(capacity));

            for (i, (octet, name)) in ops.into_iter().enumerate() {
                let before = cache.len();
                let k = key(octet, names[name]);
                let known = cache.contains(&k);

                let outcome = cache.observe(k, at(i as i64)).unwrap();

                prop_assert!(cache.len() <= capacity);
                prop_assert!(cache.check_invariants());
                if known {
                    prop_assert_eq!(outcome, Observed::Promoted);
                    prop_assert_eq!(cache.len(), before);
                }

                let newest = cache.iter().last().map(|(k, _)| k.to_string());
                prop_assert_eq!(newest, Some(format!("10.0.0.{}@{}", octet, names[name])));
            }
        }
    }
}
