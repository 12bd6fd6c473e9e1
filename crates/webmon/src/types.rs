//! Value types shared by the extractor, the snapshot codec and the cache

use std::fmt;
use std::net::Ipv4Addr;
use std::str::FromStr;

use chrono::Utc;

use crate::error::Error;

/// Maximum content length of a host, path, or search term (bytes)
pub const MAX_VALUE_LEN: usize = 624;

/// Wall-clock time of an observation, seconds plus microseconds
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Timestamp {
    /// Seconds since the Unix epoch
    pub secs: i64,
    /// Sub-second part in microseconds
    pub micros: u32,
}

impl Timestamp {
    /// Current wall-clock time
    pub fn now() -> Self {
        let now = Utc::now();
        Self {
            secs: now.timestamp(),
            micros: now.timestamp_subsec_micros(),
        }
    }

    /// Whole-second timestamp, as restored from a snapshot
    pub fn from_secs(secs: i64) -> Self {
        Self { secs, micros: 0 }
    }
}

/// One entry as enumerated out of a recency queue
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Observation {
    /// Requesting host
    pub source: Ipv4Addr,
    /// Domain name or search term
    pub value: String,
    /// Most recent time the pair was seen
    pub last_seen: Timestamp,
}

/// The two recency queues kept by a monitor
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum QueueKind {
    /// Recently requested domains
    Domains,
    /// Recently submitted search terms
    Searches,
}

impl QueueKind {
    /// Name used on the control channel and for snapshot files
    pub fn as_str(&self) -> &'static str {
        match self {
            QueueKind::Domains => "domains",
            QueueKind::Searches => "searches",
        }
    }
}

impl fmt::Display for QueueKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for QueueKind {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.eq_ignore_ascii_case("domains") {
            Ok(QueueKind::Domains)
        } else if s.eq_ignore_ascii_case("searches") {
            Ok(QueueKind::Searches)
        } else {
            Err(Error::UnknownQueue(s.to_string()))
        }
    }
}

/// Convert raw bytes to an owned string of at most [`MAX_VALUE_LEN`] bytes.
///
/// Invalid UTF-8 is replaced, and the result is cut back to a character
/// boundary if the replacement pushed it over the bound.
pub(crate) fn bounded_string(bytes: &[u8]) -> String {
    let bytes = &bytes[..bytes.len().min(MAX_VALUE_LEN)];
    let mut s = String::from_utf8_lossy(bytes).into_owned();
    if s.len() > MAX_VALUE_LEN {
        let mut end = MAX_VALUE_LEN;
        while !s.is_char_boundary(end) {
            end -= 1;
        }
        s.truncate(end);
    }
    s
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_timestamp_ordering() {
        let a = Timestamp { secs: 10, micros: 999_999 };
        let b = Timestamp { secs: 11, micros: 0 };
        assert!(a < b);
        assert!(Timestamp::from_secs(5) < Timestamp { secs: 5, micros: 1 });
    }

    #[test]
    fn test_queue_kind_parse() {
        assert_eq!("domains".parse::<QueueKind>().unwrap(), QueueKind::Domains);
        assert_eq!("SEARCHES".parse::<QueueKind>().unwrap(), QueueKind::Searches);
        assert!(matches!(
            "urls".parse::<QueueKind>(),
            Err(Error::UnknownQueue(name)) if name == "urls"
        ));
    }

    #[test]
    fn test_bounded_string_clamps() {
        let long = vec![b'a'; MAX_VALUE_LEN + 100];
        assert_eq!(bounded_string(&long).len(), MAX_VALUE_LEN);

        // Every invalid byte expands to a 3-byte replacement character
        let invalid = vec![0xffu8; MAX_VALUE_LEN];
        let s = bounded_string(&invalid);
        assert!(s.len() <= MAX_VALUE_LEN);
        assert!(s.chars().all(|c| c == char::REPLACEMENT_CHARACTER));
    }
}
