//! Queue capacity configuration

use std::num::NonZeroUsize;

use webmon::{Error, QueueKind, Result};

/// Default number of entries kept per queue
pub const DEFAULT_QUEUE_CAPACITY: usize = 5;

/// Capacities of the two recency queues
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MonitorConfig {
    /// Maximum recent domains
    pub max_domains: NonZeroUsize,
    /// Maximum recent search terms
    pub max_searches: NonZeroUsize,
}

impl MonitorConfig {
    /// Build a configuration, rejecting capacities below 1
    pub fn new(max_domains: i64, max_searches: i64) -> Result<Self> {
        Ok(Self {
            max_domains: validate_capacity(max_domains)?,
            max_searches: validate_capacity(max_searches)?,
        })
    }

    /// Capacity of one queue
    pub fn capacity(&self, kind: QueueKind) -> NonZeroUsize {
        match kind {
            QueueKind::Domains => self.max_domains,
            QueueKind::Searches => self.max_searches,
        }
    }

    /// Change the capacity of one queue
    pub fn set_capacity(&mut self, kind: QueueKind, capacity: NonZeroUsize) {
        match kind {
            QueueKind::Domains => self.max_domains = capacity,
            QueueKind::Searches => self.max_searches = capacity,
        }
    }
}

impl Default for MonitorConfig {
    fn default() -> Self {
        let capacity = NonZeroUsize::new(DEFAULT_QUEUE_CAPACITY).unwrap_or(NonZeroUsize::MIN);
        Self {
            max_domains: capacity,
            max_searches: capacity,
        }
    }
}

/// Turn a signed capacity from the control channel into a queue size
pub fn validate_capacity(capacity: i64) -> Result<NonZeroUsize> {
    usize::try_from(capacity)
        .ok()
        .and_then(NonZeroUsize::new)
        .ok_or(Error::InvalidCapacity(capacity))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_default() {
        let config = MonitorConfig::default();
        assert_eq!(config.max_domains.get(), DEFAULT_QUEUE_CAPACITY);
        assert_eq!(config.max_searches.get(), DEFAULT_QUEUE_CAPACITY);
    }

    #[test]
    fn test_config_rejects_non_positive() {
        assert!(matches!(MonitorConfig::new(0, 5), Err(Error::InvalidCapacity(0))));
        assert!(matches!(MonitorConfig::new(5, -3), Err(Error::InvalidCapacity(-3))));
        assert!(MonitorConfig::new(1, 1).is_ok());
    }

    #[test]
    fn test_config_set_capacity() {
        let mut config = MonitorConfig::new(5, 7).unwrap();
        config.set_capacity(QueueKind::Searches, NonZeroUsize::new(2).unwrap());

        assert_eq!(config.capacity(QueueKind::Domains).get(), 5);
        assert_eq!(config.capacity(QueueKind::Searches).get(), 2);
    }
}
