//! # webmoncache
//!
//! Bounded recency tracking for observed HTTP requests.
//!
//! ## Architecture
//! - **Index**: AHash map from (source, value) to arena slot (O(1))
//! - **Recency list**: index-linked list over the arena for promote and evict (O(1))
//! - **Monitor**: domain and search queues plus their capacities behind one mutex
//! - **Snapshots**: tab-separated text, restored through the same observe path

#![warn(missing_docs)]

mod config;
mod monitor;
mod recent;
mod stats;

pub use config::{validate_capacity, MonitorConfig, DEFAULT_QUEUE_CAPACITY};
pub use monitor::{ControlMessage, ImportSummary, WebMonitor};
pub use recent::{EntryKey, Observed, RecencyCache};
pub use stats::MonitorStats;
