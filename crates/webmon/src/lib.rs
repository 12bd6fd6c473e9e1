//! # webmon
//!
//! Request inspection and snapshot codec for recent-domain monitoring.
//!
//! ## Pieces
//! - **Extractor**: bounded, single-pass host and path extraction from raw request bytes
//! - **Tokenizer**: separator-run field splitting
//! - **Parser**: tab-separated snapshot records (`seconds`, `address`, `value`)
//!
//! The recency cache built on top lives in `webmoncache`.

#![warn(missing_docs)]

mod error;
mod extract;
mod parser;
mod tokenizer;
mod types;

pub use error::{Error, Result};
pub use extract::{extract_url, is_http_request, search_term, RequestTarget};
pub use parser::{
    format_record, format_snapshot, parse_address, parse_record, parse_seconds, snapshot_lines,
    SnapshotRecord, FIELD_SEPARATORS, LINE_SEPARATORS,
};
pub use tokenizer::{split_on_separators, FieldLimit};
pub use types::{Observation, QueueKind, Timestamp, MAX_VALUE_LEN};
