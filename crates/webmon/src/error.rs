//! Error types for webmon

use std::fmt;

/// Result type alias for webmon operations
pub type Result<T> = std::result::Result<T, Error>;

/// Error types for monitor operations
#[derive(Debug)]
pub enum Error {
    /// Parse error
    Parse(String),

    /// Queue capacity must be at least 1
    InvalidCapacity(i64),

    /// Storage for a new entry could not be reserved
    AllocationFailed,

    /// Control message named a queue that does not exist
    UnknownQueue(String),
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::Parse(msg) => write!(f, "Parse error: {}", msg),
            Error::InvalidCapacity(n) => write!(f, "Invalid capacity: {} (min 1)", n),
            Error::AllocationFailed => write!(f, "Allocation failed"),
            Error::UnknownQueue(name) => write!(f, "Unknown queue: {}", name),
        }
    }
}

impl std::error::Error for Error {}

impl From<nom::Err<nom::error::Error<&str>>> for Error {
    fn from(err: nom::Err<nom::error::Error<&str>>) -> Self {
        Error::Parse(format!("{:?}", err))
    }
}

impl From<std::collections::TryReserveError> for Error {
    fn from(_: std::collections::TryReserveError) -> Self {
        Error::AllocationFailed
    }
}
