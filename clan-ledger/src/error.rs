//! Error types for the clan ledger

use crate::types::ClanId;
use thiserror::Error;

/// Result type for ledger operations
pub type Result<T> = std::result::Result<T, Error>;

/// Ledger errors
#[derive(Error, Debug)]
pub enum Error {
    /// Storage error (RocksDB), not worth retrying
    #[error("Storage error: {0}")]
    Storage(String),

    /// Lock timeout, write conflict or busy store; retry the whole unit
    #[error("Transient storage error: {0}")]
    Transient(String),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] bincode::Error),

    /// Clan not registered
    #[error("Clan not found: {0}")]
    ClanNotFound(ClanId),

    /// Invariant violation (negative balance, level drift, broken chain)
    #[error("Invariant violation: {0}")]
    InvariantViolation(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<rocksdb::Error> for Error {
    fn from(err: rocksdb::Error) -> Self {
        use rocksdb::ErrorKind;

        match err.kind() {
            ErrorKind::Busy | ErrorKind::TimedOut | ErrorKind::TryAgain => {
                Error::Transient(err.to_string())
            }
            _ => Error::Storage(err.to_string()),
        }
    }
}
