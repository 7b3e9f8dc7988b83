//! Error types for settlement engine

use clan_ledger::{ClanId, WarId};
use thiserror::Error;

/// Result type for settlement operations
pub type Result<T> = std::result::Result<T, Error>;

/// Permanent rejections; retrying the same request cannot succeed
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    /// A clan cannot fight itself
    #[error("clan {0} cannot war against itself")]
    SelfWar(ClanId),

    /// Clan is not registered
    #[error("unknown clan {0}")]
    UnknownClan(ClanId),

    /// No policy for this war type
    #[error("unknown war type {0}")]
    UnknownWarType(u32),

    /// Blank war or adjustment id
    #[error("war id must not be empty")]
    EmptyWarId,

    /// Adjustment of zero points
    #[error("adjustment delta must not be zero")]
    ZeroAdjustment,

    /// The id was already used for a different kind of ledger event
    #[error("id {0} is already recorded for a different ledger event")]
    WarIdConflict(WarId),
}

impl ValidationError {
    /// Stable reason code for callers
    pub fn reason_code(&self) -> &'static str {
        match self {
            ValidationError::SelfWar(_) => "self_war",
            ValidationError::UnknownClan(_) => "unknown_clan",
            ValidationError::UnknownWarType(_) => "unknown_war_type",
            ValidationError::EmptyWarId => "empty_war_id",
            ValidationError::ZeroAdjustment => "zero_adjustment",
            ValidationError::WarIdConflict(_) => "war_id_conflict",
        }
    }
}

/// Settlement errors
#[derive(Error, Debug)]
pub enum Error {
    /// Rejected request
    #[error("Validation error ({}): {0}", .0.reason_code())]
    Validation(#[from] ValidationError),

    /// Contention or unavailability; retry the identical request
    #[error("Transient store error: {0}")]
    TransientStore(String),

    /// A computed entry broke a ledger invariant; nothing was written
    #[error("Invariant violation: {0}")]
    InvariantViolation(String),

    /// Ledger error
    #[error("Ledger error: {0}")]
    Ledger(clan_ledger::Error),

    /// Invalid configuration
    #[error("Invalid configuration: {0}")]
    Config(String),

    /// Metrics registry error
    #[error("Metrics error: {0}")]
    Metrics(#[from] prometheus::Error),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Only transient store failures are worth retrying
    pub fn is_retryable(&self) -> bool {
        matches!(self, Error::TransientStore(_))
    }
}

impl From<clan_ledger::Error> for Error {
    fn from(err: clan_ledger::Error) -> Self {
        match err {
            clan_ledger::Error::Transient(msg) => Error::TransientStore(msg),
            clan_ledger::Error::InvariantViolation(msg) => Error::InvariantViolation(msg),
            clan_ledger::Error::ClanNotFound(id) => {
                Error::Validation(ValidationError::UnknownClan(id))
            }
            clan_ledger::Error::Config(msg) => Error::Config(msg),
            other => Error::Ledger(other),
        }
    }
}
