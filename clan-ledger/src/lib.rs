//! Clan Ledger Core
//!
//! Persistent side of clan war settlement: clan balances, the append-only
//! points ledger, derived war statistics and the ranking projection.
//!
//! # Architecture
//!
//! - **Append-only ledger**: every point change is an immutable entry
//! - **Row locks**: RocksDB pessimistic transactions serialize writers per clan
//! - **Snapshot reads**: rankings never observe a half-applied settlement
//! - **Hash chain**: each clan's entries are chained for audit
//!
//! # Invariants
//!
//! - Non-negativity: `total_points` never drops below zero
//! - Derived level: `level == level_for_points(total_points)` always
//! - Conservation: `initial_points + Σ(points_change) == total_points`
//! - Exactly once: at most one entry per `(clan_id, war_id)`

#![forbid(unsafe_code)]
#![warn(
    missing_docs,
    rust_2018_idioms,
    missing_debug_implementations,
    clippy::all
)]

pub mod types;
pub mod level;
pub mod stats;
pub mod storage;
pub mod ranking;
pub mod audit;
pub mod error;
pub mod config;
pub mod metrics;

// Re-exports
pub use error::{Error, Result};
pub use types::{
    ClanId, ClanRecord, ClanSnapshot, LedgerReason, PointsLedgerEntry, RankingEntry, WarId,
    WarStats,
};
pub use level::level_for_points;
pub use ranking::RankingQuery;
pub use storage::{LedgerTxn, Storage};
pub use config::Config;
pub use metrics::Metrics;
