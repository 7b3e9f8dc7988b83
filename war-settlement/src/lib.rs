//! War Settlement Engine
//!
//! Turns concluded clan wars into point changes, exactly once.
//!
//! # Architecture
//!
//! A settlement runs in four steps inside one RocksDB transaction:
//!
//! 1. **Reservation**: lock the `(clan, war)` idempotency slots of both sides
//! 2. **Snapshot**: lock and read both clan rows
//! 3. **Calculation**: pure, bounded point deltas from relative strength
//! 4. **Application**: balances, levels, ledger entries and war stats, then commit
//!
//! A war that already holds a slot is answered from the ledger instead of
//! being scored again.
//!
//! # Scoring
//!
//! - Beating a higher-level clan pays an upset bonus, beating a lower one is discounted
//! - Beating a richer clan pays up to +50% more
//! - Winner gains are bounded to [50, 2000], loser losses to [10, 200]
//!
//! # Example
//!
//! ```no_run
//! use clan_ledger::{ClanId, WarId};
//! use war_settlement::{Config, SettlementEngine, WarOutcome};
//!
//! fn main() -> war_settlement::Result<()> {
//!     let engine = SettlementEngine::new(Config::default())?;
//!     engine.register_clan(ClanId(1), 12, 0)?;
//!     engine.register_clan(ClanId(2), 30, 4000)?;
//!
//!     let outcome = WarOutcome::victory(WarId::new("war-42"), 2, ClanId(1), ClanId(2));
//!     let result = engine.settle(&outcome)?;
//!     println!("winner +{}, loser {}", result.winner_delta, result.loser_delta);
//!
//!     Ok(())
//! }
//! ```

#![forbid(unsafe_code)]
#![warn(
    missing_docs,
    rust_2018_idioms,
    missing_debug_implementations,
    clippy::all
)]

pub mod types;
pub mod calculator;
pub mod policy;
pub mod error;
pub mod config;
pub mod engine;

// Re-exports
pub use error::{Error, Result, ValidationError};
pub use types::*;
pub use calculator::{DeltaBreakdown, DeltaProposal, ScoringRules, SettlementCalculator};
pub use policy::{StaticWarTypes, WarTypeCatalog, WarTypePolicy};
pub use config::Config;
pub use engine::SettlementEngine;
