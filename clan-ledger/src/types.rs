//! Core types for the clan ledger
//!
//! All persisted types are designed for:
//! - Deterministic serialization (bincode)
//! - Unsigned balances (a clan can never hold negative points)
//! - Exact arithmetic for rates (Decimal)

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

use crate::level::level_for_points;

/// Clan identifier, owned by the clan-management side
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
pub struct ClanId(pub u64);

impl ClanId {
    /// Big-endian key bytes (keeps RocksDB iteration in id order)
    pub fn to_key(self) -> [u8; 8] {
        self.0.to_be_bytes()
    }
}

impl fmt::Display for ClanId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// War identifier supplied by war management; the idempotency key.
///
/// Manual adjustments reuse the same slot space with their own ids.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct WarId(String);

impl WarId {
    /// Create new war ID
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Get as string
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Empty ids cannot serve as idempotency keys
    pub fn is_empty(&self) -> bool {
        self.0.trim().is_empty()
    }
}

impl fmt::Display for WarId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Persisted clan balance row
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClanRecord {
    /// Clan ID
    pub clan_id: ClanId,

    /// Cumulative points
    pub total_points: u64,

    /// Level derived from `total_points`
    pub level: u8,

    /// Member count, maintained by clan management
    pub member_count: u32,

    /// Balance at registration (baseline for reconciliation)
    pub initial_points: u64,

    /// Inactive clans are excluded from rankings
    pub active: bool,

    /// Number of ledger entries written for this clan
    pub ledger_seq: u64,

    /// Hash of the newest ledger entry (all zeros before the first)
    pub last_entry_hash: [u8; 32],

    /// Last time this row changed
    pub updated_at: DateTime<Utc>,
}

impl ClanRecord {
    /// New clan with its level derived from the starting balance
    pub fn new(clan_id: ClanId, member_count: u32, initial_points: u64) -> Self {
        Self {
            clan_id,
            total_points: initial_points,
            level: level_for_points(initial_points),
            member_count,
            initial_points,
            active: true,
            ledger_seq: 0,
            last_entry_hash: [0u8; 32],
            updated_at: Utc::now(),
        }
    }

    /// Apply a signed delta, clamping at zero, and recompute the level.
    ///
    /// Returns the effective delta actually applied.
    pub fn apply_delta(&mut self, delta: i64) -> i64 {
        let before = self.total_points;
        self.total_points = before.saturating_add_signed(delta);
        self.level = level_for_points(self.total_points);
        self.updated_at = Utc::now();
        effective_delta(before, self.total_points)
    }

    /// Read-only view handed to the calculator
    pub fn snapshot(&self) -> ClanSnapshot {
        ClanSnapshot {
            clan_id: self.clan_id,
            total_points: self.total_points,
            level: self.level,
            member_count: self.member_count,
        }
    }
}

/// Signed difference `after - before` between two balances
pub fn effective_delta(before: u64, after: u64) -> i64 {
    if after >= before {
        i64::try_from(after - before).unwrap_or(i64::MAX)
    } else {
        i64::try_from(before - after).map(|d| -d).unwrap_or(i64::MIN)
    }
}

/// Clan state as seen by the settlement calculator
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClanSnapshot {
    /// Clan ID
    pub clan_id: ClanId,
    /// Cumulative points
    pub total_points: u64,
    /// Current level (1-10)
    pub level: u8,
    /// Member count
    pub member_count: u32,
}

/// Why a ledger entry was written
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
#[repr(u8)]
pub enum LedgerReason {
    /// Won a war
    WarWin = 1,
    /// Lost a war
    WarLoss = 2,
    /// War ended in a draw
    WarDraw = 3,
    /// Manual adjustment by an operator
    Adjustment = 4,
}

impl LedgerReason {
    /// Stable string code
    pub fn code(&self) -> &'static str {
        match self {
            LedgerReason::WarWin => "war_win",
            LedgerReason::WarLoss => "war_loss",
            LedgerReason::WarDraw => "war_draw",
            LedgerReason::Adjustment => "adjustment",
        }
    }
}

impl fmt::Display for LedgerReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.code())
    }
}

/// Immutable audit record of one point change for one clan
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PointsLedgerEntry {
    /// Unique entry ID (UUIDv7 for time-ordering)
    pub entry_id: Uuid,

    /// Clan this entry belongs to
    pub clan_id: ClanId,

    /// Position in the clan's history, starting at 1
    pub sequence: u64,

    /// War (or adjustment) that produced this entry
    pub war_id: WarId,

    /// The other side of the war, if any
    pub opponent_clan_id: Option<ClanId>,

    /// Effective change (after clamping)
    pub points_change: i64,

    /// Balance before
    pub points_before: u64,

    /// Balance after
    pub points_after: u64,

    /// Reason
    pub reason: LedgerReason,

    /// Free-form note (adjustments)
    #[serde(default)]
    pub note: Option<String>,

    /// Creation timestamp
    pub created_at: DateTime<Utc>,

    /// Hash of the previous entry of this clan
    pub prev_hash: [u8; 32],

    /// Hash of this entry's contents and `prev_hash`
    pub entry_hash: [u8; 32],
}

impl PointsLedgerEntry {
    /// `points_after == clamp(points_before + points_change, 0, ∞)`
    pub fn is_balanced(&self) -> bool {
        self.points_before.saturating_add_signed(self.points_change) == self.points_after
            && effective_delta(self.points_before, self.points_after) == self.points_change
    }
}

/// Derived per-clan war counters
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WarStats {
    /// Clan ID
    pub clan_id: ClanId,
    /// Wars settled
    pub total_wars: u64,
    /// Wars won
    pub wars_won: u64,
    /// Wars lost
    pub wars_lost: u64,
    /// Wars drawn
    pub wars_drawn: u64,
    /// `wars_won / total_wars × 100`, two decimal places
    pub win_rate: Decimal,
    /// Consecutive wins (0 after a loss)
    pub current_streak: i64,
    /// Highest `current_streak` ever reached
    pub best_streak: i64,
    /// Last settlement involving this clan
    pub last_war_at: Option<DateTime<Utc>>,
}

/// One row of the leaderboard
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RankingEntry {
    /// 1-based position
    pub rank: u32,
    /// Clan ID
    pub clan_id: ClanId,
    /// Cumulative points
    pub total_points: u64,
    /// Level
    pub level: u8,
    /// Member count
    pub member_count: u32,
    /// Win rate in percent
    pub win_rate: Decimal,
    /// Current win streak
    pub current_streak: i64,
    /// Best win streak
    pub best_streak: i64,
    /// Wars settled
    pub total_wars: u64,
}
