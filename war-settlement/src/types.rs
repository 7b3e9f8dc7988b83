//! Core types for settlement engine

use clan_ledger::{ClanId, WarId};
use serde::{Deserialize, Serialize};

/// Concluded war, as reported by war management
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WarOutcome {
    /// Unique war ID (idempotency key)
    pub war_id: WarId,

    /// War type, selects the scoring policy
    pub war_type_id: u32,

    /// Winning clan (first side of a draw)
    pub winner_clan_id: ClanId,

    /// Losing clan (second side of a draw)
    pub loser_clan_id: ClanId,

    /// Neither side won
    #[serde(default)]
    pub is_draw: bool,
}

impl WarOutcome {
    /// Decided war
    pub fn victory(war_id: WarId, war_type_id: u32, winner: ClanId, loser: ClanId) -> Self {
        Self {
            war_id,
            war_type_id,
            winner_clan_id: winner,
            loser_clan_id: loser,
            is_draw: false,
        }
    }

    /// Drawn war. Results list the sides in ascending clan id order,
    /// whatever order they are given in here.
    pub fn draw(war_id: WarId, war_type_id: u32, side_a: ClanId, side_b: ClanId) -> Self {
        Self {
            war_id,
            war_type_id,
            winner_clan_id: side_a,
            loser_clan_id: side_b,
            is_draw: true,
        }
    }
}

/// Effect of one settlement; deltas are the effective (clamped) ones.
///
/// A replay carries the same values as the original call with `replayed` set.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SettlementResult {
    /// War ID
    pub war_id: WarId,
    /// Winning clan (first side of a draw)
    pub winner_clan_id: ClanId,
    /// Losing clan (second side of a draw)
    pub loser_clan_id: ClanId,
    /// Scored as a draw
    pub is_draw: bool,
    /// Points applied to the winner
    pub winner_delta: i64,
    /// Points applied to the loser
    pub loser_delta: i64,
    /// Winner balance after settlement
    pub winner_new_total: u64,
    /// Loser balance after settlement
    pub loser_new_total: u64,
    /// Winner level after settlement
    pub winner_new_level: u8,
    /// Loser level after settlement
    pub loser_new_level: u8,
    /// The war was already settled; nothing was written by this call
    pub replayed: bool,
}

impl SettlementResult {
    /// Same result, ignoring whether it was replayed
    pub fn same_effect(&self, other: &SettlementResult) -> bool {
        SettlementResult {
            replayed: other.replayed,
            ..self.clone()
        } == *other
    }
}

/// Effect of a manual adjustment
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AdjustmentResult {
    /// Clan ID
    pub clan_id: ClanId,
    /// Adjustment ID (idempotency key)
    pub adjustment_id: WarId,
    /// Effective change
    pub points_change: i64,
    /// Balance after
    pub new_total: u64,
    /// Level after
    pub new_level: u8,
    /// The adjustment was already recorded; nothing was written by this call
    pub replayed: bool,
}

/// Ledger replay of a single clan
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReconciliationReport {
    /// Clan ID
    pub clan_id: ClanId,
    /// Balance at registration
    pub initial_points: u64,
    /// Σ points_change over the clan's ledger
    pub ledger_sum: i64,
    /// `initial_points + ledger_sum`
    pub expected_total: i64,
    /// Balance stored on the clan row
    pub recorded_total: u64,
    /// Number of ledger entries
    pub entry_count: u64,
    /// Every entry satisfies `after == clamp(before + change)` and follows on from the previous one
    pub entries_balanced: bool,
    /// Hash chain intact
    pub chain_valid: bool,
    /// Everything above agrees
    pub consistent: bool,
}
