//! War statistics transitions
//!
//! `WarStats` rows are derived data: one per clan, created on the first
//! settlement and updated in the same transaction as the balance change.

use chrono::{DateTime, Utc};
use rust_decimal::{Decimal, RoundingStrategy};

use crate::types::{ClanId, LedgerReason, WarStats};

/// Outcome of a war from one clan's point of view
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WarResult {
    /// Won
    Win,
    /// Lost
    Loss,
    /// Draw
    Draw,
}

impl WarResult {
    /// Ledger reason recorded for this result
    pub fn reason(self) -> LedgerReason {
        match self {
            WarResult::Win => LedgerReason::WarWin,
            WarResult::Loss => LedgerReason::WarLoss,
            WarResult::Draw => LedgerReason::WarDraw,
        }
    }
}

/// `won / total × 100` rounded to two decimals, zero without wars
pub fn win_rate(won: u64, total: u64) -> Decimal {
    if total == 0 {
        return Decimal::ZERO;
    }
    (Decimal::from(won) * Decimal::ONE_HUNDRED / Decimal::from(total))
        .round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero)
}

impl WarStats {
    /// Empty stats row for a clan that has not fought yet
    pub fn new(clan_id: ClanId) -> Self {
        Self {
            clan_id,
            total_wars: 0,
            wars_won: 0,
            wars_lost: 0,
            wars_drawn: 0,
            win_rate: Decimal::ZERO,
            current_streak: 0,
            best_streak: 0,
            last_war_at: None,
        }
    }

    /// Fold one settled war into the counters.
    ///
    /// Streak rules: a win extends the streak, a loss resets it to zero and
    /// a draw leaves it as it was. `best_streak` never decreases.
    pub fn record(&mut self, result: WarResult, at: DateTime<Utc>) {
        self.total_wars += 1;
        match result {
            WarResult::Win => {
                self.wars_won += 1;
                self.current_streak = self.current_streak.max(0) + 1;
            }
            WarResult::Loss => {
                self.wars_lost += 1;
                self.current_streak = 0;
            }
            WarResult::Draw => {
                self.wars_drawn += 1;
            }
        }
        self.best_streak = self.best_streak.max(self.current_streak);
        self.win_rate = win_rate(self.wars_won, self.total_wars);
        self.last_war_at = Some(at);
    }
}
