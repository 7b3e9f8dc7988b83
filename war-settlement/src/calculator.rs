//! Settlement calculator
//!
//! Pure scoring function: given the two clans as they stood before the war
//! and the war type's policy, propose point deltas for both sides. No I/O,
//! no errors, same inputs give the same output.
//!
//! # Algorithm
//!
//! ```text
//! level_diff  = loser.level - winner.level
//! level_mult  = 1 + 0.1 × level_diff              if level_diff > 0   (upset)
//!             = max(0.5, 1 + 0.05 × level_diff)   if level_diff < 0   (farming)
//! points_diff = loser.points - winner.points
//! points_mult = 1 + min(0.1 × points_diff / 1000, 0.5)   if points_diff > 0
//!
//! winner_delta =  clamp(round(base_winner × level_mult × points_mult), 50, 2000)
//! loser_delta  = -clamp(round(base_loser × 0.8), 10, 200)
//! ```
//!
//! Draws pay `draw_points` to both sides with no multipliers.

use clan_ledger::ClanSnapshot;
use serde::{Deserialize, Serialize};

use crate::policy::WarTypePolicy;

/// Tunable constants of the scoring function
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScoringRules {
    /// Bonus per level the winner was below the loser
    pub upset_step: f64,

    /// Discount per level the winner was above the loser
    pub discount_step: f64,

    /// Lowest level multiplier
    pub discount_floor: f64,

    /// Bonus per 1000 points the loser had over the winner
    pub points_step_per_thousand: f64,

    /// Highest points bonus
    pub points_bonus_cap: f64,

    /// Share of `base_loser_points` a loser gives up
    pub loser_factor: f64,

    /// Smallest winner gain
    pub winner_min: i64,

    /// Largest winner gain
    pub winner_max: i64,

    /// Smallest loser loss (magnitude)
    pub loser_min: i64,

    /// Largest loser loss (magnitude)
    pub loser_max: i64,
}

impl Default for ScoringRules {
    fn default() -> Self {
        Self {
            upset_step: 0.1,
            discount_step: 0.05,
            discount_floor: 0.5,
            points_step_per_thousand: 0.1,
            points_bonus_cap: 0.5,
            loser_factor: 0.8,
            winner_min: 50,
            winner_max: 2000,
            loser_min: 10,
            loser_max: 200,
        }
    }
}

impl ScoringRules {
    /// Reject rule sets that would make the function non-total or unbounded
    pub fn validate(&self) -> Result<(), String> {
        let factors = [
            self.upset_step,
            self.discount_step,
            self.discount_floor,
            self.points_step_per_thousand,
            self.points_bonus_cap,
            self.loser_factor,
        ];
        if factors.iter().any(|f| !f.is_finite() || *f < 0.0) {
            return Err("scoring factors must be finite and non-negative".to_string());
        }
        if self.winner_min <= 0 || self.winner_min > self.winner_max {
            return Err("winner bounds must satisfy 0 < min <= max".to_string());
        }
        if self.loser_min <= 0 || self.loser_min > self.loser_max {
            return Err("loser bounds must satisfy 0 < min <= max".to_string());
        }
        Ok(())
    }
}

/// Intermediate values behind a proposal
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeltaBreakdown {
    /// `loser.level - winner.level`
    pub level_diff: i32,

    /// Multiplier from the level gap
    pub level_multiplier: f64,

    /// `loser.total_points - winner.total_points`
    pub points_diff: i64,

    /// Multiplier from the points gap
    pub points_multiplier: f64,

    /// Winner delta before clamping
    pub raw_winner_delta: i64,

    /// Loser loss magnitude before clamping
    pub raw_loser_loss: i64,

    /// Scored as a draw
    pub is_draw: bool,
}

/// Proposed deltas, before clamping balances at zero
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeltaProposal {
    /// Change for the winner (or first side of a draw)
    pub winner_delta: i64,

    /// Change for the loser (or second side of a draw)
    pub loser_delta: i64,

    /// How the numbers came about
    pub breakdown: DeltaBreakdown,
}

/// Stateless calculator holding its rules
#[derive(Debug, Clone, Default)]
pub struct SettlementCalculator {
    rules: ScoringRules,
}

impl SettlementCalculator {
    /// Create calculator
    pub fn new(rules: ScoringRules) -> Self {
        Self { rules }
    }

    /// Deltas for a decided war
    pub fn compute_delta(
        &self,
        winner: &ClanSnapshot,
        loser: &ClanSnapshot,
        policy: &WarTypePolicy,
    ) -> DeltaProposal {
        let rules = &self.rules;

        let level_diff = i32::from(loser.level) - i32::from(winner.level);
        let level_multiplier = self.level_multiplier(level_diff);

        let points_diff = signed_gap(loser.total_points, winner.total_points);
        let points_multiplier = self.points_multiplier(points_diff);

        let raw_winner_delta = round_half_away(
            f64::from(policy.base_winner_points) * level_multiplier * points_multiplier,
        );
        let winner_delta = raw_winner_delta.clamp(rules.winner_min, rules.winner_max);

        let raw_loser_loss = round_half_away(f64::from(policy.base_loser_points) * rules.loser_factor);
        let loser_delta = -raw_loser_loss.clamp(rules.loser_min, rules.loser_max);

        DeltaProposal {
            winner_delta,
            loser_delta,
            breakdown: DeltaBreakdown {
                level_diff,
                level_multiplier,
                points_diff,
                points_multiplier,
                raw_winner_delta,
                raw_loser_loss,
                is_draw: false,
            },
        }
    }

    /// Deltas for a draw: the policy's draw reward for both sides
    pub fn compute_draw(&self, policy: &WarTypePolicy) -> DeltaProposal {
        let reward = i64::from(policy.draw_points);
        DeltaProposal {
            winner_delta: reward,
            loser_delta: reward,
            breakdown: DeltaBreakdown {
                level_diff: 0,
                level_multiplier: 1.0,
                points_diff: 0,
                points_multiplier: 1.0,
                raw_winner_delta: reward,
                raw_loser_loss: 0,
                is_draw: true,
            },
        }
    }

    fn level_multiplier(&self, level_diff: i32) -> f64 {
        let diff = f64::from(level_diff);
        if level_diff > 0 {
            1.0 + self.rules.upset_step * diff
        } else if level_diff < 0 {
            (1.0 + self.rules.discount_step * diff).max(self.rules.discount_floor)
        } else {
            1.0
        }
    }

    fn points_multiplier(&self, points_diff: i64) -> f64 {
        if points_diff <= 0 {
            return 1.0;
        }
        let bonus = self.rules.points_step_per_thousand * points_diff as f64 / 1000.0;
        1.0 + bonus.min(self.rules.points_bonus_cap)
    }
}

fn signed_gap(a: u64, b: u64) -> i64 {
    let gap = i128::from(a) - i128::from(b);
    gap.clamp(i128::from(i64::MIN), i128::from(i64::MAX)) as i64
}

fn round_half_away(value: f64) -> i64 {
    // f64::round rounds half away from zero; `as` saturates
    value.round() as i64
}
