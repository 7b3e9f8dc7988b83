//! Main settlement engine
//!
//! Orchestrates validation, the calculator and the ledger store. Every
//! mutating call is one RocksDB transaction: it either commits completely or
//! leaves nothing behind, so the same request can always be retried.

use crate::{
    calculator::SettlementCalculator,
    config::Config,
    policy::{StaticWarTypes, WarTypeCatalog, WarTypePolicy},
    types::*,
    Error, Result, ValidationError,
};
use chrono::{DateTime, Utc};
use clan_ledger::{
    audit, level_for_points, stats::WarResult, ClanId, ClanRecord, LedgerReason, LedgerTxn,
    Metrics, PointsLedgerEntry, RankingEntry, RankingQuery, Storage, WarId, WarStats,
};
use std::fmt;
use std::sync::Arc;
use std::time::Instant;
use uuid::Uuid;

/// Settlement engine
pub struct SettlementEngine {
    /// Ledger store
    storage: Arc<Storage>,

    /// War type policies
    catalog: Arc<dyn WarTypeCatalog>,

    /// Scoring function
    calculator: SettlementCalculator,

    /// Leaderboard reads
    rankings: RankingQuery,

    /// Prometheus metrics
    metrics: Metrics,

    /// Configuration
    config: Config,
}

impl fmt::Debug for SettlementEngine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SettlementEngine")
            .field("storage", &self.storage)
            .field("calculator", &self.calculator)
            .field("metrics", &self.metrics)
            .finish_non_exhaustive()
    }
}

impl SettlementEngine {
    /// Open the ledger and use the war types from configuration
    pub fn new(config: Config) -> Result<Self> {
        let catalog = Arc::new(StaticWarTypes::new(config.settlement.war_types.clone()));
        Self::with_catalog(config, catalog)
    }

    /// Open the ledger with an external war type catalog
    pub fn with_catalog(config: Config, catalog: Arc<dyn WarTypeCatalog>) -> Result<Self> {
        config.validate()?;
        let storage = Arc::new(Storage::open(&config.ledger)?);
        Self::from_parts(storage, catalog, config)
    }

    /// Build on an already opened store
    pub fn from_parts(
        storage: Arc<Storage>,
        catalog: Arc<dyn WarTypeCatalog>,
        config: Config,
    ) -> Result<Self> {
        config.validate()?;

        let calculator = SettlementCalculator::new(config.settlement.scoring.clone());
        let rankings = RankingQuery::new(storage.clone(), config.ledger.ranking.clone());
        let metrics = Metrics::new()?;

        tracing::info!(
            service = %config.service_name,
            max_attempts = config.settlement.max_attempts,
            "Settlement engine ready"
        );

        Ok(Self {
            storage,
            catalog,
            calculator,
            rankings,
            metrics,
            config,
        })
    }

    /// Settle a concluded war exactly once.
    ///
    /// A war that was already settled is answered from the ledger with
    /// `replayed` set, without writing anything.
    pub fn settle(&self, outcome: &WarOutcome) -> Result<SettlementResult> {
        let started = Instant::now();
        let policy = self.validate_outcome(outcome)?;

        let result = self.with_retries("settle", || self.settle_once(outcome, &policy))?;

        if result.replayed {
            self.metrics.record_replay();
            tracing::warn!(
                war_id = %outcome.war_id,
                winner = %result.winner_clan_id,
                loser = %result.loser_clan_id,
                "Duplicate settlement, returning recorded result"
            );
        } else {
            self.metrics.record_settlement(started.elapsed().as_secs_f64());
            tracing::info!(
                war_id = %result.war_id,
                war_type = policy.war_type_id,
                winner = %result.winner_clan_id,
                loser = %result.loser_clan_id,
                is_draw = result.is_draw,
                winner_delta = result.winner_delta,
                loser_delta = result.loser_delta,
                winner_total = result.winner_new_total,
                loser_total = result.loser_new_total,
                "War settled"
            );
        }

        Ok(result)
    }

    /// Apply a manual point correction, idempotent on `(clan_id, adjustment_id)`
    pub fn adjust(
        &self,
        clan_id: ClanId,
        adjustment_id: WarId,
        delta: i64,
        note: Option<String>,
    ) -> Result<AdjustmentResult> {
        if adjustment_id.is_empty() {
            return Err(ValidationError::EmptyWarId.into());
        }
        if delta == 0 {
            return Err(ValidationError::ZeroAdjustment.into());
        }

        let result = self.with_retries("adjust", || {
            self.adjust_once(clan_id, &adjustment_id, delta, note.clone())
        })?;

        if result.replayed {
            self.metrics.record_replay();
            tracing::warn!(
                clan_id = %clan_id,
                adjustment_id = %adjustment_id,
                "Duplicate adjustment, returning recorded result"
            );
        } else {
            self.metrics.record_adjustment();
            tracing::info!(
                clan_id = %clan_id,
                adjustment_id = %adjustment_id,
                requested = delta,
                applied = result.points_change,
                new_total = result.new_total,
                "Points adjusted"
            );
        }

        Ok(result)
    }

    /// Replay a clan's ledger against its balance row. Read-only.
    pub fn reconcile(&self, clan_id: ClanId) -> Result<ReconciliationReport> {
        let snapshot = self.storage.snapshot()?;
        let clan = snapshot
            .get_clan(clan_id)?
            .ok_or(ValidationError::UnknownClan(clan_id))?;
        let entries = snapshot.clan_entries(clan_id)?;

        let mut running = clan.initial_points;
        let mut entries_balanced = true;
        let mut ledger_sum: i128 = 0;
        for entry in &entries {
            if !entry.is_balanced() || entry.points_before != running {
                entries_balanced = false;
            }
            running = entry.points_after;
            ledger_sum += i128::from(entry.points_change);
        }

        let expected_total = i128::from(clan.initial_points) + ledger_sum;
        let chain_valid = audit::verify_chain(&entries);
        let head = entries
            .last()
            .map(|entry| entry.entry_hash)
            .unwrap_or(audit::GENESIS_HASH);

        let consistent = entries_balanced
            && chain_valid
            && expected_total == i128::from(clan.total_points)
            && running == clan.total_points
            && entries.len() as u64 == clan.ledger_seq
            && head == clan.last_entry_hash
            && clan.level == level_for_points(clan.total_points);

        let report = ReconciliationReport {
            clan_id,
            initial_points: clan.initial_points,
            ledger_sum: saturate(ledger_sum),
            expected_total: saturate(expected_total),
            recorded_total: clan.total_points,
            entry_count: entries.len() as u64,
            entries_balanced,
            chain_valid,
            consistent,
        };

        if consistent {
            tracing::debug!(clan_id = %clan_id, entries = report.entry_count, "Clan reconciled");
        } else {
            tracing::error!(
                clan_id = %clan_id,
                expected_total = report.expected_total,
                recorded_total = report.recorded_total,
                chain_valid,
                entries_balanced,
                "Clan ledger does not reconcile"
            );
        }

        Ok(report)
    }

    /// Ledger entries of a clan, newest first
    pub fn clan_history(&self, clan_id: ClanId, limit: usize) -> Result<Vec<PointsLedgerEntry>> {
        let snapshot = self.storage.snapshot()?;
        if snapshot.get_clan(clan_id)?.is_none() {
            return Err(ValidationError::UnknownClan(clan_id).into());
        }
        Ok(snapshot.clan_entries_newest_first(clan_id, limit)?)
    }

    /// Register a clan; an existing clan is returned untouched
    pub fn register_clan(
        &self,
        clan_id: ClanId,
        member_count: u32,
        initial_points: u64,
    ) -> Result<ClanRecord> {
        self.with_retries("register_clan", || {
            Ok(self
                .storage
                .register_clan(ClanRecord::new(clan_id, member_count, initial_points))?)
        })
    }

    /// Update a clan's member count
    pub fn set_member_count(&self, clan_id: ClanId, member_count: u32) -> Result<ClanRecord> {
        self.with_retries("set_member_count", || {
            Ok(self
                .storage
                .update_clan_profile(clan_id, |clan| clan.member_count = member_count)?)
        })
    }

    /// Mark a clan active or disbanded
    pub fn set_active(&self, clan_id: ClanId, active: bool) -> Result<ClanRecord> {
        self.with_retries("set_active", || {
            Ok(self
                .storage
                .update_clan_profile(clan_id, |clan| clan.active = active)?)
        })
    }

    /// Top `limit` clans
    pub fn get_rankings(&self, limit: usize) -> Result<Vec<RankingEntry>> {
        Ok(self.rankings.get_rankings(limit)?)
    }

    /// Top clans with the configured default limit
    pub fn get_default_rankings(&self) -> Result<Vec<RankingEntry>> {
        Ok(self.rankings.get_default_rankings()?)
    }

    /// Clan row, if registered
    pub fn get_clan(&self, clan_id: ClanId) -> Result<Option<ClanRecord>> {
        Ok(self.storage.get_clan(clan_id)?)
    }

    /// War counters of a registered clan; zeroes if it never fought
    pub fn get_war_stats(&self, clan_id: ClanId) -> Result<WarStats> {
        let snapshot = self.storage.snapshot()?;
        if snapshot.get_clan(clan_id)?.is_none() {
            return Err(ValidationError::UnknownClan(clan_id).into());
        }
        Ok(snapshot
            .get_war_stats(clan_id)?
            .unwrap_or_else(|| WarStats::new(clan_id)))
    }

    /// Metrics collector
    pub fn metrics(&self) -> &Metrics {
        &self.metrics
    }

    /// Underlying store
    pub fn storage(&self) -> &Arc<Storage> {
        &self.storage
    }

    /// Configuration in use
    pub fn config(&self) -> &Config {
        &self.config
    }

    fn validate_outcome(&self, outcome: &WarOutcome) -> Result<WarTypePolicy> {
        if outcome.winner_clan_id == outcome.loser_clan_id {
            return Err(ValidationError::SelfWar(outcome.winner_clan_id).into());
        }
        let policy = self
            .catalog
            .policy(outcome.war_type_id)
            .ok_or(ValidationError::UnknownWarType(outcome.war_type_id))?;
        if outcome.war_id.is_empty() {
            return Err(ValidationError::EmptyWarId.into());
        }
        Ok(policy)
    }

    /// Run `op` until it succeeds, fails permanently or runs out of attempts
    fn with_retries<T>(&self, operation: &'static str, mut op: impl FnMut() -> Result<T>) -> Result<T> {
        let max_attempts = self.config.settlement.max_attempts.max(1);
        let mut attempt = 1;
        loop {
            match op() {
                Err(err) if err.is_retryable() => {
                    self.metrics.record_transient_failure();
                    if attempt >= max_attempts {
                        tracing::warn!(operation, attempt, error = %err, "Giving up after transient failures");
                        return Err(err);
                    }
                    tracing::warn!(operation, attempt, error = %err, "Transient store failure, retrying");
                    attempt += 1;
                }
                other => return other,
            }
        }
    }

    fn settle_once(&self, outcome: &WarOutcome, policy: &WarTypePolicy) -> Result<SettlementResult> {
        let txn = self.storage.transaction()?;
        let (first, second) = ordered(outcome.winner_clan_id, outcome.loser_clan_id);

        // Slots, clans and stats are each locked in ascending clan order
        let first_slot = txn.lock_slot(first, &outcome.war_id)?;
        let second_slot = txn.lock_slot(second, &outcome.war_id)?;
        if first_slot.is_some() || second_slot.is_some() {
            let result = replay_settlement(&txn, outcome)?;
            txn.rollback()?;
            return Ok(result);
        }

        let first_clan = txn
            .lock_clan(first)?
            .ok_or(ValidationError::UnknownClan(first))?;
        let second_clan = txn
            .lock_clan(second)?
            .ok_or(ValidationError::UnknownClan(second))?;
        // a draw has no winner; its sides are reported in clan id order
        let (mut winner, mut loser) = if outcome.is_draw || first == outcome.winner_clan_id {
            (first_clan, second_clan)
        } else {
            (second_clan, first_clan)
        };

        let proposal = if outcome.is_draw {
            self.calculator.compute_draw(policy)
        } else {
            self.calculator
                .compute_delta(&winner.snapshot(), &loser.snapshot(), policy)
        };
        tracing::debug!(war_id = %outcome.war_id, breakdown = ?proposal.breakdown, "Delta proposed");

        let (winner_result, loser_result) = if outcome.is_draw {
            (WarResult::Draw, WarResult::Draw)
        } else {
            (WarResult::Win, WarResult::Loss)
        };

        let now = Utc::now();
        let winner_entry = stage_entry(
            &txn,
            &mut winner,
            &outcome.war_id,
            Some(loser.clan_id),
            proposal.winner_delta,
            winner_result.reason(),
            None,
            now,
        )?;
        let loser_entry = stage_entry(
            &txn,
            &mut loser,
            &outcome.war_id,
            Some(winner.clan_id),
            proposal.loser_delta,
            loser_result.reason(),
            None,
            now,
        )?;

        let first_stats = txn.lock_war_stats(first)?;
        let second_stats = txn.lock_war_stats(second)?;
        let (mut winner_stats, mut loser_stats) = if first == winner.clan_id {
            (first_stats, second_stats)
        } else {
            (second_stats, first_stats)
        };
        winner_stats.record(winner_result, now);
        loser_stats.record(loser_result, now);
        txn.put_war_stats(&winner_stats)?;
        txn.put_war_stats(&loser_stats)?;

        txn.commit()?;

        Ok(SettlementResult {
            war_id: outcome.war_id.clone(),
            winner_clan_id: winner.clan_id,
            loser_clan_id: loser.clan_id,
            is_draw: outcome.is_draw,
            winner_delta: winner_entry.points_change,
            loser_delta: loser_entry.points_change,
            winner_new_total: winner.total_points,
            loser_new_total: loser.total_points,
            winner_new_level: winner.level,
            loser_new_level: loser.level,
            replayed: false,
        })
    }

    fn adjust_once(
        &self,
        clan_id: ClanId,
        adjustment_id: &WarId,
        delta: i64,
        note: Option<String>,
    ) -> Result<AdjustmentResult> {
        let txn = self.storage.transaction()?;

        if let Some(entry) = txn.find_slot_entry(clan_id, adjustment_id)? {
            if entry.reason != LedgerReason::Adjustment {
                return Err(ValidationError::WarIdConflict(adjustment_id.clone()).into());
            }
            txn.rollback()?;
            return Ok(AdjustmentResult {
                clan_id,
                adjustment_id: adjustment_id.clone(),
                points_change: entry.points_change,
                new_total: entry.points_after,
                new_level: level_for_points(entry.points_after),
                replayed: true,
            });
        }

        let mut clan = txn
            .lock_clan(clan_id)?
            .ok_or(ValidationError::UnknownClan(clan_id))?;
        let entry = stage_entry(
            &txn,
            &mut clan,
            adjustment_id,
            None,
            delta,
            LedgerReason::Adjustment,
            note,
            Utc::now(),
        )?;
        txn.commit()?;

        Ok(AdjustmentResult {
            clan_id,
            adjustment_id: adjustment_id.clone(),
            points_change: entry.points_change,
            new_total: clan.total_points,
            new_level: clan.level,
            replayed: false,
        })
    }
}

/// Apply `delta` to a locked clan row and stage the matching ledger entry.
///
/// The clan's sequence and chain head move with the entry; nothing is
/// staged if the result would break a ledger invariant.
#[allow(clippy::too_many_arguments)]
fn stage_entry(
    txn: &LedgerTxn<'_>,
    clan: &mut ClanRecord,
    war_id: &WarId,
    opponent: Option<ClanId>,
    delta: i64,
    reason: LedgerReason,
    note: Option<String>,
    at: DateTime<Utc>,
) -> Result<PointsLedgerEntry> {
    let sequence = clan.ledger_seq.checked_add(1).ok_or_else(|| {
        Error::InvariantViolation(format!("ledger sequence of clan {} exhausted", clan.clan_id))
    })?;
    let points_before = clan.total_points;
    let applied = clan.apply_delta(delta);

    let mut entry = PointsLedgerEntry {
        entry_id: Uuid::now_v7(),
        clan_id: clan.clan_id,
        sequence,
        war_id: war_id.clone(),
        opponent_clan_id: opponent,
        points_change: applied,
        points_before,
        points_after: clan.total_points,
        reason,
        note,
        created_at: at,
        prev_hash: audit::GENESIS_HASH,
        entry_hash: audit::GENESIS_HASH,
    };
    audit::seal(&mut entry, clan.last_entry_hash);
    clan.ledger_seq = sequence;
    clan.last_entry_hash = entry.entry_hash;

    check_entry(&entry, clan, delta)?;

    txn.append_entry(&entry)?;
    txn.put_clan(clan)?;
    Ok(entry)
}

fn check_entry(entry: &PointsLedgerEntry, clan: &ClanRecord, requested: i64) -> Result<()> {
    // A clamped change keeps its sign and never exceeds the request
    let within_request = match requested.signum() {
        1 => entry.points_change == requested,
        -1 => entry.points_change <= 0 && entry.points_change >= requested,
        _ => entry.points_change == 0,
    };

    let violation = if !entry.is_balanced() {
        Some("entry does not balance")
    } else if !within_request {
        Some("applied change exceeds the requested one")
    } else if clan.level != level_for_points(clan.total_points) {
        Some("level does not match points")
    } else {
        None
    };

    match violation {
        Some(reason) => {
            tracing::error!(
                clan_id = %entry.clan_id,
                war_id = %entry.war_id,
                sequence = entry.sequence,
                points_before = entry.points_before,
                points_change = entry.points_change,
                points_after = entry.points_after,
                reason,
                "Ledger invariant violated, aborting"
            );
            Err(Error::InvariantViolation(format!(
                "clan {} entry {}: {}",
                entry.clan_id, entry.sequence, reason
            )))
        }
        None => Ok(()),
    }
}

/// Rebuild a settlement from the entries already holding its slots
fn replay_settlement(txn: &LedgerTxn<'_>, outcome: &WarOutcome) -> Result<SettlementResult> {
    let conflict = || Error::from(ValidationError::WarIdConflict(outcome.war_id.clone()));

    let first = txn.find_slot_entry(outcome.winner_clan_id, &outcome.war_id)?;
    let second = txn.find_slot_entry(outcome.loser_clan_id, &outcome.war_id)?;

    let (a, b) = match (first, second) {
        (Some(a), Some(b)) => (a, b),
        (Some(only), None) | (None, Some(only)) => {
            let other = if only.clan_id == outcome.winner_clan_id {
                outcome.loser_clan_id
            } else {
                outcome.winner_clan_id
            };
            if only.reason == LedgerReason::Adjustment || only.opponent_clan_id != Some(other) {
                return Err(conflict());
            }
            return Err(Error::InvariantViolation(format!(
                "war {} is recorded for clan {} but not for clan {}",
                outcome.war_id, only.clan_id, other
            )));
        }
        (None, None) => {
            return Err(Error::InvariantViolation(format!(
                "slot of war {} vanished inside its transaction",
                outcome.war_id
            )))
        }
    };

    let paired = a.opponent_clan_id == Some(b.clan_id) && b.opponent_clan_id == Some(a.clan_id);
    if !paired || a.reason == LedgerReason::Adjustment || b.reason == LedgerReason::Adjustment {
        return Err(conflict());
    }

    let is_draw = a.reason == LedgerReason::WarDraw;
    let (winner, loser) = if b.reason == LedgerReason::WarWin
        || (is_draw && b.clan_id < a.clan_id)
    {
        (b, a)
    } else {
        (a, b)
    };

    Ok(SettlementResult {
        war_id: outcome.war_id.clone(),
        winner_clan_id: winner.clan_id,
        loser_clan_id: loser.clan_id,
        is_draw,
        winner_delta: winner.points_change,
        loser_delta: loser.points_change,
        winner_new_total: winner.points_after,
        loser_new_total: loser.points_after,
        winner_new_level: level_for_points(winner.points_after),
        loser_new_level: level_for_points(loser.points_after),
        replayed: true,
    })
}

fn ordered(a: ClanId, b: ClanId) -> (ClanId, ClanId) {
    if a <= b {
        (a, b)
    } else {
        (b, a)
    }
}

fn saturate(value: i128) -> i64 {
    value.clamp(i128::from(i64::MIN), i128::from(i64::MAX)) as i64
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal::Decimal;
    use std::cell::Cell;
    use tempfile::TempDir;

    fn test_config(temp_dir: &TempDir) -> Config {
        let mut config = Config::default();
        config.ledger.data_dir = temp_dir.path().to_path_buf();
        config.ledger.rocksdb.sync_writes = false;
        config
    }

    fn test_engine() -> (SettlementEngine, TempDir) {
        let temp_dir = TempDir::new().unwrap();
        let engine = SettlementEngine::new(test_config(&temp_dir)).unwrap();
        (engine, temp_dir)
    }

    fn war(id: &str, winner: u64, loser: u64) -> WarOutcome {
        WarOutcome::victory(WarId::new(id), 2, ClanId(winner), ClanId(loser))
    }

    #[test]
    fn test_upset_settlement() {
        let (engine, _temp) = test_engine();
        engine.register_clan(ClanId(1), 10, 0).unwrap();
        engine.register_clan(ClanId(2), 10, 4000).unwrap();

        // level 1 beats level 6 holding 4000 more points: 200 × 1.5 × 1.4
        let result = engine.settle(&war("war-1", 1, 2)).unwrap();
        assert!(!result.replayed);
        assert_eq!(result.winner_delta, 420);
        assert_eq!(result.loser_delta, -24);
        assert_eq!(result.winner_new_total, 420);
        assert_eq!(result.winner_new_level, 2);
        assert_eq!(result.loser_new_total, 3976);
        assert_eq!(result.loser_new_level, 6);

        let winner = engine.get_clan(ClanId(1)).unwrap().unwrap();
        assert_eq!(winner.total_points, 420);
        assert_eq!(winner.ledger_seq, 1);

        let stats = engine.get_war_stats(ClanId(1)).unwrap();
        assert_eq!(stats.wars_won, 1);
        assert_eq!(stats.win_rate, Decimal::from(100));
        assert_eq!(engine.get_war_stats(ClanId(2)).unwrap().wars_lost, 1);
        assert_eq!(engine.metrics().settlements_total.get(), 1);
    }

    #[test]
    fn test_duplicate_settlement_is_replayed() {
        let (engine, _temp) = test_engine();
        engine.register_clan(ClanId(1), 10, 500).unwrap();
        engine.register_clan(ClanId(2), 10, 500).unwrap();

        let first = engine.settle(&war("war-7", 1, 2)).unwrap();
        let second = engine.settle(&war("war-7", 1, 2)).unwrap();
        assert!(second.replayed);
        assert!(first.same_effect(&second));

        // swapped sides still answer with what was recorded
        let swapped = engine.settle(&war("war-7", 2, 1)).unwrap();
        assert!(swapped.replayed);
        assert_eq!(swapped.winner_clan_id, ClanId(1));

        assert_eq!(engine.clan_history(ClanId(1), 10).unwrap().len(), 1);
        assert_eq!(engine.clan_history(ClanId(2), 10).unwrap().len(), 1);
        assert_eq!(engine.get_war_stats(ClanId(1)).unwrap().total_wars, 1);
        assert_eq!(engine.metrics().settlements_total.get(), 1);
        assert_eq!(engine.metrics().replays_total.get(), 2);
    }

    #[test]
    fn test_loser_balance_clamped_at_zero() {
        let (engine, _temp) = test_engine();
        engine.register_clan(ClanId(1), 10, 0).unwrap();
        engine.register_clan(ClanId(2), 10, 10).unwrap();

        let result = engine.settle(&war("war-1", 1, 2)).unwrap();
        assert_eq!(result.loser_delta, -10);
        assert_eq!(result.loser_new_total, 0);

        let history = engine.clan_history(ClanId(2), 10).unwrap();
        assert_eq!(history[0].points_change, -10);
        assert_eq!(history[0].points_after, 0);

        let again = engine.settle(&war("war-2", 1, 2)).unwrap();
        assert_eq!(again.loser_delta, 0);
        assert_eq!(again.loser_new_total, 0);
    }

    #[test]
    fn test_draw_pays_both_sides() {
        let (engine, _temp) = test_engine();
        engine.register_clan(ClanId(1), 10, 0).unwrap();
        engine.register_clan(ClanId(2), 10, 9000).unwrap();

        engine.settle(&war("war-0", 1, 2)).unwrap();
        let draw = WarOutcome::draw(WarId::new("war-1"), 2, ClanId(1), ClanId(2));
        let result = engine.settle(&draw).unwrap();
        assert!(result.is_draw);
        assert_eq!(result.winner_delta, 25);
        assert_eq!(result.loser_delta, 25);

        let stats = engine.get_war_stats(ClanId(1)).unwrap();
        assert_eq!(stats.wars_drawn, 1);
        assert_eq!(stats.current_streak, 1);
        assert_eq!(stats.win_rate, Decimal::from(50));

        let replay = engine.settle(&draw).unwrap();
        assert!(replay.replayed);
        assert!(replay.same_effect(&result));
    }

    #[test]
    fn test_draw_sides_follow_clan_order() {
        let (engine, _temp) = test_engine();
        engine.register_clan(ClanId(1), 10, 100).unwrap();
        engine.register_clan(ClanId(2), 10, 3000).unwrap();

        let reported = WarOutcome::draw(WarId::new("d"), 2, ClanId(2), ClanId(1));
        let result = engine.settle(&reported).unwrap();
        assert_eq!(result.winner_clan_id, ClanId(1));
        assert_eq!(result.winner_new_total, 125);
        assert_eq!(result.loser_clan_id, ClanId(2));
        assert_eq!(result.loser_new_total, 3025);

        for outcome in [
            WarOutcome::draw(WarId::new("d"), 2, ClanId(1), ClanId(2)),
            reported,
        ] {
            let replay = engine.settle(&outcome).unwrap();
            assert!(replay.replayed);
            assert!(replay.same_effect(&result), "{:?} != {:?}", replay, result);
        }
    }

    fn sealed_entry(clan: &ClanRecord, war_id: &str, opponent: ClanId, change: i64) -> PointsLedgerEntry {
        let mut entry = PointsLedgerEntry {
            entry_id: Uuid::now_v7(),
            clan_id: clan.clan_id,
            sequence: clan.ledger_seq + 1,
            war_id: WarId::new(war_id),
            opponent_clan_id: Some(opponent),
            points_change: change,
            points_before: clan.total_points,
            points_after: clan.total_points.saturating_add_signed(change),
            reason: LedgerReason::WarWin,
            note: None,
            created_at: Utc::now(),
            prev_hash: audit::GENESIS_HASH,
            entry_hash: audit::GENESIS_HASH,
        };
        audit::seal(&mut entry, clan.last_entry_hash);
        entry
    }

    #[test]
    fn test_check_entry_rejects_broken_entries() {
        let mut clan = ClanRecord::new(ClanId(1), 10, 500);
        let mut entry = sealed_entry(&clan, "w1", ClanId(2), 200);
        clan.apply_delta(200);
        assert!(check_entry(&entry, &clan, 200).is_ok());

        // after does not follow from before + change
        let mut unbalanced = entry.clone();
        unbalanced.points_after += 1;
        assert!(matches!(
            check_entry(&unbalanced, &clan, 200),
            Err(Error::InvariantViolation(_))
        ));

        // more applied than requested
        assert!(matches!(
            check_entry(&entry, &clan, 150),
            Err(Error::InvariantViolation(_))
        ));

        // a loss recorded as a gain
        assert!(matches!(
            check_entry(&entry, &clan, -24),
            Err(Error::InvariantViolation(_))
        ));

        // level out of step with points
        clan.level = 9;
        assert!(matches!(
            check_entry(&entry, &clan, 200),
            Err(Error::InvariantViolation(_))
        ));

        entry.points_change = 0;
        entry.points_after = entry.points_before;
        clan.level = level_for_points(clan.total_points);
        assert!(check_entry(&entry, &clan, 0).is_ok());
    }

    #[test]
    fn test_half_recorded_war_aborts_without_writing() {
        let (engine, _temp) = test_engine();
        engine.register_clan(ClanId(1), 10, 500).unwrap();
        engine.register_clan(ClanId(2), 10, 500).unwrap();

        // only clan 1 holds the slot for w1
        {
            let storage = engine.storage();
            let txn = storage.transaction().unwrap();
            let mut clan = txn.lock_clan(ClanId(1)).unwrap().unwrap();
            let entry = sealed_entry(&clan, "w1", ClanId(2), 200);
            clan.apply_delta(200);
            clan.ledger_seq = entry.sequence;
            clan.last_entry_hash = entry.entry_hash;
            txn.append_entry(&entry).unwrap();
            txn.put_clan(&clan).unwrap();
            txn.commit().unwrap();
        }
        let before: Vec<_> = [1, 2]
            .iter()
            .map(|id| engine.get_clan(ClanId(*id)).unwrap().unwrap())
            .collect();

        assert!(matches!(
            engine.settle(&war("w1", 1, 2)),
            Err(Error::InvariantViolation(_))
        ));
        assert!(matches!(
            engine.settle(&war("w1", 2, 1)),
            Err(Error::InvariantViolation(_))
        ));

        for clan in &before {
            let after = engine.get_clan(clan.clan_id).unwrap().unwrap();
            assert_eq!(after.total_points, clan.total_points);
            assert_eq!(after.ledger_seq, clan.ledger_seq);
        }
        assert!(engine.clan_history(ClanId(2), 10).unwrap().is_empty());
        assert_eq!(engine.get_war_stats(ClanId(2)).unwrap().total_wars, 0);
        assert_eq!(engine.metrics().settlements_total.get(), 0);
    }

    #[test]
    fn test_validation_rejects_without_writing() {
        let (engine, _temp) = test_engine();
        engine.register_clan(ClanId(1), 10, 100).unwrap();
        engine.register_clan(ClanId(2), 10, 100).unwrap();

        let cases = [
            (war("war-1", 1, 1), "self_war"),
            (WarOutcome::victory(WarId::new("war-1"), 99, ClanId(1), ClanId(2)), "unknown_war_type"),
            (war("  ", 1, 2), "empty_war_id"),
            (war("war-1", 1, 42), "unknown_clan"),
        ];
        for (outcome, code) in cases {
            match engine.settle(&outcome) {
                Err(Error::Validation(err)) => assert_eq!(err.reason_code(), code),
                other => panic!("expected {} rejection, got {:?}", code, other),
            }
        }

        assert!(engine.clan_history(ClanId(1), 10).unwrap().is_empty());
        assert_eq!(engine.get_clan(ClanId(1)).unwrap().unwrap().total_points, 100);
        assert!(matches!(
            engine.clan_history(ClanId(42), 10),
            Err(Error::Validation(ValidationError::UnknownClan(ClanId(42))))
        ));
    }

    #[test]
    fn test_adjustments() {
        let (engine, _temp) = test_engine();
        engine.register_clan(ClanId(1), 10, 100).unwrap();
        engine.register_clan(ClanId(2), 10, 100).unwrap();

        let bonus = engine
            .adjust(ClanId(1), WarId::new("adj-1"), 500, Some("season reward".into()))
            .unwrap();
        assert_eq!(bonus.new_total, 600);
        assert_eq!(bonus.new_level, 3);
        assert!(!bonus.replayed);

        let replay = engine.adjust(ClanId(1), WarId::new("adj-1"), 500, None).unwrap();
        assert!(replay.replayed);
        assert_eq!(replay.new_total, 600);

        let penalty = engine.adjust(ClanId(1), WarId::new("adj-2"), -10_000, None).unwrap();
        assert_eq!(penalty.points_change, -600);
        assert_eq!(penalty.new_total, 0);

        assert!(matches!(
            engine.adjust(ClanId(1), WarId::new("adj-3"), 0, None),
            Err(Error::Validation(ValidationError::ZeroAdjustment))
        ));
        assert!(matches!(
            engine.adjust(ClanId(9), WarId::new("adj-3"), 5, None),
            Err(Error::Validation(ValidationError::UnknownClan(ClanId(9))))
        ));

        // adjustments leave war stats alone
        assert_eq!(engine.get_war_stats(ClanId(1)).unwrap().total_wars, 0);
        assert_eq!(engine.metrics().adjustments_total.get(), 2);
    }

    #[test]
    fn test_id_reuse_across_event_kinds_conflicts() {
        let (engine, _temp) = test_engine();
        for id in 1..=3 {
            engine.register_clan(ClanId(id), 10, 100).unwrap();
        }

        engine.settle(&war("war-1", 1, 2)).unwrap();
        assert!(matches!(
            engine.adjust(ClanId(1), WarId::new("war-1"), 10, None),
            Err(Error::Validation(ValidationError::WarIdConflict(_)))
        ));

        engine.adjust(ClanId(3), WarId::new("adj-1"), 10, None).unwrap();
        assert!(matches!(
            engine.settle(&war("adj-1", 3, 1)),
            Err(Error::Validation(ValidationError::WarIdConflict(_)))
        ));

        // same war id against a different opponent
        assert!(matches!(
            engine.settle(&war("war-1", 1, 3)),
            Err(Error::Validation(ValidationError::WarIdConflict(_)))
        ));
        assert_eq!(engine.clan_history(ClanId(3), 10).unwrap().len(), 1);
    }

    #[test]
    fn test_streaks() {
        let (engine, _temp) = test_engine();
        engine.register_clan(ClanId(1), 10, 0).unwrap();
        engine.register_clan(ClanId(2), 10, 0).unwrap();

        engine.settle(&war("w1", 1, 2)).unwrap();
        engine.settle(&war("w2", 1, 2)).unwrap();
        engine.settle(&war("w3", 2, 1)).unwrap();
        engine.settle(&war("w4", 1, 2)).unwrap();

        let stats = engine.get_war_stats(ClanId(1)).unwrap();
        assert_eq!(stats.total_wars, 4);
        assert_eq!(stats.wars_won, 3);
        assert_eq!(stats.current_streak, 1);
        assert_eq!(stats.best_streak, 2);
        assert_eq!(stats.win_rate, Decimal::from(75));
    }

    #[test]
    fn test_reconcile_after_mixed_activity() {
        let (engine, _temp) = test_engine();
        engine.register_clan(ClanId(1), 10, 1500).unwrap();
        engine.register_clan(ClanId(2), 10, 20).unwrap();

        engine.settle(&war("w1", 1, 2)).unwrap();
        engine.settle(&war("w2", 1, 2)).unwrap();
        engine.adjust(ClanId(1), WarId::new("adj-1"), -300, None).unwrap();
        engine
            .settle(&WarOutcome::draw(WarId::new("w3"), 1, ClanId(2), ClanId(1)))
            .unwrap();

        for id in [1, 2] {
            let report = engine.reconcile(ClanId(id)).unwrap();
            assert!(report.consistent, "clan {} did not reconcile: {:?}", id, report);
            assert!(report.chain_valid);
            assert_eq!(report.expected_total, report.recorded_total as i64);
        }

        let report = engine.reconcile(ClanId(1)).unwrap();
        assert_eq!(report.entry_count, 4);
        assert_eq!(report.initial_points, 1500);
    }

    #[test]
    fn test_rankings_through_engine() {
        let (engine, _temp) = test_engine();
        engine.register_clan(ClanId(1), 10, 500).unwrap();
        engine.register_clan(ClanId(2), 10, 500).unwrap();
        engine.register_clan(ClanId(3), 0, 9000).unwrap();
        engine.register_clan(ClanId(4), 10, 8000).unwrap();
        engine.set_active(ClanId(4), false).unwrap();

        engine.settle(&war("w1", 2, 1)).unwrap();

        let rankings = engine.get_rankings(10).unwrap();
        let ids: Vec<_> = rankings.iter().map(|r| r.clan_id).collect();
        assert_eq!(ids, vec![ClanId(2), ClanId(1)]);
        assert_eq!(rankings[0].rank, 1);

        engine.set_member_count(ClanId(3), 5).unwrap();
        assert_eq!(engine.get_rankings(1).unwrap()[0].clan_id, ClanId(3));
    }

    #[test]
    fn test_retries_stop_at_max_attempts() {
        let (engine, _temp) = test_engine();

        let calls = Cell::new(0);
        let value = engine
            .with_retries("test", || {
                calls.set(calls.get() + 1);
                if calls.get() < 3 {
                    Err(Error::TransientStore("busy".into()))
                } else {
                    Ok(7)
                }
            })
            .unwrap();
        assert_eq!(value, 7);

        calls.set(0);
        let err = engine
            .with_retries("test", || -> Result<()> {
                calls.set(calls.get() + 1);
                Err(Error::TransientStore("busy".into()))
            })
            .unwrap_err();
        assert!(err.is_retryable());
        assert_eq!(calls.get(), 3);

        calls.set(0);
        let err = engine
            .with_retries("test", || -> Result<()> {
                calls.set(calls.get() + 1);
                Err(ValidationError::EmptyWarId.into())
            })
            .unwrap_err();
        assert!(!err.is_retryable());
        assert_eq!(calls.get(), 1);
        assert_eq!(engine.metrics().transient_failures_total.get(), 5);
    }
}
