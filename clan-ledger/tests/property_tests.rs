//! Property-based tests for ledger invariants
//!
//! - Level is monotone in points and always within 1..=10
//! - Clamped deltas never drive a balance below zero
//! - War counters stay internally consistent
//! - Rankings are totally ordered and densely numbered
//! - Any edit to a sealed history breaks the chain

use std::collections::HashMap;

use chrono::Utc;
use clan_ledger::{
    audit,
    level::{level_floor, points_to_next_level, MAX_LEVEL},
    level_for_points,
    ranking::rank_clans,
    stats::WarResult,
    ClanId, ClanRecord, LedgerReason, PointsLedgerEntry, WarId, WarStats,
};
use proptest::prelude::*;
use rust_decimal::Decimal;
use uuid::Uuid;

/// Strategy for generating war results
fn war_result_strategy() -> impl Strategy<Value = WarResult> {
    prop_oneof![
        Just(WarResult::Win),
        Just(WarResult::Loss),
        Just(WarResult::Draw),
    ]
}

/// Seal a run of changes into a chained history
fn sealed_history(start: u64, changes: &[i64]) -> Vec<PointsLedgerEntry> {
    let mut clan = ClanRecord::new(ClanId(1), 10, start);
    let mut entries = Vec::new();
    for (i, change) in changes.iter().enumerate() {
        let before = clan.total_points;
        let applied = clan.apply_delta(*change);
        let mut entry = PointsLedgerEntry {
            entry_id: Uuid::now_v7(),
            clan_id: clan.clan_id,
            sequence: i as u64 + 1,
            war_id: WarId::new(format!("adj-{}", i)),
            opponent_clan_id: None,
            points_change: applied,
            points_before: before,
            points_after: clan.total_points,
            reason: LedgerReason::Adjustment,
            note: None,
            created_at: Utc::now(),
            prev_hash: audit::GENESIS_HASH,
            entry_hash: audit::GENESIS_HASH,
        };
        audit::seal(&mut entry, clan.last_entry_hash);
        clan.last_entry_hash = entry.entry_hash;
        entries.push(entry);
    }
    entries
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(500))]

    /// Property: more points never means a lower level
    #[test]
    fn prop_level_monotone(a in any::<u64>(), b in any::<u64>()) {
        let (low, high) = if a <= b { (a, b) } else { (b, a) };
        prop_assert!(level_for_points(low) <= level_for_points(high));
        prop_assert!((1..=MAX_LEVEL).contains(&level_for_points(a)));
    }

    /// Property: a level's floor is reachable and the next level is exactly that far away
    #[test]
    fn prop_next_level_distance(points in 0u64..20_000) {
        let level = level_for_points(points);
        prop_assert!(level_floor(level).unwrap() <= points);
        match points_to_next_level(points) {
            Some(missing) => {
                prop_assert!(missing > 0);
                prop_assert_eq!(level_for_points(points + missing), level + 1);
                prop_assert_eq!(level_for_points(points + missing - 1), level);
            }
            None => prop_assert_eq!(level, MAX_LEVEL),
        }
    }

    /// Property: applying a delta clamps at zero and reports what was applied
    #[test]
    fn prop_apply_delta_clamps(start in 0u64..100_000, delta in -200_000i64..200_000) {
        let mut clan = ClanRecord::new(ClanId(7), 10, start);
        let applied = clan.apply_delta(delta);

        prop_assert_eq!(i128::from(clan.total_points), (i128::from(start) + i128::from(delta)).max(0));
        prop_assert_eq!(i128::from(start) + i128::from(applied), i128::from(clan.total_points));
        prop_assert_eq!(clan.level, level_for_points(clan.total_points));
        if delta >= 0 {
            prop_assert_eq!(applied, delta);
        } else {
            prop_assert!(applied <= 0 && applied >= delta);
        }
    }

    /// Property: war counters add up after any sequence of results
    #[test]
    fn prop_stats_consistent(results in prop::collection::vec(war_result_strategy(), 0..60)) {
        let mut stats = WarStats::new(ClanId(3));
        let mut longest_run = 0i64;
        let mut run = 0i64;
        for result in &results {
            stats.record(*result, Utc::now());
            match result {
                WarResult::Win => run += 1,
                WarResult::Loss => run = 0,
                WarResult::Draw => {}
            }
            longest_run = longest_run.max(run);
        }

        prop_assert_eq!(stats.total_wars, results.len() as u64);
        prop_assert_eq!(stats.wars_won + stats.wars_lost + stats.wars_drawn, stats.total_wars);
        prop_assert_eq!(stats.current_streak, run);
        prop_assert_eq!(stats.best_streak, longest_run);
        prop_assert!(stats.win_rate >= Decimal::ZERO);
        prop_assert!(stats.win_rate <= Decimal::ONE_HUNDRED);
        prop_assert!(stats.win_rate.scale() <= 2);
    }

    /// Property: rankings follow points, then win rate, then clan id, ranked 1..n
    #[test]
    fn prop_rankings_ordered(
        clans in prop::collection::vec((0u64..3_000, prop::collection::vec(war_result_strategy(), 0..6)), 0..20),
        limit in 0usize..25,
    ) {
        let mut records = Vec::new();
        let mut stats = HashMap::new();
        for (i, (points, results)) in clans.iter().enumerate() {
            let id = ClanId(i as u64 + 1);
            records.push(ClanRecord::new(id, 10, *points));
            let mut row = WarStats::new(id);
            for result in results {
                row.record(*result, Utc::now());
            }
            stats.insert(id, row);
        }

        let ranked = rank_clans(records, &stats, limit);
        prop_assert_eq!(ranked.len(), clans.len().min(limit));
        for (i, entry) in ranked.iter().enumerate() {
            prop_assert_eq!(entry.rank as usize, i + 1);
        }
        for pair in ranked.windows(2) {
            let key = |e: &clan_ledger::RankingEntry| (std::cmp::Reverse(e.total_points), std::cmp::Reverse(e.win_rate), e.clan_id);
            prop_assert!(key(&pair[0]) < key(&pair[1]));
        }
    }

    /// Property: tampering with any entry is detected
    #[test]
    fn prop_chain_detects_tampering(
        changes in prop::collection::vec(-500i64..500, 1..15),
        victim in any::<prop::sample::Index>(),
        bump in 1i64..100,
    ) {
        let mut entries = sealed_history(1_000, &changes);
        prop_assert!(audit::verify_chain(&entries));

        let index = victim.index(entries.len());
        entries[index].points_change += bump;
        prop_assert!(!audit::verify_chain(&entries));
    }
}
