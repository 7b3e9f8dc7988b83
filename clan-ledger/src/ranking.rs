//! Leaderboard projection
//!
//! Joins clan rows with their war stats from a single snapshot, so a
//! ranking reflects either all or none of any settlement.

use std::collections::HashMap;
use std::sync::Arc;

use crate::config::RankingConfig;
use crate::types::{ClanId, ClanRecord, RankingEntry, WarStats};
use crate::{Result, Storage};

/// Read-only ranking service
#[derive(Debug, Clone)]
pub struct RankingQuery {
    storage: Arc<Storage>,
    config: RankingConfig,
}

impl RankingQuery {
    /// Create a ranking service over shared storage
    pub fn new(storage: Arc<Storage>, config: RankingConfig) -> Self {
        Self { storage, config }
    }

    /// Top `limit` eligible clans by points, then win rate.
    ///
    /// `limit` is capped at `ranking.max_limit`; zero yields an empty list.
    pub fn get_rankings(&self, limit: usize) -> Result<Vec<RankingEntry>> {
        if limit > self.config.max_limit {
            tracing::warn!(
                requested = limit,
                max_limit = self.config.max_limit,
                "Ranking limit above max_limit, capping"
            );
        }
        let limit = limit.min(self.config.max_limit);
        if limit == 0 {
            return Ok(Vec::new());
        }

        let snapshot = self.storage.snapshot()?;
        let clans = snapshot.all_clans()?;

        let mut stats = HashMap::with_capacity(clans.len());
        for clan in clans.iter().filter(|c| self.is_eligible(c)) {
            if let Some(row) = snapshot.get_war_stats(clan.clan_id)? {
                stats.insert(clan.clan_id, row);
            }
        }

        let ranked = rank_clans(
            clans.into_iter().filter(|c| self.is_eligible(c)).collect(),
            &stats,
            limit,
        );

        tracing::debug!(requested = limit, returned = ranked.len(), "Rankings computed");

        Ok(ranked)
    }

    /// Rankings with the configured default limit
    pub fn get_default_rankings(&self) -> Result<Vec<RankingEntry>> {
        self.get_rankings(self.config.default_limit)
    }

    fn is_eligible(&self, clan: &ClanRecord) -> bool {
        clan.active && clan.member_count >= self.config.min_member_count
    }
}

/// Order clans for display: points desc, win rate desc, clan id asc.
///
/// Clans without a stats row rank as if they had never fought.
pub fn rank_clans(
    clans: Vec<ClanRecord>,
    stats: &HashMap<ClanId, WarStats>,
    limit: usize,
) -> Vec<RankingEntry> {
    let mut rows: Vec<(ClanRecord, WarStats)> = clans
        .into_iter()
        .map(|clan| {
            let row = stats
                .get(&clan.clan_id)
                .cloned()
                .unwrap_or_else(|| WarStats::new(clan.clan_id));
            (clan, row)
        })
        .collect();

    rows.sort_by(|(a, a_stats), (b, b_stats)| {
        b.total_points
            .cmp(&a.total_points)
            .then_with(|| b_stats.win_rate.cmp(&a_stats.win_rate))
            .then_with(|| a.clan_id.cmp(&b.clan_id))
    });

    rows.into_iter()
        .take(limit)
        .enumerate()
        .map(|(index, (clan, row))| RankingEntry {
            rank: index as u32 + 1,
            clan_id: clan.clan_id,
            total_points: clan.total_points,
            level: clan.level,
            member_count: clan.member_count,
            win_rate: row.win_rate,
            current_streak: row.current_streak,
            best_streak: row.best_streak,
            total_wars: row.total_wars,
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stats::WarResult;
    use crate::Config;
    use chrono::Utc;

    fn clan(id: u64, points: u64) -> ClanRecord {
        ClanRecord::new(ClanId(id), 5, points)
    }

    fn stats_with(id: u64, results: &[WarResult]) -> WarStats {
        let mut stats = WarStats::new(ClanId(id));
        for result in results {
            stats.record(*result, Utc::now());
        }
        stats
    }

    #[test]
    fn test_orders_by_points_then_win_rate() {
        use WarResult::*;
        let clans = vec![clan(1, 500), clan(2, 900), clan(3, 500), clan(4, 500)];
        let mut stats = HashMap::new();
        stats.insert(ClanId(1), stats_with(1, &[Win, Loss]));
        stats.insert(ClanId(3), stats_with(3, &[Win, Win]));

        let ranked = rank_clans(clans, &stats, 10);
        let order: Vec<u64> = ranked.iter().map(|r| r.clan_id.0).collect();
        assert_eq!(order, vec![2, 3, 1, 4]);
        assert_eq!(ranked[0].rank, 1);
        assert_eq!(ranked[3].rank, 4);
        assert_eq!(ranked[3].total_wars, 0);
    }

    #[test]
    fn test_full_tie_falls_back_to_clan_id() {
        let ranked = rank_clans(vec![clan(9, 100), clan(4, 100)], &HashMap::new(), 10);
        assert_eq!(ranked[0].clan_id, ClanId(4));
    }

    #[test]
    fn test_limit_truncates() {
        let clans = (1..=10).map(|i| clan(i, i * 100)).collect();
        let ranked = rank_clans(clans, &HashMap::new(), 3);
        assert_eq!(ranked.len(), 3);
        assert_eq!(ranked[0].clan_id, ClanId(10));
    }

    #[test]
    fn test_query_filters_ineligible_clans() {
        let temp_dir = tempfile::tempdir().unwrap();
        let mut config = Config::default();
        config.data_dir = temp_dir.path().to_path_buf();
        config.rocksdb.sync_writes = false;
        config.ranking.min_member_count = 3;

        let storage = Arc::new(Storage::open(&config).unwrap());
        storage.register_clan(ClanRecord::new(ClanId(1), 10, 700)).unwrap();
        storage.register_clan(ClanRecord::new(ClanId(2), 2, 5000)).unwrap();
        storage.register_clan(ClanRecord::new(ClanId(3), 10, 9000)).unwrap();
        storage
            .update_clan_profile(ClanId(3), |c| c.active = false)
            .unwrap();

        let query = RankingQuery::new(storage, config.ranking.clone());
        let ranked = query.get_rankings(10).unwrap();
        assert_eq!(ranked.len(), 1);
        assert_eq!(ranked[0].clan_id, ClanId(1));
        assert_eq!(ranked[0].level, 3);

        assert!(query.get_rankings(0).unwrap().is_empty());
    }

    #[test]
    fn test_query_caps_limit_at_max_limit() {
        let temp_dir = tempfile::tempdir().unwrap();
        let mut config = Config::default();
        config.data_dir = temp_dir.path().to_path_buf();
        config.rocksdb.sync_writes = false;
        config.ranking.max_limit = 2;

        let storage = Arc::new(Storage::open(&config).unwrap());
        for id in 1..=5 {
            storage.register_clan(ClanRecord::new(ClanId(id), 10, id * 100)).unwrap();
        }

        let query = RankingQuery::new(storage, config.ranking.clone());
        let ranked = query.get_rankings(10).unwrap();
        assert_eq!(ranked.len(), 2);
        assert_eq!(ranked[0].clan_id, ClanId(5));
        assert_eq!(ranked[1].clan_id, ClanId(4));
    }
}
