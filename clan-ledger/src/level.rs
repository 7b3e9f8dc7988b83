//! Level derivation policy
//!
//! A clan's level is a pure function of its points. It is recomputed after
//! every balance change and never adjusted incrementally.

/// Minimum points for levels 1 through 10
pub const LEVEL_THRESHOLDS: [u64; 10] = [0, 200, 600, 1200, 2000, 3000, 4500, 6000, 8000, 10000];

/// Highest reachable level
pub const MAX_LEVEL: u8 = LEVEL_THRESHOLDS.len() as u8;

/// Level (1-10) for a points balance
pub fn level_for_points(points: u64) -> u8 {
    let reached = LEVEL_THRESHOLDS
        .iter()
        .take_while(|&&threshold| points >= threshold)
        .count();
    reached.max(1) as u8
}

/// Minimum points needed to hold `level`
pub fn level_floor(level: u8) -> Option<u64> {
    if level == 0 {
        return None;
    }
    LEVEL_THRESHOLDS.get(usize::from(level) - 1).copied()
}

/// Points missing until the next level, `None` at the top
pub fn points_to_next_level(points: u64) -> Option<u64> {
    let next = level_floor(level_for_points(points).checked_add(1)?)?;
    Some(next - points)
}
