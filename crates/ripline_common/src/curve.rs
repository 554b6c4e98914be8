//! Growth curve for the main leveling ledger.
//!
//! Levels 1..=99 with geometric requirements, except the last level which is
//! widened so the cumulative sum lands exactly on `XP_TOTAL_CAP`. The table
//! is built once and is the single source of truth for level, current,
//! next, remaining, and progress. Nothing else may derive level from XP.

use crate::types::XpSnapshot;
use once_cell::sync::Lazy;

pub const LEVEL_CAP: u32 = 99;
pub const GROWTH_BASE: f64 = 200.0;
pub const GROWTH_FACTOR: f64 = 1.10;
pub const XP_TOTAL_CAP: i64 = 25_100_000;

struct CurveTable {
    /// XP required to clear each level. Index 0 unused.
    requirement: [i64; (LEVEL_CAP + 1) as usize],
    /// Total XP at which each level starts. Index 0 unused.
    cumulative: [i64; (LEVEL_CAP + 1) as usize],
}

static TABLE: Lazy<CurveTable> = Lazy::new(build_table);

fn build_table() -> CurveTable {
    let mut requirement = [0i64; (LEVEL_CAP + 1) as usize];
    let mut cumulative = [0i64; (LEVEL_CAP + 1) as usize];
    let mut sum = 0i64;
    for level in 1..=LEVEL_CAP as usize {
        cumulative[level] = sum;
        requirement[level] = if level == LEVEL_CAP as usize {
            // Widen the final level so the curve closes exactly on the cap.
            XP_TOTAL_CAP - sum
        } else {
            (GROWTH_BASE * GROWTH_FACTOR.powi(level as i32 - 1)).round() as i64
        };
        sum += requirement[level];
    }
    CurveTable {
        requirement,
        cumulative,
    }
}

/// XP required to clear `level`. Levels outside 1..=99 are clamped.
pub fn requirement(level: u32) -> i64 {
    TABLE.requirement[level.clamp(1, LEVEL_CAP) as usize]
}

/// Total XP at which `level` starts. Levels outside 1..=99 are clamped.
pub fn cumulative(level: u32) -> i64 {
    TABLE.cumulative[level.clamp(1, LEVEL_CAP) as usize]
}

/// Clamp a raw total into the valid XP range.
pub fn clamp_total(total: i64) -> i64 {
    total.clamp(0, XP_TOTAL_CAP)
}

/// The largest level whose cumulative start is at or below `total`,
/// capped at `LEVEL_CAP`.
pub fn level_for_total(total: i64) -> u32 {
    let total = clamp_total(total);
    let mut level = 1;
    while level < LEVEL_CAP && TABLE.cumulative[(level + 1) as usize] <= total {
        level += 1;
    }
    level
}

/// Derive the full display state for a total XP value.
pub fn snapshot(total: i64) -> XpSnapshot {
    let total = clamp_total(total);
    let level = level_for_total(total);
    let current = total - cumulative(level);
    let (next, remaining, progress) = if level >= LEVEL_CAP {
        (0, 0, 1.0)
    } else {
        let next = requirement(level);
        let remaining = next - current;
        (next, remaining, current as f64 / next as f64)
    };
    XpSnapshot {
        level,
        current,
        next,
        remaining,
        progress,
        cap: XP_TOTAL_CAP,
        max_level: LEVEL_CAP,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_requirement_head_of_curve() {
        assert_eq!(requirement(1), 200);
        assert_eq!(requirement(2), 220);
        assert_eq!(requirement(3), 242);
        assert_eq!(requirement(4), 266);
        assert_eq!(requirement(5), 293);
    }

    #[test]
    fn test_final_level_widened_to_close_cap() {
        assert_eq!(cumulative(LEVEL_CAP), 22_775_875);
        assert_eq!(requirement(LEVEL_CAP), 2_324_125);
        assert_eq!(cumulative(LEVEL_CAP) + requirement(LEVEL_CAP), XP_TOTAL_CAP);
        // Wider than the natural geometric value.
        let natural = (GROWTH_BASE * GROWTH_FACTOR.powi(LEVEL_CAP as i32 - 1)).round() as i64;
        assert!(requirement(LEVEL_CAP) > natural);
    }

    #[test]
    fn test_cumulative_adjacency() {
        for level in 1..LEVEL_CAP {
            assert_eq!(
                cumulative(level) + requirement(level),
                cumulative(level + 1),
                "adjacency broken at level {level}"
            );
        }
    }

    #[test]
    fn test_level_monotone_over_domain() {
        let mut previous = 0;
        let mut total = 0i64;
        while total <= XP_TOTAL_CAP {
            let snap = snapshot(total);
            assert!(snap.level >= previous, "level regressed at total {total}");
            if snap.level < LEVEL_CAP {
                assert!(snap.current <= snap.next, "current > next at total {total}");
                assert!(snap.current >= 0);
            }
            previous = snap.level;
            total += 104_729; // large prime stride keeps the scan cheap
        }
    }

    #[test]
    fn test_snapshot_concrete_values() {
        let snap = snapshot(105);
        assert_eq!(snap.level, 1);
        assert_eq!(snap.current, 105);
        assert_eq!(snap.next, 200);
        assert_eq!(snap.remaining, 95);
        assert_relative_eq!(snap.progress, 105.0 / 200.0);

        let snap = snapshot(200);
        assert_eq!(snap.level, 2);
        assert_eq!(snap.current, 0);

        let snap = snapshot(419);
        assert_eq!(snap.level, 2);
        assert_eq!(snap.current, 219);

        let snap = snapshot(420);
        assert_eq!(snap.level, 3);
        assert_eq!(snap.current, 0);
    }

    #[test]
    fn test_snapshot_at_cap() {
        let snap = snapshot(XP_TOTAL_CAP);
        assert_eq!(snap.level, LEVEL_CAP);
        assert_eq!(snap.next, 0);
        assert_eq!(snap.remaining, 0);
        assert_relative_eq!(snap.progress, 1.0);
        assert_eq!(snap.current, requirement(LEVEL_CAP));
    }

    #[test]
    fn test_totals_clamped() {
        assert_eq!(snapshot(-50).level, 1);
        assert_eq!(snapshot(-50).current, 0);
        assert_eq!(snapshot(XP_TOTAL_CAP + 1_000).level, LEVEL_CAP);
        assert_eq!(clamp_total(XP_TOTAL_CAP + 1), XP_TOTAL_CAP);
    }
}
