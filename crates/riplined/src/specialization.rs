//! Specialization progression.
//!
//! A narrower leveling system per user per track (slider/kicker/surface)
//! with authored thresholds and a level multiplier applied to each award.
//! Which track to award, and whether to award at all, is the caller's
//! decision. Totals are monotonic: there is no revoke path here.

use crate::store::ProgressionStore;
use ripline_common::{
    tracks, LeaderboardEntry, RiplineError, Specialization, SpecializationResult,
    SpecializationTrack,
};
use rusqlite::params;
use tracing::debug;

#[derive(Clone)]
pub struct SpecializationProgression {
    store: ProgressionStore,
}

impl SpecializationProgression {
    pub fn new(store: ProgressionStore) -> Self {
        Self { store }
    }

    /// Award base XP to one track, applying the current level's multiplier.
    /// All three tracks are initialized at level 1 on a user's first touch.
    pub fn award(
        &self,
        user_id: &str,
        track: SpecializationTrack,
        base_xp: i64,
        trick_id: Option<&str>,
    ) -> Result<SpecializationResult, RiplineError> {
        let conn = self.store.lock();
        let tx = conn.unchecked_transaction()?;

        for t in SpecializationTrack::ALL {
            tx.execute(
                "INSERT OR IGNORE INTO specializations (user_id, track) VALUES (?1, ?2)",
                params![user_id, t.as_str()],
            )?;
        }

        let (level, xp_total, tricks_completed, best_trick_xp): (i64, i64, i64, i64) = tx
            .query_row(
                "SELECT level, xp_total, tricks_completed, best_trick_xp
                 FROM specializations WHERE user_id = ?1 AND track = ?2",
                params![user_id, track.as_str()],
                |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?, row.get(3)?)),
            )?;

        let previous_level = level as u32;
        let multiplier = tracks::multiplier_for(previous_level);
        let awarded = tracks::apply_multiplier(base_xp, previous_level);
        let new_total = xp_total + awarded;
        let new_level = tracks::track_level(new_total);
        let new_current = tracks::track_current(new_total);
        let new_best = awarded > best_trick_xp;

        if new_best {
            tx.execute(
                "UPDATE specializations SET level = ?1, xp_total = ?2, xp_current = ?3,
                     tricks_completed = tricks_completed + 1,
                     best_trick_id = ?4, best_trick_xp = ?5
                 WHERE user_id = ?6 AND track = ?7",
                params![
                    new_level,
                    new_total,
                    new_current,
                    trick_id,
                    awarded,
                    user_id,
                    track.as_str()
                ],
            )?;
        } else {
            tx.execute(
                "UPDATE specializations SET level = ?1, xp_total = ?2, xp_current = ?3,
                     tricks_completed = tricks_completed + 1
                 WHERE user_id = ?4 AND track = ?5",
                params![new_level, new_total, new_current, user_id, track.as_str()],
            )?;
        }
        tx.commit()?;

        debug!(
            user_id,
            track = %track,
            awarded,
            total = new_total,
            level = new_level,
            "specialization award"
        );

        Ok(SpecializationResult {
            track,
            awarded,
            multiplier,
            xp_total: new_total,
            level: new_level,
            previous_level,
            leveled_up: new_level > previous_level,
            tricks_completed: tricks_completed as u32 + 1,
            new_best,
        })
    }

    /// All three track rows for a user, track order. Empty if the user has
    /// never been awarded.
    pub fn for_user(&self, user_id: &str) -> Result<Vec<Specialization>, RiplineError> {
        let conn = self.store.lock();
        let mut stmt = conn.prepare(
            "SELECT track, level, xp_total, xp_current, tricks_completed,
                    best_trick_id, best_trick_xp
             FROM specializations WHERE user_id = ?1",
        )?;
        let rows = stmt.query_map(params![user_id], |row| {
            Ok((
                row.get::<_, String>(0)?,
                row.get::<_, i64>(1)?,
                row.get::<_, i64>(2)?,
                row.get::<_, i64>(3)?,
                row.get::<_, i64>(4)?,
                row.get::<_, Option<String>>(5)?,
                row.get::<_, i64>(6)?,
            ))
        })?;

        let mut specializations = Vec::new();
        for row in rows {
            let (track, level, xp_total, xp_current, tricks, best_id, best_xp) = row?;
            specializations.push(Specialization {
                user_id: user_id.to_string(),
                track: track.parse()?,
                level: level as u32,
                xp_total,
                xp_current,
                tricks_completed: tricks as u32,
                best_trick_id: best_id,
                best_trick_xp: best_xp,
            });
        }
        specializations.sort_by_key(|s| {
            SpecializationTrack::ALL
                .iter()
                .position(|t| *t == s.track)
                .unwrap_or(usize::MAX)
        });
        Ok(specializations)
    }

    /// Top users on one track, ranked by total XP then user id.
    pub fn leaderboard(
        &self,
        track: SpecializationTrack,
        limit: usize,
    ) -> Result<Vec<LeaderboardEntry>, RiplineError> {
        let conn = self.store.lock();
        let mut stmt = conn.prepare(
            "SELECT user_id, level, xp_total, best_trick_id, best_trick_xp
             FROM specializations WHERE track = ?1
             ORDER BY xp_total DESC, user_id ASC LIMIT ?2",
        )?;
        let rows = stmt.query_map(params![track.as_str(), limit as i64], |row| {
            Ok((
                row.get::<_, String>(0)?,
                row.get::<_, i64>(1)?,
                row.get::<_, i64>(2)?,
                row.get::<_, Option<String>>(3)?,
                row.get::<_, i64>(4)?,
            ))
        })?;

        let mut entries = Vec::new();
        for (index, row) in rows.enumerate() {
            let (user_id, level, xp_total, best_trick_id, best_trick_xp) = row?;
            entries.push(LeaderboardEntry {
                rank: index as u32 + 1,
                user_id,
                level: level as u32,
                xp_total,
                best_trick_id,
                best_trick_xp,
            });
        }
        Ok(entries)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn test_progression() -> (SpecializationProgression, tempfile::TempDir) {
        let dir = tempdir().unwrap();
        let store = ProgressionStore::open(&dir.path().join("test.db")).unwrap();
        (SpecializationProgression::new(store), dir)
    }

    #[test]
    fn test_first_award_initializes_all_tracks() {
        let (progression, _dir) = test_progression();
        let result = progression
            .award("rider-1", SpecializationTrack::Slider, 100, Some("boardslide"))
            .unwrap();
        assert_eq!(result.awarded, 100); // level 1 multiplier is 1.0
        assert_eq!(result.multiplier, 1.0);
        assert_eq!(result.tricks_completed, 1);
        assert!(result.new_best);

        let rows = progression.for_user("rider-1").unwrap();
        assert_eq!(rows.len(), 3);
        assert_eq!(rows[0].track, SpecializationTrack::Slider);
        assert_eq!(rows[0].xp_total, 100);
        assert_eq!(rows[1].xp_total, 0);
        assert_eq!(rows[2].xp_total, 0);
    }

    #[test]
    fn test_level_up_at_threshold() {
        let (progression, _dir) = test_progression();
        progression
            .award("rider-1", SpecializationTrack::Kicker, 400, Some("fs180"))
            .unwrap();
        let result = progression
            .award("rider-1", SpecializationTrack::Kicker, 100, Some("bs180"))
            .unwrap();
        assert_eq!(result.xp_total, 500);
        assert_eq!(result.level, 2);
        assert!(result.leveled_up);
    }

    #[test]
    fn test_multiplier_applied_above_level_one() {
        let (progression, _dir) = test_progression();
        // Reach level 2 (threshold 500), then verify the 1.03 multiplier.
        progression
            .award("rider-1", SpecializationTrack::Surface, 500, Some("surface_180"))
            .unwrap();
        let result = progression
            .award("rider-1", SpecializationTrack::Surface, 100, Some("butter_press"))
            .unwrap();
        assert_eq!(result.previous_level, 2);
        assert_eq!(result.multiplier, 1.03);
        assert_eq!(result.awarded, 103);
        assert_eq!(result.xp_total, 603);
    }

    #[test]
    fn test_best_trick_only_improves() {
        let (progression, _dir) = test_progression();
        progression
            .award("rider-1", SpecializationTrack::Slider, 200, Some("lipslide"))
            .unwrap();
        let result = progression
            .award("rider-1", SpecializationTrack::Slider, 150, Some("fifty_fifty"))
            .unwrap();
        assert!(!result.new_best);

        let rows = progression.for_user("rider-1").unwrap();
        assert_eq!(rows[0].best_trick_id.as_deref(), Some("lipslide"));
        assert_eq!(rows[0].best_trick_xp, 200);
        assert_eq!(rows[0].tricks_completed, 2);
    }

    #[test]
    fn test_leaderboard_ranked_and_tie_broken() {
        let (progression, _dir) = test_progression();
        progression
            .award("rider-b", SpecializationTrack::Slider, 300, None)
            .unwrap();
        progression
            .award("rider-a", SpecializationTrack::Slider, 300, None)
            .unwrap();
        progression
            .award("rider-c", SpecializationTrack::Slider, 500, None)
            .unwrap();

        let board = progression
            .leaderboard(SpecializationTrack::Slider, 10)
            .unwrap();
        assert_eq!(board.len(), 3);
        assert_eq!(board[0].user_id, "rider-c");
        assert_eq!(board[0].rank, 1);
        assert_eq!(board[1].user_id, "rider-a");
        assert_eq!(board[2].user_id, "rider-b");
    }

    #[test]
    fn test_leaderboard_respects_limit() {
        let (progression, _dir) = test_progression();
        for user in ["a", "b", "c", "d"] {
            progression
                .award(user, SpecializationTrack::Kicker, 100, None)
                .unwrap();
        }
        let board = progression
            .leaderboard(SpecializationTrack::Kicker, 2)
            .unwrap();
        assert_eq!(board.len(), 2);
    }
}
