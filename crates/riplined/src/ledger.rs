//! Leveling ledger.
//!
//! Owns the per-user XP state machine and the append-only exp_log. Award
//! and revoke are transactional read-modify-write units: the progression
//! row and any log rows change together or not at all, so the log can
//! always reconstruct the total by summation.

use crate::notifier::ProgressionNotifier;
use crate::store::ProgressionStore;
use chrono::Utc;
use ripline_common::{curve, AwardResult, Contribution, ExpSource, RiplineError, UserProgression};
use rusqlite::{params, OptionalExtension, Transaction};
use std::sync::Arc;
use tracing::{debug, info};
use uuid::Uuid;

#[derive(Clone)]
pub struct LevelingLedger {
    store: ProgressionStore,
    notifier: Arc<dyn ProgressionNotifier>,
}

/// Consistency report comparing a user's total against the log sum.
#[derive(Debug, Clone, PartialEq)]
pub struct AuditReport {
    pub user_id: String,
    pub xp_total: i64,
    pub ledger_sum: i64,
    pub consistent: bool,
}

impl LevelingLedger {
    pub fn new(store: ProgressionStore, notifier: Arc<dyn ProgressionNotifier>) -> Self {
        Self { store, notifier }
    }

    /// Apply an XP delta to a user and return the resulting state.
    ///
    /// `amount` may be negative (revocation path). Positive awards append a
    /// log row and emit a notification; zero is a no-op that still returns a
    /// consistent snapshot; negative amounts adjust state silently.
    pub fn award(
        &self,
        user_id: &str,
        amount: i64,
        video_id: Option<&str>,
        contributions: &[Contribution],
        source: ExpSource,
        context: Option<&str>,
    ) -> Result<AwardResult, RiplineError> {
        let result = {
            let conn = self.store.lock();
            let tx = conn.unchecked_transaction()?;
            let result = apply_delta(&tx, user_id, amount)?;
            // Log the applied delta, not the requested amount: an award
            // clamped to nothing at the cap must not leave a zero row.
            if amount > 0 && result.awarded > 0 {
                append_log(&tx, user_id, video_id, result.awarded, contributions, source, context)?;
            }
            tx.commit()?;
            result
        };

        if amount > 0 && result.awarded > 0 {
            if result.leveled_up {
                self.notifier.leveled_up(user_id, &result);
            } else {
                self.notifier.xp_gained(user_id, &result);
            }
        }
        Ok(result)
    }

    /// Undo every ledger entry for `(user, video)`: apply the negated sum
    /// through the same state update (no log row, no notification), then
    /// delete the entries. Returns the revoked amount, 0 when there was
    /// nothing to revoke.
    pub fn revoke(&self, user_id: &str, video_id: &str) -> Result<i64, RiplineError> {
        let conn = self.store.lock();
        let tx = conn.unchecked_transaction()?;

        let refund: i64 = tx.query_row(
            "SELECT COALESCE(SUM(amount), 0) FROM exp_log WHERE user_id = ?1 AND video_id = ?2",
            params![user_id, video_id],
            |row| row.get(0),
        )?;
        if refund == 0 {
            debug!(user_id, video_id, "revoke: no ledger entries");
            return Ok(0);
        }

        apply_delta(&tx, user_id, -refund)?;
        let removed = tx.execute(
            "DELETE FROM exp_log WHERE user_id = ?1 AND video_id = ?2",
            params![user_id, video_id],
        )?;
        tx.commit()?;

        info!(user_id, video_id, refund, removed, "revoked video XP");
        Ok(refund)
    }

    /// Current progression row for a user; a zeroed row if never awarded.
    pub fn progression(&self, user_id: &str) -> Result<UserProgression, RiplineError> {
        let conn = self.store.lock();
        let row = conn
            .query_row(
                "SELECT xp_total, xp_current, level, updated_at
                 FROM user_progression WHERE user_id = ?1",
                params![user_id],
                |row| {
                    Ok((
                        row.get::<_, i64>(0)?,
                        row.get::<_, i64>(1)?,
                        row.get::<_, i64>(2)?,
                        row.get::<_, String>(3)?,
                    ))
                },
            )
            .optional()?;

        Ok(match row {
            Some((xp_total, xp_current, level, updated_at)) => UserProgression {
                user_id: user_id.to_string(),
                xp_total,
                xp_current,
                level: level as u32,
                updated_at: updated_at
                    .parse()
                    .map_err(|e| RiplineError::Internal(format!("bad timestamp: {e}")))?,
            },
            None => UserProgression {
                user_id: user_id.to_string(),
                xp_total: 0,
                xp_current: 0,
                level: 1,
                updated_at: Utc::now(),
            },
        })
    }

    /// All log entries for a user, newest first.
    pub fn entries(&self, user_id: &str) -> Result<Vec<ripline_common::ExpLogEntry>, RiplineError> {
        let conn = self.store.lock();
        let mut stmt = conn.prepare(
            "SELECT id, video_id, amount, source, contributions, context, created_at
             FROM exp_log WHERE user_id = ?1 ORDER BY created_at DESC, id DESC",
        )?;
        let rows = stmt.query_map(params![user_id], |row| {
            Ok((
                row.get::<_, String>(0)?,
                row.get::<_, Option<String>>(1)?,
                row.get::<_, i64>(2)?,
                row.get::<_, String>(3)?,
                row.get::<_, String>(4)?,
                row.get::<_, Option<String>>(5)?,
                row.get::<_, String>(6)?,
            ))
        })?;

        let mut entries = Vec::new();
        for row in rows {
            let (id, video_id, amount, source, contributions, context, created_at) = row?;
            entries.push(ripline_common::ExpLogEntry {
                id,
                user_id: user_id.to_string(),
                video_id,
                amount,
                source: source
                    .parse()
                    .map_err(|_| RiplineError::Internal(format!("bad exp source: {source}")))?,
                contributions: serde_json::from_str(&contributions)?,
                context,
                created_at: created_at
                    .parse()
                    .map_err(|e| RiplineError::Internal(format!("bad timestamp: {e}")))?,
            });
        }
        Ok(entries)
    }

    /// Recompute a user's total from the log and compare. Positive awards
    /// are the only logged events, so a user whose XP was clamped at the
    /// cap or revoked below a logged sum shows as inconsistent here and is
    /// surfaced for operator attention rather than auto-corrected.
    pub fn audit_user(&self, user_id: &str) -> Result<AuditReport, RiplineError> {
        let conn = self.store.lock();
        let ledger_sum: i64 = conn.query_row(
            "SELECT COALESCE(SUM(amount), 0) FROM exp_log WHERE user_id = ?1",
            params![user_id],
            |row| row.get(0),
        )?;
        let xp_total: i64 = conn
            .query_row(
                "SELECT xp_total FROM user_progression WHERE user_id = ?1",
                params![user_id],
                |row| row.get(0),
            )
            .optional()?
            .unwrap_or(0);
        Ok(AuditReport {
            user_id: user_id.to_string(),
            xp_total,
            ledger_sum,
            consistent: xp_total == ledger_sum,
        })
    }
}

/// Read-modify-write of the progression row inside an open transaction.
/// Level and current are always recomputed from the new total through the
/// curve; the returned `awarded` is the applied delta after clamping.
fn apply_delta(tx: &Transaction<'_>, user_id: &str, amount: i64) -> Result<AwardResult, RiplineError> {
    let old_total: i64 = tx
        .query_row(
            "SELECT xp_total FROM user_progression WHERE user_id = ?1",
            params![user_id],
            |row| row.get(0),
        )
        .optional()?
        .unwrap_or(0);

    let previous_level = curve::level_for_total(old_total);
    let new_total = curve::clamp_total(old_total + amount);
    let snap = curve::snapshot(new_total);

    if amount != 0 {
        tx.execute(
            "INSERT INTO user_progression (user_id, xp_total, xp_current, level, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5)
             ON CONFLICT(user_id) DO UPDATE SET
                 xp_total = excluded.xp_total,
                 xp_current = excluded.xp_current,
                 level = excluded.level,
                 updated_at = excluded.updated_at",
            params![
                user_id,
                new_total,
                snap.current,
                snap.level,
                Utc::now().to_rfc3339()
            ],
        )?;
    }

    Ok(AwardResult {
        awarded: new_total - old_total,
        total: new_total,
        current: snap.current,
        next: snap.next,
        remaining: snap.remaining,
        progress: snap.progress,
        level: snap.level,
        previous_level,
        leveled_up: snap.level > previous_level,
        level_ups: snap.level.saturating_sub(previous_level),
    })
}

fn append_log(
    tx: &Transaction<'_>,
    user_id: &str,
    video_id: Option<&str>,
    amount: i64,
    contributions: &[Contribution],
    source: ExpSource,
    context: Option<&str>,
) -> Result<(), RiplineError> {
    tx.execute(
        "INSERT INTO exp_log (id, user_id, video_id, amount, source, contributions, context, created_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
        params![
            Uuid::new_v4().to_string(),
            user_id,
            video_id,
            amount,
            source.as_str(),
            serde_json::to_string(contributions)?,
            context,
            Utc::now().to_rfc3339()
        ],
    )?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::notifier::NullNotifier;
    use tempfile::tempdir;

    fn test_ledger() -> (LevelingLedger, tempfile::TempDir) {
        let dir = tempdir().unwrap();
        let store = ProgressionStore::open(&dir.path().join("test.db")).unwrap();
        (LevelingLedger::new(store, Arc::new(NullNotifier)), dir)
    }

    fn contribution(xp: i64) -> Contribution {
        Contribution {
            label: "base_moves:boardslide".to_string(),
            display_name: "Boardslide".to_string(),
            xp,
        }
    }

    #[test]
    fn test_award_105_from_zero() {
        let (ledger, _dir) = test_ledger();
        let result = ledger
            .award("rider-1", 105, Some("vid-1"), &[contribution(105)], ExpSource::Video, None)
            .unwrap();
        assert_eq!(result.awarded, 105);
        assert_eq!(result.level, 1);
        assert_eq!(result.current, 105);
        assert_eq!(result.next, 200);
        assert!(!result.leveled_up);

        let entries = ledger.entries("rider-1").unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].amount, 105);
        assert_eq!(entries[0].video_id.as_deref(), Some("vid-1"));
    }

    #[test]
    fn test_zero_award_writes_nothing() {
        let (ledger, _dir) = test_ledger();
        let result = ledger
            .award("rider-1", 0, None, &[], ExpSource::Video, None)
            .unwrap();
        assert_eq!(result.awarded, 0);
        assert_eq!(result.total, 0);
        assert_eq!(result.level, 1);
        assert!(ledger.entries("rider-1").unwrap().is_empty());
        assert_eq!(ledger.progression("rider-1").unwrap().xp_total, 0);
    }

    #[test]
    fn test_level_up_detected() {
        let (ledger, _dir) = test_ledger();
        ledger
            .award("rider-1", 150, Some("vid-1"), &[contribution(150)], ExpSource::Video, None)
            .unwrap();
        let result = ledger
            .award("rider-1", 100, Some("vid-2"), &[contribution(100)], ExpSource::Video, None)
            .unwrap();
        assert_eq!(result.total, 250);
        assert_eq!(result.level, 2);
        assert_eq!(result.previous_level, 1);
        assert!(result.leveled_up);
        assert_eq!(result.level_ups, 1);
        assert_eq!(result.current, 50);
    }

    #[test]
    fn test_award_revoke_round_trip() {
        let (ledger, _dir) = test_ledger();
        ledger
            .award("rider-1", 300, Some("vid-keep"), &[contribution(300)], ExpSource::Video, None)
            .unwrap();
        ledger
            .award("rider-1", 250, Some("vid-gone"), &[contribution(250)], ExpSource::Video, None)
            .unwrap();

        let revoked = ledger.revoke("rider-1", "vid-gone").unwrap();
        assert_eq!(revoked, 250);

        let progression = ledger.progression("rider-1").unwrap();
        assert_eq!(progression.xp_total, 300);
        let entries = ledger.entries("rider-1").unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].video_id.as_deref(), Some("vid-keep"));
    }

    #[test]
    fn test_revoke_sums_multiple_entries() {
        let (ledger, _dir) = test_ledger();
        ledger
            .award("rider-1", 105, Some("vid-1"), &[contribution(105)], ExpSource::Video, None)
            .unwrap();
        ledger
            .award("rider-1", 75, Some("vid-1"), &[contribution(75)], ExpSource::QuestBonus, None)
            .unwrap();
        let revoked = ledger.revoke("rider-1", "vid-1").unwrap();
        assert_eq!(revoked, 180);
        assert_eq!(ledger.progression("rider-1").unwrap().xp_total, 0);
        assert!(ledger.entries("rider-1").unwrap().is_empty());
    }

    #[test]
    fn test_revoke_without_entries_is_noop() {
        let (ledger, _dir) = test_ledger();
        assert_eq!(ledger.revoke("rider-1", "vid-unknown").unwrap(), 0);
        assert_eq!(ledger.progression("rider-1").unwrap().xp_total, 0);
    }

    #[test]
    fn test_negative_total_clamped_to_zero() {
        let (ledger, _dir) = test_ledger();
        let result = ledger
            .award("rider-1", -500, None, &[], ExpSource::Admin, None)
            .unwrap();
        assert_eq!(result.total, 0);
        assert_eq!(result.awarded, 0);
        assert!(ledger.entries("rider-1").unwrap().is_empty());
    }

    #[test]
    fn test_total_clamped_at_cap() {
        let (ledger, _dir) = test_ledger();
        ledger
            .award(
                "rider-1",
                curve::XP_TOTAL_CAP,
                Some("vid-1"),
                &[contribution(curve::XP_TOTAL_CAP)],
                ExpSource::Admin,
                None,
            )
            .unwrap();
        let result = ledger
            .award("rider-1", 1_000, Some("vid-2"), &[contribution(1_000)], ExpSource::Video, None)
            .unwrap();
        assert_eq!(result.total, curve::XP_TOTAL_CAP);
        assert_eq!(result.awarded, 0);
        assert_eq!(result.level, curve::LEVEL_CAP);
        // The clamped-to-nothing award leaves no log row behind.
        assert_eq!(ledger.entries("rider-1").unwrap().len(), 1);
    }

    #[test]
    fn test_audit_consistent_after_awards() {
        let (ledger, _dir) = test_ledger();
        ledger
            .award("rider-1", 105, Some("vid-1"), &[contribution(105)], ExpSource::Video, None)
            .unwrap();
        ledger
            .award("rider-1", 95, Some("vid-2"), &[contribution(95)], ExpSource::Video, None)
            .unwrap();
        let report = ledger.audit_user("rider-1").unwrap();
        assert!(report.consistent);
        assert_eq!(report.ledger_sum, 200);
        assert_eq!(report.xp_total, 200);
    }
}
