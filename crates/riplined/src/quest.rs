//! Quest graph engine.
//!
//! Quest nodes form a shallow DAG; merge nodes carry exactly two named
//! parents, both of which must be satisfied before the node is available.
//! Per-(user, node) state is derived from the stored attempt history, never
//! stored itself. Recording a completion on a locked node is permitted
//! (video publication must not be blocked) but the bonus is withheld until
//! prerequisites are satisfied and reconciled.

use crate::ledger::LevelingLedger;
use crate::store::ProgressionStore;
use chrono::{DateTime, Utc};
use ripline_common::{
    Contribution, ExpSource, QuestCompletion, QuestCompletionOutcome, QuestCompletionStatus,
    QuestEvolution, QuestNode, QuestNodeState, RiplineError, SuggestedRetry,
};
use rusqlite::{params, OptionalExtension, Row};
use std::collections::HashMap;
use tracing::{debug, warn};

#[derive(Clone)]
pub struct QuestGraph {
    store: ProgressionStore,
    ledger: LevelingLedger,
}

impl QuestGraph {
    pub fn new(store: ProgressionStore, ledger: LevelingLedger) -> Self {
        Self { store, ledger }
    }

    /// Insert or replace a node definition. Used by seeding and admin
    /// tooling; run [`QuestGraph::validate_graph`] afterwards.
    pub fn insert_node(&self, node: &QuestNode) -> Result<(), RiplineError> {
        let conn = self.store.lock();
        conn.execute(
            "INSERT OR REPLACE INTO quest_nodes
                 (id, specialization, tier, position, branch_type, display_row,
                  prerequisites, merge_left, merge_right, required_for_unlock,
                  xp_bonus, repeatable, is_shared_node)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13)",
            params![
                node.id,
                node.specialization.as_str(),
                node.tier,
                node.position,
                node.branch_type.as_str(),
                node.display_row,
                serde_json::to_string(&node.prerequisites)?,
                node.merge_left,
                node.merge_right,
                node.required_for_unlock,
                node.xp_bonus,
                node.repeatable,
                node.is_shared_node
            ],
        )?;
        Ok(())
    }

    pub fn node(&self, node_id: &str) -> Result<QuestNode, RiplineError> {
        let conn = self.store.lock();
        conn.query_row(
            &format!("{NODE_SELECT} WHERE id = ?1"),
            params![node_id],
            node_from_row,
        )
        .optional()?
        .ok_or_else(|| RiplineError::UnknownQuest(node_id.to_string()))
    }

    pub fn all_nodes(&self) -> Result<Vec<QuestNode>, RiplineError> {
        let conn = self.store.lock();
        let mut stmt = conn.prepare(&format!("{NODE_SELECT} ORDER BY tier, position, id"))?;
        let rows = stmt.query_map(params![], node_from_row)?;
        let mut nodes = Vec::new();
        for row in rows {
            nodes.push(row?);
        }
        Ok(nodes)
    }

    /// Structural validation of the whole graph: merge nodes carry exactly
    /// their two parents as prerequisites, every prerequisite resolves, and
    /// the graph is acyclic.
    pub fn validate_graph(&self) -> Result<(), RiplineError> {
        let nodes = self.all_nodes()?;
        let by_id: HashMap<&str, &QuestNode> =
            nodes.iter().map(|node| (node.id.as_str(), node)).collect();

        for node in &nodes {
            if node.branch_type == ripline_common::BranchType::Merge {
                let (left, right) = match (&node.merge_left, &node.merge_right) {
                    (Some(left), Some(right)) => (left, right),
                    _ => {
                        return Err(RiplineError::InvalidGraph(format!(
                            "merge node {} is missing a parent",
                            node.id
                        )))
                    }
                };
                let mut expected = vec![left.clone(), right.clone()];
                expected.sort();
                let mut actual = node.prerequisites.clone();
                actual.sort();
                if expected != actual {
                    return Err(RiplineError::InvalidGraph(format!(
                        "merge node {} prerequisites must equal its two parents",
                        node.id
                    )));
                }
            } else if node.merge_left.is_some() || node.merge_right.is_some() {
                return Err(RiplineError::InvalidGraph(format!(
                    "non-merge node {} carries merge parents",
                    node.id
                )));
            }

            for prerequisite in &node.prerequisites {
                if !by_id.contains_key(prerequisite.as_str()) {
                    return Err(RiplineError::InvalidGraph(format!(
                        "node {} requires unknown node {}",
                        node.id, prerequisite
                    )));
                }
            }
        }

        // Cycle check: DFS with tri-state coloring.
        #[derive(Clone, Copy, PartialEq)]
        enum Color {
            White,
            Grey,
            Black,
        }
        fn visit(
            id: &str,
            by_id: &HashMap<&str, &QuestNode>,
            colors: &mut HashMap<String, Color>,
        ) -> Result<(), RiplineError> {
            match colors.get(id).copied().unwrap_or(Color::White) {
                Color::Black => return Ok(()),
                Color::Grey => {
                    return Err(RiplineError::InvalidGraph(format!(
                        "quest graph contains a cycle through {id}"
                    )))
                }
                Color::White => {}
            }
            colors.insert(id.to_string(), Color::Grey);
            if let Some(node) = by_id.get(id) {
                for prerequisite in &node.prerequisites {
                    visit(prerequisite, by_id, colors)?;
                }
            }
            colors.insert(id.to_string(), Color::Black);
            Ok(())
        }
        let mut colors = HashMap::new();
        for node in &nodes {
            visit(&node.id, &by_id, &mut colors)?;
        }

        debug!(nodes = nodes.len(), "quest graph validated");
        Ok(())
    }

    fn has_completion(&self, user_id: &str, node_id: &str) -> Result<bool, RiplineError> {
        let conn = self.store.lock();
        let count: i64 = conn.query_row(
            "SELECT COUNT(*) FROM quest_completions WHERE user_id = ?1 AND node_id = ?2",
            params![user_id, node_id],
            |row| row.get(0),
        )?;
        Ok(count > 0)
    }

    fn bonus_ever_granted(&self, user_id: &str, node_id: &str) -> Result<bool, RiplineError> {
        let conn = self.store.lock();
        let count: i64 = conn.query_row(
            "SELECT COUNT(*) FROM quest_completions
             WHERE user_id = ?1 AND node_id = ?2 AND bonus_awarded > 0",
            params![user_id, node_id],
            |row| row.get(0),
        )?;
        Ok(count > 0)
    }

    /// Availability derivation: no prerequisites, or every prerequisite has
    /// at least one completion attempt. Merge nodes carry exactly their two
    /// parents as prerequisites, so the same rule requires both.
    pub fn check_unlocked(&self, user_id: &str, node_id: &str) -> Result<bool, RiplineError> {
        let node = self.node(node_id)?;
        for prerequisite in &node.prerequisites {
            if !self.has_completion(user_id, prerequisite)? {
                return Ok(false);
            }
        }
        Ok(true)
    }

    /// Derived display state for one node.
    pub fn node_state(&self, user_id: &str, node_id: &str) -> Result<QuestNodeState, RiplineError> {
        if self.has_completion(user_id, node_id)? {
            return Ok(QuestNodeState::Completed);
        }
        if self.check_unlocked(user_id, node_id)? {
            Ok(QuestNodeState::Available)
        } else {
            Ok(QuestNodeState::Locked)
        }
    }

    /// Confirm availability without granting anything.
    pub fn unlock(&self, user_id: &str, node_id: &str) -> Result<QuestNodeState, RiplineError> {
        if !self.check_unlocked(user_id, node_id)? {
            return Err(RiplineError::PrerequisitesNotMet(node_id.to_string()));
        }
        self.node_state(user_id, node_id)
    }

    /// Record a completion attempt and grant the node bonus when due.
    ///
    /// The bonus goes through the leveling ledger on the first-ever
    /// completion, or on every completion of a repeatable node. Completing a
    /// node that is not yet available records the attempt with the bonus
    /// withheld and reports a warning status instead of failing.
    pub fn complete_quest(
        &self,
        user_id: &str,
        node_id: &str,
        video_id: &str,
        video_xp: i64,
    ) -> Result<QuestCompletionOutcome, RiplineError> {
        let node = self.node(node_id)?;
        let available = self.check_unlocked(user_id, node_id)?;
        let eligible = node.repeatable || !self.bonus_ever_granted(user_id, node_id)?;
        let withheld = !available && eligible;

        let attempt_number = {
            let conn = self.store.lock();
            let tx = conn.unchecked_transaction()?;
            let attempt_number: i64 = tx.query_row(
                "SELECT COALESCE(MAX(attempt_number), 0) + 1 FROM quest_completions
                 WHERE user_id = ?1 AND node_id = ?2",
                params![user_id, node_id],
                |row| row.get(0),
            )?;
            tx.execute(
                "INSERT INTO quest_completions
                     (user_id, node_id, video_id, attempt_number, xp_awarded,
                      bonus_awarded, bonus_withheld, completed_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, 0, ?6, ?7)",
                params![
                    user_id,
                    node_id,
                    video_id,
                    attempt_number,
                    video_xp,
                    withheld,
                    Utc::now().to_rfc3339()
                ],
            )?;
            tx.commit()?;
            attempt_number as u32
        };

        if !available {
            warn!(
                user_id,
                node_id, attempt_number, "quest completed before prerequisites; bonus withheld"
            );
            return Ok(QuestCompletionOutcome {
                node_id: node_id.to_string(),
                attempt_number,
                status: if withheld {
                    QuestCompletionStatus::BonusWithheld
                } else {
                    QuestCompletionStatus::AlreadyCompleted
                },
                bonus: None,
            });
        }

        if !eligible {
            return Ok(QuestCompletionOutcome {
                node_id: node_id.to_string(),
                attempt_number,
                status: QuestCompletionStatus::AlreadyCompleted,
                bonus: None,
            });
        }

        let bonus = self.grant_bonus(user_id, &node, video_id, attempt_number)?;
        Ok(QuestCompletionOutcome {
            node_id: node_id.to_string(),
            attempt_number,
            status: QuestCompletionStatus::BonusAwarded,
            bonus: Some(bonus),
        })
    }

    /// Award a node bonus through the ledger and mark the attempt row.
    fn grant_bonus(
        &self,
        user_id: &str,
        node: &QuestNode,
        video_id: &str,
        attempt_number: u32,
    ) -> Result<ripline_common::AwardResult, RiplineError> {
        let contributions = vec![Contribution {
            label: format!("quest:{}", node.id),
            display_name: node.id.clone(),
            xp: node.xp_bonus,
        }];
        let result = self.ledger.award(
            user_id,
            node.xp_bonus,
            Some(video_id),
            &contributions,
            ExpSource::QuestBonus,
            Some(&node.id),
        )?;

        let conn = self.store.lock();
        conn.execute(
            "UPDATE quest_completions SET bonus_awarded = ?1, bonus_withheld = 0
             WHERE user_id = ?2 AND node_id = ?3 AND attempt_number = ?4",
            params![result.awarded, user_id, node.id, attempt_number],
        )?;
        Ok(result)
    }

    /// Grant withheld bonuses whose prerequisites have since been
    /// satisfied. Returns the granted outcomes; ineligible rows (a
    /// non-repeatable node that paid out in the meantime) are cleared
    /// without a grant.
    pub fn reconcile_withheld(
        &self,
        user_id: &str,
    ) -> Result<Vec<QuestCompletionOutcome>, RiplineError> {
        let withheld: Vec<(String, u32, String)> = {
            let conn = self.store.lock();
            let mut stmt = conn.prepare(
                "SELECT node_id, attempt_number, video_id FROM quest_completions
                 WHERE user_id = ?1 AND bonus_withheld = 1
                 ORDER BY node_id, attempt_number",
            )?;
            let rows = stmt.query_map(params![user_id], |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    row.get::<_, i64>(1)? as u32,
                    row.get::<_, String>(2)?,
                ))
            })?;
            let mut pending = Vec::new();
            for row in rows {
                pending.push(row?);
            }
            pending
        };

        let mut outcomes = Vec::new();
        for (node_id, attempt_number, video_id) in withheld {
            if !self.check_unlocked(user_id, &node_id)? {
                continue;
            }
            let node = self.node(&node_id)?;
            let eligible = node.repeatable || !self.bonus_ever_granted(user_id, &node_id)?;
            if eligible {
                let bonus = self.grant_bonus(user_id, &node, &video_id, attempt_number)?;
                debug!(user_id, node_id = %node_id, attempt_number, "withheld quest bonus reconciled");
                outcomes.push(QuestCompletionOutcome {
                    node_id,
                    attempt_number,
                    status: QuestCompletionStatus::BonusAwarded,
                    bonus: Some(bonus),
                });
            } else {
                let conn = self.store.lock();
                conn.execute(
                    "UPDATE quest_completions SET bonus_withheld = 0
                     WHERE user_id = ?1 AND node_id = ?2 AND attempt_number = ?3",
                    params![user_id, node_id, attempt_number],
                )?;
            }
        }
        Ok(outcomes)
    }

    /// All attempts for one node, newest first.
    pub fn history(
        &self,
        user_id: &str,
        node_id: &str,
    ) -> Result<Vec<QuestCompletion>, RiplineError> {
        let conn = self.store.lock();
        let mut stmt = conn.prepare(
            "SELECT video_id, attempt_number, xp_awarded, bonus_awarded, bonus_withheld,
                    completed_at
             FROM quest_completions WHERE user_id = ?1 AND node_id = ?2
             ORDER BY attempt_number DESC",
        )?;
        let rows = stmt.query_map(params![user_id, node_id], |row| {
            Ok((
                row.get::<_, String>(0)?,
                row.get::<_, i64>(1)?,
                row.get::<_, i64>(2)?,
                row.get::<_, i64>(3)?,
                row.get::<_, bool>(4)?,
                row.get::<_, String>(5)?,
            ))
        })?;

        let mut attempts = Vec::new();
        for row in rows {
            let (video_id, attempt_number, xp_awarded, bonus_awarded, bonus_withheld, at) = row?;
            attempts.push(QuestCompletion {
                user_id: user_id.to_string(),
                node_id: node_id.to_string(),
                video_id,
                attempt_number: attempt_number as u32,
                xp_awarded,
                bonus_awarded,
                bonus_withheld,
                completed_at: parse_timestamp(&at)?,
            });
        }
        Ok(attempts)
    }

    /// Trend of video XP across a user's attempts on one node. None when
    /// the node has never been attempted.
    pub fn evolution(
        &self,
        user_id: &str,
        node_id: &str,
    ) -> Result<Option<QuestEvolution>, RiplineError> {
        let mut attempts = self.history(user_id, node_id)?;
        attempts.reverse(); // oldest first
        let (first, last) = match (attempts.first(), attempts.last()) {
            (Some(first), Some(last)) => (first.clone(), last.clone()),
            _ => return Ok(None),
        };
        let best_xp = attempts.iter().map(|a| a.xp_awarded).max().unwrap_or(0);
        Ok(Some(QuestEvolution {
            node_id: node_id.to_string(),
            attempts: attempts.len() as u32,
            first_xp: first.xp_awarded,
            best_xp,
            latest_xp: last.xp_awarded,
            improvement: best_xp - first.xp_awarded,
            first_attempt_at: first.completed_at,
            last_attempt_at: last.completed_at,
        }))
    }

    /// Available, never-completed nodes ranked by tier ascending, declared
    /// bonus descending, then id.
    pub fn recommended(
        &self,
        user_id: &str,
        limit: usize,
    ) -> Result<Vec<QuestNode>, RiplineError> {
        let mut candidates = Vec::new();
        for node in self.all_nodes()? {
            if self.node_state(user_id, &node.id)? == QuestNodeState::Available {
                candidates.push(node);
            }
        }
        candidates.sort_by(|a, b| {
            a.tier
                .cmp(&b.tier)
                .then(b.xp_bonus.cmp(&a.xp_bonus))
                .then(a.id.cmp(&b.id))
        });
        candidates.truncate(limit);
        Ok(candidates)
    }

    /// Repeatable, already-completed nodes with the most room for
    /// improvement: largest best-minus-latest XP gap first, then the
    /// longest-untouched, then id. Deterministic for a fixed history.
    pub fn suggested_retries(
        &self,
        user_id: &str,
        limit: usize,
    ) -> Result<Vec<SuggestedRetry>, RiplineError> {
        let mut retries = Vec::new();
        for node in self.all_nodes()? {
            if !node.repeatable {
                continue;
            }
            let mut attempts = self.history(user_id, &node.id)?;
            if attempts.is_empty() {
                continue;
            }
            attempts.reverse(); // oldest first
            let best_xp = attempts.iter().map(|a| a.xp_awarded).max().unwrap_or(0);
            let latest = attempts.last().unwrap();
            retries.push(SuggestedRetry {
                best_xp,
                latest_xp: latest.xp_awarded,
                gap: best_xp - latest.xp_awarded,
                last_attempt_at: latest.completed_at,
                node,
            });
        }
        retries.sort_by(|a, b| {
            b.gap
                .cmp(&a.gap)
                .then(a.last_attempt_at.cmp(&b.last_attempt_at))
                .then(a.node.id.cmp(&b.node.id))
        });
        retries.truncate(limit);
        Ok(retries)
    }

    /// Remove every attempt tied to a deleted video. Attempt numbers are
    /// not renumbered; later attempts continue from the prior maximum.
    pub fn remove_video_attempts(
        &self,
        user_id: &str,
        video_id: &str,
    ) -> Result<usize, RiplineError> {
        let conn = self.store.lock();
        let removed = conn.execute(
            "DELETE FROM quest_completions WHERE user_id = ?1 AND video_id = ?2",
            params![user_id, video_id],
        )?;
        if removed > 0 {
            debug!(user_id, video_id, removed, "quest attempts removed for deleted video");
        }
        Ok(removed)
    }
}

const NODE_SELECT: &str = "SELECT id, specialization, tier, position, branch_type, display_row,
        prerequisites, merge_left, merge_right, required_for_unlock, xp_bonus,
        repeatable, is_shared_node
 FROM quest_nodes";

fn node_from_row(row: &Row<'_>) -> rusqlite::Result<QuestNode> {
    let specialization: String = row.get(1)?;
    let branch_type: String = row.get(4)?;
    let prerequisites: String = row.get(6)?;
    Ok(QuestNode {
        id: row.get(0)?,
        specialization: specialization.parse().map_err(|_| {
            rusqlite::Error::FromSqlConversionFailure(
                1,
                rusqlite::types::Type::Text,
                format!("bad specialization: {specialization}").into(),
            )
        })?,
        tier: row.get::<_, i64>(2)? as u32,
        position: row.get::<_, i64>(3)? as u32,
        branch_type: branch_type.parse().map_err(|_| {
            rusqlite::Error::FromSqlConversionFailure(
                4,
                rusqlite::types::Type::Text,
                format!("bad branch type: {branch_type}").into(),
            )
        })?,
        display_row: row.get::<_, i64>(5)? as u32,
        prerequisites: serde_json::from_str(&prerequisites).map_err(|e| {
            rusqlite::Error::FromSqlConversionFailure(
                6,
                rusqlite::types::Type::Text,
                format!("bad prerequisites: {e}").into(),
            )
        })?,
        merge_left: row.get(7)?,
        merge_right: row.get(8)?,
        required_for_unlock: row.get(9)?,
        xp_bonus: row.get(10)?,
        repeatable: row.get(11)?,
        is_shared_node: row.get(12)?,
    })
}

fn parse_timestamp(raw: &str) -> Result<DateTime<Utc>, RiplineError> {
    raw.parse()
        .map_err(|e| RiplineError::Internal(format!("bad timestamp: {e}")))
}
