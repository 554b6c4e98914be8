//! Video lifecycle service.
//!
//! Entry points for the two events the progression engine consumes:
//! publication (award path) and deletion (revocation path). Quest-graph
//! bookkeeping runs after the award has committed and must never block or
//! fail a publish; its errors are logged and left for reconciliation.

use crate::engine::ProgressionEngine;
use ripline_common::{
    calculator, AwardResult, ExpSource, ManeuverPayload, RiplineError, SpecializationResult,
    XpBreakdown,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{error, warn};

/// A published trick video, as delivered by the video collaborator.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VideoPublished {
    pub user_id: String,
    pub video_id: String,
    pub maneuver: ManeuverPayload,
    #[serde(default)]
    pub challenge_id: Option<String>,
    #[serde(default)]
    pub quest_node_id: Option<String>,
}

/// Synchronous result of a publish. Quest bonus XP is eventually
/// consistent: `quest_pending` reports whether a follow-up was scheduled.
#[derive(Debug, Clone)]
pub struct PublishOutcome {
    pub breakdown: XpBreakdown,
    pub award: AwardResult,
    pub specialization: Option<SpecializationResult>,
    pub quest_pending: bool,
}

#[derive(Clone)]
pub struct VideoService {
    engine: Arc<ProgressionEngine>,
}

impl VideoService {
    pub fn new(engine: Arc<ProgressionEngine>) -> Self {
        Self { engine }
    }

    pub fn engine(&self) -> &ProgressionEngine {
        &self.engine
    }

    /// Score the maneuver, award the user, award the linked specialization
    /// track, and schedule the quest completion follow-up.
    ///
    /// Input errors (malformed payload, unknown component) reject the
    /// publish before any write.
    pub async fn on_video_published(
        &self,
        event: VideoPublished,
    ) -> Result<PublishOutcome, RiplineError> {
        let snapshot = self.engine.catalog.load()?;
        let breakdown = calculator::calculate(&snapshot, &event.maneuver)?;

        let award = self.engine.ledger.award(
            &event.user_id,
            breakdown.maneuver_total,
            Some(&event.video_id),
            &breakdown.contributions(),
            ExpSource::Video,
            event.challenge_id.as_deref(),
        )?;

        // The linked quest node declares which track this trick progresses.
        let specialization = match event.quest_node_id.as_deref() {
            Some(node_id) => match self.engine.quests.node(node_id) {
                Ok(node) => Some(self.engine.specialization.award(
                    &event.user_id,
                    node.specialization,
                    breakdown.maneuver_total,
                    Some(node_id),
                )?),
                Err(e) => {
                    warn!(
                        user_id = %event.user_id,
                        node_id,
                        error = %e,
                        "unknown quest node on publish; skipping specialization award"
                    );
                    None
                }
            },
            None => None,
        };

        let quest_pending = match event.quest_node_id {
            Some(node_id) => {
                let engine = self.engine.clone();
                let user_id = event.user_id.clone();
                let video_id = event.video_id.clone();
                let video_xp = breakdown.maneuver_total;
                tokio::spawn(async move {
                    match engine.quests.complete_quest(&user_id, &node_id, &video_id, video_xp) {
                        Ok(outcome) => {
                            tracing::debug!(
                                user_id = %user_id,
                                node_id = %node_id,
                                attempt = outcome.attempt_number,
                                status = ?outcome.status,
                                "quest completion recorded"
                            );
                        }
                        Err(e) => {
                            // Soft failure: the video stands, the node stays
                            // eligible for manual reconciliation.
                            warn!(
                                user_id = %user_id,
                                node_id = %node_id,
                                video_id = %video_id,
                                error = %e,
                                "quest completion failed"
                            );
                        }
                    }
                });
                true
            }
            None => false,
        };

        Ok(PublishOutcome {
            breakdown,
            award,
            specialization,
            quest_pending,
        })
    }

    /// Correct the user's balance for a deleted video, then clean its quest
    /// attempts up in the background. The revocation is synchronous: the
    /// delete must not be acknowledged with the balance still inflated.
    pub async fn on_video_deleted(
        &self,
        user_id: &str,
        video_id: &str,
    ) -> Result<i64, RiplineError> {
        let revoked = match self.engine.ledger.revoke(user_id, video_id) {
            Ok(revoked) => revoked,
            Err(e) => {
                // A failed revocation is a balance discrepancy; make noise.
                error!(user_id, video_id, error = %e, "revocation failed");
                return Err(e);
            }
        };

        let engine = self.engine.clone();
        let user = user_id.to_string();
        let video = video_id.to_string();
        tokio::spawn(async move {
            if let Err(e) = engine.quests.remove_video_attempts(&user, &video) {
                warn!(user_id = %user, video_id = %video, error = %e, "quest attempt cleanup failed");
            }
        });

        Ok(revoked)
    }
}
