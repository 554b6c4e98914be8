//! Notification side effects for XP awards.
//!
//! Delivery is best-effort and decoupled from the award transaction; a
//! failed or missing notification never affects the ledger. Revocations
//! never notify.

use ripline_common::AwardResult;
use tracing::info;

/// Sink for award notifications. The daemon wires a real delivery channel
/// here; tests use [`NullNotifier`].
pub trait ProgressionNotifier: Send + Sync {
    /// The user gained XP without crossing a level boundary.
    fn xp_gained(&self, user_id: &str, result: &AwardResult);

    /// The user crossed one or more level boundaries.
    fn leveled_up(&self, user_id: &str, result: &AwardResult);
}

/// Default notifier: structured log lines only.
pub struct TracingNotifier;

impl ProgressionNotifier for TracingNotifier {
    fn xp_gained(&self, user_id: &str, result: &AwardResult) {
        info!(
            user_id,
            awarded = result.awarded,
            total = result.total,
            level = result.level,
            "gained XP"
        );
    }

    fn leveled_up(&self, user_id: &str, result: &AwardResult) {
        info!(
            user_id,
            awarded = result.awarded,
            level = result.level,
            previous_level = result.previous_level,
            level_ups = result.level_ups,
            "leveled up"
        );
    }
}

/// Silent notifier for tests and read-only tooling.
pub struct NullNotifier;

impl ProgressionNotifier for NullNotifier {
    fn xp_gained(&self, _user_id: &str, _result: &AwardResult) {}
    fn leveled_up(&self, _user_id: &str, _result: &AwardResult) {}
}
