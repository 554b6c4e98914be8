//! Core domain types shared between the engine daemon and the CLI.
//!
//! A maneuver is described as one component per mandatory division plus any
//! number of modifiers. Everything downstream (breakdowns, ledger entries,
//! specializations, quest nodes) is built from these types.

use crate::error::RiplineError;
use chrono::{DateTime, Utc};
use serde::de::{self, Deserializer, SeqAccess, Visitor};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Fixed maneuver divisions. Every division except `Modifiers` is mandatory
/// in a payload; all of them carry an implicit zero-XP `none` member.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Division {
    Approach,
    Entry,
    Spins,
    Grabs,
    BaseMoves,
    Modifiers,
}

impl Division {
    /// Divisions that must be present in every payload, in display order.
    pub const MANDATORY: [Division; 5] = [
        Division::Approach,
        Division::Entry,
        Division::Spins,
        Division::Grabs,
        Division::BaseMoves,
    ];

    /// All divisions, mandatory first, in display order.
    pub const ALL: [Division; 6] = [
        Division::Approach,
        Division::Entry,
        Division::Spins,
        Division::Grabs,
        Division::BaseMoves,
        Division::Modifiers,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Division::Approach => "approach",
            Division::Entry => "entry",
            Division::Spins => "spins",
            Division::Grabs => "grabs",
            Division::BaseMoves => "base_moves",
            Division::Modifiers => "modifiers",
        }
    }
}

impl fmt::Display for Division {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Division {
    type Err = RiplineError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "approach" => Ok(Division::Approach),
            "entry" => Ok(Division::Entry),
            "spins" => Ok(Division::Spins),
            "grabs" => Ok(Division::Grabs),
            "base_moves" => Ok(Division::BaseMoves),
            "modifiers" => Ok(Division::Modifiers),
            other => Err(RiplineError::UnknownDivision(other.to_string())),
        }
    }
}

/// Component id reserved for the synthetic zero-XP member of every division.
pub const NONE_COMPONENT: &str = "none";

/// A selectable building block within a division.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ComponentDefinition {
    pub division: Division,
    pub component_id: String,
    pub display_name: String,
    pub xp_value: i64,
    #[serde(default)]
    pub metadata: Option<serde_json::Value>,
    pub active: bool,
}

impl ComponentDefinition {
    /// The synthetic `none` member every division carries.
    pub fn none_for(division: Division) -> Self {
        Self {
            division,
            component_id: NONE_COMPONENT.to_string(),
            display_name: "None".to_string(),
            xp_value: 0,
            metadata: None,
            active: true,
        }
    }
}

/// A submitted maneuver: one component per mandatory division, plus zero or
/// more modifiers. The `modifiers` field accepts a single string, a list of
/// strings, or nothing at all, and is normalized to a list on the way in.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ManeuverPayload {
    pub approach: Option<String>,
    pub entry: Option<String>,
    pub spins: Option<String>,
    pub grabs: Option<String>,
    pub base_moves: Option<String>,
    #[serde(default, deserialize_with = "deserialize_modifiers")]
    pub modifiers: Vec<String>,
}

impl ManeuverPayload {
    /// Parse a payload from a JSON value, surfacing a typed error when the
    /// modifiers field has an unusable shape.
    pub fn from_value(value: serde_json::Value) -> Result<Self, RiplineError> {
        if let Some(m) = value.get("modifiers") {
            let usable = m.is_null()
                || m.is_string()
                || m.as_array()
                    .map(|items| items.iter().all(|v| v.is_string()))
                    .unwrap_or(false);
            if !usable {
                return Err(RiplineError::InvalidModifiers(
                    "expected a modifier id, a list of modifier ids, or nothing".to_string(),
                ));
            }
        }
        Ok(serde_json::from_value(value)?)
    }

    /// The selected component id for a mandatory division, if present.
    pub fn selection(&self, division: Division) -> Option<&str> {
        match division {
            Division::Approach => self.approach.as_deref(),
            Division::Entry => self.entry.as_deref(),
            Division::Spins => self.spins.as_deref(),
            Division::Grabs => self.grabs.as_deref(),
            Division::BaseMoves => self.base_moves.as_deref(),
            Division::Modifiers => None,
        }
    }
}

fn deserialize_modifiers<'de, D>(deserializer: D) -> Result<Vec<String>, D::Error>
where
    D: Deserializer<'de>,
{
    struct ModifiersVisitor;

    impl<'de> Visitor<'de> for ModifiersVisitor {
        type Value = Vec<String>;

        fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            f.write_str("a modifier id, a list of modifier ids, or null")
        }

        fn visit_unit<E: de::Error>(self) -> Result<Self::Value, E> {
            Ok(Vec::new())
        }

        fn visit_none<E: de::Error>(self) -> Result<Self::Value, E> {
            Ok(Vec::new())
        }

        fn visit_str<E: de::Error>(self, v: &str) -> Result<Self::Value, E> {
            Ok(vec![v.to_string()])
        }

        fn visit_seq<A: SeqAccess<'de>>(self, mut seq: A) -> Result<Self::Value, A::Error> {
            let mut out = Vec::new();
            while let Some(item) = seq.next_element::<String>()? {
                out.push(item);
            }
            Ok(out)
        }
    }

    deserializer.deserialize_any(ModifiersVisitor)
}

/// One resolved line of an XP breakdown.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct XpLineItem {
    pub division: Division,
    pub component_id: String,
    pub display_name: String,
    pub xp: i64,
}

/// A non-zero XP contribution recorded on a ledger entry. Mirrors breakdown
/// line items for maneuver awards and carries a single synthetic line for
/// quest bonuses.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Contribution {
    pub label: String,
    pub display_name: String,
    pub xp: i64,
}

impl From<&XpLineItem> for Contribution {
    fn from(item: &XpLineItem) -> Self {
        Self {
            label: format!("{}:{}", item.division, item.component_id),
            display_name: item.display_name.clone(),
            xp: item.xp,
        }
    }
}

/// The itemized XP computation for one maneuver payload. Deterministic:
/// identical payloads always produce identical breakdowns.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct XpBreakdown {
    pub approach: XpLineItem,
    pub entry: XpLineItem,
    pub spins: XpLineItem,
    pub grabs: XpLineItem,
    pub base_moves: XpLineItem,
    pub modifiers: Vec<XpLineItem>,
    pub maneuver_total: i64,
}

impl XpBreakdown {
    /// All line items in fixed division order, modifiers last.
    pub fn line_items(&self) -> Vec<&XpLineItem> {
        let mut items = vec![
            &self.approach,
            &self.entry,
            &self.spins,
            &self.grabs,
            &self.base_moves,
        ];
        items.extend(self.modifiers.iter());
        items
    }

    /// Ledger contributions: the non-zero line items only.
    pub fn contributions(&self) -> Vec<Contribution> {
        self.line_items()
            .into_iter()
            .filter(|item| item.xp != 0)
            .map(Contribution::from)
            .collect()
    }
}

/// Pure view of a user's position on the growth curve.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct XpSnapshot {
    pub level: u32,
    pub current: i64,
    pub next: i64,
    pub remaining: i64,
    pub progress: f64,
    pub cap: i64,
    pub max_level: u32,
}

/// Result of applying an XP delta to a user.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AwardResult {
    pub awarded: i64,
    pub total: i64,
    pub current: i64,
    pub next: i64,
    pub remaining: i64,
    pub progress: f64,
    pub level: u32,
    pub previous_level: u32,
    pub leveled_up: bool,
    pub level_ups: u32,
}

/// Persisted per-user progression row. `level` and `xp_current` are cached
/// projections of `xp_total` through the growth curve, never authored.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserProgression {
    pub user_id: String,
    pub xp_total: i64,
    pub xp_current: i64,
    pub level: u32,
    pub updated_at: DateTime<Utc>,
}

/// Origin of an XP-granting ledger entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExpSource {
    Video,
    QuestBonus,
    Admin,
}

impl ExpSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            ExpSource::Video => "video",
            ExpSource::QuestBonus => "quest_bonus",
            ExpSource::Admin => "admin",
        }
    }
}

impl fmt::Display for ExpSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ExpSource {
    type Err = RiplineError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "video" => Ok(ExpSource::Video),
            "quest_bonus" => Ok(ExpSource::QuestBonus),
            "admin" => Ok(ExpSource::Admin),
            other => Err(RiplineError::Internal(format!(
                "unknown exp source: {other}"
            ))),
        }
    }
}

/// Immutable-once-written ledger row. Created only for positive awards;
/// deleted en masse when the associated video is deleted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExpLogEntry {
    pub id: String,
    pub user_id: String,
    pub video_id: Option<String>,
    pub amount: i64,
    pub source: ExpSource,
    pub contributions: Vec<Contribution>,
    pub context: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// The three independent specialization tracks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SpecializationTrack {
    Slider,
    Kicker,
    Surface,
}

impl SpecializationTrack {
    pub const ALL: [SpecializationTrack; 3] = [
        SpecializationTrack::Slider,
        SpecializationTrack::Kicker,
        SpecializationTrack::Surface,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            SpecializationTrack::Slider => "slider",
            SpecializationTrack::Kicker => "kicker",
            SpecializationTrack::Surface => "surface",
        }
    }
}

impl fmt::Display for SpecializationTrack {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SpecializationTrack {
    type Err = RiplineError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "slider" => Ok(SpecializationTrack::Slider),
            "kicker" => Ok(SpecializationTrack::Kicker),
            "surface" => Ok(SpecializationTrack::Surface),
            other => Err(RiplineError::UnknownTrack(other.to_string())),
        }
    }
}

/// Persisted per-(user, track) specialization row.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Specialization {
    pub user_id: String,
    pub track: SpecializationTrack,
    pub level: u32,
    pub xp_total: i64,
    pub xp_current: i64,
    pub tricks_completed: u32,
    pub best_trick_id: Option<String>,
    pub best_trick_xp: i64,
}

/// Result of a specialization award.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SpecializationResult {
    pub track: SpecializationTrack,
    pub awarded: i64,
    pub multiplier: f64,
    pub xp_total: i64,
    pub level: u32,
    pub previous_level: u32,
    pub leveled_up: bool,
    pub tricks_completed: u32,
    pub new_best: bool,
}

/// One row of a specialization leaderboard.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LeaderboardEntry {
    pub rank: u32,
    pub user_id: String,
    pub level: u32,
    pub xp_total: i64,
    pub best_trick_id: Option<String>,
    pub best_trick_xp: i64,
}

/// Branch flavor of a quest node. Affects display grouping; `Merge` also
/// implies the two-parent prerequisite shape.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BranchType {
    None,
    Spin,
    Merge,
    Ollie,
    Grab,
}

impl BranchType {
    pub fn as_str(&self) -> &'static str {
        match self {
            BranchType::None => "none",
            BranchType::Spin => "spin",
            BranchType::Merge => "merge",
            BranchType::Ollie => "ollie",
            BranchType::Grab => "grab",
        }
    }
}

impl FromStr for BranchType {
    type Err = RiplineError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "none" => Ok(BranchType::None),
            "spin" => Ok(BranchType::Spin),
            "merge" => Ok(BranchType::Merge),
            "ollie" => Ok(BranchType::Ollie),
            "grab" => Ok(BranchType::Grab),
            other => Err(RiplineError::Internal(format!(
                "unknown branch type: {other}"
            ))),
        }
    }
}

/// A unit in the skill-tree graph. A merge node has exactly two direct
/// prerequisites equal to `{merge_left, merge_right}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QuestNode {
    pub id: String,
    pub specialization: SpecializationTrack,
    pub tier: u32,
    pub position: u32,
    pub branch_type: BranchType,
    pub display_row: u32,
    pub prerequisites: Vec<String>,
    pub merge_left: Option<String>,
    pub merge_right: Option<String>,
    pub required_for_unlock: bool,
    pub xp_bonus: i64,
    pub repeatable: bool,
    pub is_shared_node: bool,
}

/// One recorded completion attempt of a quest node. `xp_awarded` is the
/// triggering video's maneuver XP (the quality signal evolution tracks);
/// `bonus_awarded` is the node bonus granted through the ledger for this
/// attempt, zero when none was due or it is still withheld.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QuestCompletion {
    pub user_id: String,
    pub node_id: String,
    pub video_id: String,
    pub attempt_number: u32,
    pub xp_awarded: i64,
    pub bonus_awarded: i64,
    pub bonus_withheld: bool,
    pub completed_at: DateTime<Utc>,
}

/// Derived per-(user, node) state. Never stored.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QuestNodeState {
    Locked,
    Available,
    Completed,
}

/// What happened to the bonus when a completion was recorded.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QuestCompletionStatus {
    /// The node bonus was granted through the ledger.
    BonusAwarded,
    /// Non-repeatable node already paid out; attempt recorded, no bonus.
    AlreadyCompleted,
    /// Prerequisites were unmet; attempt recorded, bonus withheld for
    /// reconciliation.
    BonusWithheld,
}

/// Outcome of recording a quest completion attempt.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QuestCompletionOutcome {
    pub node_id: String,
    pub attempt_number: u32,
    pub status: QuestCompletionStatus,
    pub bonus: Option<AwardResult>,
}

/// Trend of a user's attempts on one node.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QuestEvolution {
    pub node_id: String,
    pub attempts: u32,
    pub first_xp: i64,
    pub best_xp: i64,
    pub latest_xp: i64,
    pub improvement: i64,
    pub first_attempt_at: DateTime<Utc>,
    pub last_attempt_at: DateTime<Utc>,
}

/// A repeatable, already-completed node ranked by room for improvement.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SuggestedRetry {
    pub node: QuestNode,
    pub best_xp: i64,
    pub latest_xp: i64,
    pub gap: i64,
    pub last_attempt_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_modifiers_absent_normalizes_to_empty() {
        let payload = ManeuverPayload::from_value(serde_json::json!({
            "approach": "none",
            "entry": "ollie",
            "spins": "none",
            "grabs": "none",
            "base_moves": "boardslide",
        }))
        .unwrap();
        assert!(payload.modifiers.is_empty());
    }

    #[test]
    fn test_modifiers_single_string_normalizes_to_list() {
        let payload = ManeuverPayload::from_value(serde_json::json!({
            "approach": "none",
            "entry": "ollie",
            "spins": "none",
            "grabs": "none",
            "base_moves": "boardslide",
            "modifiers": "blind_landing",
        }))
        .unwrap();
        assert_eq!(payload.modifiers, vec!["blind_landing".to_string()]);
    }

    #[test]
    fn test_modifiers_list_passes_through() {
        let payload = ManeuverPayload::from_value(serde_json::json!({
            "approach": "none",
            "entry": "ollie",
            "spins": "none",
            "grabs": "none",
            "base_moves": "boardslide",
            "modifiers": ["blind_landing", "press_out"],
        }))
        .unwrap();
        assert_eq!(payload.modifiers.len(), 2);
    }

    #[test]
    fn test_modifiers_bad_shape_rejected() {
        let err = ManeuverPayload::from_value(serde_json::json!({
            "approach": "none",
            "entry": "ollie",
            "spins": "none",
            "grabs": "none",
            "base_moves": "boardslide",
            "modifiers": 42,
        }))
        .unwrap_err();
        assert!(matches!(err, RiplineError::InvalidModifiers(_)));
    }

    #[test]
    fn test_division_round_trip() {
        for division in Division::ALL {
            assert_eq!(division.as_str().parse::<Division>().unwrap(), division);
        }
        assert!("rails".parse::<Division>().is_err());
    }

    #[test]
    fn test_track_round_trip() {
        for track in SpecializationTrack::ALL {
            assert_eq!(
                track.as_str().parse::<SpecializationTrack>().unwrap(),
                track
            );
        }
    }
}
