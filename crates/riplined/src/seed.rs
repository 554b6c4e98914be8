//! Built-in seed data.
//!
//! First-boot defaults for the component catalog and the starter quest
//! graph. Seeding only runs against empty tables, so admin edits are never
//! overwritten, and the seeded graph is validated before the daemon
//! accepts traffic.

use crate::quest::QuestGraph;
use crate::store::ProgressionStore;
use ripline_common::{BranchType, QuestNode, RiplineError, SpecializationTrack};
use rusqlite::params;
use tracing::info;

/// Seed catalog and quest graph defaults into empty tables.
pub fn seed_defaults(store: &ProgressionStore, quests: &QuestGraph) -> Result<(), RiplineError> {
    seed_components(store)?;
    seed_quest_graph(store, quests)?;
    Ok(())
}

fn seed_components(store: &ProgressionStore) -> Result<(), RiplineError> {
    let conn = store.lock();
    let existing: i64 = conn.query_row("SELECT COUNT(*) FROM components", [], |row| row.get(0))?;
    if existing > 0 {
        return Ok(());
    }

    let defaults: &[(&str, &str, &str, i64)] = &[
        ("approach", "heelside_carve", "Heelside Carve", 5),
        ("approach", "toeside_carve", "Toeside Carve", 10),
        ("approach", "switch_approach", "Switch Approach", 15),
        ("entry", "ollie", "Ollie", 20),
        ("entry", "switch_ollie", "Switch Ollie", 30),
        ("entry", "bunny_hop", "Bunny Hop", 15),
        ("spins", "surface_180", "Surface 180", 25),
        ("spins", "fs180", "FS 180", 35),
        ("spins", "bs180", "BS 180", 40),
        ("spins", "fs360", "FS 360", 70),
        ("spins", "bs360", "BS 360", 80),
        ("grabs", "indy", "Indy", 25),
        ("grabs", "melan", "Melan", 30),
        ("grabs", "mute", "Mute", 25),
        ("grabs", "nose_grab", "Nose Grab", 20),
        ("grabs", "tail_grab", "Tail Grab", 20),
        ("base_moves", "fifty_fifty", "50-50", 40),
        ("base_moves", "boardslide", "Boardslide", 50),
        ("base_moves", "lipslide", "Lipslide", 60),
        ("base_moves", "nose_press", "Nose Press", 45),
        ("base_moves", "tail_press", "Tail Press", 45),
        ("base_moves", "raley", "Raley", 90),
        ("base_moves", "tantrum", "Tantrum", 100),
        ("modifiers", "blind_landing", "Blind Landing", 25),
        ("modifiers", "switch_landing", "Switch Landing", 20),
        ("modifiers", "press_out", "Press Out", 15),
        ("modifiers", "one_hand", "One Hand", 10),
    ];

    let tx = conn.unchecked_transaction()?;
    for (division, id, name, xp) in defaults {
        tx.execute(
            "INSERT INTO components (division, component_id, display_name, xp_value, active)
             VALUES (?1, ?2, ?3, ?4, 1)",
            params![division, id, name, xp],
        )?;
    }
    tx.commit()?;
    info!(components = defaults.len(), "seeded default component catalog");
    Ok(())
}

fn seed_quest_graph(store: &ProgressionStore, quests: &QuestGraph) -> Result<(), RiplineError> {
    {
        let conn = store.lock();
        let existing: i64 =
            conn.query_row("SELECT COUNT(*) FROM quest_nodes", [], |row| row.get(0))?;
        if existing > 0 {
            return Ok(());
        }
    }

    let nodes = default_quest_nodes();
    for node in &nodes {
        quests.insert_node(node)?;
    }
    quests.validate_graph()?;
    info!(nodes = nodes.len(), "seeded default quest graph");
    Ok(())
}

fn quest(
    id: &str,
    track: SpecializationTrack,
    tier: u32,
    position: u32,
    branch_type: BranchType,
    prerequisites: &[&str],
    xp_bonus: i64,
    repeatable: bool,
) -> QuestNode {
    QuestNode {
        id: id.to_string(),
        specialization: track,
        tier,
        position,
        branch_type,
        display_row: tier,
        prerequisites: prerequisites.iter().map(|p| p.to_string()).collect(),
        merge_left: None,
        merge_right: None,
        required_for_unlock: tier == 1,
        xp_bonus,
        repeatable,
        is_shared_node: false,
    }
}

fn merge(
    id: &str,
    track: SpecializationTrack,
    tier: u32,
    position: u32,
    left: &str,
    right: &str,
    xp_bonus: i64,
) -> QuestNode {
    QuestNode {
        branch_type: BranchType::Merge,
        merge_left: Some(left.to_string()),
        merge_right: Some(right.to_string()),
        ..quest(id, track, tier, position, BranchType::Merge, &[left, right], xp_bonus, false)
    }
}

/// The starter skill tree: three tracks, tiers 1..=3, one or two merge
/// nodes per track tail. `kck_grab_air` feeds both kicker merges and is
/// flagged shared for display.
fn default_quest_nodes() -> Vec<QuestNode> {
    use BranchType::*;
    use SpecializationTrack::*;

    let mut nodes = vec![
        // Slider
        quest("sld_fifty_fifty", Slider, 1, 0, None, &[], 100, true),
        quest("sld_boardslide", Slider, 1, 1, None, &[], 120, true),
        quest("sld_pressline", Slider, 2, 0, Ollie, &["sld_fifty_fifty"], 160, false),
        quest("sld_lipslide", Slider, 2, 1, None, &["sld_boardslide"], 180, false),
        merge("sld_back_lip_combo", Slider, 3, 0, "sld_lipslide", "sld_pressline", 300),
        // Kicker
        quest("kck_straight_air", Kicker, 1, 0, None, &[], 100, true),
        quest("kck_grab_air", Kicker, 1, 1, Grab, &[], 120, true),
        quest("kck_fs180", Kicker, 2, 0, Spin, &["kck_straight_air"], 180, false),
        quest("kck_bs180", Kicker, 2, 1, Spin, &["kck_straight_air"], 190, false),
        merge("kck_fs180_melan", Kicker, 3, 0, "kck_fs180", "kck_grab_air", 320),
        merge("kck_bs180_mute", Kicker, 3, 1, "kck_bs180", "kck_grab_air", 340),
        // Surface
        quest("srf_surface_180", Surface, 1, 0, None, &[], 80, true),
        quest("srf_butter_press", Surface, 1, 1, Ollie, &[], 90, true),
        quest("srf_body_varial", Surface, 2, 0, None, &["srf_surface_180"], 150, false),
        merge("srf_butter_360", Surface, 3, 0, "srf_body_varial", "srf_butter_press", 280),
    ];

    for node in &mut nodes {
        if node.id == "kck_grab_air" {
            node.is_shared_node = true;
        }
    }
    nodes
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::read_snapshot;
    use crate::ledger::LevelingLedger;
    use crate::notifier::NullNotifier;
    use ripline_common::Division;
    use std::sync::Arc;
    use tempfile::tempdir;

    fn seeded() -> (ProgressionStore, QuestGraph, tempfile::TempDir) {
        let dir = tempdir().unwrap();
        let store = ProgressionStore::open(&dir.path().join("test.db")).unwrap();
        let ledger = LevelingLedger::new(store.clone(), Arc::new(NullNotifier));
        let quests = QuestGraph::new(store.clone(), ledger);
        seed_defaults(&store, &quests).unwrap();
        (store, quests, dir)
    }

    #[test]
    fn test_seed_populates_catalog() {
        let (store, _quests, _dir) = seeded();
        let snapshot = read_snapshot(&store).unwrap();
        assert_eq!(snapshot.lookup(Division::Entry, "ollie").unwrap().xp_value, 20);
        assert_eq!(
            snapshot.lookup(Division::BaseMoves, "boardslide").unwrap().xp_value,
            50
        );
    }

    #[test]
    fn test_seed_is_idempotent() {
        let (store, quests, _dir) = seeded();
        seed_defaults(&store, &quests).unwrap();
        let count: i64 = store
            .lock()
            .query_row("SELECT COUNT(*) FROM quest_nodes", [], |row| row.get(0))
            .unwrap();
        assert_eq!(count, default_quest_nodes().len() as i64);
    }

    #[test]
    fn test_seeded_graph_is_valid() {
        let (_store, quests, _dir) = seeded();
        quests.validate_graph().unwrap();
        let nodes = quests.all_nodes().unwrap();
        let shared = nodes.iter().find(|n| n.id == "kck_grab_air").unwrap();
        assert!(shared.is_shared_node);
        let merges = nodes
            .iter()
            .filter(|n| n.branch_type == BranchType::Merge)
            .count();
        assert_eq!(merges, 4);
    }
}
