//! Command handlers for riplinectl.
//!
//! Everything here opens the database read-only; writes belong to the
//! daemon. `calc` and `snapshot` work without a database where possible.

use anyhow::{anyhow, Context, Result};
use owo_colors::OwoColorize;
use ripline_common::{calculator, curve, Division, ManeuverPayload, SpecializationTrack};
use riplined::catalog::read_snapshot;
use riplined::ledger::LevelingLedger;
use riplined::notifier::NullNotifier;
use riplined::quest::QuestGraph;
use riplined::specialization::SpecializationProgression;
use riplined::store::{ProgressionStore, DB_PATH};
use std::path::Path;
use std::sync::Arc;

fn open_store(db: Option<&Path>) -> Result<ProgressionStore> {
    let path = db.unwrap_or(Path::new(DB_PATH));
    ProgressionStore::open_readonly(path)
        .ok_or_else(|| anyhow!("no database at {} (is riplined installed?)", path.display()))
}

/// Preview a maneuver payload: `{"approach":"none","entry":"ollie",...}`
/// or `@payload.json`.
pub fn calc(db: Option<&Path>, payload: &str) -> Result<()> {
    let raw = match payload.strip_prefix('@') {
        Some(path) => std::fs::read_to_string(path)
            .with_context(|| format!("failed to read payload file {path}"))?,
        None => payload.to_string(),
    };
    let value: serde_json::Value = serde_json::from_str(&raw).context("payload is not JSON")?;
    let maneuver = ManeuverPayload::from_value(value)?;

    let store = open_store(db)?;
    let snapshot = read_snapshot(&store)?;
    let breakdown = calculator::calculate(&snapshot, &maneuver)?;

    println!("{}", calculator::describe(&breakdown).bold());
    for item in breakdown.line_items() {
        if item.xp != 0 {
            println!("  {:<12} {:<20} {:>5}", item.division, item.display_name, item.xp);
        }
    }
    println!("  {:<33} {:>5}", "total".bold(), breakdown.maneuver_total.bold());
    Ok(())
}

/// Pure growth-curve state for a total.
pub fn snapshot(total: i64) -> Result<()> {
    let snap = curve::snapshot(total);
    println!("{} {}", "level".bold(), snap.level);
    println!("{} {}/{}", "xp".bold(), snap.current, snap.next);
    println!("{} {}", "remaining".bold(), snap.remaining);
    println!("{} {:.1}%", "progress".bold(), snap.progress * 100.0);
    if snap.level == snap.max_level {
        println!("{}", "max level".green());
    }
    Ok(())
}

pub fn catalog(db: Option<&Path>) -> Result<()> {
    let store = open_store(db)?;
    let snapshot = read_snapshot(&store)?;
    for division in Division::ALL {
        println!("{}", division.to_string().bold());
        let mut components: Vec<_> = snapshot.components(division).collect();
        components.sort_by(|a, b| a.xp_value.cmp(&b.xp_value).then(a.component_id.cmp(&b.component_id)));
        for component in components {
            println!("  {:<20} {:<24} {:>5}", component.component_id, component.display_name, component.xp_value);
        }
    }
    Ok(())
}

pub fn rider(db: Option<&Path>, user_id: &str) -> Result<()> {
    let store = open_store(db)?;
    let ledger = LevelingLedger::new(store.clone(), Arc::new(NullNotifier));
    let progression = ledger.progression(user_id)?;

    println!("{}", user_id.bold());
    let snap = curve::snapshot(progression.xp_total);
    println!(
        "  level {} ({}/{} xp, total {})",
        snap.level.bold(),
        snap.current,
        snap.next,
        progression.xp_total
    );

    let specializations = SpecializationProgression::new(store).for_user(user_id)?;
    if specializations.is_empty() {
        println!("  no specialization progress yet");
    }
    for spec in specializations {
        println!(
            "  {:<8} level {:<2} {:>7} xp  {:>3} tricks  best: {} ({})",
            spec.track.to_string(),
            spec.level,
            spec.xp_total,
            spec.tricks_completed,
            spec.best_trick_id.as_deref().unwrap_or("-"),
            spec.best_trick_xp
        );
    }
    Ok(())
}

pub fn leaderboard(db: Option<&Path>, track: &str, limit: usize) -> Result<()> {
    let track: SpecializationTrack = track.parse()?;
    let store = open_store(db)?;
    let board = SpecializationProgression::new(store).leaderboard(track, limit)?;
    if board.is_empty() {
        println!("no riders on the {track} board yet");
        return Ok(());
    }
    println!("{} {}", track.to_string().bold(), "leaderboard".bold());
    for entry in board {
        println!(
            "  {:>3}. {:<20} level {:<2} {:>7} xp",
            entry.rank, entry.user_id, entry.level, entry.xp_total
        );
    }
    Ok(())
}

pub fn quests(db: Option<&Path>, user_id: &str, retries: bool, limit: usize) -> Result<()> {
    let store = open_store(db)?;
    let ledger = LevelingLedger::new(store.clone(), Arc::new(NullNotifier));
    let graph = QuestGraph::new(store, ledger);

    if retries {
        let suggestions = graph.suggested_retries(user_id, limit)?;
        if suggestions.is_empty() {
            println!("nothing to retry yet");
            return Ok(());
        }
        println!("{}", "suggested retries".bold());
        for retry in suggestions {
            println!(
                "  {:<22} best {:>4}  latest {:>4}  gap {:>4}",
                retry.node.id, retry.best_xp, retry.latest_xp, retry.gap
            );
        }
    } else {
        let recommendations = graph.recommended(user_id, limit)?;
        if recommendations.is_empty() {
            println!("no quests available");
            return Ok(());
        }
        println!("{}", "recommended quests".bold());
        for node in recommendations {
            println!(
                "  {:<22} tier {}  {:<8} bonus {:>4}",
                node.id,
                node.tier,
                node.specialization.to_string(),
                node.xp_bonus
            );
        }
    }
    Ok(())
}

pub fn audit(db: Option<&Path>, user_id: &str) -> Result<()> {
    let store = open_store(db)?;
    let ledger = LevelingLedger::new(store, Arc::new(NullNotifier));
    let report = ledger.audit_user(user_id)?;
    println!("{}", user_id.bold());
    println!("  progression total {}", report.xp_total);
    println!("  ledger sum        {}", report.ledger_sum);
    if report.consistent {
        println!("  {}", "consistent".green());
    } else {
        println!("  {}", "INCONSISTENT".red().bold());
    }
    Ok(())
}
