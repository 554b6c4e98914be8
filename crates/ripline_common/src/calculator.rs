//! Maneuver XP calculator.
//!
//! Validates a payload against the catalog and produces an itemized
//! breakdown. Purely functional given a catalog snapshot: no side effects,
//! no randomness, no time dependence.

use crate::catalog::CatalogSnapshot;
use crate::error::RiplineError;
use crate::types::{Division, ManeuverPayload, XpBreakdown, XpLineItem, NONE_COMPONENT};

/// Check that every mandatory division is present. Modifier shape errors are
/// caught earlier, at payload deserialization.
pub fn validate(payload: &ManeuverPayload) -> Result<(), RiplineError> {
    for division in Division::MANDATORY {
        if payload.selection(division).is_none() {
            return Err(RiplineError::MissingDivision(division.to_string()));
        }
    }
    Ok(())
}

/// Validate, resolve every selection through the catalog, and sum.
pub fn calculate(
    catalog: &CatalogSnapshot,
    payload: &ManeuverPayload,
) -> Result<XpBreakdown, RiplineError> {
    validate(payload)?;

    let resolve = |division: Division, component_id: &str| -> Result<XpLineItem, RiplineError> {
        let definition = catalog.lookup(division, component_id)?;
        Ok(XpLineItem {
            division,
            component_id: definition.component_id.clone(),
            display_name: definition.display_name.clone(),
            xp: definition.xp_value,
        })
    };
    let mandatory = |division: Division| -> Result<XpLineItem, RiplineError> {
        let component_id = payload
            .selection(division)
            .ok_or_else(|| RiplineError::MissingDivision(division.to_string()))?;
        resolve(division, component_id)
    };

    let approach = mandatory(Division::Approach)?;
    let entry = mandatory(Division::Entry)?;
    let spins = mandatory(Division::Spins)?;
    let grabs = mandatory(Division::Grabs)?;
    let base_moves = mandatory(Division::BaseMoves)?;

    let mut modifiers = Vec::with_capacity(payload.modifiers.len());
    for modifier_id in &payload.modifiers {
        modifiers.push(resolve(Division::Modifiers, modifier_id)?);
    }

    let maneuver_total = approach.xp
        + entry.xp
        + spins.xp
        + grabs.xp
        + base_moves.xp
        + modifiers.iter().map(|item| item.xp).sum::<i64>();

    Ok(XpBreakdown {
        approach,
        entry,
        spins,
        grabs,
        base_moves,
        modifiers,
        maneuver_total,
    })
}

/// Human-readable trick name in fixed division order, modifiers appended
/// with " + ". Display only, never used for scoring.
pub fn describe(breakdown: &XpBreakdown) -> String {
    let mut parts = Vec::new();
    for item in [
        &breakdown.approach,
        &breakdown.entry,
        &breakdown.spins,
        &breakdown.grabs,
        &breakdown.base_moves,
    ] {
        if item.component_id != NONE_COMPONENT {
            parts.push(item.display_name.clone());
        }
    }
    let mut description = parts.join(" ");
    for modifier in &breakdown.modifiers {
        if modifier.component_id != NONE_COMPONENT {
            description.push_str(" + ");
            description.push_str(&modifier.display_name);
        }
    }
    description
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::ComponentDefinition;

    fn component(division: Division, id: &str, name: &str, xp: i64) -> ComponentDefinition {
        ComponentDefinition {
            division,
            component_id: id.to_string(),
            display_name: name.to_string(),
            xp_value: xp,
            metadata: None,
            active: true,
        }
    }

    fn test_catalog() -> CatalogSnapshot {
        CatalogSnapshot::new(vec![
            component(Division::Entry, "ollie", "Ollie", 20),
            component(Division::Spins, "fs180", "FS 180", 35),
            component(Division::BaseMoves, "boardslide", "Boardslide", 50),
            component(Division::Grabs, "melan", "Melan", 30),
            component(Division::Modifiers, "blind_landing", "Blind Landing", 25),
        ])
    }

    fn test_payload() -> ManeuverPayload {
        ManeuverPayload {
            approach: Some("none".to_string()),
            entry: Some("ollie".to_string()),
            spins: Some("fs180".to_string()),
            grabs: Some("none".to_string()),
            base_moves: Some("boardslide".to_string()),
            modifiers: Vec::new(),
        }
    }

    #[test]
    fn test_concrete_scenario_totals_105() {
        let breakdown = calculate(&test_catalog(), &test_payload()).unwrap();
        assert_eq!(breakdown.maneuver_total, 105);
        let non_zero = breakdown
            .line_items()
            .into_iter()
            .filter(|item| item.xp != 0)
            .count();
        assert_eq!(non_zero, 3);
        assert_eq!(breakdown.contributions().len(), 3);
    }

    #[test]
    fn test_calculate_is_pure() {
        let catalog = test_catalog();
        let payload = test_payload();
        let first = calculate(&catalog, &payload).unwrap();
        let second = calculate(&catalog, &payload).unwrap();
        assert_eq!(first, second);
        assert_eq!(
            serde_json::to_string(&first).unwrap(),
            serde_json::to_string(&second).unwrap()
        );
    }

    #[test]
    fn test_total_equals_sum_of_line_items() {
        let catalog = test_catalog();
        let mut payload = test_payload();
        payload.grabs = Some("melan".to_string());
        payload.modifiers = vec!["blind_landing".to_string()];
        let breakdown = calculate(&catalog, &payload).unwrap();
        let sum: i64 = breakdown.line_items().iter().map(|item| item.xp).sum();
        assert_eq!(breakdown.maneuver_total, sum);
        assert_eq!(breakdown.maneuver_total, 160);
    }

    #[test]
    fn test_missing_division_rejected() {
        let mut payload = test_payload();
        payload.spins = None;
        let err = calculate(&test_catalog(), &payload).unwrap_err();
        match err {
            RiplineError::MissingDivision(name) => assert_eq!(name, "spins"),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_unknown_component_propagates() {
        let mut payload = test_payload();
        payload.entry = Some("triple_backflip".to_string());
        assert!(matches!(
            calculate(&test_catalog(), &payload),
            Err(RiplineError::UnknownComponent { .. })
        ));
    }

    #[test]
    fn test_unknown_modifier_propagates() {
        let mut payload = test_payload();
        payload.modifiers = vec!["imaginary".to_string()];
        assert!(matches!(
            calculate(&test_catalog(), &payload),
            Err(RiplineError::UnknownComponent { .. })
        ));
    }

    #[test]
    fn test_describe_skips_none_and_joins_modifiers() {
        let catalog = test_catalog();
        let mut payload = test_payload();
        payload.modifiers = vec!["blind_landing".to_string()];
        let breakdown = calculate(&catalog, &payload).unwrap();
        assert_eq!(describe(&breakdown), "Ollie FS 180 Boardslide + Blind Landing");
    }
}
