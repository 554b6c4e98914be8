//! Immutable component catalog snapshot.
//!
//! A snapshot maps each division to its selectable components. Every
//! division always carries the synthetic zero-XP `none` member, and only
//! active components are present, so a failed lookup covers both truly
//! unknown ids and ids that exist but are inactive.

use crate::error::RiplineError;
use crate::types::{ComponentDefinition, Division, NONE_COMPONENT};
use std::collections::HashMap;

#[derive(Debug, Clone)]
pub struct CatalogSnapshot {
    divisions: HashMap<Division, HashMap<String, ComponentDefinition>>,
}

impl CatalogSnapshot {
    /// Build a snapshot from raw component rows. Inactive components are
    /// dropped; the `none` member is inserted for every division.
    pub fn new(components: Vec<ComponentDefinition>) -> Self {
        let mut divisions: HashMap<Division, HashMap<String, ComponentDefinition>> =
            HashMap::new();
        for division in Division::ALL {
            divisions
                .entry(division)
                .or_default()
                .insert(NONE_COMPONENT.to_string(), ComponentDefinition::none_for(division));
        }
        for component in components {
            if !component.active {
                continue;
            }
            divisions
                .entry(component.division)
                .or_default()
                .insert(component.component_id.clone(), component);
        }
        Self { divisions }
    }

    /// Resolve a component id within a division.
    pub fn lookup(
        &self,
        division: Division,
        component_id: &str,
    ) -> Result<&ComponentDefinition, RiplineError> {
        self.divisions
            .get(&division)
            .and_then(|components| components.get(component_id))
            .ok_or_else(|| RiplineError::UnknownComponent {
                division: division.to_string(),
                component_id: component_id.to_string(),
            })
    }

    /// All components of one division, unordered.
    pub fn components(&self, division: Division) -> impl Iterator<Item = &ComponentDefinition> {
        self.divisions
            .get(&division)
            .into_iter()
            .flat_map(|components| components.values())
    }

    /// Total number of selectable components, synthetic members included.
    pub fn len(&self) -> usize {
        self.divisions.values().map(|c| c.len()).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
