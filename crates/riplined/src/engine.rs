//! Engine composition root.
//!
//! Wires the store, catalog cache, ledger, specialization progression, and
//! quest graph together behind one handle. The quest graph is validated on
//! construction so a malformed seed or admin edit fails the boot, not a
//! request.

use crate::catalog::ComponentCatalog;
use crate::config::RiplinedConfig;
use crate::ledger::LevelingLedger;
use crate::notifier::ProgressionNotifier;
use crate::quest::QuestGraph;
use crate::specialization::SpecializationProgression;
use crate::store::ProgressionStore;
use ripline_common::RiplineError;
use std::sync::Arc;
use std::time::Duration;

pub struct ProgressionEngine {
    pub store: ProgressionStore,
    pub catalog: ComponentCatalog,
    pub ledger: LevelingLedger,
    pub specialization: SpecializationProgression,
    pub quests: QuestGraph,
}

impl ProgressionEngine {
    pub fn new(
        store: ProgressionStore,
        config: &RiplinedConfig,
        notifier: Arc<dyn ProgressionNotifier>,
    ) -> Result<Self, RiplineError> {
        let catalog = ComponentCatalog::new(
            store.clone(),
            Duration::from_secs(config.catalog_ttl_secs),
        );
        let ledger = LevelingLedger::new(store.clone(), notifier);
        let specialization = SpecializationProgression::new(store.clone());
        let quests = QuestGraph::new(store.clone(), ledger.clone());
        quests.validate_graph()?;
        Ok(Self {
            store,
            catalog,
            ledger,
            specialization,
            quests,
        })
    }
}
