//! Component catalog cache.
//!
//! Loads the active component set from the database into an immutable
//! snapshot, cached for a bounded TTL or until explicitly invalidated by an
//! admin edit. Populated lazily; callers must tolerate a cache miss
//! triggering a reload.

use crate::store::ProgressionStore;
use ripline_common::{CatalogSnapshot, ComponentDefinition, Division, RiplineError};
use rusqlite::params;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tracing::debug;

/// Default snapshot lifetime before a reload.
pub const DEFAULT_CATALOG_TTL: Duration = Duration::from_secs(300);

struct CachedSnapshot {
    snapshot: Arc<CatalogSnapshot>,
    loaded_at: Instant,
}

#[derive(Clone)]
pub struct ComponentCatalog {
    store: ProgressionStore,
    ttl: Duration,
    cached: Arc<Mutex<Option<CachedSnapshot>>>,
}

impl ComponentCatalog {
    pub fn new(store: ProgressionStore, ttl: Duration) -> Self {
        Self {
            store,
            ttl,
            cached: Arc::new(Mutex::new(None)),
        }
    }

    /// The current snapshot, reloading from the store when the cache is
    /// cold or stale.
    pub fn load(&self) -> Result<Arc<CatalogSnapshot>, RiplineError> {
        let mut cached = self.cached.lock().unwrap();
        if let Some(entry) = cached.as_ref() {
            if entry.loaded_at.elapsed() < self.ttl {
                return Ok(entry.snapshot.clone());
            }
        }

        let snapshot = Arc::new(read_snapshot(&self.store)?);
        debug!(components = snapshot.len(), "catalog snapshot reloaded");
        *cached = Some(CachedSnapshot {
            snapshot: snapshot.clone(),
            loaded_at: Instant::now(),
        });
        Ok(snapshot)
    }

    /// Drop the cached snapshot. Called when the admin-edit collaborator
    /// reports a component change.
    pub fn invalidate(&self) {
        *self.cached.lock().unwrap() = None;
        debug!("catalog cache invalidated");
    }

    /// Resolve one component through the cached snapshot.
    pub fn lookup(
        &self,
        division: Division,
        component_id: &str,
    ) -> Result<ComponentDefinition, RiplineError> {
        Ok(self.load()?.lookup(division, component_id)?.clone())
    }
}

/// Read the active component set straight from the store, bypassing any
/// cache. Also used by riplinectl for one-shot snapshots.
pub fn read_snapshot(store: &ProgressionStore) -> Result<CatalogSnapshot, RiplineError> {
    let conn = store.lock();
    let mut stmt = conn.prepare(
        "SELECT division, component_id, display_name, xp_value, metadata
         FROM components WHERE active = 1",
    )?;
    let rows = stmt.query_map(params![], |row| {
        Ok((
            row.get::<_, String>(0)?,
            row.get::<_, String>(1)?,
            row.get::<_, String>(2)?,
            row.get::<_, i64>(3)?,
            row.get::<_, Option<String>>(4)?,
        ))
    })?;

    let mut components = Vec::new();
    for row in rows {
        let (division, component_id, display_name, xp_value, metadata) = row?;
        components.push(ComponentDefinition {
            division: division.parse()?,
            component_id,
            display_name,
            xp_value,
            metadata: match metadata {
                Some(raw) => Some(serde_json::from_str(&raw)?),
                None => None,
            },
            active: true,
        });
    }
    Ok(CatalogSnapshot::new(components))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn test_store() -> (ProgressionStore, tempfile::TempDir) {
        let dir = tempdir().unwrap();
        let store = ProgressionStore::open(&dir.path().join("test.db")).unwrap();
        (store, dir)
    }

    fn insert_component(store: &ProgressionStore, division: &str, id: &str, xp: i64, active: bool) {
        store
            .lock()
            .execute(
                "INSERT INTO components (division, component_id, display_name, xp_value, active)
                 VALUES (?1, ?2, ?3, ?4, ?5)",
                params![division, id, id, xp, active],
            )
            .unwrap();
    }

    #[test]
    fn test_load_includes_synthetic_none() {
        let (store, _dir) = test_store();
        let catalog = ComponentCatalog::new(store, DEFAULT_CATALOG_TTL);
        let snapshot = catalog.load().unwrap();
        for division in Division::ALL {
            assert!(snapshot.lookup(division, "none").is_ok());
        }
    }

    #[test]
    fn test_cache_serves_stale_until_invalidated() {
        let (store, _dir) = test_store();
        let catalog = ComponentCatalog::new(store.clone(), Duration::from_secs(600));
        assert!(catalog.lookup(Division::Entry, "ollie").is_err());

        insert_component(&store, "entry", "ollie", 20, true);
        // Still the cached pre-insert snapshot.
        assert!(catalog.lookup(Division::Entry, "ollie").is_err());

        catalog.invalidate();
        assert_eq!(catalog.lookup(Division::Entry, "ollie").unwrap().xp_value, 20);
    }

    #[test]
    fn test_zero_ttl_always_reloads() {
        let (store, _dir) = test_store();
        let catalog = ComponentCatalog::new(store.clone(), Duration::ZERO);
        catalog.load().unwrap();
        insert_component(&store, "entry", "ollie", 20, true);
        assert_eq!(catalog.lookup(Division::Entry, "ollie").unwrap().xp_value, 20);
    }

    #[test]
    fn test_inactive_rows_excluded() {
        let (store, _dir) = test_store();
        insert_component(&store, "grabs", "melan", 30, true);
        insert_component(&store, "grabs", "retired", 10, false);
        let snapshot = read_snapshot(&store).unwrap();
        assert!(snapshot.lookup(Division::Grabs, "melan").is_ok());
        assert!(snapshot.lookup(Division::Grabs, "retired").is_err());
    }
}
