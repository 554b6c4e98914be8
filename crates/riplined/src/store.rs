//! Progression database.
//!
//! SQLite-backed storage for the component catalog, user progression,
//! XP ledger, specializations, and the quest graph.
//! Location: /var/lib/ripline/progression.db by default.
//!
//! Schema:
//! - components: catalog rows keyed by (division, component_id)
//! - user_progression: one row per user; level/current cached from xp_total
//! - exp_log: append-only XP events
//! - specializations: one row per (user, track)
//! - quest_nodes: skill-tree definitions with merge columns
//! - quest_completions: attempts keyed by (user, node, attempt_number)

use ripline_common::RiplineError;
use rusqlite::Connection;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard};

/// Default database path for the daemon.
pub const DB_PATH: &str = "/var/lib/ripline/progression.db";

/// SQLite-backed progression store. Cloning shares the same connection, so
/// all writers are serialized through one exclusive handle.
#[derive(Clone)]
pub struct ProgressionStore {
    conn: Arc<Mutex<Connection>>,
    db_path: PathBuf,
}

impl ProgressionStore {
    /// Open or create the store at the default location.
    pub fn open_default() -> Result<Self, RiplineError> {
        Self::open(Path::new(DB_PATH))
    }

    /// Open or create the store at a specific path.
    pub fn open(path: &Path) -> Result<Self, RiplineError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let conn = Connection::open(path)?;

        // WAL mode for concurrent readers (riplinectl) alongside the daemon.
        conn.execute_batch("PRAGMA journal_mode=WAL; PRAGMA foreign_keys=ON;")?;

        let store = Self {
            conn: Arc::new(Mutex::new(conn)),
            db_path: path.to_path_buf(),
        };
        store.init_schema()?;
        Ok(store)
    }

    /// Open the store read-only (for CLI use).
    /// Returns None if the file doesn't exist or can't be opened.
    pub fn open_readonly(path: &Path) -> Option<Self> {
        if !path.exists() {
            return None;
        }
        let conn = Connection::open_with_flags(
            path,
            rusqlite::OpenFlags::SQLITE_OPEN_READ_ONLY,
        )
        .ok()?;
        Some(Self {
            conn: Arc::new(Mutex::new(conn)),
            db_path: path.to_path_buf(),
        })
    }

    pub fn db_path(&self) -> &Path {
        &self.db_path
    }

    /// Exclusive access to the underlying connection. Every transactional
    /// unit of work in the engine runs under this lock, which serializes
    /// concurrent awards against the same rows.
    pub(crate) fn lock(&self) -> MutexGuard<'_, Connection> {
        self.conn.lock().unwrap()
    }

    fn init_schema(&self) -> Result<(), RiplineError> {
        let conn = self.lock();
        conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS components (
                division TEXT NOT NULL,
                component_id TEXT NOT NULL,
                display_name TEXT NOT NULL,
                xp_value INTEGER NOT NULL,
                metadata TEXT,
                active INTEGER NOT NULL DEFAULT 1,
                PRIMARY KEY (division, component_id)
            );

            CREATE TABLE IF NOT EXISTS user_progression (
                user_id TEXT PRIMARY KEY,
                xp_total INTEGER NOT NULL DEFAULT 0,
                xp_current INTEGER NOT NULL DEFAULT 0,
                level INTEGER NOT NULL DEFAULT 1,
                updated_at TEXT NOT NULL
            );

            CREATE TABLE IF NOT EXISTS exp_log (
                id TEXT PRIMARY KEY,
                user_id TEXT NOT NULL,
                video_id TEXT,
                amount INTEGER NOT NULL,
                source TEXT NOT NULL,
                contributions TEXT NOT NULL,
                context TEXT,
                created_at TEXT NOT NULL
            );

            CREATE INDEX IF NOT EXISTS idx_exp_log_user ON exp_log(user_id);
            CREATE INDEX IF NOT EXISTS idx_exp_log_user_video ON exp_log(user_id, video_id);

            CREATE TABLE IF NOT EXISTS specializations (
                user_id TEXT NOT NULL,
                track TEXT NOT NULL,
                level INTEGER NOT NULL DEFAULT 1,
                xp_total INTEGER NOT NULL DEFAULT 0,
                xp_current INTEGER NOT NULL DEFAULT 0,
                tricks_completed INTEGER NOT NULL DEFAULT 0,
                best_trick_id TEXT,
                best_trick_xp INTEGER NOT NULL DEFAULT 0,
                PRIMARY KEY (user_id, track)
            );

            CREATE INDEX IF NOT EXISTS idx_specializations_track
                ON specializations(track, xp_total);

            CREATE TABLE IF NOT EXISTS quest_nodes (
                id TEXT PRIMARY KEY,
                specialization TEXT NOT NULL,
                tier INTEGER NOT NULL,
                position INTEGER NOT NULL,
                branch_type TEXT NOT NULL DEFAULT 'none',
                display_row INTEGER NOT NULL DEFAULT 0,
                prerequisites TEXT NOT NULL DEFAULT '[]',
                merge_left TEXT,
                merge_right TEXT,
                required_for_unlock INTEGER NOT NULL DEFAULT 0,
                xp_bonus INTEGER NOT NULL DEFAULT 0,
                repeatable INTEGER NOT NULL DEFAULT 0,
                is_shared_node INTEGER NOT NULL DEFAULT 0
            );

            CREATE TABLE IF NOT EXISTS quest_completions (
                user_id TEXT NOT NULL,
                node_id TEXT NOT NULL,
                video_id TEXT NOT NULL,
                attempt_number INTEGER NOT NULL,
                xp_awarded INTEGER NOT NULL,
                bonus_awarded INTEGER NOT NULL DEFAULT 0,
                bonus_withheld INTEGER NOT NULL DEFAULT 0,
                completed_at TEXT NOT NULL,
                PRIMARY KEY (user_id, node_id, attempt_number)
            );

            CREATE INDEX IF NOT EXISTS idx_quest_completions_video
                ON quest_completions(user_id, video_id);
            "#,
        )?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_open_creates_schema() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("progression.db");
        let store = ProgressionStore::open(&path).unwrap();
        let conn = store.lock();
        let tables: i64 = conn
            .query_row(
                "SELECT COUNT(*) FROM sqlite_master WHERE type='table' AND name IN
                 ('components','user_progression','exp_log','specializations',
                  'quest_nodes','quest_completions')",
                [],
                |row| row.get(0),
            )
            .unwrap();
        assert_eq!(tables, 6);
    }

    #[test]
    fn test_open_readonly_missing_file() {
        let dir = tempdir().unwrap();
        assert!(ProgressionStore::open_readonly(&dir.path().join("absent.db")).is_none());
    }

    #[test]
    fn test_open_is_idempotent() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("progression.db");
        ProgressionStore::open(&path).unwrap();
        ProgressionStore::open(&path).unwrap();
    }
}
