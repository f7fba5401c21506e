//! Embedded SQLite backend for high-volume collectors.
//!
//! A single-file database with `processed_items` keyed by `item_id` and
//! indexed by source. Updates run in ordinary transactions with WAL and
//! full synchronous mode, so durability comes from SQLite itself and
//! [`StateStore::flush`] has nothing left to do.

use std::collections::BTreeSet;
use std::path::Path;

use chrono::{SecondsFormat, Utc};
use rusqlite::{Connection, params};

use gleaner_types::{Action, Error, Result};

use crate::{RetentionPolicy, StateStore};

#[derive(Debug)]
pub struct SqliteStore {
    db: Connection,
    source_type: String,
    source_name: String,
}

impl SqliteStore {
    const SCHEMA: &'static str = "
        CREATE TABLE IF NOT EXISTS processed_items (
            item_id TEXT PRIMARY KEY,
            source_type TEXT NOT NULL,
            source_name TEXT NOT NULL,
            actions_applied TEXT NOT NULL,
            processed_timestamp TEXT NOT NULL,
            metadata_json TEXT,
            created_at TEXT DEFAULT CURRENT_TIMESTAMP
        );

        CREATE INDEX IF NOT EXISTS idx_source_type
        ON processed_items(source_type);

        CREATE INDEX IF NOT EXISTS idx_source_name
        ON processed_items(source_name);
    ";

    /// Open or create the database with hardened file permissions.
    pub fn open(path: &Path, source_type: &str, source_name: &str) -> Result<Self> {
        prepare_db_path(path)?;
        let db = Connection::open(path).map_err(|e| {
            Error::state(format!("cannot open state database: {e}"))
                .with_context("path", path.display().to_string())
        })?;
        Self::initialize(db, source_type, source_name)
    }

    /// In-memory store for tests.
    pub fn open_in_memory(source_type: &str, source_name: &str) -> Result<Self> {
        let db = Connection::open_in_memory()
            .map_err(|e| Error::state(format!("cannot open in-memory state database: {e}")))?;
        Self::initialize(db, source_type, source_name)
    }

    fn initialize(db: Connection, source_type: &str, source_name: &str) -> Result<Self> {
        db.execute_batch("PRAGMA journal_mode=WAL; PRAGMA synchronous=FULL;")
            .map_err(|e| Error::state(format!("cannot set state database pragmas: {e}")))?;
        db.execute_batch(Self::SCHEMA)
            .map_err(|e| Error::state(format!("cannot create state schema: {e}")))?;
        Ok(Self {
            db,
            source_type: source_type.to_string(),
            source_name: source_name.to_string(),
        })
    }

    fn recorded_actions(&self, item_id: &str) -> Option<BTreeSet<Action>> {
        let raw: Option<String> = self
            .db
            .query_row(
                "SELECT actions_applied FROM processed_items WHERE item_id = ?1",
                [item_id],
                |row| row.get(0),
            )
            .ok();
        raw.map(|json| serde_json::from_str(&json).unwrap_or_default())
    }

    fn merged_actions(&self, item_id: &str, actions: &[Action]) -> BTreeSet<Action> {
        let mut merged = self.actions_for(item_id);
        merged.extend(actions.iter().cloned());
        merged
    }

    fn upsert(
        &self,
        item_id: &str,
        actions: &BTreeSet<Action>,
        metadata: Option<&serde_json::Value>,
    ) -> Result<()> {
        let actions_json = serde_json::to_string(actions)
            .map_err(|e| Error::state(format!("cannot serialize actions: {e}")))?;
        let timestamp = Utc::now().to_rfc3339_opts(SecondsFormat::Secs, true);
        let metadata_json = metadata.map(serde_json::Value::to_string);

        self.db
            .execute(
                "INSERT INTO processed_items
                     (item_id, source_type, source_name, actions_applied,
                      processed_timestamp, metadata_json)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)
                 ON CONFLICT(item_id) DO UPDATE SET
                     actions_applied = excluded.actions_applied,
                     processed_timestamp = excluded.processed_timestamp,
                     metadata_json = COALESCE(excluded.metadata_json,
                                              processed_items.metadata_json)",
                params![
                    item_id,
                    &self.source_type,
                    &self.source_name,
                    actions_json,
                    timestamp,
                    metadata_json,
                ],
            )
            .map_err(|e| Error::state(format!("cannot record processed item: {e}")))?;
        Ok(())
    }
}

impl StateStore for SqliteStore {
    fn is_processed(&self, item_id: &str, required: &[Action]) -> bool {
        self.recorded_actions(item_id)
            .is_some_and(|recorded| required.iter().all(|action| recorded.contains(action)))
    }

    fn actions_for(&self, item_id: &str) -> BTreeSet<Action> {
        self.recorded_actions(item_id).unwrap_or_default()
    }

    fn mark_processed(
        &mut self,
        item_id: &str,
        actions: &[Action],
        metadata: Option<serde_json::Value>,
    ) -> Result<()> {
        let merged = self.merged_actions(item_id, actions);
        self.upsert(item_id, &merged, metadata.as_ref())
    }

    fn bulk_update(&mut self, records: &[(String, Vec<Action>)]) -> Result<()> {
        let merged: Vec<(String, BTreeSet<Action>)> = records
            .iter()
            .map(|(item_id, actions)| (item_id.clone(), self.merged_actions(item_id, actions)))
            .collect();

        let tx = self
            .db
            .transaction()
            .map_err(|e| Error::state(format!("cannot start state transaction: {e}")))?;
        {
            let timestamp = Utc::now().to_rfc3339_opts(SecondsFormat::Secs, true);
            let mut stmt = tx
                .prepare(
                    "INSERT INTO processed_items
                         (item_id, source_type, source_name, actions_applied,
                          processed_timestamp)
                     VALUES (?1, ?2, ?3, ?4, ?5)
                     ON CONFLICT(item_id) DO UPDATE SET
                         actions_applied = excluded.actions_applied,
                         processed_timestamp = excluded.processed_timestamp",
                )
                .map_err(|e| Error::state(format!("cannot prepare state update: {e}")))?;

            for (item_id, actions) in &merged {
                let actions_json = serde_json::to_string(actions)
                    .map_err(|e| Error::state(format!("cannot serialize actions: {e}")))?;
                stmt.execute(params![
                    item_id,
                    &self.source_type,
                    &self.source_name,
                    actions_json,
                    timestamp,
                ])
                .map_err(|e| Error::state(format!("cannot record processed item: {e}")))?;
            }
        }
        tx.commit()
            .map_err(|e| Error::state(format!("cannot commit state transaction: {e}")))
    }

    fn cleanup(&mut self, policy: RetentionPolicy) -> Result<usize> {
        let removed = match policy {
            RetentionPolicy::KeepCount(keep) => self
                .db
                .execute(
                    "DELETE FROM processed_items WHERE item_id IN (
                         SELECT item_id FROM processed_items
                         ORDER BY processed_timestamp DESC, item_id
                         LIMIT -1 OFFSET ?1
                     )",
                    [i64::from(keep)],
                )
                .map_err(|e| Error::state(format!("cannot prune state records: {e}")))?,
            RetentionPolicy::KeepDays(days) => {
                let cutoff = (Utc::now() - chrono::Duration::days(i64::from(days)))
                    .to_rfc3339_opts(SecondsFormat::Secs, true);
                self.db
                    .execute(
                        "DELETE FROM processed_items WHERE processed_timestamp < ?1",
                        [cutoff],
                    )
                    .map_err(|e| Error::state(format!("cannot prune state records: {e}")))?
            }
        };
        Ok(removed)
    }

    fn flush(&mut self) -> Result<()> {
        // Transactions already committed; nothing buffered.
        Ok(())
    }

    fn len(&self) -> usize {
        self.db
            .query_row("SELECT COUNT(*) FROM processed_items", [], |row| {
                row.get::<_, i64>(0)
            })
            .unwrap_or(0) as usize
    }
}

/// Create the parent directory and database file with restrictive
/// permissions before SQLite touches them.
fn prepare_db_path(path: &Path) -> Result<()> {
    if let Some(parent) = path.parent()
        && !parent.as_os_str().is_empty()
    {
        std::fs::create_dir_all(parent).map_err(|e| {
            Error::state(format!("cannot create state directory: {e}"))
                .with_context("path", parent.display().to_string())
        })?;
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            let mode = std::fs::metadata(parent)
                .map(|m| m.permissions().mode() & 0o777)
                .unwrap_or(0o700);
            if mode & 0o077 != 0 {
                let _ = std::fs::set_permissions(
                    parent,
                    std::fs::Permissions::from_mode(0o700),
                );
            }
        }
    }

    if !path.exists() {
        #[cfg(unix)]
        {
            use std::os::unix::fs::OpenOptionsExt;
            std::fs::OpenOptions::new()
                .create(true)
                .truncate(false)
                .read(true)
                .write(true)
                .mode(0o600)
                .open(path)
                .map_err(|e| {
                    Error::state(format!("cannot create state database file: {e}"))
                        .with_context("path", path.display().to_string())
                })?;
        }
        #[cfg(not(unix))]
        {
            std::fs::OpenOptions::new()
                .create(true)
                .truncate(false)
                .read(true)
                .write(true)
                .open(path)
                .map_err(|e| {
                    Error::state(format!("cannot create state database file: {e}"))
                        .with_context("path", path.display().to_string())
                })?;
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn store() -> SqliteStore {
        SqliteStore::open_in_memory("mail", "inbox").unwrap()
    }

    #[test]
    fn unknown_items_are_unprocessed() {
        let store = store();
        assert!(!store.is_processed("nope", &[Action::Save]));
        assert!(store.actions_for("nope").is_empty());
    }

    #[test]
    fn mark_then_query_round_trips_actions() {
        let mut store = store();
        store
            .mark_processed("m1", &[Action::Save, Action::Label("x".into())], None)
            .unwrap();

        assert!(store.is_processed("m1", &[Action::Save]));
        assert!(store.is_processed("m1", &[Action::Label("x".into())]));
        assert!(!store.is_processed("m1", &[Action::Label("y".into())]));
    }

    #[test]
    fn actions_accumulate_across_marks() {
        let mut store = store();
        store.mark_processed("m1", &[Action::Save], None).unwrap();
        store.mark_processed("m1", &[Action::Archive], None).unwrap();

        let actions = store.actions_for("m1");
        assert!(actions.contains(&Action::Save));
        assert!(actions.contains(&Action::Archive));
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn metadata_persists_and_is_not_clobbered_by_none() {
        let mut store = store();
        store
            .mark_processed("m1", &[Action::Save], Some(serde_json::json!({"k": 1})))
            .unwrap();
        store.mark_processed("m1", &[Action::Archive], None).unwrap();

        let metadata: Option<String> = store
            .db
            .query_row(
                "SELECT metadata_json FROM processed_items WHERE item_id = 'm1'",
                [],
                |row| row.get(0),
            )
            .unwrap();
        assert_eq!(metadata.as_deref(), Some("{\"k\":1}"));
    }

    #[test]
    fn bulk_update_commits_all_records() {
        let mut store = store();
        let batch = vec![
            ("a".to_string(), vec![Action::Save]),
            ("b".to_string(), vec![Action::Save, Action::Archive]),
        ];
        store.bulk_update(&batch).unwrap();

        assert_eq!(store.len(), 2);
        assert!(store.is_processed("b", &[Action::Archive]));
    }

    #[test]
    fn cleanup_keep_count_prunes_oldest() {
        let mut store = store();
        for i in 0..5 {
            store
                .mark_processed(&format!("m{i}"), &[Action::Save], None)
                .unwrap();
            // Distinct timestamps, oldest first.
            store
                .db
                .execute(
                    "UPDATE processed_items SET processed_timestamp = ?1 WHERE item_id = ?2",
                    params![format!("2024-01-0{}T00:00:00Z", i + 1), format!("m{i}")],
                )
                .unwrap();
        }

        let removed = store.cleanup(RetentionPolicy::KeepCount(2)).unwrap();
        assert_eq!(removed, 3);
        assert!(store.is_processed("m4", &[Action::Save]));
        assert!(store.is_processed("m3", &[Action::Save]));
        assert!(!store.is_processed("m0", &[Action::Save]));
    }

    #[test]
    fn cleanup_keep_days_prunes_stale() {
        let mut store = store();
        store.mark_processed("fresh", &[Action::Save], None).unwrap();
        store.mark_processed("stale", &[Action::Save], None).unwrap();
        store
            .db
            .execute(
                "UPDATE processed_items SET processed_timestamp = '2020-01-01T00:00:00Z'
                 WHERE item_id = 'stale'",
                [],
            )
            .unwrap();

        let removed = store.cleanup(RetentionPolicy::KeepDays(30)).unwrap();
        assert_eq!(removed, 1);
        assert!(store.is_processed("fresh", &[Action::Save]));
    }

    #[test]
    fn on_disk_store_survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("state.db");
        {
            let mut store = SqliteStore::open(&path, "mail", "inbox").unwrap();
            store.mark_processed("m1", &[Action::Save], None).unwrap();
        }
        let store = SqliteStore::open(&path, "mail", "inbox").unwrap();
        assert!(store.is_processed("m1", &[Action::Save]));
    }

    #[cfg(unix)]
    #[test]
    fn database_file_is_owner_only() {
        use std::os::unix::fs::PermissionsExt;

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("state.db");
        let _store = SqliteStore::open(&path, "mail", "inbox").unwrap();

        let mode = std::fs::metadata(&path).unwrap().permissions().mode() & 0o777;
        assert_eq!(mode, 0o600);
    }
}
