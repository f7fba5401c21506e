//! Durable at-most-once processing state.
//!
//! Two interchangeable backends share the [`StateStore`] interface: a JSON
//! document store for low-volume collectors and an embedded SQLite store for
//! high-volume ones, selected by the state file's suffix. Both guarantee
//! that a recorded action implies the side effect happened, never the other
//! way around: records are written only after actions succeed, and
//! checkpoints are atomic.
//!
//! The state manager is safe under process crashes and single-process
//! re-entry. Concurrent runs of the same collector against the same state
//! file must serialize through the lock file; the document backend enforces
//! this for the lifetime of the store.

mod document;
mod lock;
mod record;
mod sqlite;

use std::collections::BTreeSet;
use std::path::Path;

use gleaner_types::{Action, Result};

pub use document::DocumentStore;
pub use lock::LockFile;
pub use record::ProcessedRecord;
pub use sqlite::SqliteStore;

/// How [`StateStore::cleanup`] decides what to prune.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetentionPolicy {
    /// Keep the `n` most recently processed records.
    KeepCount(u32),
    /// Drop records last processed more than `n` days ago.
    KeepDays(u32),
}

/// The interface both backends implement.
pub trait StateStore {
    /// True iff every action in `required` is recorded for `item_id`.
    fn is_processed(&self, item_id: &str, required: &[Action]) -> bool;

    /// The actions recorded for `item_id` (empty set when unknown). The
    /// orchestrator uses this to compute the missing subset of a rule's
    /// action list.
    fn actions_for(&self, item_id: &str) -> BTreeSet<Action>;

    /// Union-merge `actions` into the record for `item_id` and refresh its
    /// timestamp. Actions already present stay present: the applied set
    /// only ever grows.
    fn mark_processed(
        &mut self,
        item_id: &str,
        actions: &[Action],
        metadata: Option<serde_json::Value>,
    ) -> Result<()>;

    /// Batch variant of [`mark_processed`](StateStore::mark_processed),
    /// used by the checkpoint path.
    fn bulk_update(&mut self, records: &[(String, Vec<Action>)]) -> Result<()>;

    /// Prune old records according to `policy`. Returns the number removed.
    fn cleanup(&mut self, policy: RetentionPolicy) -> Result<usize>;

    /// Flush pending changes durably. A no-op when nothing changed.
    fn flush(&mut self) -> Result<()>;

    /// Number of records currently tracked.
    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Open the backend selected by the state file suffix: `.db` / `.sqlite` /
/// `.sqlite3` for the relational store, anything else for the document
/// store.
pub fn open_store(
    path: &Path,
    source_type: &str,
    source_name: &str,
) -> Result<Box<dyn StateStore>> {
    match path.extension().and_then(|e| e.to_str()) {
        Some("db" | "sqlite" | "sqlite3") => Ok(Box::new(SqliteStore::open(
            path,
            source_type,
            source_name,
        )?)),
        _ => Ok(Box::new(DocumentStore::open(path)?)),
    }
}
