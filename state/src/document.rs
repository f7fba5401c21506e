//! JSON document backend for low-volume collectors.
//!
//! The whole store is one JSON file: a schema version, bookkeeping
//! timestamps, an integrity digest, and the `processed_messages` map.
//! Saves go through temp-write + fsync + rename while an exclusive lock
//! file is held, so a crash leaves either the old file or the new one,
//! never a torn mix.

use std::collections::BTreeMap;
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Duration, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use gleaner_types::{Action, Error, Result};
use gleaner_utils::{AtomicWriteOptions, PersistMode, atomic_write_with_options};

use crate::lock::{LOCK_TIMEOUT, LockFile};
use crate::record::ProcessedRecord;
use crate::{RetentionPolicy, StateStore};

const SCHEMA_VERSION: &str = "1.0";

#[derive(Debug, Serialize, Deserialize)]
struct StateFile {
    version: String,
    #[serde(rename = "_created")]
    created: String,
    #[serde(rename = "_last_updated")]
    last_updated: String,
    #[serde(rename = "_integrity_hash")]
    integrity_hash: String,
    /// Kept as a raw value so legacy list-shaped stores can be migrated.
    processed_messages: serde_json::Value,
}

#[derive(Debug)]
pub struct DocumentStore {
    path: PathBuf,
    _lock: LockFile,
    records: BTreeMap<String, ProcessedRecord>,
    created: DateTime<Utc>,
    last_updated: DateTime<Utc>,
    dirty: bool,
}

impl DocumentStore {
    /// Open or create the store, taking the exclusive lock for the store's
    /// lifetime.
    pub fn open(path: &Path) -> Result<Self> {
        let lock = LockFile::acquire(path, LOCK_TIMEOUT)?;

        if !path.exists() {
            let now = Utc::now();
            return Ok(Self {
                path: path.to_path_buf(),
                _lock: lock,
                records: BTreeMap::new(),
                created: now,
                last_updated: now,
                dirty: false,
            });
        }

        let raw = std::fs::read_to_string(path).map_err(|e| {
            Error::state(format!("cannot read state file: {e}"))
                .with_context("path", path.display().to_string())
        })?;
        let parsed: StateFile = serde_json::from_str(&raw).map_err(|e| {
            Error::state(format!("state file is not valid JSON: {e}"))
                .with_context("path", path.display().to_string())
        })?;

        let records = migrate_records(parsed.processed_messages, &parsed.last_updated)?;

        let expected = integrity_hash(&records, &parsed.version);
        if expected != parsed.integrity_hash {
            tracing::warn!(
                path = %path.display(),
                "State file integrity hash mismatch; continuing with parsed contents"
            );
        }

        Ok(Self {
            path: path.to_path_buf(),
            _lock: lock,
            records,
            created: parse_timestamp(&parsed.created),
            last_updated: parse_timestamp(&parsed.last_updated),
            dirty: false,
        })
    }

    #[must_use]
    pub fn records(&self) -> &BTreeMap<String, ProcessedRecord> {
        &self.records
    }
}

impl StateStore for DocumentStore {
    fn is_processed(&self, item_id: &str, required: &[Action]) -> bool {
        self.records
            .get(item_id)
            .is_some_and(|record| record.covers(required))
    }

    fn actions_for(&self, item_id: &str) -> BTreeSet<Action> {
        self.records
            .get(item_id)
            .map(|record| record.actions_applied.clone())
            .unwrap_or_default()
    }

    fn mark_processed(
        &mut self,
        item_id: &str,
        actions: &[Action],
        metadata: Option<serde_json::Value>,
    ) -> Result<()> {
        let now = Utc::now();
        let record = self
            .records
            .entry(item_id.to_string())
            .and_modify(|record| record.merge(actions, now))
            .or_insert_with(|| ProcessedRecord::new(actions, now));
        if metadata.is_some() {
            record.metadata = metadata;
        }
        self.dirty = true;
        Ok(())
    }

    fn bulk_update(&mut self, records: &[(String, Vec<Action>)]) -> Result<()> {
        for (item_id, actions) in records {
            self.mark_processed(item_id, actions, None)?;
        }
        Ok(())
    }

    fn cleanup(&mut self, policy: RetentionPolicy) -> Result<usize> {
        let before = self.records.len();
        match policy {
            RetentionPolicy::KeepCount(keep) => {
                let keep = keep as usize;
                if before > keep {
                    let mut by_age: Vec<(DateTime<Utc>, String)> = self
                        .records
                        .iter()
                        .map(|(id, record)| (record.last_processed, id.clone()))
                        .collect();
                    by_age.sort();
                    for (_, id) in by_age.into_iter().take(before - keep) {
                        self.records.remove(&id);
                    }
                }
            }
            RetentionPolicy::KeepDays(days) => {
                let cutoff = Utc::now() - Duration::days(i64::from(days));
                self.records
                    .retain(|_, record| record.last_processed >= cutoff);
            }
        }

        let removed = before - self.records.len();
        if removed > 0 {
            self.dirty = true;
        }
        Ok(removed)
    }

    fn flush(&mut self) -> Result<()> {
        if !self.dirty {
            return Ok(());
        }

        self.last_updated = Utc::now();
        let file = StateFile {
            version: SCHEMA_VERSION.to_string(),
            created: format_timestamp(self.created),
            last_updated: format_timestamp(self.last_updated),
            integrity_hash: integrity_hash(&self.records, SCHEMA_VERSION),
            processed_messages: serde_json::to_value(&self.records)
                .map_err(|e| Error::state(format!("cannot serialize state: {e}")))?,
        };

        let serialized = serde_json::to_string_pretty(&file)
            .map_err(|e| Error::state(format!("cannot serialize state: {e}")))?;

        let options = AtomicWriteOptions {
            mode: PersistMode::OwnerOnly,
            ..Default::default()
        };
        atomic_write_with_options(&self.path, serialized.as_bytes(), options).map_err(|e| {
            Error::state(format!("cannot write state file: {e}"))
                .with_context("path", self.path.display().to_string())
        })?;

        self.dirty = false;
        Ok(())
    }

    fn len(&self) -> usize {
        self.records.len()
    }
}

impl Drop for DocumentStore {
    fn drop(&mut self) {
        if self.dirty
            && let Err(e) = self.flush()
        {
            tracing::warn!(path = %self.path.display(), "Final state flush failed: {e}");
        }
    }
}

/// SHA-256 over the canonical serialization of the non-underscore keys.
fn integrity_hash(records: &BTreeMap<String, ProcessedRecord>, version: &str) -> String {
    let payload = serde_json::json!({
        "processed_messages": records,
        "version": version,
    });
    let mut hasher = Sha256::new();
    hasher.update(payload.to_string().as_bytes());
    format!("{:x}", hasher.finalize())
}

/// Accept both the current map shape and legacy list shapes.
///
/// Legacy stores kept `processed_messages` as a plain list of item ids (or
/// id → timestamp pairs); those records are assumed to have had `save`
/// applied.
fn migrate_records(
    value: serde_json::Value,
    fallback_timestamp: &str,
) -> Result<BTreeMap<String, ProcessedRecord>> {
    let fallback = parse_timestamp(fallback_timestamp);

    match value {
        serde_json::Value::Object(map) => {
            let mut records = BTreeMap::new();
            for (item_id, entry) in map {
                let record = match entry {
                    serde_json::Value::Object(_) => serde_json::from_value(entry).map_err(|e| {
                        Error::state(format!("malformed record for '{item_id}': {e}"))
                            .with_context("item_id", item_id.clone())
                    })?,
                    // Legacy: value was a bare timestamp string.
                    serde_json::Value::String(ts) => ProcessedRecord::new(
                        &[Action::Save],
                        chrono::DateTime::parse_from_rfc3339(&ts)
                            .map(|t| t.with_timezone(&Utc))
                            .unwrap_or(fallback),
                    ),
                    _ => {
                        return Err(Error::state(format!(
                            "unrecognized record shape for '{item_id}'"
                        )));
                    }
                };
                records.insert(item_id, record);
            }
            Ok(records)
        }
        // Legacy: a flat list of processed item ids.
        serde_json::Value::Array(ids) => {
            let mut records = BTreeMap::new();
            for entry in ids {
                let serde_json::Value::String(item_id) = entry else {
                    return Err(Error::state("legacy state list contains a non-string id"));
                };
                records.insert(item_id, ProcessedRecord::new(&[Action::Save], fallback));
            }
            Ok(records)
        }
        _ => Err(Error::state("processed_messages has an unrecognized shape")),
    }
}

fn format_timestamp(ts: DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Secs, true)
}

fn parse_timestamp(raw: &str) -> DateTime<Utc> {
    chrono::DateTime::parse_from_rfc3339(raw)
        .map(|t| t.with_timezone(&Utc))
        .unwrap_or_else(|_| Utc::now())
}
