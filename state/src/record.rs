//! The per-item processing record.

use std::collections::BTreeSet;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use gleaner_types::Action;

/// What has been done to one item.
///
/// Invariant: for any (item, action) successfully applied, the action
/// appears in `actions_applied` after the next durable checkpoint, and no
/// later save ever removes it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProcessedRecord {
    /// Actions applied so far, serialized in their canonical string forms.
    pub actions_applied: BTreeSet<Action>,
    pub last_processed: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub metadata: Option<serde_json::Value>,
}

impl ProcessedRecord {
    #[must_use]
    pub fn new(actions: &[Action], at: DateTime<Utc>) -> Self {
        Self {
            actions_applied: actions.iter().cloned().collect(),
            last_processed: at,
            metadata: None,
        }
    }

    /// Union-merge more applied actions and refresh the timestamp.
    pub fn merge(&mut self, actions: &[Action], at: DateTime<Utc>) {
        self.actions_applied.extend(actions.iter().cloned());
        self.last_processed = at;
    }

    /// True iff every required action has been applied.
    #[must_use]
    pub fn covers(&self, required: &[Action]) -> bool {
        required
            .iter()
            .all(|action| self.actions_applied.contains(action))
    }
}
