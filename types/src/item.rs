//! Item references, hydrated items, and collection rules.
//!
//! The reference/hydrated split exists to avoid unnecessary fetches: a
//! reference carries just enough metadata to filter and to consult the state
//! store, a hydrated item carries the full content and is dropped as soon as
//! the item has been persisted.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::action::Action;
use crate::filter::FilterCriteria;

/// A lightweight handle to a source item, produced by enumeration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ItemRef {
    /// Opaque source-local identifier, unique within the source.
    pub id: String,
    pub title: String,
    pub author: Option<String>,
    /// Creation time in UTC. Adapters must normalize naive timestamps to UTC
    /// before constructing the reference.
    pub created_at: DateTime<Utc>,
    /// Score or activity counter, where the source has one.
    pub score: Option<i64>,
    /// Canonical URL, where one exists.
    pub url: Option<String>,
}

/// An attachment surfaced during hydration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Attachment {
    pub filename: String,
    pub data: Vec<u8>,
}

/// A fully loaded item: body, child content, attachments.
///
/// Created by hydration, consumed by the renderer, never retained across
/// items.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HydratedItem {
    pub reference: ItemRef,
    /// Full body, possibly HTML. Stripping happens at the filter/render
    /// boundary, not here.
    pub body: String,
    /// Source-specific metadata destined for the frontmatter. Keys must not
    /// collide with the Tier-1 names.
    pub extra_metadata: BTreeMap<String, String>,
    pub attachments: Vec<Attachment>,
}

impl HydratedItem {
    #[must_use]
    pub fn new(reference: ItemRef, body: impl Into<String>) -> Self {
        Self {
            reference,
            body: body.into(),
            extra_metadata: BTreeMap::new(),
            attachments: Vec::new(),
        }
    }
}

/// What to do when an already-saved item is re-collected with new metadata.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UpdatePolicy {
    /// Replace the file but keep frontmatter keys the new version omits.
    #[default]
    Enrich,
    /// Replace the file wholesale.
    Replace,
}

/// A named collection directive. Immutable for the duration of a run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Rule {
    pub name: String,
    /// Source-specific query string handed verbatim to the adapter.
    pub query: String,
    /// Actions in application order. `save` is always applied first when
    /// present, regardless of position.
    pub actions: Vec<Action>,
    pub max_items: Option<u32>,
    /// Rule-level filter overrides, cascaded with tool defaults by the
    /// orchestrator.
    pub filters: FilterCriteria,
    pub update_policy: UpdatePolicy,
    /// Source-specific knobs, passed through to the adapter untouched.
    pub options: BTreeMap<String, serde_json::Value>,
}

impl Rule {
    /// The actions this rule wants, with `save` hoisted to the front.
    #[must_use]
    pub fn ordered_actions(&self) -> Vec<Action> {
        let mut ordered: Vec<Action> = Vec::with_capacity(self.actions.len());
        if self.actions.contains(&Action::Save) {
            ordered.push(Action::Save);
        }
        for action in &self.actions {
            if *action != Action::Save && !ordered.contains(action) {
                ordered.push(action.clone());
            }
        }
        ordered
    }
}
