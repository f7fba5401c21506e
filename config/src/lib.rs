//! Configuration loading, environment substitution, and validation.
//!
//! Loading is a three-step boundary: parse the YAML document, resolve
//! `${NAME}` environment references across the whole tree, then convert to
//! the typed [`Config`] with bounds checks. Action strings are parsed into
//! tagged variants here, once; nothing downstream ever re-parses them.

mod env_subst;

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde::Deserialize;

use gleaner_types::{Action, Error, FilterCriteria, Result, Rule, UpdatePolicy};

pub use env_subst::substitute_tree;

/// Bounds for `max_items` (doubles as the per-rule fetch batch size).
const MAX_ITEMS_RANGE: std::ops::RangeInclusive<u32> = 1..=100;

/// Floor for the state retention count; the default matches the recommended
/// minimum of ten thousand records.
const MIN_STATE_RETENTION: u32 = 100;
const DEFAULT_STATE_RETENTION: u32 = 10_000;

const DEFAULT_MAX_ITEMS: u32 = 25;

/// Which state backend a config selects, derived from the file suffix.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StateBackend {
    Document,
    Relational,
}

/// Validated collector configuration.
#[derive(Debug, Clone)]
pub struct Config {
    pub output_dir: PathBuf,
    pub state_file: PathBuf,
    /// Minimum spacing between outbound requests, in seconds.
    pub rate_limit_seconds: f64,
    pub default_filters: FilterCriteria,
    pub state_retention: u32,
    pub rules: Vec<Rule>,
    /// Source-specific credentials, `${ENV_VAR}` references already resolved.
    pub auth: BTreeMap<String, String>,
}

impl Config {
    /// Load, substitute, and validate a config file.
    pub fn load(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path).map_err(|e| {
            Error::config(format!("cannot read config file: {e}"))
                .with_context("path", path.display().to_string())
        })?;
        Self::from_yaml(&raw)
    }

    /// Parse and validate a YAML document.
    pub fn from_yaml(document: &str) -> Result<Self> {
        let mut tree: serde_yaml::Value = serde_yaml::from_str(document)
            .map_err(|e| Error::config(format!("malformed YAML: {e}")))?;

        if !tree.is_mapping() {
            return Err(Error::config("config root must be a mapping"));
        }

        substitute_tree(&mut tree, "")?;

        let raw: RawConfig = serde_yaml::from_value(tree)
            .map_err(|e| Error::config(format!("config does not match schema: {e}")))?;

        raw.validate()
    }

    /// The state backend selected by the `state_file` suffix.
    #[must_use]
    pub fn state_backend(&self) -> StateBackend {
        match self.state_file.extension().and_then(|e| e.to_str()) {
            Some("db" | "sqlite" | "sqlite3") => StateBackend::Relational,
            _ => StateBackend::Document,
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct RawConfig {
    output_dir: PathBuf,
    state_file: PathBuf,
    #[serde(default)]
    rate_limit_seconds: Option<f64>,
    #[serde(default)]
    default_filters: FilterCriteria,
    #[serde(default)]
    state_retention: Option<u32>,
    rules: Vec<RawRule>,
    #[serde(default)]
    auth: BTreeMap<String, String>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct RawRule {
    name: String,
    query: String,
    actions: Vec<String>,
    #[serde(default)]
    max_items: Option<u32>,
    #[serde(default)]
    filters: FilterCriteria,
    #[serde(default)]
    update_policy: Option<UpdatePolicy>,
    #[serde(default)]
    options: BTreeMap<String, serde_yaml::Value>,
}

impl RawConfig {
    fn validate(self) -> Result<Config> {
        let rate_limit_seconds = self.rate_limit_seconds.unwrap_or(0.0);
        if !rate_limit_seconds.is_finite() || rate_limit_seconds < 0.0 {
            return Err(Error::config(format!(
                "rate_limit_seconds must be a non-negative number, got {rate_limit_seconds}"
            ))
            .with_context("path", "rate_limit_seconds"));
        }

        let state_retention = self.state_retention.unwrap_or(DEFAULT_STATE_RETENTION);
        if state_retention < MIN_STATE_RETENTION {
            return Err(Error::config(format!(
                "state_retention must be at least {MIN_STATE_RETENTION}, got {state_retention}"
            ))
            .with_context("path", "state_retention"));
        }

        if self.rules.is_empty() {
            return Err(Error::config("at least one rule is required")
                .with_context("path", "rules"));
        }

        let mut rules = Vec::with_capacity(self.rules.len());
        let mut seen_names: Vec<&str> = Vec::new();
        for (index, raw_rule) in self.rules.iter().enumerate() {
            let rule = convert_rule(raw_rule, index)?;
            if seen_names.contains(&rule.name.as_str()) {
                return Err(Error::config(format!("duplicate rule name '{}'", rule.name))
                    .with_context("path", format!("rules[{index}].name")));
            }
            seen_names.push(&raw_rule.name);
            rules.push(rule);
        }

        Ok(Config {
            output_dir: self.output_dir,
            state_file: self.state_file,
            rate_limit_seconds,
            default_filters: self.default_filters,
            state_retention,
            rules,
            auth: self.auth,
        })
    }
}

fn convert_rule(raw: &RawRule, index: usize) -> Result<Rule> {
    let path = |field: &str| format!("rules[{index}].{field}");

    if raw.name.trim().is_empty() {
        return Err(Error::config("rule name must not be empty").with_context("path", path("name")));
    }

    if raw.actions.is_empty() {
        return Err(Error::config(format!("rule '{}' has no actions", raw.name))
            .with_context("path", path("actions")));
    }

    let mut actions = Vec::with_capacity(raw.actions.len());
    for (action_index, spelled) in raw.actions.iter().enumerate() {
        let action: Action = spelled.parse().map_err(|e| {
            Error::config(format!("rule '{}': {e}", raw.name))
                .with_context("path", format!("rules[{index}].actions[{action_index}]"))
        })?;
        if let Action::Forward(address) = &action {
            gleaner_utils::validate_email_shape(address, &path("actions"))?;
        }
        actions.push(action);
    }

    if let Some(max_items) = raw.max_items
        && !MAX_ITEMS_RANGE.contains(&max_items)
    {
        return Err(Error::config(format!(
            "max_items must be in [{}, {}], got {max_items}",
            MAX_ITEMS_RANGE.start(),
            MAX_ITEMS_RANGE.end()
        ))
        .with_context("path", path("max_items")));
    }

    let mut options = BTreeMap::new();
    for (key, value) in &raw.options {
        let converted = serde_json::to_value(value).map_err(|e| {
            Error::config(format!("option '{key}' is not representable: {e}"))
                .with_context("path", path("options"))
        })?;
        options.insert(key.clone(), converted);
    }

    Ok(Rule {
        name: raw.name.clone(),
        query: raw.query.clone(),
        actions,
        max_items: Some(raw.max_items.unwrap_or(DEFAULT_MAX_ITEMS)),
        filters: raw.filters.clone(),
        update_policy: raw.update_policy.unwrap_or_default(),
        options,
    })
}
