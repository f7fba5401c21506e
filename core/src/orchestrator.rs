//! The per-collector orchestration loop.
//!
//! One orchestrator composes an adapter, a state store, the filter engine,
//! and the output manager into the canonical pipeline, executed per rule:
//! enumerate → early filter → state gate → hydrate → late filter → render →
//! persist/execute → record, with a durable checkpoint every few items and
//! at every rule boundary.
//!
//! Errors follow the failure policy matrix: item-scope failures become
//! [`ItemOutcome`] values on the hot path, rule-scope failures abort the
//! current rule, run-scope failures abort the run (after preserving any
//! progress the state store will still accept).

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use chrono::Utc;

use gleaner_config::Config;
use gleaner_filter::{CompiledFilter, ItemView};
use gleaner_output::{OutputManager, WriteOutcome};
use gleaner_state::{RetentionPolicy, StateStore};
use gleaner_types::{
    Action, Error, ErrorKind, FilterCriteria, HydratedItem, ItemRef, Result, Rule, Scope,
};

use crate::adapter::SourceAdapter;
use crate::render::{date_folder, item_filename, render_item};
use crate::summary::{RuleSummary, RunSummary};

/// Items between durable checkpoints within a rule.
pub const CHECKPOINT_INTERVAL: usize = 10;

#[derive(Debug, Clone)]
pub struct RunOptions {
    /// Stop before any outbound mutation and any disk write.
    pub dry_run: bool,
    pub checkpoint_interval: usize,
}

impl Default for RunOptions {
    fn default() -> Self {
        Self {
            dry_run: false,
            checkpoint_interval: CHECKPOINT_INTERVAL,
        }
    }
}

/// Terminal state of one item within one run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ItemOutcome {
    /// Rejected by the early or late filter.
    FilteredOut,
    /// Every required action was already recorded.
    Skipped,
    /// Dry run stopped before hydration.
    WouldProcess,
    /// An item-scope failure; nothing recorded beyond what succeeded.
    Errored,
    /// Some actions succeeded and were recorded, others failed and will be
    /// retried next run.
    Partial { applied: Vec<Action> },
    /// All missing actions applied and recorded.
    Done { applied: Vec<Action> },
}

pub struct Orchestrator<A: SourceAdapter> {
    adapter: A,
    state: Box<dyn StateStore>,
    output: OutputManager,
    config: Config,
    options: RunOptions,
    cancel: Arc<AtomicBool>,
}

impl<A: SourceAdapter> Orchestrator<A> {
    /// Build the orchestrator, rejecting rules whose actions fall outside
    /// the adapter's declared capabilities.
    pub fn new(
        adapter: A,
        config: Config,
        state: Box<dyn StateStore>,
        output: OutputManager,
        options: RunOptions,
    ) -> Result<Self> {
        for rule in &config.rules {
            for action in &rule.actions {
                if *action == Action::Save {
                    continue;
                }
                if !adapter.capabilities().contains(&action.kind()) {
                    return Err(Error::config(format!(
                        "rule '{}' uses action '{action}', which source '{}' does not support",
                        rule.name,
                        adapter.source_tag(),
                    ))
                    .with_context("rule", &rule.name)
                    .with_context("action", action.to_string()));
                }
            }
        }

        Ok(Self {
            adapter,
            state,
            output,
            config,
            options,
            cancel: Arc::new(AtomicBool::new(false)),
        })
    }

    /// Flag polled between items; setting it finishes the in-flight item,
    /// checkpoints, and returns.
    #[must_use]
    pub fn cancel_flag(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.cancel)
    }

    /// Execute every rule in order and return the run summary.
    pub async fn run(&mut self) -> Result<RunSummary> {
        let mut summary = RunSummary::default();
        let rules = self.config.rules.clone();

        for rule in &rules {
            if self.cancel.load(Ordering::Relaxed) {
                tracing::info!("Cancellation requested; stopping before rule '{}'", rule.name);
                break;
            }

            match self.run_rule(rule).await {
                Ok(rule_summary) => summary.absorb(&rule.name, rule_summary),
                Err(error) => match error.scope() {
                    // Item-scope errors are handled inside the rule loop;
                    // one surfacing here means enumeration failed, which
                    // ends the rule either way.
                    Scope::Item | Scope::Rule => {
                        tracing::warn!(
                            rule = %rule.name,
                            code = error.code(),
                            "Aborting rule: {error}"
                        );
                        summary.absorb(&rule.name, RuleSummary::default());
                    }
                    Scope::Run => {
                        tracing::error!(code = error.code(), "Aborting run: {error}");
                        // Preserve progress unless it is the state store
                        // itself that failed.
                        if !matches!(error.kind(), ErrorKind::State) {
                            self.checkpoint()?;
                        }
                        return Err(error);
                    }
                },
            }
        }

        self.checkpoint()?;
        if !self.options.dry_run {
            self.state
                .cleanup(RetentionPolicy::KeepCount(self.config.state_retention))?;
            self.state.flush()?;
        }
        Ok(summary)
    }

    async fn run_rule(&mut self, rule: &Rule) -> Result<RuleSummary> {
        // The sole place the effective filter is materialized.
        let effective = FilterCriteria::cascade(&self.config.default_filters, &rule.filters);
        let filter = CompiledFilter::compile(effective)?;
        let actions = rule.ordered_actions();

        tracing::debug!(rule = %rule.name, query = %rule.query, "Enumerating rule");
        let mut references = self.adapter.enumerate(rule).await?;
        if let Some(max_items) = rule.max_items {
            references.truncate(max_items as usize);
        }

        let mut rule_summary = RuleSummary {
            enumerated: references.len(),
            ..Default::default()
        };
        let mut since_checkpoint = 0usize;

        for reference in references {
            if self.cancel.load(Ordering::Relaxed) {
                tracing::info!(rule = %rule.name, "Cancellation requested; stopping rule");
                break;
            }

            let outcome = self
                .process_item(rule, &filter, &actions, &reference)
                .await;

            let outcome = match outcome {
                Ok(outcome) => outcome,
                Err(error) => {
                    // Rule- and run-scope failures end the rule here; the
                    // caller decides whether the run survives.
                    self.state.flush()?;
                    return Err(error);
                }
            };

            match &outcome {
                ItemOutcome::FilteredOut => rule_summary.filtered += 1,
                ItemOutcome::Skipped => rule_summary.skipped += 1,
                ItemOutcome::WouldProcess => rule_summary.would_process += 1,
                ItemOutcome::Errored => rule_summary.errored += 1,
                ItemOutcome::Partial { applied } => {
                    rule_summary.partial += 1;
                    rule_summary.count_actions(applied);
                    if applied.contains(&Action::Save) {
                        rule_summary.saved += 1;
                    }
                }
                ItemOutcome::Done { applied } => {
                    rule_summary.count_actions(applied);
                    if applied.contains(&Action::Save) {
                        rule_summary.saved += 1;
                    }
                }
            }

            since_checkpoint += 1;
            if since_checkpoint >= self.options.checkpoint_interval {
                self.state.flush()?;
                since_checkpoint = 0;
            }
        }

        // Checkpoint at every rule boundary.
        self.state.flush()?;
        Ok(rule_summary)
    }

    /// Drive one item through the state machine. Item-scope failures come
    /// back as [`ItemOutcome::Errored`]; anything broader is an `Err`.
    async fn process_item(
        &mut self,
        rule: &Rule,
        filter: &CompiledFilter,
        actions: &[Action],
        reference: &ItemRef,
    ) -> Result<ItemOutcome> {
        let reference_view = ItemView {
            title: &reference.title,
            body: "",
            created_at: reference.created_at,
            score: reference.score,
        };
        if !filter.accepts_reference(&reference_view) {
            tracing::debug!(item = %reference.id, "Filtered out by reference metadata");
            return Ok(ItemOutcome::FilteredOut);
        }

        // State gate: proceed with only the missing subset.
        let recorded = self.state.actions_for(&reference.id);
        let missing: Vec<Action> = actions
            .iter()
            .filter(|action| !recorded.contains(action))
            .cloned()
            .collect();
        if missing.is_empty() {
            tracing::debug!(item = %reference.id, "All actions already recorded; skipping");
            return Ok(ItemOutcome::Skipped);
        }

        if self.options.dry_run {
            tracing::info!(
                item = %reference.id,
                actions = %join_actions(&missing),
                "Dry run: would process"
            );
            return Ok(ItemOutcome::WouldProcess);
        }

        let item = match self.adapter.hydrate(reference).await {
            Ok(item) => item,
            Err(error) if error.scope() == Scope::Item => {
                tracing::warn!(item = %reference.id, code = error.code(), "Hydration failed: {error}");
                return Ok(ItemOutcome::Errored);
            }
            Err(error) => return Err(error),
        };

        let full_view = ItemView {
            title: &item.reference.title,
            body: &item.body,
            created_at: item.reference.created_at,
            score: item.reference.score,
        };
        if !filter.accepts(&full_view) {
            tracing::debug!(item = %reference.id, "Filtered out after hydration");
            return Ok(ItemOutcome::FilteredOut);
        }

        self.apply_actions(rule, &missing, &item).await
    }

    /// Apply the missing actions in order. `save` always runs first and is
    /// item-fatal; failures of the remaining actions are isolated from one
    /// another. Whatever succeeded is recorded, even when a broader error
    /// forces the rule to stop.
    async fn apply_actions(
        &mut self,
        rule: &Rule,
        missing: &[Action],
        item: &HydratedItem,
    ) -> Result<ItemOutcome> {
        let mut applied: Vec<Action> = Vec::with_capacity(missing.len());
        let mut failed = false;

        for action in missing {
            let result = match action {
                Action::Save => self.save_item(rule, item),
                other => self.adapter.execute(other, item).await,
            };

            match result {
                Ok(()) => applied.push(action.clone()),
                Err(error) if error.scope() == Scope::Item => {
                    tracing::warn!(
                        item = %item.reference.id,
                        action = %action,
                        code = error.code(),
                        "Action failed: {error}"
                    );
                    if *action == Action::Save {
                        // Nothing depends on a file that was never written.
                        return Ok(ItemOutcome::Errored);
                    }
                    failed = true;
                }
                Err(error) => {
                    // Record what did succeed before the rule aborts, so
                    // the next run retries only the remainder.
                    if !applied.is_empty() {
                        self.state.mark_processed(&item.reference.id, &applied, None)?;
                    }
                    return Err(error);
                }
            }
        }

        if applied.is_empty() {
            return Ok(ItemOutcome::Errored);
        }

        self.state.mark_processed(&item.reference.id, &applied, None)?;
        if failed {
            Ok(ItemOutcome::Partial { applied })
        } else {
            Ok(ItemOutcome::Done { applied })
        }
    }

    /// The universal `save` action: render and persist markdown plus any
    /// attachments.
    fn save_item(&mut self, rule: &Rule, item: &HydratedItem) -> Result<()> {
        let (frontmatter, body) = render_item(item, self.adapter.source_tag(), Utc::now())?;

        let folder = self
            .output
            .ensure_folder(&rule.name, Some(&date_folder(&item.reference)))?;
        let path = folder.join(item_filename(&item.reference));

        let outcome = self
            .output
            .persist_markdown(&path, &frontmatter, &body, rule.update_policy)?;
        if outcome == WriteOutcome::Unchanged {
            tracing::debug!(item = %item.reference.id, "File already up to date");
        }

        for attachment in &item.attachments {
            self.output.persist_attachment(
                &item.reference.id,
                &attachment.filename,
                &attachment.data,
            )?;
        }
        Ok(())
    }

    fn checkpoint(&mut self) -> Result<()> {
        self.state.flush()
    }

    /// Consume the orchestrator, returning the adapter (useful in tests).
    pub fn into_adapter(self) -> A {
        self.adapter
    }
}

fn join_actions(actions: &[Action]) -> String {
    actions
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(",")
}
