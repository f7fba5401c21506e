//! Run accounting, printed at the end of every run.

use std::collections::BTreeMap;
use std::fmt;

use gleaner_types::Action;

/// Per-rule counters.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RuleSummary {
    pub enumerated: usize,
    pub saved: usize,
    pub skipped: usize,
    pub filtered: usize,
    pub errored: usize,
    pub partial: usize,
    pub would_process: usize,
    /// Successful applications per action, keyed by canonical string form.
    pub action_counts: BTreeMap<String, usize>,
}

impl RuleSummary {
    pub(crate) fn count_actions(&mut self, actions: &[Action]) {
        for action in actions {
            *self.action_counts.entry(action.to_string()).or_default() += 1;
        }
    }
}

/// Whole-run counters, the user-visible result of a run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunSummary {
    pub rules_processed: usize,
    pub items_saved: usize,
    pub items_skipped: usize,
    pub items_filtered: usize,
    pub items_errored: usize,
    pub items_partial: usize,
    pub items_would_process: usize,
    pub per_rule: BTreeMap<String, RuleSummary>,
}

impl RunSummary {
    pub(crate) fn absorb(&mut self, rule_name: &str, rule: RuleSummary) {
        self.rules_processed += 1;
        self.items_saved += rule.saved;
        self.items_skipped += rule.skipped;
        self.items_filtered += rule.filtered;
        self.items_errored += rule.errored;
        self.items_partial += rule.partial;
        self.items_would_process += rule.would_process;
        self.per_rule.insert(rule_name.to_string(), rule);
    }
}

impl fmt::Display for RunSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "rules processed: {}, items saved: {}, items skipped: {}, \
             items filtered: {}, items errored: {}",
            self.rules_processed,
            self.items_saved,
            self.items_skipped,
            self.items_filtered,
            self.items_errored,
        )?;
        if self.items_would_process > 0 {
            writeln!(f, "dry run: {} item(s) would be processed", self.items_would_process)?;
        }
        for (name, rule) in &self.per_rule {
            let actions: Vec<String> = rule
                .action_counts
                .iter()
                .map(|(action, count)| format!("{action}={count}"))
                .collect();
            writeln!(
                f,
                "  {name}: enumerated={} saved={} skipped={} filtered={} errored={}{}{}",
                rule.enumerated,
                rule.saved,
                rule.skipped,
                rule.filtered,
                rule.errored,
                if rule.partial > 0 {
                    format!(" partial={}", rule.partial)
                } else {
                    String::new()
                },
                if actions.is_empty() {
                    String::new()
                } else {
                    format!(" actions[{}]", actions.join(", "))
                },
            )?;
        }
        Ok(())
    }
}
