//! Filter criteria and the cascade rule.
//!
//! Criteria are plain data here; glob compilation and HTML stripping live in
//! `gleaner-filter`. The cascade combines tool-wide defaults with rule-level
//! overrides: scalar fields use override semantics, keyword lists use union.

use serde::{Deserialize, Serialize};

/// Query-independent content filter criteria.
///
/// Keyword entries are case-insensitive glob patterns (`*`, `?`) matched as
/// substrings of the stripped title + body.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields, default)]
pub struct FilterCriteria {
    /// Reject items older than this many days.
    pub max_age_days: Option<u32>,
    /// Reject items scoring below this. Items without a score are rejected
    /// whenever this is set.
    pub min_score: Option<i64>,
    /// Accept only items matching at least one pattern (empty = accept all).
    pub include_keywords: Vec<String>,
    /// Reject items matching any pattern.
    pub exclude_keywords: Vec<String>,
}

impl FilterCriteria {
    /// Merge tool-wide `defaults` with rule-level `overrides`.
    ///
    /// Scalars: the override wins when present. Keyword lists: union, with
    /// default entries first and duplicates removed. The orchestrator is the
    /// sole caller that materializes an effective filter this way.
    #[must_use]
    pub fn cascade(defaults: &Self, overrides: &Self) -> Self {
        Self {
            max_age_days: overrides.max_age_days.or(defaults.max_age_days),
            min_score: overrides.min_score.or(defaults.min_score),
            include_keywords: union(&defaults.include_keywords, &overrides.include_keywords),
            exclude_keywords: union(&defaults.exclude_keywords, &overrides.exclude_keywords),
        }
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.max_age_days.is_none()
            && self.min_score.is_none()
            && self.include_keywords.is_empty()
            && self.exclude_keywords.is_empty()
    }
}

fn union(first: &[String], second: &[String]) -> Vec<String> {
    let mut merged: Vec<String> = Vec::with_capacity(first.len() + second.len());
    for entry in first.iter().chain(second) {
        if !merged.iter().any(|existing| existing == entry) {
            merged.push(entry.clone());
        }
    }
    merged
}

#[cfg(test)]
mod tests {
    use super::*;

    fn criteria(
        max_age_days: Option<u32>,
        min_score: Option<i64>,
        include: &[&str],
        exclude: &[&str],
    ) -> FilterCriteria {
        FilterCriteria {
            max_age_days,
            min_score,
            include_keywords: include.iter().map(ToString::to_string).collect(),
            exclude_keywords: exclude.iter().map(ToString::to_string).collect(),
        }
    }

    #[test]
    fn scalars_use_override_semantics() {
        let defaults = criteria(Some(30), Some(5), &[], &[]);
        let overrides = criteria(Some(7), None, &[], &[]);
        let effective = FilterCriteria::cascade(&defaults, &overrides);
        assert_eq!(effective.max_age_days, Some(7));
        assert_eq!(effective.min_score, Some(5));
    }

    #[test]
    fn keyword_lists_use_union() {
        let defaults = criteria(None, None, &["*rust*"], &["*promotional*"]);
        let overrides = criteria(None, None, &["*tokio*"], &["*draft*", "*promotional*"]);
        let effective = FilterCriteria::cascade(&defaults, &overrides);
        assert_eq!(effective.include_keywords, vec!["*rust*", "*tokio*"]);
        assert_eq!(effective.exclude_keywords, vec!["*promotional*", "*draft*"]);
    }

    #[test]
    fn cascade_with_empty_overrides_is_identity() {
        let defaults = criteria(Some(14), Some(2), &["*a*"], &["*b*"]);
        let effective = FilterCriteria::cascade(&defaults, &FilterCriteria::default());
        assert_eq!(effective, defaults);
    }

    #[test]
    fn unknown_fields_are_rejected() {
        let err = serde_json::from_str::<FilterCriteria>(r#"{"max_age_days":7,"bogus":1}"#);
        assert!(err.is_err());
    }
}
