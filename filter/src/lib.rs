//! Query-independent content filtering.
//!
//! A [`CompiledFilter`] is built once per rule from the effective (cascaded)
//! criteria and then evaluated against item views. Keyword patterns are
//! case-insensitive globs matched as substrings of the HTML-stripped
//! title + body; age and score are plain threshold checks.

use chrono::{DateTime, Duration, Utc};
use globset::{GlobBuilder, GlobSet, GlobSetBuilder};
use scraper::Html;

use gleaner_types::{Error, FilterCriteria, Result};

/// The fields a filter looks at. Borrowed so callers can evaluate a filter
/// against either a bare reference (empty body) or a hydrated item.
#[derive(Debug, Clone, Copy)]
pub struct ItemView<'a> {
    pub title: &'a str,
    pub body: &'a str,
    pub created_at: DateTime<Utc>,
    pub score: Option<i64>,
}

/// Filter criteria with keyword globs compiled.
#[derive(Debug)]
pub struct CompiledFilter {
    criteria: FilterCriteria,
    include: Option<GlobSet>,
    exclude: Option<GlobSet>,
}

impl CompiledFilter {
    /// Compile the criteria's keyword patterns. Invalid glob syntax is a
    /// config error naming the pattern.
    pub fn compile(criteria: FilterCriteria) -> Result<Self> {
        let include = build_keyword_set(&criteria.include_keywords)?;
        let exclude = build_keyword_set(&criteria.exclude_keywords)?;
        Ok(Self {
            criteria,
            include,
            exclude,
        })
    }

    /// Evaluate against the current wall clock.
    #[must_use]
    pub fn accepts(&self, view: &ItemView<'_>) -> bool {
        self.accepts_at(view, Utc::now())
    }

    /// Early-stage check against reference metadata only.
    ///
    /// Age, score, and exclude patterns can reject an item from its
    /// reference alone (a title that matches an exclude pattern will still
    /// match once the body arrives). Include patterns cannot: a body that
    /// has not been fetched yet might match, so the include decision is
    /// deferred to the late filter.
    #[must_use]
    pub fn accepts_reference(&self, view: &ItemView<'_>) -> bool {
        self.accepts_reference_at(view, Utc::now())
    }

    #[must_use]
    pub fn accepts_reference_at(&self, view: &ItemView<'_>, now: DateTime<Utc>) -> bool {
        let deferred_include = Self {
            criteria: self.criteria.clone(),
            include: None,
            exclude: self.exclude.clone(),
        };
        deferred_include.accepts_at(view, now)
    }

    /// Evaluate with an explicit `now`, so age checks are testable.
    #[must_use]
    pub fn accepts_at(&self, view: &ItemView<'_>, now: DateTime<Utc>) -> bool {
        if let Some(max_age_days) = self.criteria.max_age_days {
            let cutoff = now - Duration::days(i64::from(max_age_days));
            if view.created_at < cutoff {
                return false;
            }
        }

        if let Some(min_score) = self.criteria.min_score {
            // An item without a score cannot prove it clears the bar.
            match view.score {
                Some(score) if score >= min_score => {}
                _ => return false,
            }
        }

        if self.include.is_none() && self.exclude.is_none() {
            return true;
        }

        let haystack = normalize_for_matching(view.title, view.body);

        if let Some(exclude) = &self.exclude
            && exclude.is_match(&haystack)
        {
            return false;
        }

        if let Some(include) = &self.include {
            return include.is_match(&haystack);
        }

        true
    }

    #[must_use]
    pub fn criteria(&self) -> &FilterCriteria {
        &self.criteria
    }
}

fn build_keyword_set(patterns: &[String]) -> Result<Option<GlobSet>> {
    if patterns.is_empty() {
        return Ok(None);
    }

    let mut builder = GlobSetBuilder::new();
    for pattern in patterns {
        // Patterns are anchored nowhere: wrap in `*` for substring semantics.
        let wrapped = format!("*{pattern}*");
        let glob = GlobBuilder::new(&wrapped)
            .case_insensitive(true)
            .literal_separator(false)
            .build()
            .map_err(|e| {
                Error::config(format!("invalid keyword pattern '{pattern}': {e}"))
                    .with_context("pattern", pattern)
            })?;
        builder.add(glob);
    }
    builder.build().map(Some).map_err(|e| {
        Error::config(format!("failed to compile keyword patterns: {e}"))
    })
}

/// Strip HTML and fold whitespace so glob matching sees one flat,
/// space-separated string.
fn normalize_for_matching(title: &str, body: &str) -> String {
    let mut text = String::with_capacity(title.len() + body.len() + 1);
    text.push_str(title);
    text.push(' ');
    text.push_str(&strip_html(body));

    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Extract the text content of an HTML fragment. Plain text passes through.
#[must_use]
pub fn strip_html(input: &str) -> String {
    if !input.contains('<') {
        return input.to_string();
    }

    let fragment = Html::parse_fragment(input);
    fragment
        .root_element()
        .text()
        .collect::<Vec<_>>()
        .join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 6, 15, 12, 0, 0).unwrap()
    }

    fn view_with_title(title: &'static str) -> ItemView<'static> {
        ItemView {
            title,
            body: "",
            created_at: Utc.with_ymd_and_hms(2024, 6, 15, 0, 0, 0).unwrap(),
            score: None,
        }
    }

    fn compile(criteria: FilterCriteria) -> CompiledFilter {
        CompiledFilter::compile(criteria).expect("compile")
    }

    #[test]
    fn empty_filter_accepts_everything() {
        let filter = compile(FilterCriteria::default());
        assert!(filter.accepts_at(&view_with_title("anything"), now()));
    }

    #[test]
    fn age_cutoff_is_inclusive_of_recent_items() {
        let filter = compile(FilterCriteria {
            max_age_days: Some(7),
            ..Default::default()
        });

        let fresh = ItemView {
            created_at: now() - Duration::days(1),
            ..view_with_title("t")
        };
        let stale = ItemView {
            created_at: now() - Duration::days(8),
            ..view_with_title("t")
        };
        assert!(filter.accepts_at(&fresh, now()));
        assert!(!filter.accepts_at(&stale, now()));
    }

    #[test]
    fn min_score_rejects_missing_scores() {
        let filter = compile(FilterCriteria {
            min_score: Some(10),
            ..Default::default()
        });

        let scored = ItemView {
            score: Some(10),
            ..view_with_title("t")
        };
        let low = ItemView {
            score: Some(9),
            ..view_with_title("t")
        };
        let unscored = view_with_title("t");
        assert!(filter.accepts_at(&scored, now()));
        assert!(!filter.accepts_at(&low, now()));
        assert!(!filter.accepts_at(&unscored, now()));
    }

    #[test]
    fn include_keywords_match_any() {
        let filter = compile(FilterCriteria {
            include_keywords: vec!["*rust*".into(), "*tokio*".into()],
            ..Default::default()
        });

        assert!(filter.accepts_at(&view_with_title("Learning Rust fast"), now()));
        assert!(filter.accepts_at(&view_with_title("tokio internals"), now()));
        assert!(!filter.accepts_at(&view_with_title("Python news"), now()));
    }

    #[test]
    fn exclude_keywords_reject_any() {
        let filter = compile(FilterCriteria {
            exclude_keywords: vec!["*promotional*".into(), "*draft*".into()],
            ..Default::default()
        });

        assert!(!filter.accepts_at(&view_with_title("Q4 promotional"), now()));
        assert!(!filter.accepts_at(&view_with_title("Final draft"), now()));
        assert!(filter.accepts_at(&view_with_title("Summary"), now()));
    }

    #[test]
    fn exclude_wins_over_include() {
        let filter = compile(FilterCriteria {
            include_keywords: vec!["*report*".into()],
            exclude_keywords: vec!["*draft*".into()],
            ..Default::default()
        });

        assert!(!filter.accepts_at(&view_with_title("draft report"), now()));
        assert!(filter.accepts_at(&view_with_title("final report"), now()));
    }

    #[test]
    fn matching_is_case_insensitive() {
        let filter = compile(FilterCriteria {
            include_keywords: vec!["*RUST*".into()],
            ..Default::default()
        });
        assert!(filter.accepts_at(&view_with_title("rust weekly"), now()));
    }

    #[test]
    fn question_mark_matches_single_character() {
        let filter = compile(FilterCriteria {
            include_keywords: vec!["*v?.0*".into()],
            ..Default::default()
        });
        assert!(filter.accepts_at(&view_with_title("release v2.0 notes"), now()));
        assert!(!filter.accepts_at(&view_with_title("release v10 notes"), now()));
    }

    #[test]
    fn html_is_stripped_before_matching() {
        let filter = compile(FilterCriteria {
            exclude_keywords: vec!["*unsubscribe*".into()],
            ..Default::default()
        });

        let html_body = ItemView {
            body: "<p>Click <a href=\"#\">unsub<b>scribe</b></a> here</p>",
            ..view_with_title("newsletter")
        };
        // Tag removal joins "unsub" and "scribe" with a space, so the
        // pattern must not match across the boundary.
        assert!(filter.accepts_at(&html_body, now()));

        let html_plain = ItemView {
            body: "<p>Click <em>unsubscribe</em> here</p>",
            ..view_with_title("newsletter")
        };
        assert!(!filter.accepts_at(&html_plain, now()));
    }

    #[test]
    fn body_participates_in_matching() {
        let filter = compile(FilterCriteria {
            include_keywords: vec!["*needle*".into()],
            ..Default::default()
        });
        let with_body = ItemView {
            body: "a haystack with a needle inside",
            ..view_with_title("title only")
        };
        assert!(filter.accepts_at(&with_body, now()));
    }

    #[test]
    fn reference_check_defers_include_but_not_exclude() {
        let filter = compile(FilterCriteria {
            include_keywords: vec!["*needle*".into()],
            exclude_keywords: vec!["*spam*".into()],
            ..Default::default()
        });

        // Title alone lacks the include keyword, but the body might not.
        let undecided = view_with_title("ordinary title");
        assert!(filter.accepts_reference_at(&undecided, now()));
        assert!(!filter.accepts_at(&undecided, now()));

        // An excluded title stays excluded once the body arrives.
        let excluded = view_with_title("pure spam here");
        assert!(!filter.accepts_reference_at(&excluded, now()));
    }

    #[test]
    fn invalid_pattern_is_config_error() {
        let err = CompiledFilter::compile(FilterCriteria {
            include_keywords: vec!["[unclosed".into()],
            ..Default::default()
        })
        .unwrap_err();
        assert_eq!(err.code(), "config");
    }

    #[test]
    fn strip_html_handles_plain_text() {
        assert_eq!(strip_html("no tags here"), "no tags here");
        assert!(strip_html("<div><p>hello</p><p>world</p></div>").contains("hello"));
    }
}
