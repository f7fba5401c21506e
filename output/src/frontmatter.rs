//! YAML frontmatter blocks.
//!
//! Every produced markdown file starts with `---\n<map>\n---\n`. Keys are
//! emitted sorted, string values double-quoted, multi-line values as
//! indented block scalars. Tier-1 keys are required and may not be shadowed
//! by source-specific metadata.

use std::collections::BTreeMap;

use gleaner_types::{Error, Result};
use gleaner_utils::sanitize_yaml_value;

/// Tier-1 keys that must be present and non-empty in every file.
pub const REQUIRED_KEYS: &[&str] = &["title", "source", "created_date", "collected_date"];

/// Tier-1 keys overall; `url` is required only where a canonical URL exists.
pub const TIER1_KEYS: &[&str] = &["title", "source", "created_date", "collected_date", "url"];

const DELIMITER: &str = "---";

/// An ordered frontmatter map.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Frontmatter {
    fields: BTreeMap<String, String>,
}

impl Frontmatter {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set a Tier-1 field.
    pub fn set(&mut self, key: &str, value: impl Into<String>) {
        self.fields.insert(key.to_string(), value.into());
    }

    /// Insert a source-specific field. Collisions with Tier-1 names are
    /// content errors: adapters must namespace their keys.
    pub fn insert_extra(&mut self, key: &str, value: impl Into<String>) -> Result<()> {
        if TIER1_KEYS.contains(&key) {
            return Err(Error::content(format!(
                "source-specific frontmatter key '{key}' collides with a Tier-1 name"
            ))
            .with_context("key", key));
        }
        self.fields.insert(key.to_string(), value.into());
        Ok(())
    }

    #[must_use]
    pub fn get(&self, key: &str) -> Option<&str> {
        self.fields.get(key).map(String::as_str)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.fields.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// Check the Tier-1 contract: required keys present and non-empty.
    pub fn validate(&self) -> Result<()> {
        for key in REQUIRED_KEYS {
            match self.fields.get(*key) {
                Some(value) if !value.trim().is_empty() => {}
                _ => {
                    return Err(Error::content(format!(
                        "frontmatter is missing required field '{key}'"
                    ))
                    .with_context("field", *key));
                }
            }
        }
        Ok(())
    }

    /// Render the `---` delimited block, keys sorted.
    #[must_use]
    pub fn render(&self) -> String {
        let mut out = String::new();
        out.push_str(DELIMITER);
        out.push('\n');
        for (key, value) in &self.fields {
            let clean = sanitize_yaml_value(value);
            if clean.contains('\n') {
                out.push_str(key);
                out.push_str(": |-\n");
                for line in clean.lines() {
                    out.push_str("  ");
                    out.push_str(line);
                    out.push('\n');
                }
            } else {
                out.push_str(key);
                out.push_str(": \"");
                out.push_str(&escape_quoted(&clean));
                out.push_str("\"\n");
            }
        }
        out.push_str(DELIMITER);
        out.push('\n');
        out
    }

    /// Split a document into its frontmatter and body.
    pub fn parse_document(document: &str) -> Result<(Self, &str)> {
        let rest = document.strip_prefix("---\n").ok_or_else(|| {
            Error::content("document has no leading frontmatter delimiter")
        })?;
        let end = rest.find("\n---\n").ok_or_else(|| {
            Error::content("document has no closing frontmatter delimiter")
        })?;

        let yaml = &rest[..end];
        let body = &rest[end + "\n---\n".len()..];

        let parsed: BTreeMap<String, serde_yaml::Value> = serde_yaml::from_str(yaml)
            .map_err(|e| Error::content(format!("frontmatter is not a YAML map: {e}")))?;

        let mut fields = BTreeMap::new();
        for (key, value) in parsed {
            let rendered = match value {
                serde_yaml::Value::String(s) => s,
                serde_yaml::Value::Number(n) => n.to_string(),
                serde_yaml::Value::Bool(b) => b.to_string(),
                serde_yaml::Value::Null => String::new(),
                other => serde_yaml::to_string(&other)
                    .unwrap_or_default()
                    .trim_end()
                    .to_string(),
            };
            fields.insert(key, rendered);
        }

        Ok((Self { fields }, body))
    }

    /// Additive merge for in-place updates: `new` wins on shared keys, keys
    /// only the old block had are preserved.
    #[must_use]
    pub fn merged_additive(old: &Self, new: &Self) -> Self {
        let mut fields = old.fields.clone();
        for (key, value) in &new.fields {
            fields.insert(key.clone(), value.clone());
        }
        Self { fields }
    }
}

fn escape_quoted(value: &str) -> String {
    value.replace('\\', "\\\\").replace('"', "\\\"")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn complete() -> Frontmatter {
        let mut fm = Frontmatter::new();
        fm.set("title", "Weekly Notes");
        fm.set("source", "mail");
        fm.set("created_date", "2024-06-14T08:00:00Z");
        fm.set("collected_date", "2024-06-15T09:30:00Z");
        fm
    }

    #[test]
    fn renders_sorted_quoted_keys() {
        let rendered = complete().render();
        let lines: Vec<&str> = rendered.lines().collect();
        assert_eq!(lines.first(), Some(&"---"));
        assert_eq!(lines.last(), Some(&"---"));
        // BTreeMap ordering: collected_date < created_date < source < title.
        assert!(lines[1].starts_with("collected_date: \""));
        assert!(lines[2].starts_with("created_date: \""));
        assert!(lines[3].starts_with("source: \""));
        assert!(lines[4].starts_with("title: \""));
    }

    #[test]
    fn round_trips_through_parse() {
        let mut fm = complete();
        fm.insert_extra("message_id", "abc-123").unwrap();
        let document = format!("{}\n# Body\n", fm.render());

        let (parsed, body) = Frontmatter::parse_document(&document).unwrap();
        assert_eq!(parsed, fm);
        assert_eq!(body, "\n# Body\n");
    }

    #[test]
    fn multiline_values_render_as_block_scalars() {
        let mut fm = complete();
        fm.set("title", "line one\nline two");
        let rendered = fm.render();
        assert!(rendered.contains("title: |-\n  line one\n  line two\n"));

        let document = format!("{rendered}body");
        let (parsed, _) = Frontmatter::parse_document(&document).unwrap();
        assert_eq!(parsed.get("title"), Some("line one\nline two"));
    }

    #[test]
    fn quotes_and_backslashes_are_escaped() {
        let mut fm = complete();
        fm.set("title", r#"He said "hi" \ bye"#);
        let document = format!("{}body", fm.render());
        let (parsed, _) = Frontmatter::parse_document(&document).unwrap();
        assert_eq!(parsed.get("title"), Some(r#"He said "hi" \ bye"#));
    }

    #[test]
    fn control_characters_are_stripped_from_values() {
        let mut fm = complete();
        fm.set("title", "clean\x1b[31m me");
        let rendered = fm.render();
        assert!(!rendered.contains('\x1b'));
    }

    #[test]
    fn validate_requires_tier1_fields() {
        assert!(complete().validate().is_ok());

        let mut missing = complete();
        missing.fields.remove("source");
        assert_eq!(missing.validate().unwrap_err().code(), "content");

        let mut blank = complete();
        blank.set("title", "   ");
        assert!(blank.validate().is_err());
    }

    #[test]
    fn extra_keys_must_not_shadow_tier1() {
        let mut fm = complete();
        let err = fm.insert_extra("title", "shadow").unwrap_err();
        assert_eq!(err.code(), "content");
        assert!(fm.insert_extra("thread_id", "t1").is_ok());
    }

    #[test]
    fn additive_merge_preserves_old_keys() {
        let mut old = complete();
        old.insert_extra("labels", "inbox").unwrap();

        let mut new = complete();
        new.set("title", "Updated Title");

        let merged = Frontmatter::merged_additive(&old, &new);
        assert_eq!(merged.get("title"), Some("Updated Title"));
        assert_eq!(merged.get("labels"), Some("inbox"));
    }

    #[test]
    fn parse_rejects_documents_without_frontmatter() {
        assert!(Frontmatter::parse_document("# Just a body\n").is_err());
        assert!(Frontmatter::parse_document("---\nunclosed: \"x\"\n").is_err());
    }
}
