//! Environment-reference substitution with injection defense.
//!
//! Every string in the parsed YAML tree may contain `${NAME}` references.
//! `NAME` must match `[A-Z_][A-Z0-9_]*`; anything else inside `${...}` is an
//! injection error, including nested `${...${...}...}` forms. Substituted
//! values may themselves contain references, resolved up to a depth of 5.

use regex::Regex;
use serde_yaml::Value;
use std::sync::OnceLock;

use gleaner_types::{Error, Result};

/// Maximum recursive resolution depth. A chain deeper than this is treated
/// as a loop.
const MAX_RESOLUTION_DEPTH: usize = 5;

fn env_name_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"^[A-Z_][A-Z0-9_]*$").expect("valid env name regex"))
}

/// Walk the YAML tree, replacing `${NAME}` references in every string.
pub fn substitute_tree(value: &mut Value, path: &str) -> Result<()> {
    match value {
        Value::String(s) => {
            if s.contains("${") {
                *s = resolve_string(s, path)?;
            }
            Ok(())
        }
        Value::Sequence(items) => {
            for (index, item) in items.iter_mut().enumerate() {
                substitute_tree(item, &format!("{path}[{index}]"))?;
            }
            Ok(())
        }
        Value::Mapping(map) => {
            for (key, item) in map.iter_mut() {
                let segment = key.as_str().unwrap_or("?");
                let child_path = if path.is_empty() {
                    segment.to_string()
                } else {
                    format!("{path}.{segment}")
                };
                substitute_tree(item, &child_path)?;
            }
            Ok(())
        }
        _ => Ok(()),
    }
}

fn resolve_string(raw: &str, path: &str) -> Result<String> {
    let mut current = raw.to_string();

    for _ in 0..MAX_RESOLUTION_DEPTH {
        if !current.contains("${") {
            return Ok(current);
        }
        current = substitute_once(&current, path)?;
    }

    if current.contains("${") {
        return Err(Error::injection(format!(
            "environment reference at '{path}' exceeds resolution depth {MAX_RESOLUTION_DEPTH}"
        ))
        .with_context("path", path));
    }
    Ok(current)
}

/// Perform one substitution pass over `input`.
fn substitute_once(input: &str, path: &str) -> Result<String> {
    let mut out = String::with_capacity(input.len());
    let mut rest = input;

    while let Some(start) = rest.find("${") {
        out.push_str(&rest[..start]);
        let after_open = &rest[start + 2..];

        let Some(end) = after_open.find('}') else {
            return Err(Error::injection(format!(
                "unterminated environment reference at '{path}'"
            ))
            .with_context("path", path));
        };

        let name = &after_open[..end];
        if name.contains("${") {
            return Err(Error::injection(format!(
                "nested environment reference at '{path}'"
            ))
            .with_context("path", path));
        }
        if !env_name_pattern().is_match(name) {
            return Err(Error::injection(format!(
                "invalid environment variable name '{name}' at '{path}'"
            ))
            .with_context("path", path)
            .with_context("name", name));
        }

        let value = std::env::var(name).map_err(|_| {
            Error::config(format!(
                "environment variable '{name}' referenced at '{path}' is not set"
            ))
            .with_context("path", path)
            .with_context("name", name)
        })?;
        out.push_str(&value);

        rest = &after_open[end + 1..];
    }

    out.push_str(rest);
    Ok(out)
}
