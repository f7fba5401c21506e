//! Sanitization of untrusted text destined for the filesystem or YAML.
//!
//! Filenames are reduced to a restricted character class so that no title,
//! however hostile, can escape the output directory or trip up a platform.
//! YAML values are stripped of control characters that would corrupt a
//! frontmatter block.

use std::borrow::Cow;

/// Longest filename stem we will produce, in bytes. Sanitized output is pure
/// ASCII, so bytes and chars coincide.
const MAX_FILENAME_LEN: usize = 120;

/// Basenames Windows reserves regardless of extension.
const WINDOWS_RESERVED: &[&str] = &[
    "CON", "PRN", "AUX", "NUL", "COM1", "COM2", "COM3", "COM4", "COM5", "COM6", "COM7", "COM8",
    "COM9", "LPT1", "LPT2", "LPT3", "LPT4", "LPT5", "LPT6", "LPT7", "LPT8", "LPT9",
];

/// Reduce arbitrary text to a safe filename component.
///
/// The result contains only `[A-Za-z0-9._-]`, never starts with a dot, never
/// contains a path separator or traversal sequence, is capped at 120 bytes,
/// sidesteps Windows reserved basenames, and is never empty.
#[must_use]
pub fn sanitize_filename(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len().min(MAX_FILENAME_LEN));
    let mut last_was_separator = false;

    for c in raw.chars() {
        let mapped = match c {
            'a'..='z' | 'A'..='Z' | '0'..='9' | '.' | '-' | '_' => Some(c),
            c if c.is_whitespace() => Some('_'),
            '/' | '\\' | ':' => Some('_'),
            _ => None,
        };
        if let Some(c) = mapped {
            // Collapse separator runs so "a / b" becomes "a_b", not "a___b".
            let is_separator = c == '_';
            if is_separator && last_was_separator {
                continue;
            }
            last_was_separator = is_separator;
            out.push(c);
        }
    }

    // ".." anywhere is collapsed to a single dot.
    while out.contains("..") {
        out = out.replace("..", ".");
    }
    // No leading dots: "..secret" must not read as traversal or hidden file.
    while out.starts_with(['.', '_']) {
        out.remove(0);
    }
    out.truncate(MAX_FILENAME_LEN);
    while out.ends_with(['.', '_']) {
        out.pop();
    }

    if out.is_empty() {
        return "untitled".to_string();
    }

    let stem = out.split('.').next().unwrap_or(&out);
    if WINDOWS_RESERVED
        .iter()
        .any(|reserved| stem.eq_ignore_ascii_case(reserved))
    {
        return format!("_{out}");
    }

    out
}

/// Strip characters unsafe inside a quoted YAML scalar.
///
/// Removes C0/C1 control characters (escape sequences included) while
/// keeping newlines and tabs, which the frontmatter writer block-indents.
/// Returns `Cow::Borrowed` when nothing needed stripping.
#[must_use]
pub fn sanitize_yaml_value(input: &str) -> Cow<'_, str> {
    let needs_work = input
        .chars()
        .any(|c| is_disallowed_control(c));
    if !needs_work {
        return Cow::Borrowed(input);
    }

    Cow::Owned(
        input
            .chars()
            .filter(|c| !is_disallowed_control(*c))
            .collect(),
    )
}

fn is_disallowed_control(c: char) -> bool {
    let is_c0 = c <= '\x1f' && !matches!(c, '\n' | '\t');
    let is_c1 = ('\u{0080}'..='\u{009f}').contains(&c);
    is_c0 || is_c1 || c == '\x7f'
}
