//! Input shape validators.
//!
//! Pure, thread-safe, idempotent. Failures are `input_validation` security
//! errors carrying the offending field name; callers decide what to do with
//! them (for the runtime that means aborting the run).

use gleaner_types::{Error, Result};

/// Reject values longer than `max` bytes.
pub fn validate_max_length(value: &str, max: usize, field: &str) -> Result<()> {
    if value.len() > max {
        return Err(Error::input_validation(format!(
            "{field} exceeds maximum length of {max} bytes"
        ))
        .with_context("field", field)
        .with_context("length", value.len().to_string()));
    }
    Ok(())
}

/// Check the rough shape of an email address: one `@`, non-empty local part,
/// valid domain. Not an RFC 5321 validator; it exists to catch config typos
/// and obviously hostile input before they reach a source API.
pub fn validate_email_shape(value: &str, field: &str) -> Result<()> {
    validate_max_length(value, 254, field)?;

    let Some((local, domain)) = value.split_once('@') else {
        return Err(shape_error(field, "missing '@'"));
    };
    if local.is_empty() || local.len() > 64 {
        return Err(shape_error(field, "invalid local part"));
    }
    if local.contains(char::is_whitespace) || local.contains('@') {
        return Err(shape_error(field, "invalid local part"));
    }
    validate_domain_shape(domain, field)
}

/// Check the rough shape of a DNS hostname: dot-separated labels of
/// `[A-Za-z0-9-]`, no label starting or ending with `-`, at least two labels.
pub fn validate_domain_shape(value: &str, field: &str) -> Result<()> {
    validate_max_length(value, 253, field)?;

    let labels: Vec<&str> = value.split('.').collect();
    if labels.len() < 2 {
        return Err(shape_error(field, "domain needs at least two labels"));
    }
    for label in &labels {
        let valid = !label.is_empty()
            && label.len() <= 63
            && !label.starts_with('-')
            && !label.ends_with('-')
            && label
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '-');
        if !valid {
            return Err(shape_error(field, "invalid domain label"));
        }
    }
    Ok(())
}

fn shape_error(field: &str, detail: &str) -> Error {
    Error::input_validation(format!("{field}: {detail}")).with_context("field", field)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn max_length_boundary() {
        assert!(validate_max_length("abc", 3, "f").is_ok());
        assert!(validate_max_length("abcd", 3, "f").is_err());
    }

    #[test]
    fn accepts_ordinary_emails() {
        assert!(validate_email_shape("user@example.com", "forward").is_ok());
        assert!(validate_email_shape("a.b-c_d@sub.example.org", "forward").is_ok());
    }

    #[test]
    fn rejects_malformed_emails() {
        for bad in ["", "no-at-sign", "@example.com", "a b@example.com", "x@", "x@nolabel"] {
            assert!(validate_email_shape(bad, "forward").is_err(), "{bad:?}");
        }
    }

    #[test]
    fn rejects_malformed_domains() {
        for bad in ["", "single", "-leading.example.com", "trailing-.com", "sp ace.com", "a..b"] {
            assert!(validate_domain_shape(bad, "host").is_err(), "{bad:?}");
        }
        assert!(validate_domain_shape("api.example.com", "host").is_ok());
    }

    #[test]
    fn errors_carry_field_context() {
        let err = validate_email_shape("broken", "rules[0].forward").unwrap_err();
        assert_eq!(err.code(), "input_validation");
        assert_eq!(
            err.context().get("field").map(String::as_str),
            Some("rules[0].forward")
        );
    }
}
