//! Shared utilities for Gleaner: atomic IO, filename sanitization, input
//! validation.

mod atomic_write;
mod sanitize;
mod validate;

pub use atomic_write::{AtomicWriteOptions, PersistMode, atomic_write, atomic_write_with_options};
pub use sanitize::{sanitize_filename, sanitize_yaml_value};
pub use validate::{validate_domain_shape, validate_email_shape, validate_max_length};
