//! Safe path resolution inside the output directory.
//!
//! Every directory component is validated against a restricted character
//! set before any filesystem call, then the final path is canonicalized and
//! checked for containment, so a hostile rule name or date string can never
//! address anything outside the base.

use std::path::{Path, PathBuf};

use gleaner_types::{Error, Result};

/// Basenames Windows reserves regardless of extension.
const WINDOWS_RESERVED: &[&str] = &[
    "CON", "PRN", "AUX", "NUL", "COM1", "COM2", "COM3", "COM4", "COM5", "COM6", "COM7", "COM8",
    "COM9", "LPT1", "LPT2", "LPT3", "LPT4", "LPT5", "LPT6", "LPT7", "LPT8", "LPT9",
];

/// Validate a single directory component.
pub fn validate_component(component: &str) -> Result<()> {
    if component.is_empty() {
        return Err(Error::path_traversal("empty path component"));
    }
    if component == "." || component.contains("..") {
        return Err(Error::path_traversal(format!(
            "path component '{component}' contains a traversal sequence"
        ))
        .with_context("component", component));
    }
    if component.contains(['/', '\\', '\0', ':']) {
        return Err(Error::path_traversal(format!(
            "path component '{component}' contains a separator"
        ))
        .with_context("component", component));
    }

    let allowed = component
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || matches!(c, '.' | '-' | '_' | ' '));
    if !allowed {
        return Err(Error::input_validation(format!(
            "path component '{component}' contains characters outside the allowed set"
        ))
        .with_context("component", component));
    }

    let stem = component.split('.').next().unwrap_or(component);
    if WINDOWS_RESERVED
        .iter()
        .any(|reserved| stem.eq_ignore_ascii_case(reserved))
    {
        return Err(Error::input_validation(format!(
            "path component '{component}' is a reserved name"
        ))
        .with_context("component", component));
    }

    Ok(())
}

/// Create (if needed) and return a directory inside `base`.
///
/// Components are validated, directories are created with restrictive
/// permissions, symlinks are resolved, and the final path must remain
/// within `base`.
pub fn ensure_folder(base: &Path, source_tag: &str, subsource: Option<&str>) -> Result<PathBuf> {
    validate_component(source_tag)?;
    if let Some(subsource) = subsource {
        validate_component(subsource)?;
    }

    create_dir_restricted(base)?;
    let canonical_base = base.canonicalize().map_err(|e| {
        Error::state(format!("cannot canonicalize output base: {e}"))
            .with_context("path", base.display().to_string())
    })?;

    let mut target = canonical_base.clone();
    target.push(source_tag);
    if let Some(subsource) = subsource {
        target.push(subsource);
    }
    create_dir_restricted(&target)?;

    // Resolve symlinks in the final path and verify containment.
    let canonical_target = target.canonicalize().map_err(|e| {
        Error::state(format!("cannot canonicalize output folder: {e}"))
            .with_context("path", target.display().to_string())
    })?;
    if !canonical_target.starts_with(&canonical_base) {
        return Err(Error::path_traversal(format!(
            "resolved folder '{}' escapes the output directory",
            canonical_target.display()
        ))
        .with_context("base", canonical_base.display().to_string()));
    }

    Ok(canonical_target)
}

fn create_dir_restricted(path: &Path) -> Result<()> {
    std::fs::create_dir_all(path).map_err(|e| {
        Error::state(format!("cannot create directory: {e}"))
            .with_context("path", path.display().to_string())
    })?;

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        let metadata = std::fs::metadata(path).map_err(|e| {
            Error::state(format!("cannot read directory metadata: {e}"))
                .with_context("path", path.display().to_string())
        })?;
        let current_mode = metadata.permissions().mode() & 0o777;
        if current_mode & 0o077 != 0 {
            std::fs::set_permissions(path, std::fs::Permissions::from_mode(0o700)).map_err(
                |e| {
                    Error::state(format!("cannot set directory permissions: {e}"))
                        .with_context("path", path.display().to_string())
                },
            )?;
        }
    }

    Ok(())
}
