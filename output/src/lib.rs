//! Safe filesystem materialization of markdown with frontmatter.
//!
//! The output manager owns everything between "rendered content" and "file
//! on disk": folder resolution inside the base directory, atomic writes,
//! and in-place updates that preserve previously collected metadata.

mod frontmatter;
mod paths;

use std::path::{Path, PathBuf};

use gleaner_types::{Error, Result, UpdatePolicy};
use gleaner_utils::{atomic_write, sanitize_filename};

pub use frontmatter::{Frontmatter, REQUIRED_KEYS, TIER1_KEYS};
pub use paths::{ensure_folder, validate_component};

/// What a persist call did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteOutcome {
    Created,
    Updated,
    /// The file already held exactly this content; nothing was written.
    Unchanged,
}

#[derive(Debug, Clone)]
pub struct OutputManager {
    base: PathBuf,
}

impl OutputManager {
    /// Create the manager, establishing the base directory.
    pub fn new(base: impl Into<PathBuf>) -> Result<Self> {
        let base = base.into();
        std::fs::create_dir_all(&base).map_err(|e| {
            Error::state(format!("cannot create output directory: {e}"))
                .with_context("path", base.display().to_string())
        })?;
        Ok(Self { base })
    }

    #[must_use]
    pub fn base(&self) -> &Path {
        &self.base
    }

    /// Resolve `<base>/<source_tag>[/<subsource>]`, creating it safely.
    pub fn ensure_folder(&self, source_tag: &str, subsource: Option<&str>) -> Result<PathBuf> {
        ensure_folder(&self.base, source_tag, subsource)
    }

    /// Write or update a markdown document at `path`.
    ///
    /// New files are written atomically. Existing files are replaced
    /// according to `policy`: `Enrich` keeps frontmatter keys the new
    /// version omits, `Replace` does not. Identical content is left alone.
    pub fn persist_markdown(
        &self,
        path: &Path,
        frontmatter: &Frontmatter,
        body: &str,
        policy: UpdatePolicy,
    ) -> Result<WriteOutcome> {
        frontmatter.validate()?;
        self.check_containment(path)?;

        let existing = match std::fs::read_to_string(path) {
            Ok(content) => Some(content),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => None,
            Err(e) => {
                return Err(Error::state(format!("cannot read existing file: {e}"))
                    .with_context("path", path.display().to_string()));
            }
        };

        let effective = match (&existing, policy) {
            (Some(old), UpdatePolicy::Enrich) => {
                match Frontmatter::parse_document(old) {
                    Ok((old_frontmatter, _)) => {
                        Frontmatter::merged_additive(&old_frontmatter, frontmatter)
                    }
                    // An unparseable predecessor is replaced outright.
                    Err(_) => frontmatter.clone(),
                }
            }
            _ => frontmatter.clone(),
        };

        let document = compose_document(&effective, body);
        if existing.as_deref() == Some(document.as_str()) {
            return Ok(WriteOutcome::Unchanged);
        }

        let outcome = if existing.is_some() {
            WriteOutcome::Updated
        } else {
            WriteOutcome::Created
        };

        atomic_write(path, document.as_bytes()).map_err(|e| {
            Error::state(format!("cannot write markdown file: {e}"))
                .with_context("path", path.display().to_string())
        })?;
        tracing::debug!(path = %path.display(), ?outcome, "Persisted markdown");
        Ok(outcome)
    }

    /// Write an attachment under `<base>/attachments/<item_id>/`.
    pub fn persist_attachment(
        &self,
        item_id: &str,
        filename: &str,
        data: &[u8],
    ) -> Result<PathBuf> {
        let folder = ensure_folder(&self.base, "attachments", Some(&sanitize_filename(item_id)))?;
        let path = folder.join(sanitize_filename(filename));

        atomic_write(&path, data).map_err(|e| {
            Error::state(format!("cannot write attachment: {e}"))
                .with_context("path", path.display().to_string())
        })?;
        Ok(path)
    }

    /// Reject any target path that escapes the base directory. The parent
    /// must already exist (it comes out of [`ensure_folder`]).
    fn check_containment(&self, path: &Path) -> Result<()> {
        let parent = path
            .parent()
            .ok_or_else(|| Error::path_traversal("target path has no parent"))?;
        let canonical_parent = parent.canonicalize().map_err(|e| {
            Error::state(format!("cannot canonicalize target folder: {e}"))
                .with_context("path", parent.display().to_string())
        })?;
        let canonical_base = self.base.canonicalize().map_err(|e| {
            Error::state(format!("cannot canonicalize output base: {e}"))
                .with_context("path", self.base.display().to_string())
        })?;

        if !canonical_parent.starts_with(&canonical_base) {
            return Err(Error::path_traversal(format!(
                "target '{}' escapes the output directory",
                path.display()
            )));
        }

        if let Some(name) = path.file_name().and_then(|n| n.to_str()) {
            if name.contains("..") {
                return Err(Error::path_traversal("filename contains a traversal sequence"));
            }
        } else {
            return Err(Error::path_traversal("filename is not valid UTF-8"));
        }

        Ok(())
    }
}

fn compose_document(frontmatter: &Frontmatter, body: &str) -> String {
    let mut document = frontmatter.render();
    document.push('\n');
    document.push_str(body);
    if !document.ends_with('\n') {
        document.push('\n');
    }
    document
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tier1() -> Frontmatter {
        let mut fm = Frontmatter::new();
        fm.set("title", "A Title");
        fm.set("source", "board");
        fm.set("created_date", "2024-06-14T08:00:00Z");
        fm.set("collected_date", "2024-06-15T09:30:00Z");
        fm.set("url", "https://example.com/post/1");
        fm
    }

    fn manager() -> (tempfile::TempDir, OutputManager) {
        let dir = tempfile::tempdir().unwrap();
        let manager = OutputManager::new(dir.path().join("corpus")).unwrap();
        (dir, manager)
    }

    #[test]
    fn creates_a_parseable_document() {
        let (_dir, manager) = manager();
        let folder = manager.ensure_folder("rule", Some("2024-06-15")).unwrap();
        let path = folder.join("doc.md");

        let outcome = manager
            .persist_markdown(&path, &tier1(), "# Hello\n", UpdatePolicy::Enrich)
            .unwrap();
        assert_eq!(outcome, WriteOutcome::Created);

        let content = std::fs::read_to_string(&path).unwrap();
        let (parsed, body) = Frontmatter::parse_document(&content).unwrap();
        assert_eq!(parsed.get("title"), Some("A Title"));
        assert_eq!(body.trim(), "# Hello");
    }

    #[test]
    fn rewrite_with_identical_content_is_unchanged() {
        let (_dir, manager) = manager();
        let folder = manager.ensure_folder("rule", None).unwrap();
        let path = folder.join("doc.md");

        manager
            .persist_markdown(&path, &tier1(), "body", UpdatePolicy::Enrich)
            .unwrap();
        let before = std::fs::read(&path).unwrap();

        let outcome = manager
            .persist_markdown(&path, &tier1(), "body", UpdatePolicy::Enrich)
            .unwrap();
        assert_eq!(outcome, WriteOutcome::Unchanged);
        assert_eq!(std::fs::read(&path).unwrap(), before);
    }

    #[test]
    fn enrich_preserves_omitted_keys() {
        let (_dir, manager) = manager();
        let folder = manager.ensure_folder("rule", None).unwrap();
        let path = folder.join("doc.md");

        let mut first = tier1();
        first.insert_extra("labels", "inbox, starred").unwrap();
        manager
            .persist_markdown(&path, &first, "v1", UpdatePolicy::Enrich)
            .unwrap();

        let second = tier1();
        let outcome = manager
            .persist_markdown(&path, &second, "v2", UpdatePolicy::Enrich)
            .unwrap();
        assert_eq!(outcome, WriteOutcome::Updated);

        let content = std::fs::read_to_string(&path).unwrap();
        let (parsed, body) = Frontmatter::parse_document(&content).unwrap();
        assert_eq!(parsed.get("labels"), Some("inbox, starred"));
        assert_eq!(body.trim(), "v2");
    }

    #[test]
    fn replace_drops_omitted_keys() {
        let (_dir, manager) = manager();
        let folder = manager.ensure_folder("rule", None).unwrap();
        let path = folder.join("doc.md");

        let mut first = tier1();
        first.insert_extra("labels", "inbox").unwrap();
        manager
            .persist_markdown(&path, &first, "v1", UpdatePolicy::Replace)
            .unwrap();

        manager
            .persist_markdown(&path, &tier1(), "v2", UpdatePolicy::Replace)
            .unwrap();

        let content = std::fs::read_to_string(&path).unwrap();
        let (parsed, _) = Frontmatter::parse_document(&content).unwrap();
        assert_eq!(parsed.get("labels"), None);
    }

    #[test]
    fn incomplete_frontmatter_is_rejected() {
        let (_dir, manager) = manager();
        let folder = manager.ensure_folder("rule", None).unwrap();
        let path = folder.join("doc.md");

        let mut incomplete = Frontmatter::new();
        incomplete.set("title", "only a title");
        let err = manager
            .persist_markdown(&path, &incomplete, "body", UpdatePolicy::Enrich)
            .unwrap_err();
        assert_eq!(err.code(), "content");
        assert!(!path.exists());
    }

    #[test]
    fn escaping_paths_are_rejected() {
        let (dir, manager) = manager();
        let outside = dir.path().join("outside.md");

        let err = manager
            .persist_markdown(&outside, &tier1(), "body", UpdatePolicy::Enrich)
            .unwrap_err();
        assert_eq!(err.code(), "path_traversal");
        assert!(!outside.exists());
    }

    #[test]
    fn attachments_land_under_item_folder() {
        let (_dir, manager) = manager();
        let path = manager
            .persist_attachment("msg-42", "Invoice 2024.pdf", b"%PDF-")
            .unwrap();
        assert!(path.ends_with("attachments/msg-42/Invoice_2024.pdf"));
        assert_eq!(std::fs::read(&path).unwrap(), b"%PDF-");
    }

    #[test]
    fn hostile_attachment_names_are_sanitized() {
        let (_dir, manager) = manager();
        let path = manager
            .persist_attachment("id", "../../../etc/passwd", b"x")
            .unwrap();
        assert!(path.to_string_lossy().contains("attachments"));
        assert!(!path.to_string_lossy().contains(".."));
    }
}
