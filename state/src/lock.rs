//! Advisory lock file serializing access to a state file.
//!
//! Acquisition tries a non-blocking exclusive lock first, then polls until
//! a deadline. Holding the lock for the lifetime of a store serializes
//! whole runs, which is the concurrency model the runtime promises.

use std::fs::{File, OpenOptions};
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use fs2::FileExt;

use gleaner_types::{Error, Result};

/// Default time to wait for a competing run to finish.
pub const LOCK_TIMEOUT: Duration = Duration::from_secs(30);

const POLL_INTERVAL: Duration = Duration::from_millis(100);

#[derive(Debug)]
pub struct LockFile {
    file: File,
    path: PathBuf,
}

impl LockFile {
    /// Acquire the lock at `<state_file>.lock`, waiting up to `timeout`.
    pub fn acquire(state_file: &Path, timeout: Duration) -> Result<Self> {
        let path = lock_path(state_file);
        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
        {
            std::fs::create_dir_all(parent).map_err(|e| {
                Error::state(format!("cannot create state directory: {e}"))
                    .with_context("path", parent.display().to_string())
            })?;
        }

        let file = OpenOptions::new()
            .create(true)
            .truncate(false)
            .read(true)
            .write(true)
            .open(&path)
            .map_err(|e| {
                Error::state(format!("cannot open lock file: {e}"))
                    .with_context("path", path.display().to_string())
            })?;

        // Fast path: uncontended.
        if file.try_lock_exclusive().is_ok() {
            return Ok(Self { file, path });
        }

        tracing::debug!(path = %path.display(), "State lock contended, waiting");
        let deadline = Instant::now() + timeout;
        loop {
            if file.try_lock_exclusive().is_ok() {
                return Ok(Self { file, path });
            }
            if Instant::now() >= deadline {
                return Err(Error::state(format!(
                    "state file locked by another run for over {}s",
                    timeout.as_secs()
                ))
                .with_context("path", path.display().to_string()));
            }
            std::thread::sleep(POLL_INTERVAL);
        }
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for LockFile {
    fn drop(&mut self) {
        if let Err(e) = fs2::FileExt::unlock(&self.file) {
            tracing::warn!(path = %self.path.display(), "Failed to release state lock: {e}");
        }
    }
}

fn lock_path(state_file: &Path) -> PathBuf {
    let mut name = state_file
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "state".to_string());
    name.push_str(".lock");
    state_file.with_file_name(name)
}
