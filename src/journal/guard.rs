use crate::journal::paths::JournalPaths;
use anyhow::{Context, Result, bail};
use fs2::FileExt;
use std::fs::{self, File, OpenOptions};

/// Advisory per-operation-kind lock. A second holder for the same kind is
/// refused rather than queued; the lock is released on drop.
#[derive(Debug)]
pub struct InFlightGuard {
    file: File,
    kind: String,
}

impl InFlightGuard {
    pub fn acquire(paths: &JournalPaths, kind: &str) -> Result<Self> {
        fs::create_dir_all(&paths.locks_dir)
            .with_context(|| format!("failed to create {}", paths.locks_dir.display()))?;
        let lock_path = paths.locks_dir.join(format!("{kind}.lock"));
        let file = OpenOptions::new()
            .create(true)
            .truncate(false)
            .write(true)
            .open(&lock_path)
            .with_context(|| format!("failed to open {}", lock_path.display()))?;

        if let Err(err) = file.try_lock_exclusive() {
            if err.kind() == fs2::lock_contended_error().kind() {
                bail!("{kind} already in progress");
            }
            return Err(err).with_context(|| format!("failed to lock {}", lock_path.display()));
        }
        Ok(Self {
            file,
            kind: kind.to_string(),
        })
    }
}

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        let _ = FileExt::unlock(&self.file);
        tracing::debug!(kind = %self.kind, "in-flight guard released");
    }
}
