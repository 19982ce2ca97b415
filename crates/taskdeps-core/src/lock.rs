//! Cross-process advisory locking for a project directory.
//!
//! The engine serializes writers inside one process. Separate `td`
//! invocations against the same project coordinate through an fs2 lock on
//! `.taskdeps/lock`: mutating commands hold it exclusively, queries hold it
//! shared.

use crate::config::PROJECT_DIR;
use crate::error::ErrorCode;
use fs2::FileExt;
use std::{
    fs::{self, File, OpenOptions},
    io,
    path::{Path, PathBuf},
    thread,
    time::{Duration, Instant},
};

/// Lock file name inside the project directory.
pub const LOCK_FILE: &str = "lock";

/// Default time to wait for a contended lock.
pub const DEFAULT_LOCK_TIMEOUT: Duration = Duration::from_secs(5);

const RETRY_INTERVAL: Duration = Duration::from_millis(10);

/// Advisory lock errors.
#[derive(Debug, thiserror::Error)]
pub enum LockError {
    #[error(
        "{}: lock timed out after {:?} at {}",
        ErrorCode::LockContention.code(),
        .waited,
        .path.display()
    )]
    Timeout { path: PathBuf, waited: Duration },

    #[error("{}: {0}", ErrorCode::StoreUnavailable.code())]
    IoError(#[from] io::Error),
}

impl LockError {
    /// Machine-readable code associated with this lock error.
    #[must_use]
    pub const fn code(&self) -> ErrorCode {
        match self {
            Self::Timeout { .. } => ErrorCode::LockContention,
            Self::IoError(_) => ErrorCode::StoreUnavailable,
        }
    }

    #[must_use]
    pub const fn hint(&self) -> Option<&'static str> {
        self.code().hint()
    }
}

/// Lock mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LockKind {
    Shared,
    Exclusive,
}

/// RAII guard over the project lock file. Released on drop.
#[derive(Debug)]
pub struct ProjectLock {
    file: File,
    path: PathBuf,
    kind: LockKind,
}

impl ProjectLock {
    /// Lock file path for a project rooted at `project_root`.
    #[must_use]
    pub fn path_for(project_root: &Path) -> PathBuf {
        project_root.join(PROJECT_DIR).join(LOCK_FILE)
    }

    /// Take the lock exclusively, for commands that mutate the graph.
    ///
    /// # Errors
    ///
    /// [`LockError::Timeout`] if another process holds the lock for longer
    /// than `timeout`; [`LockError::IoError`] if the file cannot be opened.
    pub fn exclusive(project_root: &Path, timeout: Duration) -> Result<Self, LockError> {
        Self::acquire(&Self::path_for(project_root), timeout, LockKind::Exclusive)
    }

    /// Take the lock shared, for read-only commands.
    ///
    /// # Errors
    ///
    /// Same as [`Self::exclusive`].
    pub fn shared(project_root: &Path, timeout: Duration) -> Result<Self, LockError> {
        Self::acquire(&Self::path_for(project_root), timeout, LockKind::Shared)
    }

    /// Acquire `kind` on an arbitrary lock file, creating it if needed.
    ///
    /// # Errors
    ///
    /// Same as [`Self::exclusive`].
    pub fn acquire(path: &Path, timeout: Duration, kind: LockKind) -> Result<Self, LockError> {
        let parent = path.parent().ok_or_else(|| {
            io::Error::new(io::ErrorKind::InvalidInput, "lock path has no parent")
        })?;
        fs::create_dir_all(parent)?;

        let start = Instant::now();
        loop {
            let file = OpenOptions::new()
                .create(true)
                .read(true)
                .write(true)
                .truncate(false)
                .open(path)?;

            let attempt = match kind {
                LockKind::Shared => FileExt::try_lock_shared(&file),
                LockKind::Exclusive => FileExt::try_lock_exclusive(&file),
            };

            if attempt.is_ok() {
                tracing::trace!(path = %path.display(), ?kind, "acquired project lock");
                return Ok(Self {
                    file,
                    path: path.to_path_buf(),
                    kind,
                });
            }

            if start.elapsed() >= timeout {
                tracing::warn!(path = %path.display(), ?kind, "timed out waiting for project lock");
                return Err(LockError::Timeout {
                    path: path.to_path_buf(),
                    waited: start.elapsed(),
                });
            }

            thread::sleep(RETRY_INTERVAL);
        }
    }

    /// Explicitly release the lock. Release also happens on drop.
    pub fn release(self) {
        drop(self);
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    #[must_use]
    pub const fn kind(&self) -> LockKind {
        self.kind
    }
}

impl Drop for ProjectLock {
    fn drop(&mut self) {
        let _ = FileExt::unlock(&self.file);
    }
}

#[cfg(test)]
mod tests {
    use super::{LockError, LockKind, ProjectLock};
    use crate::error::ErrorCode;
    use std::{
        sync::{Arc, Barrier},
        thread,
        time::Duration,
    };

    #[test]
    fn exclusive_lock_acquires_and_releases() -> Result<(), LockError> {
        let root = tempfile::tempdir()?;
        let lock = ProjectLock::exclusive(root.path(), Duration::from_millis(50))?;
        assert_eq!(lock.path(), ProjectLock::path_for(root.path()));
        assert_eq!(lock.kind(), LockKind::Exclusive);
        lock.release();

        let _again = ProjectLock::exclusive(root.path(), Duration::from_millis(50))?;
        Ok(())
    }

    #[test]
    fn exclusive_lock_times_out_when_held() {
        let root = tempfile::tempdir().unwrap();
        let _guard = ProjectLock::exclusive(root.path(), Duration::from_millis(50)).unwrap();
        let err = ProjectLock::exclusive(root.path(), Duration::from_millis(20)).unwrap_err();

        let expected = ProjectLock::path_for(root.path());
        assert!(matches!(err, LockError::Timeout { ref path, .. } if *path == expected));
        assert_eq!(err.code(), ErrorCode::LockContention);
        assert!(err.hint().is_some());
    }

    #[test]
    fn shared_locks_are_compatible() -> Result<(), LockError> {
        let root = tempfile::tempdir()?;
        let first = ProjectLock::shared(root.path(), Duration::from_millis(50))?;
        let second = ProjectLock::shared(root.path(), Duration::from_millis(50))?;
        first.release();
        second.release();
        Ok(())
    }

    #[test]
    fn writer_blocks_readers() {
        let root = tempfile::tempdir().unwrap();
        let _write = ProjectLock::exclusive(root.path(), Duration::from_millis(50)).unwrap();

        let started = std::time::Instant::now();
        let read = ProjectLock::shared(root.path(), Duration::from_millis(20));

        assert!(matches!(read, Err(LockError::Timeout { .. })));
        assert!(started.elapsed() >= Duration::from_millis(20));
    }

    #[test]
    fn contention_resolves_after_writer_releases() -> Result<(), LockError> {
        let root = tempfile::tempdir()?;
        let project = root.path().to_path_buf();

        let held = Arc::new(Barrier::new(2));
        let done = Arc::new(Barrier::new(2));

        let held_thread = Arc::clone(&held);
        let done_thread = Arc::clone(&done);
        let project_thread = project.clone();
        let handle = thread::spawn(move || {
            let _writer =
                ProjectLock::exclusive(&project_thread, Duration::from_millis(200)).unwrap();
            held_thread.wait();
            done_thread.wait();
        });

        held.wait();
        assert!(matches!(
            ProjectLock::shared(&project, Duration::from_millis(20)),
            Err(LockError::Timeout { .. })
        ));
        done.wait();
        handle.join().unwrap();

        let follow_up = ProjectLock::exclusive(&project, Duration::from_millis(50))?;
        follow_up.release();
        Ok(())
    }
}
