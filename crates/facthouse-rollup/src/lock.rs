//! Exclusive on-disk job lock.
//!
//! Rollup jobs may be started by an external scheduler, so an in-process
//! mutex cannot guarantee single-writer output; the gate is a lock file in
//! the output directory, created with `O_EXCL` semantics. The file records
//! `pid=<n> started=<rfc3339>` so a conflicting run can probe whether the
//! owner is still alive: a dead owner's lock is removed and acquisition is
//! retried once. The lock is released on drop, covering every exit path.

use std::io::Write;
use std::path::{Path, PathBuf};

use tracing::warn;

use crate::error::{Result, RollupError};

/// Lock file for the per-minute request-metrics rollup.
pub const METRICS_LOCK_FILE: &str = ".rollup.lock";
/// Lock file for the daily service-events rollup.
pub const EVENTS_LOCK_FILE: &str = ".event_rollup.lock";

#[derive(Debug)]
pub struct JobLock {
    path: PathBuf,
}

impl JobLock {
    /// Acquire the lock `<dir>/<file_name>`, clearing a stale lock from a
    /// dead process if necessary.
    pub fn acquire(dir: &Path, file_name: &str) -> Result<Self> {
        std::fs::create_dir_all(dir)?;
        let path = dir.join(file_name);

        match Self::try_create(&path) {
            Ok(lock) => Ok(lock),
            Err(err) if err.kind() == std::io::ErrorKind::AlreadyExists => {
                if is_stale(&path) {
                    warn!(path = %path.display(), "removing stale lock file (owner process is dead)");
                    let _ = std::fs::remove_file(&path);
                    match Self::try_create(&path) {
                        Ok(lock) => Ok(lock),
                        Err(err) if err.kind() == std::io::ErrorKind::AlreadyExists => {
                            Err(RollupError::AlreadyRunning(path))
                        }
                        Err(err) => Err(err.into()),
                    }
                } else {
                    Err(RollupError::AlreadyRunning(path))
                }
            }
            Err(err) => Err(err.into()),
        }
    }

    fn try_create(path: &Path) -> std::io::Result<Self> {
        let mut file = std::fs::OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(path)?;
        writeln!(
            file,
            "pid={} started={}",
            std::process::id(),
            chrono::Utc::now().to_rfc3339()
        )?;
        file.sync_all()?;
        Ok(Self {
            path: path.to_path_buf(),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for JobLock {
    fn drop(&mut self) {
        if let Err(err) = std::fs::remove_file(&self.path) {
            warn!(path = %self.path.display(), error = %err, "failed to remove lock file");
        }
    }
}

/// A lock is stale when its contents cannot be read, its PID cannot be
/// parsed, or the owning process no longer exists.
fn is_stale(path: &Path) -> bool {
    let Ok(contents) = std::fs::read_to_string(path) else {
        return true;
    };
    let Some(pid) = contents
        .split_whitespace()
        .next()
        .and_then(|token| token.strip_prefix("pid="))
        .and_then(|pid| pid.parse::<i32>().ok())
    else {
        return true;
    };
    !pid_alive(pid)
}

/// Probe a process with signal 0: delivery is never attempted, but the
/// error distinguishes "no such process" from "exists but not ours".
#[cfg(unix)]
fn pid_alive(pid: i32) -> bool {
    let ret = unsafe { libc::kill(pid as libc::pid_t, 0) };
    if ret == 0 {
        return true;
    }
    std::io::Error::last_os_error().raw_os_error() == Some(libc::EPERM)
}

#[cfg(not(unix))]
fn pid_alive(_pid: i32) -> bool {
    // No cheap liveness probe; err on the side of respecting the lock.
    true
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn acquire_writes_pid_and_releases_on_drop() {
        let dir = TempDir::new().unwrap();
        let lock = JobLock::acquire(dir.path(), METRICS_LOCK_FILE).unwrap();

        let contents = std::fs::read_to_string(lock.path()).unwrap();
        assert!(contents.starts_with(&format!("pid={} ", std::process::id())));
        assert!(contents.contains("started="));

        let path = lock.path().to_path_buf();
        drop(lock);
        assert!(!path.exists());
    }

    #[test]
    fn second_acquire_fails_while_owner_is_alive() {
        let dir = TempDir::new().unwrap();
        let _lock = JobLock::acquire(dir.path(), METRICS_LOCK_FILE).unwrap();

        let err = JobLock::acquire(dir.path(), METRICS_LOCK_FILE).unwrap_err();
        assert!(matches!(err, RollupError::AlreadyRunning(_)));
    }

    #[test]
    fn acquire_succeeds_after_previous_owner_released() {
        let dir = TempDir::new().unwrap();
        let first = JobLock::acquire(dir.path(), EVENTS_LOCK_FILE).unwrap();
        drop(first);
        let second = JobLock::acquire(dir.path(), EVENTS_LOCK_FILE);
        assert!(second.is_ok());
    }

    #[test]
    fn dead_owner_lock_is_taken_over() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join(METRICS_LOCK_FILE);

        // A process that has already exited: its PID is dead by the time
        // we probe it.
        let mut child = std::process::Command::new("true").spawn().unwrap();
        let dead_pid = child.id();
        child.wait().unwrap();

        std::fs::write(
            &path,
            format!("pid={} started=2025-01-15T00:00:00Z\n", dead_pid),
        )
        .unwrap();

        let lock = JobLock::acquire(dir.path(), METRICS_LOCK_FILE).unwrap();
        let contents = std::fs::read_to_string(lock.path()).unwrap();
        assert!(contents.starts_with(&format!("pid={} ", std::process::id())));
    }

    #[test]
    fn unparseable_lock_is_treated_as_stale() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join(METRICS_LOCK_FILE);
        std::fs::write(&path, "garbage\n").unwrap();

        let lock = JobLock::acquire(dir.path(), METRICS_LOCK_FILE);
        assert!(lock.is_ok());
    }

    #[test]
    fn distinct_lock_files_do_not_conflict() {
        let dir = TempDir::new().unwrap();
        let _metrics = JobLock::acquire(dir.path(), METRICS_LOCK_FILE).unwrap();
        let events = JobLock::acquire(dir.path(), EVENTS_LOCK_FILE);
        assert!(events.is_ok());
    }
}
