#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions)]

//! Single-primary worker election.
//!
//! Every worker process tries a non-blocking exclusive lock on a
//! well-known file at startup. The winner becomes the primary: it owns
//! ingestion, writes its PID and a `startup` marker next to the lock,
//! and flips the marker to `running` once the background tasks are up.
//! The other workers poll those files and refuse to serve traffic until
//! the PID is alive and the marker reads `running`. The OS releases the
//! lock when the primary dies, so the next restart elects a new one.

use std::fs::{self, File, OpenOptions};
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

use fs2::FileExt as _;
use strum_macros::{AsRefStr, Display, EnumString};

/// Poll interval while a replica waits for the primary.
const POLL_INTERVAL: Duration = Duration::from_millis(100);

/// The primary's lifecycle state, as written to the state file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, EnumString, AsRefStr)]
#[strum(serialize_all = "lowercase")]
pub enum WorkerState {
    /// The primary is running its first country and AED passes.
    Startup,
    /// The primary is up; replicas may serve traffic.
    Running,
}

/// Errors that can occur during worker coordination.
#[derive(Debug, thiserror::Error)]
pub enum WorkerError {
    /// Lock, PID, or state file I/O failed.
    #[error("Worker file I/O failed: {0}")]
    Io(#[from] std::io::Error),

    /// A replica tried to perform a primary-only operation.
    #[error("Only the primary worker can set the state")]
    NotPrimary,
}

/// The process's role in the deployment, held for the process lifetime.
///
/// Dropping the guard releases the lock, so the primary keeps it alive
/// until shutdown.
#[derive(Debug)]
pub struct WorkerGuard {
    is_primary: bool,
    pid_path: PathBuf,
    state_path: PathBuf,
    _lock_file: File,
}

impl WorkerGuard {
    /// Joins the deployment rooted at `data_dir`.
    ///
    /// Returns once the election is decided; use
    /// [`WorkerGuard::is_primary`] to pick the startup path and
    /// [`WorkerGuard::wait_for_running`] on replicas.
    ///
    /// # Errors
    ///
    /// Returns [`WorkerError`] if the data directory or the worker
    /// files cannot be created.
    pub fn init(data_dir: &Path) -> Result<Self, WorkerError> {
        fs::create_dir_all(data_dir)?;

        let lock_path = data_dir.join("worker.lock");
        let pid_path = data_dir.join("worker.pid");
        let state_path = data_dir.join("worker.state");

        let lock_file = OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(false)
            .open(&lock_path)?;

        let is_primary = match lock_file.try_lock_exclusive() {
            Ok(()) => true,
            Err(error) if error.kind() == ErrorKind::WouldBlock => false,
            Err(error) => return Err(error.into()),
        };

        let guard = Self {
            is_primary,
            pid_path,
            state_path,
            _lock_file: lock_file,
        };

        if is_primary {
            fs::write(&guard.state_path, WorkerState::Startup.as_ref())?;
            fs::write(&guard.pid_path, std::process::id().to_string())?;
            log::info!("Elected as the primary worker");
        } else {
            log::info!("Another worker holds the lock; running read-only");
        }

        Ok(guard)
    }

    /// Whether this process won the election.
    #[must_use]
    pub const fn is_primary(&self) -> bool {
        self.is_primary
    }

    /// Writes the state file. Primary only.
    ///
    /// # Errors
    ///
    /// Returns [`WorkerError::NotPrimary`] on a replica, or an I/O
    /// error if the state file cannot be written.
    pub fn set_state(&self, state: WorkerState) -> Result<(), WorkerError> {
        if !self.is_primary {
            return Err(WorkerError::NotPrimary);
        }
        fs::write(&self.state_path, state.as_ref())?;
        log::info!("Worker state set to {state}");
        Ok(())
    }

    /// Reads the current state file, if it exists and parses.
    #[must_use]
    pub fn get_state(&self) -> Option<WorkerState> {
        let raw = fs::read_to_string(&self.state_path).ok()?;
        WorkerState::from_str(raw.trim()).ok()
    }

    /// Blocks until the primary has written its PID, the PID is alive,
    /// and the state file reads `running`.
    ///
    /// Replicas call this before accepting traffic so no request is
    /// ever served ahead of the `startup` to `running` transition.
    pub async fn wait_for_running(&self) {
        loop {
            if self.primary_ready() {
                return;
            }
            tokio::time::sleep(POLL_INTERVAL).await;
        }
    }

    fn primary_ready(&self) -> bool {
        let Ok(pid_raw) = fs::read_to_string(&self.pid_path) else {
            return false;
        };
        let Ok(pid) = pid_raw.trim().parse::<u32>() else {
            return false;
        };
        pid_alive(pid) && self.get_state() == Some(WorkerState::Running)
    }
}

/// Checks whether a PID refers to a live process.
#[cfg(target_os = "linux")]
fn pid_alive(pid: u32) -> bool {
    Path::new(&format!("/proc/{pid}")).is_dir()
}

/// Non-Linux fallback: trust the state file alone.
#[cfg(not(target_os = "linux"))]
const fn pid_alive(_pid: u32) -> bool {
    true
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    static DIR_COUNTER: AtomicU32 = AtomicU32::new(0);

    fn scratch_dir() -> PathBuf {
        let n = DIR_COUNTER.fetch_add(1, Ordering::SeqCst);
        std::env::temp_dir().join(format!("openaedmap-worker-test-{}-{n}", std::process::id()))
    }

    #[test]
    fn state_strings_round_trip() {
        assert_eq!(WorkerState::Startup.as_ref(), "startup");
        assert_eq!(WorkerState::Running.to_string(), "running");
        assert_eq!(WorkerState::from_str("running").unwrap(), WorkerState::Running);
        assert!(WorkerState::from_str("draining").is_err());
    }

    #[test]
    fn first_guard_wins_the_election() {
        let dir = scratch_dir();
        let primary = WorkerGuard::init(&dir).unwrap();
        assert!(primary.is_primary());

        let replica = WorkerGuard::init(&dir).unwrap();
        assert!(!replica.is_primary());

        drop(replica);
        drop(primary);
        let _ = fs::remove_dir_all(&dir);
    }

    #[test]
    fn only_the_primary_sets_state() {
        let dir = scratch_dir();
        let primary = WorkerGuard::init(&dir).unwrap();
        let replica = WorkerGuard::init(&dir).unwrap();

        assert_eq!(primary.get_state(), Some(WorkerState::Startup));
        assert!(matches!(
            replica.set_state(WorkerState::Running),
            Err(WorkerError::NotPrimary)
        ));

        primary.set_state(WorkerState::Running).unwrap();
        assert_eq!(replica.get_state(), Some(WorkerState::Running));

        drop(replica);
        drop(primary);
        let _ = fs::remove_dir_all(&dir);
    }

    #[test]
    fn replica_sees_live_primary_as_ready_only_when_running() {
        let dir = scratch_dir();
        let primary = WorkerGuard::init(&dir).unwrap();
        let replica = WorkerGuard::init(&dir).unwrap();

        // PID file carries this (live) test process, but state is startup.
        assert!(!replica.primary_ready());
        primary.set_state(WorkerState::Running).unwrap();
        assert!(replica.primary_ready());

        drop(replica);
        drop(primary);
        let _ = fs::remove_dir_all(&dir);
    }
}
