//! Process registry: directory-on-disk = running-process record.
//!
//! Each launched bot owns a working directory under the registry root,
//! `<root>/<conversation>/<bot>`, holding a `pid` file with the worker's
//! OS process id. Stop runs read that file and signal the process; clear
//! wipes the whole root. The trait exists so orchestrator tests can swap
//! the filesystem for an in-memory double.

use std::path::{Path, PathBuf};

#[derive(Debug, thiserror::Error)]
pub enum RegistryError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("unreadable pid record under {dir}: {reason}")]
    UnreadablePid { dir: PathBuf, reason: String },

    #[error("failed to signal pid {pid}; the process may no longer exist")]
    SignalFailed { pid: u32 },
}

/// What a termination request actually did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TerminateOutcome {
    /// A SIGTERM-equivalent was delivered to the recorded pid.
    Signalled(u32),
    /// No record existed for the directory; stopping is idempotent.
    NotTracked,
}

pub trait ProcessRegistry {
    /// Persist `pid` under `dir`. Must complete before the process is
    /// considered launched for stop purposes.
    fn record(&self, dir: &Path, pid: u32) -> Result<(), RegistryError>;

    /// Read back the recorded pid, if any.
    fn lookup(&self, dir: &Path) -> Result<Option<u32>, RegistryError>;

    /// Signal the recorded process to terminate. Missing records are a
    /// no-op; unreadable records or dead processes are errors the caller
    /// logs without aborting sibling stops.
    fn terminate(&self, dir: &Path) -> Result<TerminateOutcome, RegistryError>;

    /// Recursively delete the entire registry root. No-op if absent.
    fn clear_all(&self) -> Result<(), RegistryError>;
}

/// Filesystem-backed registry, the production implementation.
#[derive(Debug, Clone)]
pub struct FsProcessRegistry {
    root: PathBuf,
}

impl FsProcessRegistry {
    pub fn new(root: PathBuf) -> Self {
        Self { root }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn pid_path(dir: &Path) -> PathBuf {
        dir.join("pid")
    }

    /// Atomically write `data` to `path` via a `.tmp` sibling.
    fn atomic_write(path: &Path, data: &[u8]) -> Result<(), RegistryError> {
        let tmp = path.with_extension("tmp");
        std::fs::write(&tmp, data)?;
        std::fs::rename(&tmp, path)?;
        Ok(())
    }

    /// Deliver SIGTERM (unix) or a forced taskkill (windows) to `pid`.
    fn signal_terminate(pid: u32) -> Result<(), RegistryError> {
        #[cfg(unix)]
        let status = std::process::Command::new("kill")
            .arg("-TERM")
            .arg(pid.to_string())
            .status()?;

        #[cfg(windows)]
        let status = std::process::Command::new("taskkill")
            .args(["/PID", &pid.to_string(), "/F"])
            .status()?;

        if status.success() {
            Ok(())
        } else {
            Err(RegistryError::SignalFailed { pid })
        }
    }
}

impl ProcessRegistry for FsProcessRegistry {
    fn record(&self, dir: &Path, pid: u32) -> Result<(), RegistryError> {
        std::fs::create_dir_all(dir)?;
        Self::atomic_write(&Self::pid_path(dir), pid.to_string().as_bytes())
    }

    fn lookup(&self, dir: &Path) -> Result<Option<u32>, RegistryError> {
        let path = Self::pid_path(dir);
        let data = match std::fs::read_to_string(&path) {
            Ok(data) => data,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        let pid = data
            .trim()
            .parse::<u32>()
            .map_err(|e| RegistryError::UnreadablePid {
                dir: dir.to_path_buf(),
                reason: e.to_string(),
            })?;
        Ok(Some(pid))
    }

    fn terminate(&self, dir: &Path) -> Result<TerminateOutcome, RegistryError> {
        // A missing directory or pid file means the bot was never launched
        // (or already cleared); stopping it twice must stay a no-op.
        match self.lookup(dir)? {
            Some(pid) => {
                Self::signal_terminate(pid)?;
                Ok(TerminateOutcome::Signalled(pid))
            }
            None => Ok(TerminateOutcome::NotTracked),
        }
    }

    fn clear_all(&self) -> Result<(), RegistryError> {
        match std::fs::remove_dir_all(&self.root) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

/// In-memory registry for tests: records and terminations are observable
/// without touching the filesystem or signalling anything.
#[derive(Debug, Default)]
pub struct MemoryRegistry {
    inner: std::sync::Mutex<MemoryState>,
}

#[derive(Debug, Default)]
struct MemoryState {
    pids: std::collections::HashMap<PathBuf, u32>,
    terminated: Vec<PathBuf>,
}

impl MemoryRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Directories whose processes were asked to terminate, in order.
    pub fn terminated(&self) -> Vec<PathBuf> {
        self.inner.lock().map(|s| s.terminated.clone()).unwrap_or_default()
    }

    pub fn recorded(&self) -> Vec<(PathBuf, u32)> {
        self.inner
            .lock()
            .map(|s| {
                let mut v: Vec<_> = s.pids.iter().map(|(k, v)| (k.clone(), *v)).collect();
                v.sort();
                v
            })
            .unwrap_or_default()
    }
}

impl ProcessRegistry for MemoryRegistry {
    fn record(&self, dir: &Path, pid: u32) -> Result<(), RegistryError> {
        if let Ok(mut state) = self.inner.lock() {
            state.pids.insert(dir.to_path_buf(), pid);
        }
        Ok(())
    }

    fn lookup(&self, dir: &Path) -> Result<Option<u32>, RegistryError> {
        Ok(self
            .inner
            .lock()
            .ok()
            .and_then(|s| s.pids.get(dir).copied()))
    }

    fn terminate(&self, dir: &Path) -> Result<TerminateOutcome, RegistryError> {
        let mut state = match self.inner.lock() {
            Ok(s) => s,
            Err(_) => return Ok(TerminateOutcome::NotTracked),
        };
        match state.pids.get(dir).copied() {
            Some(pid) => {
                state.terminated.push(dir.to_path_buf());
                Ok(TerminateOutcome::Signalled(pid))
            }
            None => Ok(TerminateOutcome::NotTracked),
        }
    }

    fn clear_all(&self) -> Result<(), RegistryError> {
        if let Ok(mut state) = self.inner.lock() {
            state.pids.clear();
            state.terminated.clear();
        }
        Ok(())
    }
}
