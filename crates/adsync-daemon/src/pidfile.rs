//! Single-instance PID file and control signals
//!
//! The running daemon holds an exclusively created PID file. The control
//! subcommands (`sync`, `reload`, `stop`) read it and signal that process.

use std::fs::{self, OpenOptions};
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use tracing::{debug, info, warn};

/// Signals understood by a running daemon
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DaemonSignal {
    /// `SIGUSR1`: reconcile now
    Sync,
    /// `SIGUSR2`: re-read the config and apply the ignore list
    Reload,
    /// `SIGTERM`: stop after the in-flight tick
    Stop,
}

impl DaemonSignal {
    pub fn as_raw(self) -> libc::c_int {
        match self {
            DaemonSignal::Sync => libc::SIGUSR1,
            DaemonSignal::Reload => libc::SIGUSR2,
            DaemonSignal::Stop => libc::SIGTERM,
        }
    }
}

/// PID file owned by the running daemon; removed on drop
#[derive(Debug)]
pub struct PidFile {
    path: PathBuf,
}

impl PidFile {
    /// Creates the PID file for the current process
    ///
    /// A leftover file whose process no longer exists is replaced once.
    ///
    /// # Errors
    /// Fails if another live instance holds the file or it cannot be written.
    pub fn acquire(path: &Path) -> Result<Self> {
        match Self::create(path) {
            Err(e) if e.kind() == ErrorKind::AlreadyExists => {
                match read_pid(path) {
                    Ok(pid) if process_alive(pid) => {
                        bail!("adsyncd is already running (pid {pid}, {})", path.display())
                    }
                    _ => {
                        warn!(path = %path.display(), "Removing stale PID file");
                        fs::remove_file(path).with_context(|| {
                            format!("Failed to remove stale PID file {}", path.display())
                        })?;
                        Self::create(path)
                    }
                }
            }
            other => other,
        }
        .with_context(|| format!("Failed to create PID file {}", path.display()))
    }

    fn create(path: &Path) -> std::io::Result<Self> {
        let mut file = OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(path)?;
        writeln!(file, "{}", std::process::id())?;
        debug!(path = %path.display(), "PID file created");
        Ok(Self {
            path: path.to_path_buf(),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for PidFile {
    fn drop(&mut self) {
        if let Err(e) = fs::remove_file(&self.path) {
            warn!(path = %self.path.display(), error = %e, "Failed to remove PID file");
        }
    }
}

/// Reads the process id stored in `path`
pub fn read_pid(path: &Path) -> Result<libc::pid_t> {
    let content = fs::read_to_string(path)
        .with_context(|| format!("Failed to read PID file {}", path.display()))?;
    let pid: libc::pid_t = content
        .trim()
        .parse()
        .with_context(|| format!("PID file {} is corrupt", path.display()))?;
    if pid <= 0 {
        bail!("PID file {} holds an invalid pid {pid}", path.display());
    }
    Ok(pid)
}

/// Sends `signal` to the daemon recorded in `path`
///
/// # Returns
/// The signalled process id
pub fn signal_daemon(path: &Path, signal: DaemonSignal) -> Result<libc::pid_t> {
    let pid = read_pid(path).context("Is adsyncd running?")?;
    // SAFETY: kill(2) has no memory-safety preconditions
    let rc = unsafe { libc::kill(pid, signal.as_raw()) };
    if rc != 0 {
        let err = std::io::Error::last_os_error();
        return Err(err).with_context(|| format!("Failed to signal adsyncd (pid {pid})"));
    }
    info!(pid, signal = ?signal, "Signal sent");
    Ok(pid)
}

fn process_alive(pid: libc::pid_t) -> bool {
    // SAFETY: signal 0 only checks for existence and permission
    if unsafe { libc::kill(pid, 0) } == 0 {
        return true;
    }
    std::io::Error::last_os_error().raw_os_error() == Some(libc::EPERM)
}
