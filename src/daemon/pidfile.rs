//! PID file lifecycle with stale-PID detection (SPEC_FULL §4.6).
//!
//! Liveness is checked with `kill(pid, 0)`, the standard POSIX idiom for
//! "is this process alive" without actually signaling it.

use crate::error::DaemonError;
use nix::sys::signal::kill;
use nix::unistd::Pid;
use std::fs;
use std::path::{Path, PathBuf};

pub struct PidFile {
    path: PathBuf,
}

impl PidFile {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Inspects any existing PID file. Returns `Ok(())` if it is absent,
    /// unparseable, or names a dead process (removing it first); returns
    /// `Err(AlreadyRunning)` if the named process is live.
    pub fn check_and_clear_stale(&self) -> Result<(), DaemonError> {
        let contents = match fs::read_to_string(&self.path) {
            Ok(c) => c,
            Err(_) => return Ok(()),
        };
        let pid: i32 = match contents.trim().parse() {
            Ok(p) => p,
            Err(_) => {
                let _ = fs::remove_file(&self.path);
                return Ok(());
            }
        };

        if process_is_alive(pid) {
            return Err(DaemonError::AlreadyRunning { pid });
        }

        let _ = fs::remove_file(&self.path);
        Ok(())
    }

    pub fn write_current_pid(&self) -> Result<(), DaemonError> {
        let pid = std::process::id();
        write_atomic(&self.path, &pid.to_string()).map_err(|source| DaemonError::PidFile {
            path: self.path.display().to_string(),
            source,
        })
    }

    pub fn remove(&self) {
        let _ = fs::remove_file(&self.path);
    }
}

fn process_is_alive(pid: i32) -> bool {
    kill(Pid::from_raw(pid), None).is_ok()
}

fn write_atomic(path: &Path, contents: &str) -> std::io::Result<()> {
    let tmp = path.with_extension("pid.tmp");
    fs::write(&tmp, contents)?;
    if fs::rename(&tmp, path).is_err() {
        fs::copy(&tmp, path)?;
        fs::remove_file(&tmp)?;
    }
    Ok(())
}
