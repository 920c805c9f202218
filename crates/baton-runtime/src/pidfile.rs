//! Pid file handed from generation to generation

use baton_core::{Error, Result};
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// Pid file rewritten by every generation once it is ready.
///
/// The file is never removed on exit; the next generation overwrites it.
#[derive(Debug, Clone)]
pub struct PidFile {
    path: PathBuf,
}

impl PidFile {
    /// Manage the pid file at `path`
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Path to the pid file
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Pid currently recorded, if the file exists and parses
    pub fn read(&self) -> Option<u32> {
        std::fs::read_to_string(&self.path)
            .ok()
            .and_then(|contents| contents.trim().parse().ok())
    }

    /// Fail when another live process holds the file. Stale files are ignored.
    pub fn check_available(&self) -> Result<()> {
        match self.read() {
            Some(pid) if pid != std::process::id() && is_alive(pid) => Err(Error::Config(format!(
                "pid file {} is held by running process {pid}",
                self.path.display()
            ))),
            Some(pid) => {
                debug!(pid, path = %self.path.display(), "Ignoring stale pid file");
                Ok(())
            }
            None => Ok(()),
        }
    }

    /// Atomically replace the file contents with `pid`
    pub fn write(&self, pid: u32) -> std::io::Result<()> {
        let dir = match self.path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent,
            _ => Path::new("."),
        };
        std::fs::create_dir_all(dir)?;

        let mut tmp = tempfile::NamedTempFile::new_in(dir)?;
        writeln!(tmp, "{pid}")?;
        tmp.as_file().sync_all()?;
        tmp.persist(&self.path).map_err(|e| e.error)?;

        info!(pid, path = %self.path.display(), "Pid file written");
        Ok(())
    }
}

#[cfg(target_os = "linux")]
fn is_alive(pid: u32) -> bool {
    Path::new(&format!("/proc/{pid}")).exists()
}

// Without procfs liveness cannot be checked safely; treat the file as stale.
#[cfg(not(target_os = "linux"))]
fn is_alive(_pid: u32) -> bool {
    false
}
