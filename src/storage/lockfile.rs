//! Single-instance lock
//!
//! Two sensor processes would fight over the SDR and the Wi-Fi adapters, so
//! startup takes a pid lock in the data directory first.

use anyhow::{bail, Context, Result};
use std::fs;
use std::path::{Path, PathBuf};

use crate::acquisition::process::{command_line, is_alive};

/// Pid lock held for the lifetime of the sensor process.
#[derive(Debug)]
pub struct ProcessLock {
    lock_path: PathBuf,
    owned: bool,
}

impl ProcessLock {
    pub const LOCK_FILE_NAME: &'static str = ".occupancy.lock";

    /// Take the lock in `data_dir`, removing a lock left by a dead process.
    ///
    /// Fails if a live sensor process already holds it.
    pub fn acquire<P: AsRef<Path>>(data_dir: P) -> Result<Self> {
        let data_dir = data_dir.as_ref();
        fs::create_dir_all(data_dir)
            .with_context(|| format!("Failed to create data directory {}", data_dir.display()))?;

        let lock_path = data_dir.join(Self::LOCK_FILE_NAME);
        if let Some(holder) = Self::live_holder(&lock_path) {
            bail!(
                "Another occupancy sensor is already running (PID: {holder}). \
                 Stop it, or remove {} if it is stale.",
                lock_path.display()
            );
        }
        if lock_path.exists() {
            tracing::info!(path = %lock_path.display(), "Removing stale lock file");
            fs::remove_file(&lock_path).context("Failed to remove stale lock file")?;
        }

        let pid = std::process::id();
        fs::write(&lock_path, format!("{pid}\n"))
            .with_context(|| format!("Failed to write lock file {}", lock_path.display()))?;
        tracing::debug!(pid, path = %lock_path.display(), "Acquired process lock");

        Ok(Self {
            lock_path,
            owned: true,
        })
    }

    /// Pid recorded in the lock file, if that process is alive and looks
    /// like a sensor. Unreadable or garbled files count as stale.
    fn live_holder(lock_path: &Path) -> Option<u32> {
        let contents = fs::read_to_string(lock_path).ok()?;
        let pid: u32 = match contents.trim().parse() {
            Ok(pid) => pid,
            Err(_) => {
                tracing::warn!(path = %lock_path.display(), "Lock file does not hold a pid");
                return None;
            }
        };
        let running = i32::try_from(pid).is_ok_and(is_alive) && Self::looks_like_sensor(pid);
        running.then_some(pid)
    }

    /// A recycled pid belonging to some other program does not hold the lock.
    fn looks_like_sensor(pid: u32) -> bool {
        match i32::try_from(pid).ok().and_then(command_line) {
            Some(argv) => argv.iter().any(|arg| arg.contains("occupancy")),
            // No procfs: trust the liveness probe alone.
            None => !Path::new("/proc/self").exists(),
        }
    }

    /// Remove the lock file; also runs on drop.
    pub fn release(&mut self) {
        if !self.owned {
            return;
        }
        match fs::remove_file(&self.lock_path) {
            Ok(()) => tracing::debug!(path = %self.lock_path.display(), "Released process lock"),
            Err(e) => tracing::warn!(error = %e, "Failed to remove lock file"),
        }
        self.owned = false;
    }

    pub fn path(&self) -> &Path {
        &self.lock_path
    }
}

impl Drop for ProcessLock {
    fn drop(&mut self) {
        self.release();
    }
}
