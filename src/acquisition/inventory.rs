//! Channel inventory: cached list of cellular channels to listen on.
//!
//! The cache artifact is a pretty-printed JSON array of
//! `{arfcn, frequency, power, band}`. It is trusted while its modification
//! time is within the configured expiry; otherwise every band is rescanned
//! and the artifact overwritten.

use std::io;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant, SystemTime};

use thiserror::Error;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::scanner::ChannelScanner;
use crate::types::{Channel, GsmBand};

#[derive(Error, Debug)]
pub enum InventoryError {
    #[error("No channels available: cache {} missing or stale and scan found none", .0.display())]
    Unavailable(PathBuf),

    #[error("Channel cache I/O error ({}): {}", .0.display(), .1)]
    Io(PathBuf, #[source] io::Error),

    #[error("Channel cache parse error ({}): {}", .0.display(), .1)]
    Parse(PathBuf, #[source] serde_json::Error),
}

/// Result of [`ChannelInventory::get_channels`].
#[derive(Debug, Clone)]
pub struct ChannelSet {
    pub channels: Vec<Channel>,
    /// `true` when the list came from a fresh scan rather than the cache.
    pub rescanned: bool,
    /// Wall-clock time spent scanning (zero on a cache hit).
    pub scan_duration: Duration,
}

/// Owns the channel cache artifact and decides when to rescan.
#[derive(Debug, Clone)]
pub struct ChannelInventory {
    cache_path: PathBuf,
    scanner: ChannelScanner,
}

impl ChannelInventory {
    pub fn new(cache_path: impl Into<PathBuf>, scanner: ChannelScanner) -> Self {
        Self {
            cache_path: cache_path.into(),
            scanner,
        }
    }

    pub fn cache_path(&self) -> &Path {
        &self.cache_path
    }

    /// Return cached channels if fresh, else scan `bands` and persist.
    pub async fn get_channels(
        &self,
        bands: &[GsmBand],
        sample_rate: f64,
        expiry: Duration,
        cancel: &CancellationToken,
    ) -> Result<ChannelSet, InventoryError> {
        match self.read_fresh_cache(expiry) {
            Ok(Some(channels)) => {
                info!(
                    count = channels.len(),
                    path = %self.cache_path.display(),
                    "Using cached channel list"
                );
                return Ok(ChannelSet {
                    channels,
                    rescanned: false,
                    scan_duration: Duration::ZERO,
                });
            }
            Ok(None) => {}
            Err(e) => warn!(error = %e, "Unreadable channel cache, rescanning"),
        }

        let started = Instant::now();
        let channels = self.scanner.scan(bands, sample_rate, cancel).await;
        let scan_duration = started.elapsed();
        info!(
            count = channels.len(),
            scan_secs = scan_duration.as_secs_f64(),
            "Channel scan finished"
        );

        if channels.is_empty() {
            return Err(InventoryError::Unavailable(self.cache_path.clone()));
        }

        if let Err(e) = write_cache(&self.cache_path, &channels) {
            warn!(error = %e, "Failed to persist channel cache");
        }

        Ok(ChannelSet {
            channels,
            rescanned: true,
            scan_duration,
        })
    }

    /// `Ok(None)` when the artifact is absent, stale, or holds no channels.
    fn read_fresh_cache(&self, expiry: Duration) -> Result<Option<Vec<Channel>>, InventoryError> {
        let path = &self.cache_path;
        let metadata = match std::fs::metadata(path) {
            Ok(m) => m,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                info!(path = %path.display(), "No channel cache, scanning");
                return Ok(None);
            }
            Err(e) => return Err(InventoryError::Io(path.clone(), e)),
        };

        let age = cache_age(&metadata);
        if age > expiry {
            info!(
                age_secs = age.as_secs(),
                expiry_secs = expiry.as_secs(),
                "Channel cache expired, rescanning"
            );
            return Ok(None);
        }

        let channels = read_cache(path)?;
        if channels.is_empty() {
            debug!(path = %path.display(), "Channel cache is empty");
            return Ok(None);
        }
        Ok(Some(channels))
    }
}

/// Age from file mtime; a modification time in the future counts as fresh.
fn cache_age(metadata: &std::fs::Metadata) -> Duration {
    metadata
        .modified()
        .ok()
        .and_then(|mtime| SystemTime::now().duration_since(mtime).ok())
        .unwrap_or(Duration::ZERO)
}

/// Read and parse a channel cache artifact.
pub fn read_cache(path: &Path) -> Result<Vec<Channel>, InventoryError> {
    let contents =
        std::fs::read_to_string(path).map_err(|e| InventoryError::Io(path.to_path_buf(), e))?;
    serde_json::from_str(&contents).map_err(|e| InventoryError::Parse(path.to_path_buf(), e))
}

/// Overwrite the channel cache artifact with pretty-printed JSON.
pub fn write_cache(path: &Path, channels: &[Channel]) -> Result<(), InventoryError> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent).map_err(|e| InventoryError::Io(parent.to_path_buf(), e))?;
    }
    let json = serde_json::to_string_pretty(channels)
        .map_err(|e| InventoryError::Parse(path.to_path_buf(), e))?;
    std::fs::write(path, json).map_err(|e| InventoryError::Io(path.to_path_buf(), e))?;
    info!(count = channels.len(), path = %path.display(), "Wrote channel cache");
    Ok(())
}
