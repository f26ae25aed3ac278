//! Cellular channel scanner
//!
//! Runs the external scanner once per band and parses its stdout. The
//! scanner prints one comma-separated line per detected broadcast channel:
//!
//! ```text
//! ARFCN:  975, Freq:  925.2M, CID: 12345, LAC: 6789, MCC: 234, MNC:  10, Pwr: -36
//! ```

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::process::{run_bounded, RunEnd};
use super::session::{CommandSpec, SessionManager};
use crate::types::{Channel, GsmBand};

#[derive(Error, Debug)]
pub enum ScanError {
    #[error("Failed to start scanner '{program}': {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Scanner exited with status {0:?}")]
    Failed(Option<i32>),

    #[error("Scanner did not finish within {0:?}")]
    TimedOut(Duration),

    #[error("Scan cancelled")]
    Cancelled,
}

/// Invokes the scanner command for each configured band.
#[derive(Debug, Clone)]
pub struct ChannelScanner {
    command: CommandSpec,
    timeout: Duration,
    grace: Duration,
    manager: Arc<SessionManager>,
}

impl ChannelScanner {
    pub fn new(
        command: CommandSpec,
        timeout: Duration,
        grace: Duration,
        manager: Arc<SessionManager>,
    ) -> Self {
        Self {
            command,
            timeout,
            grace,
            manager,
        }
    }

    /// Scan one band and return the channels in scanner order.
    pub async fn scan_band(
        &self,
        band: GsmBand,
        sample_rate: f64,
        cancel: &CancellationToken,
    ) -> Result<Vec<Channel>, ScanError> {
        let cmd = self.command.render(&[
            ("band", band.as_str().to_string()),
            ("sample_rate", sample_rate.to_string()),
        ]);
        info!(%band, command = %cmd, "Scanning band");

        let out = run_bounded(&cmd, self.timeout, self.grace, &self.manager, cancel)
            .await
            .map_err(|source| ScanError::Spawn {
                program: cmd.program.clone(),
                source,
            })?;

        match out.end {
            RunEnd::Exited(Some(0)) => {}
            RunEnd::Exited(code) => return Err(ScanError::Failed(code)),
            RunEnd::TimedOut => return Err(ScanError::TimedOut(self.timeout)),
            RunEnd::Cancelled => return Err(ScanError::Cancelled),
        }

        let channels = parse_scanner_output(&String::from_utf8_lossy(&out.stdout), band);
        info!(%band, count = channels.len(), "Band scan complete");
        Ok(channels)
    }

    /// Scan every band in order. A failed band is logged and skipped.
    ///
    /// The result is deduplicated by ARFCN, first occurrence wins.
    pub async fn scan(
        &self,
        bands: &[GsmBand],
        sample_rate: f64,
        cancel: &CancellationToken,
    ) -> Vec<Channel> {
        let mut all = Vec::new();
        for &band in bands {
            if cancel.is_cancelled() {
                break;
            }
            match self.scan_band(band, sample_rate, cancel).await {
                Ok(channels) => all.extend(channels),
                Err(e) => warn!(%band, error = %e, "Band scan failed, skipping"),
            }
        }
        dedup_channels(all)
    }
}

/// Extract channels from scanner stdout.
///
/// Lines without an `ARFCN` marker are ignored; marker lines missing a
/// parseable ARFCN, frequency or power are skipped with a warning.
pub fn parse_scanner_output(text: &str, band: GsmBand) -> Vec<Channel> {
    text.lines()
        .filter(|line| line.contains("ARFCN"))
        .filter_map(|line| {
            let channel = parse_scanner_line(line, band);
            if channel.is_none() {
                warn!(line = line.trim(), "Malformed scanner line skipped");
            }
            channel
        })
        .collect()
}

fn parse_scanner_line(line: &str, band: GsmBand) -> Option<Channel> {
    let mut arfcn = None;
    let mut frequency = None;
    let mut power = None;

    for field in line.split(',') {
        let Some((key, value)) = field.split_once(':') else {
            continue;
        };
        let value = value.trim();
        match key.trim() {
            "ARFCN" => arfcn = Some(value.to_string()).filter(|v| !v.is_empty()),
            "Freq" => {
                frequency = value
                    .trim_end_matches(|c| c == 'M' || c == 'm')
                    .trim()
                    .parse::<f64>()
                    .ok();
            }
            "Pwr" => power = value.parse::<f64>().ok(),
            _ => {}
        }
    }

    let channel = Channel {
        arfcn: arfcn?,
        frequency: frequency?,
        power: power?,
        band,
    };
    debug!(arfcn = %channel.arfcn, frequency = channel.frequency, power = channel.power, %band, "Found channel");
    Some(channel)
}

/// Drop later channels whose ARFCN was already seen, preserving scan order.
pub fn dedup_channels(channels: Vec<Channel>) -> Vec<Channel> {
    let mut seen = HashSet::new();
    channels
        .into_iter()
        .filter(|c| seen.insert(c.arfcn.clone()))
        .collect()
}
