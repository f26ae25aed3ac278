//! Preflight device gate
//!
//! Before any capture starts, the USB bus must show the SDR and enough
//! external Wi-Fi adapters. Enumeration goes through `lsusb`; the matching is
//! a pure function over its output so it can be tested without hardware.

use std::io;

use tokio::process::Command;
use tracing::{debug, info};

use crate::config::PreflightConfig;

const LSUSB: &str = "lsusb";

#[derive(Debug, thiserror::Error)]
pub enum PreflightError {
    #[error("failed to run lsusb: {0}")]
    Enumerate(#[source] io::Error),

    #[error("lsusb exited with status {0:?}")]
    EnumerateFailed(Option<i32>),

    #[error("found {found} Wi-Fi adapter(s), need at least {required}")]
    MissingWifiAdapters { found: usize, required: usize },

    #[error("no SDR found (looked for {patterns:?})")]
    MissingSdr { patterns: Vec<String> },
}

/// Matching USB devices, one `lsusb` line each.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DeviceReport {
    pub wifi_adapters: Vec<String>,
    pub sdrs: Vec<String>,
}

impl DeviceReport {
    /// Gate the report against the configured minimums.
    pub fn check(&self, config: &PreflightConfig) -> Result<(), PreflightError> {
        if self.wifi_adapters.len() < config.min_wifi_adapters {
            return Err(PreflightError::MissingWifiAdapters {
                found: self.wifi_adapters.len(),
                required: config.min_wifi_adapters,
            });
        }
        if self.sdrs.is_empty() {
            return Err(PreflightError::MissingSdr {
                patterns: config.sdr_patterns.clone(),
            });
        }
        Ok(())
    }
}

/// Sort `lsusb` lines into Wi-Fi adapters and SDRs.
///
/// A line matching both pattern sets counts as an SDR only.
pub fn classify_usb_listing(text: &str, config: &PreflightConfig) -> DeviceReport {
    let matches = |line: &str, patterns: &[String]| {
        patterns.iter().any(|p| !p.is_empty() && line.contains(p.as_str()))
    };

    let mut report = DeviceReport::default();
    for line in text.lines().map(str::trim).filter(|l| !l.is_empty()) {
        if matches(line, &config.sdr_patterns) {
            report.sdrs.push(line.to_string());
        } else if matches(line, &config.wifi_adapter_patterns) {
            report.wifi_adapters.push(line.to_string());
        }
    }
    report
}

/// Enumerate USB devices and verify the sensor hardware is attached.
pub async fn check_devices(config: &PreflightConfig) -> Result<DeviceReport, PreflightError> {
    let output = Command::new(LSUSB)
        .output()
        .await
        .map_err(PreflightError::Enumerate)?;
    if !output.status.success() {
        return Err(PreflightError::EnumerateFailed(output.status.code()));
    }

    let listing = String::from_utf8_lossy(&output.stdout);
    let report = classify_usb_listing(&listing, config);
    debug!(wifi = ?report.wifi_adapters, sdr = ?report.sdrs, "USB devices classified");

    report.check(config)?;
    info!(
        wifi_adapters = report.wifi_adapters.len(),
        sdrs = report.sdrs.len(),
        "Preflight device check passed"
    );
    Ok(report)
}
