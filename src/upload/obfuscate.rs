//! Identifier obfuscation and payload assembly

use chrono::{Local, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::config::SystemConfig;
use crate::pipeline::CycleReport;
use crate::types::OccupancyList;

/// Serial used when the board exposes none.
pub const UNKNOWN_SERIAL: &str = "0000000000000000";

const CPUINFO: &str = "/proc/cpuinfo";

/// Hex SHA-256 of `"{identifier}-{secret}"`.
pub fn obfuscate(identifier: &str, secret: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(identifier.as_bytes());
    hasher.update(b"-");
    hasher.update(secret.as_bytes());
    hex::encode(hasher.finalize())
}

/// Board serial from `/proc/cpuinfo`.
pub fn read_serial() -> String {
    std::fs::read_to_string(CPUINFO)
        .ok()
        .and_then(|text| parse_serial(&text))
        .unwrap_or_else(|| UNKNOWN_SERIAL.to_string())
}

fn parse_serial(cpuinfo: &str) -> Option<String> {
    cpuinfo
        .lines()
        .filter(|line| line.starts_with("Serial"))
        .filter_map(|line| line.split_once(':'))
        .map(|(_, value)| value.trim().to_string())
        .find(|value| !value.is_empty())
}

/// What one sensor reports per cycle.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OccupancyPayload {
    #[serde(rename = "location-id")]
    pub location_id: String,
    pub device_id: String,
    pub utc_timestamp: String,
    pub local_timestamp: String,
    #[serde(rename = "wifi-occupancy-list")]
    pub wifi_occupancy_list: Vec<String>,
    #[serde(rename = "cellular-occupancy-list")]
    pub cellular_occupancy_list: Vec<String>,
}

impl OccupancyPayload {
    /// Obfuscate both occupancy lists and stamp the payload with the current
    /// time. `serial` identifies the board, see [`read_serial`].
    pub fn build(system: &SystemConfig, serial: &str, report: &CycleReport, secret: &str) -> Self {
        let hash_all =
            |ids: &OccupancyList| ids.iter().map(|id| obfuscate(id, secret)).collect::<Vec<_>>();
        let payload = Self {
            location_id: system.location_id.clone(),
            device_id: format!("{}-pi-{serial}", system.device_id),
            utc_timestamp: Utc::now().to_rfc3339(),
            local_timestamp: Local::now().naive_local().to_string(),
            wifi_occupancy_list: hash_all(&report.wifi.list),
            cellular_occupancy_list: hash_all(&report.cellular.list),
        };
        tracing::info!(
            wifi = payload.wifi_occupancy_list.len(),
            cellular = payload.cellular_occupancy_list.len(),
            "Occupancy lists obfuscated"
        );
        payload
    }
}
