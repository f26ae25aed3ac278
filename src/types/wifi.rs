//! Wi-Fi station types: WifiBand, WifiDevice

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Wi-Fi band, derived from the channel number.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum WifiBand {
    #[serde(rename = "2.4GHz")]
    Band24GHz,
    #[serde(rename = "5GHz")]
    Band5GHz,
}

impl WifiBand {
    /// Channels 1-14 are 2.4 GHz, 15 and up are 5 GHz.
    /// Channel 0 means the inventory did not report one.
    pub const fn from_channel(channel: u32) -> Option<Self> {
        match channel {
            0 => None,
            1..=14 => Some(WifiBand::Band24GHz),
            _ => Some(WifiBand::Band5GHz),
        }
    }
}

impl std::fmt::Display for WifiBand {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            WifiBand::Band24GHz => write!(f, "2.4GHz"),
            WifiBand::Band5GHz => write!(f, "5GHz"),
        }
    }
}

/// A non-AP Wi-Fi device reported by the inventory server.
///
/// Replaced wholesale every capture cycle; the pipeline never mutates it.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct WifiDevice {
    pub mac_address: String,
    /// Device type as reported by the inventory (e.g. `Wi-Fi Client`)
    pub device_type: String,
    /// Per-minute signal samples (dBm), fixed-size ring; `0` means no sample
    pub signal_history: Vec<i32>,
    /// Working channel number, `0` when unknown
    pub channel: u32,
    pub band: Option<WifiBand>,
    pub connected_bssid: Option<String>,
    pub last_seen: DateTime<Utc>,
}
