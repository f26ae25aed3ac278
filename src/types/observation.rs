//! Decoded cellular station sighting

use serde::{Deserialize, Serialize};

/// One station identifier seen in one decoded frame.
///
/// Ephemeral: exists only within one capture window before it is reduced
/// into an [`OccupancyList`](super::OccupancyList).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RawObservation {
    /// TMSI of the mobile station (e.g. `0x120ff0d7`)
    pub station_id: String,
    /// ARFCN reported in the frame header
    pub channel_ref: String,
    /// Signal level reported by the decoder (dBm)
    pub signal_level: i32,
    /// Frequency the capture session was tuned to (MHz)
    pub source_frequency: f64,
}
