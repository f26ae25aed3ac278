//! Occupancy filters: reduce raw sightings to the final identifier list.
//!
//! Both variants follow the same shape: keep one sighting per identifier,
//! then admit it only if its signal qualifies. Neither keeps state between
//! runs.

use std::collections::HashSet;

use statrs::statistics::{Data, Median};
use tracing::{debug, info};

use crate::config::WifiConfig;
use crate::types::{OccupancyList, RawObservation, WifiBand, WifiDevice};

// ============================================================================
// Cellular
// ============================================================================

/// Single-threshold filter over decoded station sightings.
#[derive(Debug, Clone, Copy)]
pub struct CellularFilter {
    threshold_dbm: i32,
}

impl CellularFilter {
    pub const fn new(threshold_dbm: i32) -> Self {
        Self { threshold_dbm }
    }

    /// Keep the first sighting per TMSI; admit it if its level is at or
    /// above the threshold.
    pub fn apply(&self, observations: &[RawObservation]) -> OccupancyList {
        let mut seen = HashSet::new();
        let mut list = OccupancyList::new();
        let mut below = 0usize;

        for obs in observations {
            if !seen.insert(obs.station_id.as_str()) {
                continue;
            }
            if obs.signal_level >= self.threshold_dbm {
                list.insert(obs.station_id.clone());
            } else {
                below += 1;
                debug!(tmsi = %obs.station_id, signal_level = obs.signal_level, threshold = self.threshold_dbm, "Station below threshold");
            }
        }

        info!(
            observations = observations.len(),
            unique = seen.len(),
            below_threshold = below,
            admitted = list.len(),
            "Cellular filter applied"
        );
        list
    }
}

// ============================================================================
// Wi-Fi
// ============================================================================

/// Tunables for [`WifiFilter`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct WifiFilterParams {
    pub threshold_24ghz_dbm: i32,
    pub threshold_5ghz_dbm: i32,
    /// Slack below the median before a sample counts as bad (dB).
    pub max_deviation_db: i32,
    /// Share of samples (0.0..=1.0) allowed to be bad.
    pub max_deviation_fraction: f64,
}

impl WifiFilterParams {
    pub const fn threshold_for(&self, band: WifiBand) -> i32 {
        match band {
            WifiBand::Band24GHz => self.threshold_24ghz_dbm,
            WifiBand::Band5GHz => self.threshold_5ghz_dbm,
        }
    }
}

impl From<&WifiConfig> for WifiFilterParams {
    fn from(config: &WifiConfig) -> Self {
        Self {
            threshold_24ghz_dbm: config.signal_threshold_24ghz_dbm,
            threshold_5ghz_dbm: config.signal_threshold_5ghz_dbm,
            max_deviation_db: config.max_deviation_db,
            max_deviation_fraction: config.max_deviation_percent / 100.0,
        }
    }
}

/// Why a device was or was not admitted.
#[derive(Debug, Clone, PartialEq)]
pub enum WifiVerdict {
    Admitted { median: f64, bad: usize, allowed: usize },
    /// Channel 0 or otherwise unknown band.
    UnknownBand,
    /// Empty history, or only zero ("no sample") entries.
    NoSamples,
    /// Median below the band threshold.
    WeakMedian { median: f64, threshold: i32 },
    /// Too many samples more than `max_deviation_db` below the median.
    Unstable { median: f64, bad: usize, allowed: usize },
}

impl WifiVerdict {
    pub const fn is_admitted(&self) -> bool {
        matches!(self, WifiVerdict::Admitted { .. })
    }
}

/// Median + bounded-deviation filter over Wi-Fi signal histories.
#[derive(Debug, Clone, Copy)]
pub struct WifiFilter {
    params: WifiFilterParams,
}

impl WifiFilter {
    pub const fn new(params: WifiFilterParams) -> Self {
        Self { params }
    }

    /// Judge one device.
    pub fn evaluate(&self, device: &WifiDevice) -> WifiVerdict {
        let Some(band) = device.band.filter(|_| device.channel != 0) else {
            return WifiVerdict::UnknownBand;
        };

        let samples: Vec<f64> = device
            .signal_history
            .iter()
            .filter(|&&s| s != 0)
            .map(|&s| f64::from(s))
            .collect();
        if samples.is_empty() {
            return WifiVerdict::NoSamples;
        }

        let n = samples.len();
        let floor = f64::from(self.params.max_deviation_db);
        let median = Data::new(samples.clone()).median();
        let bad = samples.iter().filter(|&&s| s - (median - floor) < 0.0).count();
        let allowed = allowed_bad_samples(n, self.params.max_deviation_fraction);

        let threshold = self.params.threshold_for(band);
        if median < f64::from(threshold) {
            return WifiVerdict::WeakMedian { median, threshold };
        }
        if bad > allowed {
            return WifiVerdict::Unstable { median, bad, allowed };
        }
        WifiVerdict::Admitted { median, bad, allowed }
    }

    /// Admit qualifying devices; the result holds unique MAC addresses.
    pub fn apply(&self, devices: &[WifiDevice]) -> OccupancyList {
        let mut list = OccupancyList::new();
        let mut rejected = 0usize;

        for device in devices {
            let verdict = self.evaluate(device);
            debug!(mac = %device.mac_address, channel = device.channel, verdict = ?verdict, "Wi-Fi device evaluated");
            if verdict.is_admitted() {
                list.insert(device.mac_address.clone());
            } else {
                rejected += 1;
            }
        }

        info!(
            devices = devices.len(),
            rejected,
            admitted = list.len(),
            "Wi-Fi filter applied"
        );
        list
    }
}

/// `round(n × fraction)` with ties to even.
#[allow(
    clippy::cast_possible_truncation,
    clippy::cast_sign_loss,
    clippy::cast_precision_loss
)]
fn allowed_bad_samples(n: usize, fraction: f64) -> usize {
    (n as f64 * fraction.clamp(0.0, 1.0)).round_ties_even() as usize
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn obs(id: &str, level: i32) -> RawObservation {
        RawObservation {
            station_id: id.to_string(),
            channel_ref: "975".to_string(),
            signal_level: level,
            source_frequency: 925.2,
        }
    }

    fn device(mac: &str, channel: u32, history: &[i32]) -> WifiDevice {
        WifiDevice {
            mac_address: mac.to_string(),
            device_type: "Wi-Fi Client".to_string(),
            signal_history: history.to_vec(),
            channel,
            band: WifiBand::from_channel(channel),
            connected_bssid: None,
            last_seen: Utc::now(),
        }
    }

    fn params() -> WifiFilterParams {
        WifiFilterParams {
            threshold_24ghz_dbm: -60,
            threshold_5ghz_dbm: -67,
            max_deviation_db: 10,
            max_deviation_fraction: 0.5,
        }
    }

    #[test]
    fn cellular_first_sighting_wins() {
        let filter = CellularFilter::new(-30);
        let list = filter.apply(&[obs("0x01", -40), obs("0x01", -20)]);
        assert!(list.is_empty());

        let list = filter.apply(&[obs("0x01", -20), obs("0x01", -40)]);
        assert_eq!(list.into_vec(), vec!["0x01"]);
    }

    #[test]
    fn cellular_threshold_is_inclusive() {
        let list = CellularFilter::new(-30).apply(&[obs("0x02", -30), obs("0x03", -31)]);
        assert_eq!(list.into_vec(), vec!["0x02"]);
    }

    #[test]
    fn wifi_mixed_history_admitted() {
        let d = device("aa:bb", 6, &[0, -55, -58, -60, -57]);
        match WifiFilter::new(params()).evaluate(&d) {
            WifiVerdict::Admitted { median, bad, allowed } => {
                assert!((median + 57.5).abs() < 1e-9);
                assert_eq!(bad, 0);
                assert_eq!(allowed, 2);
            }
            other => panic!("expected admission, got {other:?}"),
        }
    }

    #[test]
    fn wifi_all_zero_history_excluded() {
        let d = device("aa:bb", 6, &[0, 0, 0]);
        assert_eq!(WifiFilter::new(params()).evaluate(&d), WifiVerdict::NoSamples);
        let empty = device("aa:bc", 6, &[]);
        assert_eq!(WifiFilter::new(params()).evaluate(&empty), WifiVerdict::NoSamples);
    }

    #[test]
    fn wifi_unknown_channel_excluded() {
        let d = device("aa:bb", 0, &[-40, -41]);
        assert_eq!(WifiFilter::new(params()).evaluate(&d), WifiVerdict::UnknownBand);
    }

    #[test]
    fn wifi_median_exactly_at_threshold_admitted() {
        let d = device("aa:bb", 6, &[-60, -60, -60]);
        assert!(WifiFilter::new(params()).evaluate(&d).is_admitted());
        let d5 = device("aa:bc", 36, &[-67, -67]);
        assert!(WifiFilter::new(params()).evaluate(&d5).is_admitted());
    }

    #[test]
    fn wifi_five_ghz_threshold_used_from_channel_fifteen() {
        // -64 passes the 5 GHz threshold but fails the 2.4 GHz one.
        let filter = WifiFilter::new(params());
        assert!(filter.evaluate(&device("a", 15, &[-64])).is_admitted());
        assert!(!filter.evaluate(&device("b", 14, &[-64])).is_admitted());
    }

    #[test]
    fn wifi_too_many_bad_samples_excluded() {
        // Median -40; only -55 is more than 10 dB below it. 12.5% of 4 rounds to 0.
        let p = WifiFilterParams {
            max_deviation_fraction: 0.125,
            ..params()
        };
        let d = device("aa:bb", 6, &[-40, -40, -55, -30]);
        match WifiFilter::new(p).evaluate(&d) {
            WifiVerdict::Unstable { bad, allowed, .. } => {
                assert_eq!(bad, 1);
                assert_eq!(allowed, 0);
            }
            other => panic!("expected unstable, got {other:?}"),
        }
    }

    #[test]
    fn wifi_bad_count_at_bound_admitted() {
        // Two of four samples are bad and 50% of 4 allows exactly two.
        let d = device("aa:bb", 6, &[-20, -20, -50, -50]);
        let verdict = WifiFilter::new(params()).evaluate(&d);
        assert_eq!(
            verdict,
            WifiVerdict::Admitted { median: -35.0, bad: 2, allowed: 2 }
        );
    }

    #[test]
    fn rounding_is_ties_to_even() {
        assert_eq!(allowed_bad_samples(5, 0.5), 2);
        assert_eq!(allowed_bad_samples(3, 0.5), 2);
        assert_eq!(allowed_bad_samples(1, 0.5), 0);
        assert_eq!(allowed_bad_samples(4, 0.0), 0);
    }

    #[test]
    fn wifi_apply_dedups_mac() {
        let devices = [
            device("aa:bb", 6, &[-50]),
            device("aa:bb", 6, &[-50]),
            device("cc:dd", 6, &[-90]),
        ];
        let list = WifiFilter::new(params()).apply(&devices);
        assert_eq!(list.into_vec(), vec!["aa:bb"]);
    }

    #[test]
    fn params_from_config_convert_percent() {
        let p = WifiFilterParams::from(&WifiConfig::default());
        assert!((p.max_deviation_fraction - 0.5).abs() < 1e-12);
        assert_eq!(p.threshold_for(WifiBand::Band5GHz), -67);
    }
}
