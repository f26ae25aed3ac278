//! System-wide default constants.
//!
//! Centralises the numbers the config schema falls back to, grouped by
//! subsystem for easy discovery.

// ============================================================================
// Cycle
// ============================================================================

/// Outer period between successive pipeline runs and uploads (seconds).
pub const CLOUD_SYNC_INTERVAL_SECS: u64 = 300;

/// Default data directory (lock file, Kismet pid file).
pub const DATA_DIR: &str = "./data";

// ============================================================================
// Cellular
// ============================================================================

/// SDR sample rate handed to the scanner and capture tools (samples/s).
pub const SDR_SAMPLE_RATE: f64 = 1.6e6;

/// Minimum decoder signal level for a station to count (dBm).
pub const CELLULAR_SIGNAL_THRESHOLD_DBM: i32 = -30;

/// Channel cache lifetime before a rescan is forced (seconds).
pub const CELL_SCAN_EXPIRE_SECS: u64 = 1_800;

/// Channel cache artifact path.
pub const CHANNEL_CACHE_PATH: &str = "nearby_channels.json";

/// Upper bound on a single band scan (seconds).
pub const SCAN_TIMEOUT_SECS: u64 = 600;

/// Subtracted from every per-channel window (seconds).
pub const CELLULAR_SAFETY_MARGIN_SECS: u64 = 1;

/// Time allowed between SIGTERM and SIGKILL during session teardown (seconds).
pub const TEARDOWN_GRACE_SECS: u64 = 3;

// ============================================================================
// Wi-Fi
// ============================================================================

/// Kismet REST port.
pub const KISMET_PORT: u16 = 2501;

/// Only devices active in this many trailing seconds are queried.
pub const WIFI_LAST_SEEN_SECS: u64 = 300;

/// Median RSSI floor for 2.4 GHz stations (dBm).
pub const SIGNAL_THRESHOLD_24GHZ_DBM: i32 = -60;

/// Median RSSI floor for 5 GHz stations (dBm).
pub const SIGNAL_THRESHOLD_5GHZ_DBM: i32 = -67;

/// Slack below the median before a sample counts as bad (dB).
pub const MAX_DEVIATION_DB: i32 = 10;

/// Share of samples allowed to be bad (percent).
pub const MAX_DEVIATION_PERCENT: f64 = 50.0;

/// Reserved at the end of the Wi-Fi window for the inventory query (seconds).
pub const WIFI_SAFETY_MARGIN_SECS: u64 = 5;

/// HTTP timeout for the inventory query and the upload (seconds).
pub const HTTP_TIMEOUT_SECS: u64 = 30;

/// Kismet pid file.
pub const KISMET_PID_FILE: &str = "./data/kismet.pid";

/// Prefix of the log files Kismet writes into its working directory.
pub const KISMET_ARTIFACT_PREFIX: &str = "Kismet-";

// ============================================================================
// Preflight
// ============================================================================

/// External Wi-Fi adapters required (one monitors 2.4 GHz, one 5 GHz).
pub const MIN_WIFI_ADAPTERS: usize = 2;
