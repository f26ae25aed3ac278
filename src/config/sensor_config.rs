//! Sensor Configuration - every tunable as a typed TOML value
//!
//! Each section implements `Default` with the values the sensor ships with,
//! so a deployment with no config file behaves exactly like the defaults
//! documented in `defaults.rs`.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{info, warn};

use super::defaults;
use crate::types::GsmBand;

// ============================================================================
// Top-Level Config
// ============================================================================

/// Root configuration for one sensor deployment.
///
/// Load with `SensorConfig::load()` which searches:
/// 1. `$OCCUPANCY_CONFIG` env var
/// 2. `./sensor_config.toml`
/// 3. Built-in defaults
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SensorConfig {
    #[serde(default)]
    pub system: SystemConfig,

    #[serde(default)]
    pub cellular: CellularConfig,

    #[serde(default)]
    pub wifi: WifiConfig,

    #[serde(default)]
    pub preflight: PreflightConfig,

    #[serde(default)]
    pub upload: UploadConfig,
}

/// Environment variable naming an explicit config file.
pub const CONFIG_ENV_VAR: &str = "OCCUPANCY_CONFIG";

/// Config file looked up in the working directory.
pub const LOCAL_CONFIG_FILE: &str = "sensor_config.toml";

impl SensorConfig {
    /// Load configuration using the standard search order:
    /// 1. `$OCCUPANCY_CONFIG`
    /// 2. `./sensor_config.toml`
    /// 3. Built-in defaults
    ///
    /// A file that exists but fails to parse or validate is an error; it is
    /// never silently replaced by defaults.
    pub fn load() -> Result<Self, ConfigError> {
        if let Ok(path) = std::env::var(CONFIG_ENV_VAR) {
            let p = PathBuf::from(&path);
            if p.exists() {
                let config = Self::load_from_file(&p)?;
                info!(path = %p.display(), location = %config.system.location_id, "Loaded sensor config from {}", CONFIG_ENV_VAR);
                return Ok(config);
            }
            warn!(path = %path, "{} points to non-existent file, falling back", CONFIG_ENV_VAR);
        }

        let local = PathBuf::from(LOCAL_CONFIG_FILE);
        if local.exists() {
            let config = Self::load_from_file(&local)?;
            info!(location = %config.system.location_id, "Loaded sensor config from ./{}", LOCAL_CONFIG_FILE);
            return Ok(config);
        }

        info!("No {} found, using built-in defaults", LOCAL_CONFIG_FILE);
        Ok(Self::default())
    }

    /// Load from a specific TOML file path.
    pub fn load_from_file(path: &Path) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path)
            .map_err(|e| ConfigError::Io(path.to_path_buf(), e))?;
        Self::from_toml_str(&contents).map_err(|e| match e {
            ConfigError::Toml(e) => ConfigError::Parse(path.to_path_buf(), e),
            other => other,
        })
    }

    /// Parse and validate a TOML document.
    ///
    /// Two passes: unknown keys are rejected first (with suggestions), then
    /// serde deserialization and range validation.
    pub fn from_toml_str(contents: &str) -> Result<Self, ConfigError> {
        let unknown = super::validation::validate_unknown_keys(contents);
        if !unknown.is_empty() {
            return Err(ConfigError::UnknownKeys(
                unknown.iter().map(ToString::to_string).collect(),
            ));
        }

        let config: Self = toml::from_str(contents).map_err(ConfigError::Toml)?;
        config.validate()?;
        Ok(config)
    }

    /// Serialize the current config to a TOML string.
    pub fn to_toml(&self) -> Result<String, ConfigError> {
        toml::to_string_pretty(self).map_err(ConfigError::Serialize)
    }

    /// Overlay secrets that must not live in the TOML file.
    pub fn apply_env_overrides(&mut self) {
        if let Ok(password) = std::env::var("KISMET_PASSWORD") {
            self.wifi.password = password;
        }
    }

    /// Validate every value for range and internal consistency.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let mut errors = super::validation::validate_ranges(self);

        Self::check_command(&self.cellular.scanner, "cellular.scanner", &mut errors);
        Self::check_command(&self.cellular.capture, "cellular.capture", &mut errors);
        Self::check_command(&self.cellular.decoder, "cellular.decoder", &mut errors);
        Self::check_command(&self.wifi.server, "wifi.server", &mut errors);

        if errors.is_empty() {
            Ok(())
        } else {
            Err(ConfigError::Validation(errors))
        }
    }

    fn check_command(cmd: &CommandSpec, name: &str, errors: &mut Vec<String>) {
        if cmd.program.trim().is_empty() {
            errors.push(format!("{name}.program must not be empty"));
        }
    }

    pub const fn cycle_duration(&self) -> Duration {
        Duration::from_secs(self.system.cloud_sync_interval_secs)
    }
}

// ============================================================================
// Error Type
// ============================================================================

#[derive(Debug)]
pub enum ConfigError {
    Io(PathBuf, std::io::Error),
    Parse(PathBuf, toml::de::Error),
    Toml(toml::de::Error),
    Serialize(toml::ser::Error),
    UnknownKeys(Vec<String>),
    Validation(Vec<String>),
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigError::Io(path, e) => write!(f, "Config I/O error ({}): {}", path.display(), e),
            ConfigError::Parse(path, e) => {
                write!(f, "Config parse error in {}: {}", path.display(), e)
            }
            ConfigError::Toml(e) => write!(f, "Config parse error: {}", e),
            ConfigError::Serialize(e) => write!(f, "Config serialization error: {}", e),
            ConfigError::UnknownKeys(keys) => {
                write!(f, "Unknown config keys: {}", keys.join("; "))
            }
            ConfigError::Validation(errors) => {
                write!(f, "Config validation failed:")?;
                for e in errors {
                    write!(f, "\n  - {}", e)?;
                }
                Ok(())
            }
        }
    }
}

impl std::error::Error for ConfigError {}

// ============================================================================
// External Command Templates
// ============================================================================

/// An external tool invocation. `{placeholder}` tokens inside `args` are
/// substituted by [`CommandSpec::render`] just before spawning.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct CommandSpec {
    pub program: String,
    #[serde(default)]
    pub args: Vec<String>,
}

impl CommandSpec {
    pub fn new(program: &str, args: &[&str]) -> Self {
        Self {
            program: program.to_string(),
            args: args.iter().map(ToString::to_string).collect(),
        }
    }

    /// Substitute `{name}` tokens in every argument.
    pub fn render(&self, vars: &[(&str, String)]) -> Self {
        let args = self
            .args
            .iter()
            .map(|arg| {
                vars.iter().fold(arg.clone(), |acc, (name, value)| {
                    acc.replace(&format!("{{{name}}}"), value)
                })
            })
            .collect();
        Self {
            program: self.program.clone(),
            args,
        }
    }
}

impl std::fmt::Display for CommandSpec {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.program)?;
        for arg in &self.args {
            write!(f, " {arg}")?;
        }
        Ok(())
    }
}

// ============================================================================
// [system]
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SystemConfig {
    #[serde(default = "default_location_id")]
    pub location_id: String,

    #[serde(default = "default_device_id")]
    pub device_id: String,

    /// Outer period between uploads; also the total capture budget per cycle.
    #[serde(default = "default_cloud_sync_interval")]
    pub cloud_sync_interval_secs: u64,

    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,
}

fn default_location_id() -> String {
    "default".to_string()
}
fn default_device_id() -> String {
    "default".to_string()
}
fn default_cloud_sync_interval() -> u64 {
    defaults::CLOUD_SYNC_INTERVAL_SECS
}
fn default_data_dir() -> PathBuf {
    PathBuf::from(defaults::DATA_DIR)
}

impl Default for SystemConfig {
    fn default() -> Self {
        Self {
            location_id: default_location_id(),
            device_id: default_device_id(),
            cloud_sync_interval_secs: default_cloud_sync_interval(),
            data_dir: default_data_dir(),
        }
    }
}

// ============================================================================
// [cellular]
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CellularConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,

    #[serde(default = "default_bands")]
    pub bands: Vec<GsmBand>,

    #[serde(default = "default_sample_rate")]
    pub sample_rate: f64,

    #[serde(default = "default_cellular_threshold")]
    pub signal_threshold_dbm: i32,

    /// Channel cache lifetime before a rescan.
    #[serde(default = "default_scan_expire")]
    pub scan_expire_secs: u64,

    #[serde(default = "default_channel_cache_path")]
    pub channel_cache_path: PathBuf,

    #[serde(default = "default_scan_timeout")]
    pub scan_timeout_secs: u64,

    #[serde(default = "default_cellular_margin")]
    pub safety_margin_secs: u64,

    #[serde(default = "default_teardown_grace")]
    pub teardown_grace_secs: u64,

    /// Channel scanner; placeholders `{band}`, `{sample_rate}`.
    #[serde(default = "default_scanner")]
    pub scanner: CommandSpec,

    /// Capture (tuner) process; placeholders `{frequency}`, `{sample_rate}`.
    #[serde(default = "default_capture")]
    pub capture: CommandSpec,

    /// Decoder reading the local packet source and printing frames to stdout.
    #[serde(default = "default_decoder")]
    pub decoder: CommandSpec,
}

fn default_true() -> bool {
    true
}
fn default_bands() -> Vec<GsmBand> {
    vec![GsmBand::Gsm900, GsmBand::Dcs1800]
}
fn default_sample_rate() -> f64 {
    defaults::SDR_SAMPLE_RATE
}
fn default_cellular_threshold() -> i32 {
    defaults::CELLULAR_SIGNAL_THRESHOLD_DBM
}
fn default_scan_expire() -> u64 {
    defaults::CELL_SCAN_EXPIRE_SECS
}
fn default_channel_cache_path() -> PathBuf {
    PathBuf::from(defaults::CHANNEL_CACHE_PATH)
}
fn default_scan_timeout() -> u64 {
    defaults::SCAN_TIMEOUT_SECS
}
fn default_cellular_margin() -> u64 {
    defaults::CELLULAR_SAFETY_MARGIN_SECS
}
fn default_teardown_grace() -> u64 {
    defaults::TEARDOWN_GRACE_SECS
}
fn default_scanner() -> CommandSpec {
    CommandSpec::new("grgsm_scanner", &["-b", "{band}", "-s", "{sample_rate}", "--speed=5"])
}
fn default_capture() -> CommandSpec {
    CommandSpec::new("grgsm_livemon_headless", &["-f", "{frequency}M", "-s", "{sample_rate}"])
}
fn default_decoder() -> CommandSpec {
    CommandSpec::new("tshark", &["-i", "lo", "-l", "-Y", "e212.imsi or gsm_a.tmsi", "-V"])
}

impl Default for CellularConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            bands: default_bands(),
            sample_rate: default_sample_rate(),
            signal_threshold_dbm: default_cellular_threshold(),
            scan_expire_secs: default_scan_expire(),
            channel_cache_path: default_channel_cache_path(),
            scan_timeout_secs: default_scan_timeout(),
            safety_margin_secs: default_cellular_margin(),
            teardown_grace_secs: default_teardown_grace(),
            scanner: default_scanner(),
            capture: default_capture(),
            decoder: default_decoder(),
        }
    }
}

impl CellularConfig {
    pub const fn scan_expiry(&self) -> Duration {
        Duration::from_secs(self.scan_expire_secs)
    }

    pub const fn safety_margin(&self) -> Duration {
        Duration::from_secs(self.safety_margin_secs)
    }

    pub const fn teardown_grace(&self) -> Duration {
        Duration::from_secs(self.teardown_grace_secs)
    }
}

// ============================================================================
// [wifi]
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WifiConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,

    #[serde(default = "default_server_host")]
    pub server_host: String,

    #[serde(default = "default_server_port")]
    pub server_port: u16,

    #[serde(default = "default_username")]
    pub username: String,

    /// Only ever set from `$KISMET_PASSWORD`; see
    /// [`SensorConfig::apply_env_overrides`].
    #[serde(skip)]
    pub password: String,

    #[serde(default = "default_last_seen")]
    pub last_seen_secs: u64,

    #[serde(default = "default_threshold_24")]
    pub signal_threshold_24ghz_dbm: i32,

    #[serde(default = "default_threshold_5")]
    pub signal_threshold_5ghz_dbm: i32,

    #[serde(default = "default_max_deviation")]
    pub max_deviation_db: i32,

    /// Share of samples allowed more than `max_deviation_db` below the median.
    #[serde(default = "default_max_deviation_percent")]
    pub max_deviation_percent: f64,

    /// How long the inventory server listens before it is queried.
    /// Defaults to the cycle interval minus `safety_margin_secs`.
    #[serde(default)]
    pub capture_window_secs: Option<u64>,

    #[serde(default = "default_wifi_margin")]
    pub safety_margin_secs: u64,

    #[serde(default = "default_http_timeout")]
    pub request_timeout_secs: u64,

    #[serde(default = "default_pid_file")]
    pub pid_file: PathBuf,

    /// Directory the server writes its capture logs into.
    #[serde(default = "default_artifact_dir")]
    pub artifact_dir: PathBuf,

    #[serde(default = "default_artifact_prefix")]
    pub artifact_prefix: String,

    #[serde(default = "default_server_command")]
    pub server: CommandSpec,
}

fn default_server_host() -> String {
    "localhost".to_string()
}
fn default_server_port() -> u16 {
    defaults::KISMET_PORT
}
fn default_username() -> String {
    "kismet".to_string()
}
fn default_last_seen() -> u64 {
    defaults::WIFI_LAST_SEEN_SECS
}
fn default_threshold_24() -> i32 {
    defaults::SIGNAL_THRESHOLD_24GHZ_DBM
}
fn default_threshold_5() -> i32 {
    defaults::SIGNAL_THRESHOLD_5GHZ_DBM
}
fn default_max_deviation() -> i32 {
    defaults::MAX_DEVIATION_DB
}
fn default_max_deviation_percent() -> f64 {
    defaults::MAX_DEVIATION_PERCENT
}
fn default_wifi_margin() -> u64 {
    defaults::WIFI_SAFETY_MARGIN_SECS
}
fn default_http_timeout() -> u64 {
    defaults::HTTP_TIMEOUT_SECS
}
fn default_pid_file() -> PathBuf {
    PathBuf::from(defaults::KISMET_PID_FILE)
}
fn default_artifact_dir() -> PathBuf {
    PathBuf::from(".")
}
fn default_artifact_prefix() -> String {
    defaults::KISMET_ARTIFACT_PREFIX.to_string()
}
fn default_server_command() -> CommandSpec {
    CommandSpec::new("kismet", &["--no-ncurses", "-c", "wlan1", "-c", "wlan2"])
}

impl Default for WifiConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            server_host: default_server_host(),
            server_port: default_server_port(),
            username: default_username(),
            password: String::new(),
            last_seen_secs: default_last_seen(),
            signal_threshold_24ghz_dbm: default_threshold_24(),
            signal_threshold_5ghz_dbm: default_threshold_5(),
            max_deviation_db: default_max_deviation(),
            max_deviation_percent: default_max_deviation_percent(),
            capture_window_secs: None,
            safety_margin_secs: default_wifi_margin(),
            request_timeout_secs: default_http_timeout(),
            pid_file: default_pid_file(),
            artifact_dir: default_artifact_dir(),
            artifact_prefix: default_artifact_prefix(),
            server: default_server_command(),
        }
    }
}

impl WifiConfig {
    /// Listening window for one cycle of `cycle` length.
    pub fn capture_window(&self, cycle: Duration) -> Duration {
        match self.capture_window_secs {
            Some(secs) => Duration::from_secs(secs),
            None => cycle.saturating_sub(Duration::from_secs(self.safety_margin_secs)),
        }
    }

    pub const fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

// ============================================================================
// [preflight]
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PreflightConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Substrings identifying an external Wi-Fi adapter in `lsusb` output.
    #[serde(default = "default_wifi_patterns")]
    pub wifi_adapter_patterns: Vec<String>,

    #[serde(default = "default_min_wifi_adapters")]
    pub min_wifi_adapters: usize,

    /// Substrings identifying the SDR in `lsusb` output.
    #[serde(default = "default_sdr_patterns")]
    pub sdr_patterns: Vec<String>,
}

fn default_wifi_patterns() -> Vec<String> {
    vec!["Wireless Adapter".to_string(), "802.11ac NIC".to_string()]
}
fn default_min_wifi_adapters() -> usize {
    defaults::MIN_WIFI_ADAPTERS
}
fn default_sdr_patterns() -> Vec<String> {
    vec!["HackRF".to_string()]
}

impl Default for PreflightConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            wifi_adapter_patterns: default_wifi_patterns(),
            min_wifi_adapters: default_min_wifi_adapters(),
            sdr_patterns: default_sdr_patterns(),
        }
    }
}

// ============================================================================
// [upload]
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UploadConfig {
    /// Ingestion URL. Empty disables the upload step.
    #[serde(default)]
    pub endpoint: String,

    #[serde(default = "default_http_timeout")]
    pub timeout_secs: u64,

    /// Optional local copy of every payload (pretty JSON).
    #[serde(default)]
    pub payload_path: Option<PathBuf>,
}

impl Default for UploadConfig {
    fn default() -> Self {
        Self {
            endpoint: String::new(),
            timeout_secs: default_http_timeout(),
            payload_path: None,
        }
    }
}

impl UploadConfig {
    pub fn is_enabled(&self) -> bool {
        !self.endpoint.trim().is_empty()
    }
}
