//! Config Validation Tests
//!
//! Exercise the two-pass config load (unknown-key rejection, then range
//! validation) through the public API only.

use occupancy_sensor::config::validation::{
    known_config_keys, suggest_correction, validate_ranges, validate_unknown_keys,
};
use occupancy_sensor::config::{ConfigError, SensorConfig};
use occupancy_sensor::types::GsmBand;

// ============================================================================
// Unknown Keys
// ============================================================================

#[test]
fn typo_in_wifi_threshold_suggests_correction() {
    let toml_str = r#"
[wifi]
signal_treshold_24ghz_dbm = -60
"#;
    let warnings = validate_unknown_keys(toml_str);
    assert_eq!(warnings.len(), 1, "Expected exactly 1 warning");
    assert_eq!(warnings[0].field, "wifi.signal_treshold_24ghz_dbm");
    assert_eq!(
        warnings[0].suggestion.as_deref(),
        Some("wifi.signal_threshold_24ghz_dbm")
    );
}

#[test]
fn unknown_key_rejects_whole_config() {
    let toml_str = r#"
[cellular]
sample_rat = 1.6e6
"#;
    match SensorConfig::from_toml_str(toml_str) {
        Err(ConfigError::UnknownKeys(keys)) => {
            assert_eq!(keys.len(), 1);
            assert!(keys[0].contains("cellular.sample_rat"));
            assert!(keys[0].contains("cellular.sample_rate"), "should suggest: {}", keys[0]);
        }
        other => panic!("expected UnknownKeys, got {other:?}"),
    }
}

#[test]
fn command_template_keys_are_known() {
    let toml_str = r#"
[cellular.scanner]
program = "grgsm_scanner"
args = ["-b", "{band}"]

[wifi.server]
program = "kismet"
args = ["--no-ncurses"]
"#;
    assert!(validate_unknown_keys(toml_str).is_empty());
    let config = SensorConfig::from_toml_str(toml_str).unwrap();
    assert_eq!(config.cellular.scanner.args, vec!["-b", "{band}"]);
}

#[test]
fn inventory_password_is_not_a_file_key() {
    let toml_str = r#"
[wifi]
password = "hunter2"
"#;
    match SensorConfig::from_toml_str(toml_str) {
        Err(ConfigError::UnknownKeys(keys)) => {
            assert_eq!(keys.len(), 1);
            assert!(keys[0].contains("wifi.password"));
        }
        other => panic!("expected UnknownKeys, got {other:?}"),
    }

    let mut config = SensorConfig::default();
    config.wifi.password = "from-env".to_string();
    let rendered = config.to_toml().unwrap();
    assert!(!rendered.contains("from-env"), "secrets must not be written back out");
}

#[test]
fn unrelated_key_gets_no_suggestion() {
    let known = known_config_keys();
    assert_eq!(suggest_correction("completely.different.thing", &known), None);
}

#[test]
fn full_config_is_accepted() {
    let toml_str = r#"
[system]
location_id = "atrium-2"
device_id = "sensor-14"
cloud_sync_interval_secs = 120
data_dir = "/var/lib/occupancy"

[cellular]
enabled = true
bands = ["GSM900", "DCS1800"]
sample_rate = 2.0e6
signal_threshold_dbm = -35
scan_expire_secs = 900

[wifi]
server_port = 2501
max_deviation_db = 8
max_deviation_percent = 40
capture_window_secs = 100

[preflight]
enabled = false

[upload]
endpoint = "https://ingest.example.net/occupancy"
"#;
    assert!(validate_unknown_keys(toml_str).is_empty());
    let config = SensorConfig::from_toml_str(toml_str).unwrap();
    assert_eq!(config.system.cloud_sync_interval_secs, 120);
    assert_eq!(config.cellular.bands, vec![GsmBand::Gsm900, GsmBand::Dcs1800]);
    assert_eq!(config.wifi.capture_window_secs, Some(100));
    assert!(!config.preflight.enabled);
    assert!(config.upload.is_enabled());
}

// ============================================================================
// Malformed Values
// ============================================================================

#[test]
fn unknown_band_fails_deserialization() {
    let toml_str = r#"
[cellular]
bands = ["GSM2000"]
"#;
    assert!(matches!(
        SensorConfig::from_toml_str(toml_str),
        Err(ConfigError::Toml(_))
    ));
}

#[test]
fn out_of_range_values_are_all_reported() {
    let toml_str = r#"
[system]
cloud_sync_interval_secs = 0

[cellular]
sample_rate = -1.0

[wifi]
max_deviation_percent = 150
"#;
    match SensorConfig::from_toml_str(toml_str) {
        Err(ConfigError::Validation(errors)) => {
            assert!(errors.iter().any(|e| e.contains("cloud_sync_interval_secs")));
            assert!(errors.iter().any(|e| e.contains("sample_rate")));
            assert!(errors.iter().any(|e| e.contains("max_deviation_percent")));
        }
        other => panic!("expected Validation, got {other:?}"),
    }
}

#[test]
fn empty_command_program_rejected() {
    let toml_str = r#"
[cellular.decoder]
program = ""
"#;
    match SensorConfig::from_toml_str(toml_str) {
        Err(ConfigError::Validation(errors)) => {
            assert!(errors.iter().any(|e| e.contains("cellular.decoder.program")));
        }
        other => panic!("expected Validation, got {other:?}"),
    }
}

#[test]
fn disabled_cellular_may_have_no_bands() {
    let mut config = SensorConfig::default();
    config.cellular.enabled = false;
    config.cellular.bands.clear();
    assert!(validate_ranges(&config).is_empty());
}
