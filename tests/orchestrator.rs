//! Orchestrator tests
//!
//! Both domains run with stand-in tools: `sh` scripts for the radio chain and
//! `sleep` for the inventory server, with the device query served from memory.
#![cfg(unix)]

use std::path::Path;
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use chrono::Utc;
use occupancy_sensor::acquisition::inventory::write_cache;
use occupancy_sensor::acquisition::{DeviceInventory, KismetError, SessionManager};
use occupancy_sensor::config::{CellularConfig, CommandSpec, SensorConfig, SystemConfig, WifiConfig};
use occupancy_sensor::pipeline::{PipelineOrchestrator, PipelineState};
use occupancy_sensor::types::{Channel, GsmBand, PipelineStatus, WifiBand, WifiDevice};
use tokio_util::sync::CancellationToken;

struct FixedInventory(Option<Vec<WifiDevice>>);

#[async_trait]
impl DeviceInventory for FixedInventory {
    async fn recent_devices(&self) -> Result<Vec<WifiDevice>, KismetError> {
        self.0
            .clone()
            .ok_or(KismetError::Status(reqwest::StatusCode::SERVICE_UNAVAILABLE))
    }

    fn inventory_name(&self) -> &str {
        "fixed"
    }
}

fn station(mac: &str) -> WifiDevice {
    WifiDevice {
        mac_address: mac.to_string(),
        device_type: "Wi-Fi Client".to_string(),
        signal_history: vec![-50, -52, -51],
        channel: 6,
        band: WifiBand::from_channel(6),
        connected_bssid: None,
        last_seen: Utc::now(),
    }
}

fn sh(script: &str) -> CommandSpec {
    CommandSpec::new("sh", &["-c", script])
}

/// Cellular over one cached channel; the decoder reports a single strong
/// station, then idles.
fn cellular(dir: &Path) -> CellularConfig {
    let cache = dir.join("nearby_channels.json");
    write_cache(
        &cache,
        &[Channel {
            arfcn: "975".to_string(),
            frequency: 925.2,
            power: -40.0,
            band: GsmBand::Gsm900,
        }],
    )
    .unwrap();

    let decoder = "\
echo 'Frame 1: 81 bytes on wire (648 bits), 81 bytes captured (648 bits) on interface lo, id 0'; \
echo 'GSM TAP Header, ARFCN: 975 (Downlink), TS: 0, Channel: CCCH (0)'; \
echo '    ..00 0011 1100 1111 = ARFCN: 975'; \
echo '    Signal Level: -20 dBm'; \
echo '        TMSI/P-TMSI: 0x5eed0001'; \
sleep 30";

    CellularConfig {
        bands: vec![GsmBand::Gsm900],
        channel_cache_path: cache,
        scan_timeout_secs: 5,
        teardown_grace_secs: 1,
        safety_margin_secs: 1,
        scanner: sh("exit 7"),
        capture: sh("sleep 30"),
        decoder: sh(decoder),
        ..CellularConfig::default()
    }
}

fn wifi(dir: &Path, window_secs: u64) -> WifiConfig {
    WifiConfig {
        capture_window_secs: Some(window_secs),
        pid_file: dir.join("kismet.pid"),
        artifact_dir: dir.to_path_buf(),
        server: CommandSpec::new("sleep", &["30"]),
        ..WifiConfig::default()
    }
}

/// A 4s cycle: cellular captures its one channel for 3s, Wi-Fi listens for 2s.
fn sensor_config(dir: &Path) -> SensorConfig {
    SensorConfig {
        system: SystemConfig {
            cloud_sync_interval_secs: 4,
            data_dir: dir.to_path_buf(),
            ..SystemConfig::default()
        },
        cellular: cellular(dir),
        wifi: wifi(dir, 2),
        ..SensorConfig::default()
    }
}

#[tokio::test]
async fn domains_run_concurrently_and_both_are_awaited() {
    let dir = tempfile::tempdir().unwrap();
    let config = sensor_config(dir.path());
    let manager = SessionManager::shared();
    let inventory = Arc::new(FixedInventory(Some(vec![station("02:00:00:00:00:01")])));
    let orchestrator = PipelineOrchestrator::with_manager(&config, inventory, Arc::clone(&manager));

    let started = Instant::now();
    let report = orchestrator.run(&CancellationToken::new()).await;
    let elapsed = started.elapsed();

    assert_eq!(report.cellular.status, PipelineStatus::Success, "error: {:?}", report.cellular.error);
    assert_eq!(report.wifi.status, PipelineStatus::Success, "error: {:?}", report.wifi.error);
    assert!(report.is_success());
    assert_eq!(report.cellular.list.iter().collect::<Vec<_>>(), vec!["0x5eed0001"]);
    assert_eq!(report.wifi.list.iter().collect::<Vec<_>>(), vec!["02:00:00:00:00:01"]);

    // Sequential runs would need the 3s capture plus the 2s window.
    assert!(elapsed >= Duration::from_millis(2500), "cellular window cut short: {elapsed:?}");
    assert!(elapsed < Duration::from_millis(4500), "domains ran one after the other: {elapsed:?}");
    assert_eq!(manager.active_count(), 0);
}

#[tokio::test]
async fn disabled_domains_report_success_with_empty_lists() {
    let dir = tempfile::tempdir().unwrap();
    let mut config = sensor_config(dir.path());
    config.cellular.enabled = false;
    config.wifi.enabled = false;
    let orchestrator = PipelineOrchestrator::new(&config, Arc::new(FixedInventory(None)));

    let started = Instant::now();
    let report = orchestrator.run(&CancellationToken::new()).await;

    assert!(started.elapsed() < Duration::from_secs(1));
    assert!(report.is_success());
    for domain in [&report.cellular, &report.wifi] {
        assert_eq!(domain.status, PipelineStatus::Success);
        assert_eq!(domain.state, PipelineState::Init);
        assert!(domain.list.is_empty());
        assert!(domain.error.is_none());
    }
}

#[tokio::test]
async fn one_failed_domain_fails_the_cycle() {
    let dir = tempfile::tempdir().unwrap();
    let mut config = sensor_config(dir.path());
    config.cellular.enabled = false;
    config.wifi.capture_window_secs = Some(0);
    let orchestrator = PipelineOrchestrator::new(&config, Arc::new(FixedInventory(None)));

    let report = orchestrator.run(&CancellationToken::new()).await;

    assert!(report.cellular.is_success());
    assert_eq!(report.wifi.status, PipelineStatus::Failed);
    assert!(report.wifi.list.is_empty());
    assert!(!report.is_success());
}
