//! Wi-Fi pipeline end-to-end tests
//!
//! The inventory server is a `sleep` stand-in and the device query is served
//! by a fixed in-memory inventory, so the server lifecycle, the listening
//! window and the filter run exactly as in production.
#![cfg(unix)]

use std::os::unix::process::{CommandExt, ExitStatusExt};
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use chrono::Utc;
use occupancy_sensor::acquisition::{DeviceInventory, KismetError, SessionManager};
use occupancy_sensor::config::{CommandSpec, WifiConfig};
use occupancy_sensor::pipeline::{PipelineState, WifiPipeline};
use occupancy_sensor::types::{PipelineStatus, WifiBand, WifiDevice};
use tokio_util::sync::CancellationToken;

/// Serves a fixed device list, or an HTTP-style failure.
struct FixedInventory {
    devices: Option<Vec<WifiDevice>>,
    queries: AtomicUsize,
}

impl FixedInventory {
    fn serving(devices: Vec<WifiDevice>) -> Arc<Self> {
        Arc::new(Self {
            devices: Some(devices),
            queries: AtomicUsize::new(0),
        })
    }

    fn failing() -> Arc<Self> {
        Arc::new(Self {
            devices: None,
            queries: AtomicUsize::new(0),
        })
    }
}

#[async_trait]
impl DeviceInventory for FixedInventory {
    async fn recent_devices(&self) -> Result<Vec<WifiDevice>, KismetError> {
        self.queries.fetch_add(1, Ordering::SeqCst);
        self.devices
            .clone()
            .ok_or(KismetError::Status(reqwest::StatusCode::UNAUTHORIZED))
    }

    fn inventory_name(&self) -> &str {
        "fixed"
    }
}

fn device(mac: &str, channel: u32, samples: &[i32]) -> WifiDevice {
    WifiDevice {
        mac_address: mac.to_string(),
        device_type: "Wi-Fi Client".to_string(),
        signal_history: samples.to_vec(),
        channel,
        band: WifiBand::from_channel(channel),
        connected_bssid: None,
        last_seen: Utc::now(),
    }
}

fn config(dir: &Path) -> WifiConfig {
    WifiConfig {
        capture_window_secs: Some(0),
        pid_file: dir.join("kismet.pid"),
        artifact_dir: dir.to_path_buf(),
        server: CommandSpec::new("sleep", &["30"]),
        ..WifiConfig::default()
    }
}

fn pipeline(cfg: &WifiConfig, inventory: Arc<FixedInventory>, manager: &Arc<SessionManager>) -> WifiPipeline {
    WifiPipeline::new(cfg, Duration::from_secs(300), Duration::from_secs(1), inventory, manager)
}

#[tokio::test]
async fn stable_strong_station_is_admitted() {
    let dir = tempfile::tempdir().unwrap();
    let cfg = config(dir.path());
    let inventory = FixedInventory::serving(vec![
        // median -57.5 against -60, no sample below -67.5
        device("11:22:33:44:55:66", 6, &[0, -55, -58, -60, -57]),
        // never heard
        device("22:22:22:22:22:22", 6, &[0, 0, 0, 0, 0]),
        // too weak for 5 GHz
        device("33:33:33:33:33:33", 36, &[-70, -72, -71]),
        // unknown channel
        device("44:44:44:44:44:44", 0, &[-40, -41]),
    ]);
    let manager = SessionManager::shared();

    let report = pipeline(&cfg, Arc::clone(&inventory), &manager)
        .run(&CancellationToken::new())
        .await;

    assert_eq!(report.status, PipelineStatus::Success, "error: {:?}", report.error);
    assert_eq!(report.state, PipelineState::Done);
    assert_eq!(report.list.iter().collect::<Vec<_>>(), vec!["11:22:33:44:55:66"]);
    assert_eq!(inventory.queries.load(Ordering::SeqCst), 1);
    assert!(!cfg.pid_file.exists(), "pid file is removed when the server stops");
    assert_eq!(manager.active_count(), 0);
}

#[tokio::test]
async fn capture_artifacts_are_removed_after_the_window() {
    let dir = tempfile::tempdir().unwrap();
    let cfg = config(dir.path());
    std::fs::write(dir.path().join("Kismet-20240101-00-00-00-1.kismet"), b"db").unwrap();
    std::fs::write(dir.path().join("keep.txt"), b"other").unwrap();
    let manager = SessionManager::shared();

    let report = pipeline(&cfg, FixedInventory::serving(vec![]), &manager)
        .run(&CancellationToken::new())
        .await;

    assert!(report.is_success());
    assert!(report.list.is_empty());
    assert!(!dir.path().join("Kismet-20240101-00-00-00-1.kismet").exists());
    assert!(dir.path().join("keep.txt").exists());
}

#[tokio::test]
async fn query_failure_reports_empty_failed_list() {
    let dir = tempfile::tempdir().unwrap();
    let cfg = config(dir.path());
    let manager = SessionManager::shared();

    let report = pipeline(&cfg, FixedInventory::failing(), &manager)
        .run(&CancellationToken::new())
        .await;

    assert_eq!(report.into_parts(), (Vec::new(), 1));
    assert!(!cfg.pid_file.exists(), "the server is stopped even when the query fails");
    assert_eq!(manager.active_count(), 0);
}

#[tokio::test]
async fn stale_server_from_previous_run_is_killed() {
    let dir = tempfile::tempdir().unwrap();
    let cfg = config(dir.path());

    let mut stale = std::process::Command::new("sleep")
        .arg("30")
        .process_group(0)
        .spawn()
        .unwrap();
    std::fs::write(&cfg.pid_file, stale.id().to_string()).unwrap();

    let manager = SessionManager::shared();
    let report = pipeline(&cfg, FixedInventory::serving(vec![]), &manager)
        .run(&CancellationToken::new())
        .await;
    assert!(report.is_success(), "error: {:?}", report.error);

    let deadline = Instant::now() + Duration::from_secs(5);
    let status = loop {
        if let Some(status) = stale.try_wait().unwrap() {
            break status;
        }
        assert!(Instant::now() < deadline, "stale server survived");
        std::thread::sleep(Duration::from_millis(50));
    };
    assert_eq!(status.signal(), Some(libc::SIGKILL));
}

#[cfg(target_os = "linux")]
#[tokio::test]
async fn recycled_pid_of_another_program_is_left_alone() {
    let dir = tempfile::tempdir().unwrap();
    let cfg = WifiConfig {
        server: CommandSpec::new("sh", &["-c", "sleep 30"]),
        ..config(dir.path())
    };

    let mut unrelated = std::process::Command::new("sleep")
        .arg("300")
        .process_group(0)
        .spawn()
        .unwrap();
    std::fs::write(&cfg.pid_file, unrelated.id().to_string()).unwrap();

    let manager = SessionManager::shared();
    let report = pipeline(&cfg, FixedInventory::serving(vec![]), &manager)
        .run(&CancellationToken::new())
        .await;
    assert!(report.is_success(), "error: {:?}", report.error);
    assert!(!cfg.pid_file.exists());

    std::thread::sleep(Duration::from_millis(200));
    assert!(unrelated.try_wait().unwrap().is_none(), "unrelated process was killed");
    unrelated.kill().unwrap();
    unrelated.wait().unwrap();
}

#[tokio::test]
async fn missing_server_binary_fails_without_query() {
    let dir = tempfile::tempdir().unwrap();
    let cfg = WifiConfig {
        server: CommandSpec::new("/nonexistent/kismet", &[]),
        ..config(dir.path())
    };
    let inventory = FixedInventory::serving(vec![device("11:22:33:44:55:66", 6, &[-40])]);
    let manager = SessionManager::shared();

    let report = pipeline(&cfg, Arc::clone(&inventory), &manager)
        .run(&CancellationToken::new())
        .await;

    assert_eq!(report.status, PipelineStatus::Failed);
    assert!(report.list.is_empty());
    assert_eq!(inventory.queries.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn cancellation_during_window_stops_server() {
    let dir = tempfile::tempdir().unwrap();
    let cfg = WifiConfig {
        capture_window_secs: Some(60),
        ..config(dir.path())
    };
    let inventory = FixedInventory::serving(vec![]);
    let manager = SessionManager::shared();
    let cancel = CancellationToken::new();
    let trigger = cancel.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(200)).await;
        trigger.cancel();
    });

    let started = Instant::now();
    let report = pipeline(&cfg, Arc::clone(&inventory), &manager).run(&cancel).await;

    assert_eq!(report.status, PipelineStatus::Failed);
    assert!(started.elapsed() < Duration::from_secs(10));
    assert_eq!(inventory.queries.load(Ordering::SeqCst), 0);
    assert!(!cfg.pid_file.exists());
    assert_eq!(manager.active_count(), 0);
}
