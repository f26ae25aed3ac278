//! Occupancy Sensor
//!
//! Counts nearby cellular handsets (GSM TMSIs) and Wi-Fi stations (MACs),
//! obfuscates the identifiers and uploads one payload per cycle.
//!
//! # Usage
//!
//! ```bash
//! # One cycle with the config in ./sensor_config.toml
//! occupancy-sensor
//!
//! # Continuous operation, one upload every cloud_sync_interval_secs
//! occupancy-sensor --loop --config /etc/occupancy/sensor_config.toml
//!
//! # Bench testing without the USB hardware attached
//! occupancy-sensor --skip-preflight --wifi-only
//! ```
//!
//! # Environment Variables
//!
//! - `OCCUPANCY_CONFIG`: Path to the TOML config file
//! - `OBFUSCATE_SECRET`: Salt mixed into every obfuscated identifier
//! - `UPLOAD_AUTH_TOKEN`: Bearer token for the upload endpoint
//! - `KISMET_PASSWORD`: Inventory server password
//! - `RUST_LOG`: Logging level (default: info)

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use occupancy_sensor::acquisition::{DeviceInventory, KismetClient, SessionManager};
use occupancy_sensor::config::SensorConfig;
use occupancy_sensor::pipeline::PipelineOrchestrator;
use occupancy_sensor::storage::ProcessLock;
use occupancy_sensor::upload::{read_serial, OccupancyPayload, UploadClient};
use occupancy_sensor::preflight;

/// Status reported when the run was interrupted by Ctrl+C.
const EXIT_INTERRUPTED: i32 = 130;

// ============================================================================
// CLI Arguments
// ============================================================================

#[derive(Parser, Debug)]
#[command(name = "occupancy-sensor")]
#[command(about = "Edge occupancy sensor: cellular and Wi-Fi station counting")]
#[command(version)]
struct CliArgs {
    /// Path to the TOML config file
    #[arg(long, env = "OCCUPANCY_CONFIG", value_name = "PATH")]
    config: Option<PathBuf>,

    /// Skip the USB device check (bench testing)
    #[arg(long)]
    skip_preflight: bool,

    /// Keep running, one cycle every cloud_sync_interval_secs
    #[arg(long = "loop")]
    run_loop: bool,

    /// Emit logs as JSON lines
    #[arg(long)]
    json_logs: bool,

    /// Run only the cellular pipeline
    #[arg(long, conflicts_with = "wifi_only")]
    cellular_only: bool,

    /// Run only the Wi-Fi pipeline
    #[arg(long)]
    wifi_only: bool,
}

fn init_logging(json: bool) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));
    if json {
        tracing_subscriber::fmt()
            .json()
            .with_env_filter(filter)
            .with_target(false)
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_target(false)
            .init();
    }
}

fn load_config(args: &CliArgs) -> Result<SensorConfig> {
    let mut config = match &args.config {
        Some(path) => SensorConfig::load_from_file(path)
            .with_context(|| format!("Failed to load config from {}", path.display()))?,
        None => SensorConfig::load().context("Failed to load sensor config")?,
    };
    config.apply_env_overrides();

    if args.cellular_only {
        config.wifi.enabled = false;
    }
    if args.wifi_only {
        config.cellular.enabled = false;
    }
    Ok(config)
}

// ============================================================================
// Cycle
// ============================================================================

/// Everything one cycle needs beyond the config.
struct Sensor {
    config: SensorConfig,
    orchestrator: PipelineOrchestrator,
    uploader: UploadClient,
    secret: String,
    serial: String,
}

impl Sensor {
    /// Capture, filter, obfuscate and upload. Returns the process status.
    async fn run_cycle(&self, cancel: &CancellationToken) -> i32 {
        let report = self.orchestrator.run(cancel).await;
        if cancel.is_cancelled() {
            return EXIT_INTERRUPTED;
        }
        if !report.is_success() {
            error!(
                cellular = %report.cellular.status,
                wifi = %report.wifi.status,
                "Cycle failed, nothing uploaded"
            );
            return 1;
        }

        let payload = OccupancyPayload::build(&self.config.system, &self.serial, &report, &self.secret);
        self.uploader.send(&payload).await
    }
}

async fn run(args: CliArgs) -> Result<i32> {
    let config = load_config(&args)?;
    info!(
        location = %config.system.location_id,
        device = %config.system.device_id,
        cycle_secs = config.system.cloud_sync_interval_secs,
        cellular = config.cellular.enabled,
        wifi = config.wifi.enabled,
        "Occupancy sensor starting"
    );

    let _lock = ProcessLock::acquire(&config.system.data_dir)?;

    if args.skip_preflight || !config.preflight.enabled {
        warn!("Preflight device check skipped");
    } else if let Err(e) = preflight::check_devices(&config.preflight).await {
        error!(error = %e, "Preflight device check failed");
        return Ok(1);
    }

    let inventory: Arc<dyn DeviceInventory> =
        Arc::new(KismetClient::new(&config.wifi).context("Failed to build inventory client")?);
    let manager = SessionManager::shared();
    let orchestrator = PipelineOrchestrator::with_manager(&config, inventory, Arc::clone(&manager));
    let uploader = UploadClient::from_env(&config.upload).context("Failed to build upload client")?;
    if !config.upload.is_enabled() {
        warn!("No upload endpoint configured, payloads stay local");
    }

    let secret = std::env::var("OBFUSCATE_SECRET").unwrap_or_else(|_| {
        warn!("OBFUSCATE_SECRET not set, identifiers are hashed without a salt");
        String::new()
    });

    // Ctrl+C: cancel every in-flight wait, then sweep whatever is still alive
    let cancel = CancellationToken::new();
    let shutdown_token = cancel.clone();
    let shutdown_manager = Arc::clone(&manager);
    tokio::spawn(async move {
        tokio::signal::ctrl_c().await.ok();
        info!("Received Ctrl+C, terminating capture sessions");
        shutdown_token.cancel();
        let swept = shutdown_manager.terminate_all();
        info!(groups = swept, "Process registry swept");
    });

    let sensor = Sensor {
        orchestrator,
        uploader,
        secret,
        serial: read_serial(),
        config,
    };

    if !args.run_loop {
        return Ok(sensor.run_cycle(&cancel).await);
    }

    let interval = sensor.config.cycle_duration();
    loop {
        let started = tokio::time::Instant::now();
        let code = sensor.run_cycle(&cancel).await;
        if code == EXIT_INTERRUPTED {
            return Ok(code);
        }
        info!(status = code, "Cycle finished");

        // Cycles that ended early (failures) wait out the rest of the interval
        let next = started + interval;
        tokio::select! {
            () = tokio::time::sleep_until(next) => {}
            () = cancel.cancelled() => return Ok(EXIT_INTERRUPTED),
        }
    }
}

// ============================================================================
// Main Entry Point
// ============================================================================

#[tokio::main]
async fn main() -> Result<()> {
    let args = CliArgs::parse();
    init_logging(args.json_logs);

    // The lock is released inside `run`, before the process exits
    let code = run(args).await?;
    if code == 0 {
        info!("Occupancy sensor finished");
    }
    std::process::exit(code);
}
