//! Wi-Fi inventory: Kismet server lifecycle and device query
//!
//! One Kismet instance runs for the whole Wi-Fi capture window. Its pid is
//! recorded in a pid file so a server left behind by a crashed run can be
//! killed before a fresh one starts. At the end of the window the device
//! list is fetched with a single POST naming the fields wanted.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::{json, Value};
use thiserror::Error;
use tokio::process::Child;
use tracing::{debug, info, warn};

use super::process::{group_id, is_alive, runs_program, signal_group, signal_pid, spawn_in_group};
use super::session::{CommandSpec, SessionId, SessionManager};
use crate::config::WifiConfig;
use crate::types::{WifiBand, WifiDevice};

// ============================================================================
// Error Types
// ============================================================================

#[derive(Debug, Error)]
pub enum KismetError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Inventory server returned status {0}")]
    Status(reqwest::StatusCode),

    #[error("Failed to start inventory server '{program}': {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Pid file I/O error ({}): {}", .0.display(), .1)]
    PidFile(PathBuf, #[source] std::io::Error),
}

// ============================================================================
// Device Inventory seam
// ============================================================================

/// Source of the recently active Wi-Fi devices.
///
/// Implemented by [`KismetClient`]; tests substitute a fixed list.
#[async_trait]
pub trait DeviceInventory: Send + Sync {
    /// Devices seen within the configured last-seen window, APs excluded.
    async fn recent_devices(&self) -> Result<Vec<WifiDevice>, KismetError>;

    /// Human-readable name for logging.
    fn inventory_name(&self) -> &str;
}

/// Field paths requested from Kismet.
pub const DEVICE_FIELDS: [&str; 6] = [
    "kismet.device.base.type",
    "kismet.device.base.macaddr",
    "kismet.device.base.signal/kismet.common.signal.signal_rrd/kismet.common.rrd.minute_vec",
    "dot11.device/dot11.device.last_bssid",
    "kismet.device.base.mod_time",
    "kismet.device.base.channel",
];

const KEY_TYPE: &str = "kismet.device.base.type";
const KEY_MAC: &str = "kismet.device.base.macaddr";
const KEY_SIGNAL: &str = "kismet.common.rrd.minute_vec";
const KEY_BSSID: &str = "dot11.device.last_bssid";
const KEY_MOD_TIME: &str = "kismet.device.base.mod_time";
const KEY_CHANNEL: &str = "kismet.device.base.channel";

/// Device type Kismet uses for access points.
pub const ACCESS_POINT_TYPE: &str = "Wi-Fi AP";

// ============================================================================
// Kismet HTTP client
// ============================================================================

#[derive(Clone)]
pub struct KismetClient {
    http: reqwest::Client,
    base_url: String,
    username: String,
    password: String,
    last_seen_secs: u64,
}

impl KismetClient {
    pub fn new(config: &WifiConfig) -> Result<Self, KismetError> {
        let http = reqwest::Client::builder()
            .timeout(config.request_timeout())
            .build()?;

        Ok(Self {
            http,
            base_url: format!("http://{}:{}", config.server_host, config.server_port),
            username: config.username.clone(),
            password: config.password.clone(),
            last_seen_secs: config.last_seen_secs,
        })
    }

    pub fn devices_url(&self) -> String {
        format!(
            "{}/devices/last-time/-{}/devices.json",
            self.base_url, self.last_seen_secs
        )
    }
}

#[async_trait]
impl DeviceInventory for KismetClient {
    async fn recent_devices(&self) -> Result<Vec<WifiDevice>, KismetError> {
        let url = self.devices_url();
        info!(url = %url, last_seen_secs = self.last_seen_secs, "Querying Kismet for active devices");

        let resp = self
            .http
            .post(&url)
            .basic_auth(&self.username, Some(&self.password))
            .json(&json!({ "fields": DEVICE_FIELDS }))
            .send()
            .await?;

        if !resp.status().is_success() {
            return Err(KismetError::Status(resp.status()));
        }

        let raw: Vec<Value> = resp.json().await?;
        info!(count = raw.len(), "Received devices from Kismet");
        Ok(parse_devices(raw))
    }

    fn inventory_name(&self) -> &str {
        "kismet"
    }
}

/// Convert Kismet device objects into [`WifiDevice`]s.
///
/// Access points are dropped. Objects without a MAC address are skipped with
/// a warning; other missing fields fall back to empty values that the
/// Wi-Fi filter excludes.
pub fn parse_devices(raw: Vec<Value>) -> Vec<WifiDevice> {
    let total = raw.len();
    let mut access_points = 0usize;
    let devices: Vec<WifiDevice> = raw
        .into_iter()
        .filter_map(|obj| {
            let device_type = obj.get(KEY_TYPE).and_then(Value::as_str).unwrap_or_default();
            if device_type == ACCESS_POINT_TYPE {
                access_points += 1;
                return None;
            }
            parse_device(&obj, device_type)
        })
        .collect();
    info!(total, access_points, clients = devices.len(), "Parsed Kismet device list");
    devices
}

fn parse_device(obj: &Value, device_type: &str) -> Option<WifiDevice> {
    let Some(mac) = obj.get(KEY_MAC).and_then(Value::as_str).filter(|m| !m.is_empty()) else {
        warn!(device_type, "Kismet device without MAC address skipped");
        return None;
    };

    let signal_history = obj
        .get(KEY_SIGNAL)
        .and_then(Value::as_array)
        .map(|samples| samples.iter().map(sample_dbm).collect())
        .unwrap_or_default();

    let channel = obj.get(KEY_CHANNEL).map_or(0, parse_channel);

    let last_seen = obj
        .get(KEY_MOD_TIME)
        .and_then(Value::as_i64)
        .and_then(|secs| DateTime::from_timestamp(secs, 0))
        .unwrap_or(DateTime::<Utc>::UNIX_EPOCH);

    let connected_bssid = obj
        .get(KEY_BSSID)
        .and_then(Value::as_str)
        .filter(|b| !b.is_empty())
        .map(str::to_string);

    Some(WifiDevice {
        mac_address: mac.to_string(),
        device_type: device_type.to_string(),
        signal_history,
        channel,
        band: WifiBand::from_channel(channel),
        connected_bssid,
        last_seen,
    })
}

/// A signal sample; anything non-numeric counts as "no sample".
#[allow(clippy::cast_possible_truncation)]
fn sample_dbm(v: &Value) -> i32 {
    v.as_i64()
        .and_then(|n| i32::try_from(n).ok())
        .or_else(|| v.as_f64().map(|f| f.round() as i32))
        .unwrap_or(0)
}

/// Kismet reports the channel as a string ("6", "36", "6HT40+") or number.
/// Unparseable values become 0 (unknown band).
fn parse_channel(v: &Value) -> u32 {
    if let Some(n) = v.as_u64() {
        return u32::try_from(n).unwrap_or(0);
    }
    v.as_str()
        .map(|s| {
            let digits: String = s.trim().chars().take_while(char::is_ascii_digit).collect();
            digits.parse().unwrap_or(0)
        })
        .unwrap_or(0)
}

// ============================================================================
// Kismet server lifecycle
// ============================================================================

/// Result of [`KismetServer::start`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ServerStart {
    pub pid: u32,
    /// Pid of a previous run's server that was still alive and got killed.
    pub replaced: Option<i32>,
}

/// Handle for the one long-running inventory server.
pub struct KismetServer {
    command: CommandSpec,
    pid_file: PathBuf,
    artifact_dir: PathBuf,
    artifact_prefix: String,
    grace: Duration,
    manager: Arc<SessionManager>,
    running: Option<(Child, SessionId)>,
}

impl KismetServer {
    pub fn new(config: &WifiConfig, grace: Duration, manager: Arc<SessionManager>) -> Self {
        Self {
            command: config.server.clone(),
            pid_file: config.pid_file.clone(),
            artifact_dir: config.artifact_dir.clone(),
            artifact_prefix: config.artifact_prefix.clone(),
            grace,
            manager,
            running: None,
        }
    }

    /// Kill any server left by a previous run, then start a fresh one and
    /// record its pid.
    pub async fn start(&mut self) -> Result<ServerStart, KismetError> {
        let mut replaced = None;
        if let Some(stale) = read_pid_file(&self.pid_file) {
            if !is_alive(stale) {
                debug!(pid = stale, "Recorded inventory server pid is not running");
            } else if self.is_server(stale) {
                warn!(pid = stale, "Previous inventory server still running, killing it");
                self.kill_stale(stale).await;
                replaced = Some(stale);
            } else {
                warn!(
                    pid = stale,
                    program = %self.command.program,
                    "Recorded pid belongs to another program, discarding stale pid file"
                );
                remove_pid_file(&self.pid_file);
            }
        }

        let mut child = spawn_in_group(&self.command, false).map_err(|source| KismetError::Spawn {
            program: self.command.program.clone(),
            source,
        })?;
        let pid = child.id().unwrap_or_default();
        let session = self.manager.register(group_id(&child).into_iter().collect());

        if let Err(e) = write_pid_file(&self.pid_file, pid) {
            // Without a pid file a crashed run cannot clean this server up.
            warn!(error = %e, "Failed to record inventory server pid, stopping it");
            if let Some(pgid) = group_id(&child) {
                signal_group(pgid, libc::SIGKILL);
            }
            let _ = child.wait().await;
            self.manager.unregister(session);
            return Err(e);
        }

        info!(pid, command = %self.command, "Inventory server started");
        self.running = Some((child, session));
        Ok(ServerStart { pid, replaced })
    }

    /// The pid file outlives reboots; only a process running the server
    /// program may be killed on its word.
    fn is_server(&self, pid: i32) -> bool {
        runs_program(pid, &self.command.program)
    }

    async fn kill_stale(&self, pid: i32) {
        signal_group(pid, libc::SIGKILL);
        signal_pid(pid, libc::SIGKILL);
        let deadline = tokio::time::Instant::now() + self.grace;
        while is_alive(pid) && tokio::time::Instant::now() < deadline {
            tokio::time::sleep(Duration::from_millis(100)).await;
        }
        if is_alive(pid) {
            warn!(pid, "Previous inventory server did not exit after SIGKILL");
        }
    }

    /// Force-kill the recorded server, remove the pid file and delete
    /// capture artifacts. A missing pid is only a warning.
    pub async fn stop(&mut self) {
        let recorded = read_pid_file(&self.pid_file);
        let owned = self.running.take();
        let owned_pid = owned.as_ref().and_then(|(child, _)| group_id(child));

        match recorded {
            // Our own child is torn down through its handle below.
            Some(pid) if Some(pid) == owned_pid => {}
            Some(pid) if self.is_server(pid) => {
                signal_group(pid, libc::SIGKILL);
                signal_pid(pid, libc::SIGKILL);
                info!(pid, "Inventory server killed");
            }
            Some(pid) => warn!(
                pid,
                program = %self.command.program,
                "Recorded pid is not the inventory server, leaving it alone"
            ),
            None if owned.is_some() => {
                warn!(path = %self.pid_file.display(), "Pid file missing, killing owned server");
            }
            None => warn!(path = %self.pid_file.display(), "No inventory server pid recorded"),
        }

        if let Some((mut child, session)) = owned {
            if let Some(pgid) = group_id(&child) {
                signal_group(pgid, libc::SIGKILL);
            }
            if let Err(e) = child.kill().await {
                debug!(error = %e, "Inventory server already reaped");
            }
            info!(pid = ?owned_pid, "Inventory server killed");
            self.manager.unregister(session);
        }

        remove_pid_file(&self.pid_file);

        let removed = remove_artifacts(&self.artifact_dir, &self.artifact_prefix);
        if removed > 0 {
            info!(removed, dir = %self.artifact_dir.display(), "Removed inventory server artifacts");
        }
    }

    pub const fn is_running(&self) -> bool {
        self.running.is_some()
    }
}

fn read_pid_file(path: &Path) -> Option<i32> {
    let contents = std::fs::read_to_string(path).ok()?;
    let pid = contents.trim().parse().ok();
    if pid.is_none() {
        warn!(path = %path.display(), "Pid file does not hold a pid");
    }
    pid
}

fn remove_pid_file(path: &Path) {
    match std::fs::remove_file(path) {
        Ok(()) => {}
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
        Err(e) => warn!(path = %path.display(), error = %e, "Failed to remove pid file"),
    }
}

fn write_pid_file(path: &Path, pid: u32) -> Result<(), KismetError> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent).map_err(|e| KismetError::PidFile(parent.to_path_buf(), e))?;
    }
    std::fs::write(path, pid.to_string()).map_err(|e| KismetError::PidFile(path.to_path_buf(), e))
}

/// Delete regular files in `dir` whose name starts with `prefix`.
fn remove_artifacts(dir: &Path, prefix: &str) -> usize {
    if prefix.is_empty() {
        return 0;
    }
    let entries = match std::fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(e) => {
            warn!(dir = %dir.display(), error = %e, "Cannot list artifact directory");
            return 0;
        }
    };

    let mut removed = 0;
    for entry in entries.flatten() {
        let is_artifact = entry.file_name().to_string_lossy().starts_with(prefix)
            && entry.file_type().is_ok_and(|t| t.is_file());
        if !is_artifact {
            continue;
        }
        match std::fs::remove_file(entry.path()) {
            Ok(()) => removed += 1,
            Err(e) => warn!(path = %entry.path().display(), error = %e, "Failed to remove artifact"),
        }
    }
    removed
}
