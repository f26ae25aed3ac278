//! Capture scheduling
//!
//! Cellular: one capture session per channel, sequentially, each for the
//! same per-channel budget. Wi-Fi: one inventory server kept up for the whole
//! window and queried once at the end.

use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use super::state::PipelineError;
use crate::acquisition::{CaptureSession, DeviceInventory, FrameParser, KismetServer, SessionEnd};
use crate::types::{CaptureBudget, Channel, RawObservation, WifiDevice};

// ============================================================================
// Cellular
// ============================================================================

/// Observations from one cellular cycle plus session bookkeeping.
#[derive(Debug, Default)]
pub struct CycleOutcome {
    pub observations: Vec<RawObservation>,
    pub sessions_started: usize,
    pub sessions_failed: usize,
    pub cancelled: bool,
}

/// Drives [`CaptureSession`]s over a channel list.
pub struct CaptureScheduler {
    session: CaptureSession,
}

impl CaptureScheduler {
    pub const fn new(session: CaptureSession) -> Self {
        Self { session }
    }

    /// Capture every channel in order for `budget` each.
    ///
    /// A channel whose session fails to start contributes nothing; the cycle
    /// continues with the next channel.
    pub async fn run_cycle(
        &self,
        channels: &[Channel],
        sample_rate: f64,
        budget: CaptureBudget,
        cancel: &CancellationToken,
    ) -> CycleOutcome {
        let per_channel = budget.per_channel();
        if budget.is_zero() {
            warn!(channels = channels.len(), "Per-channel capture budget is zero");
        }
        info!(
            channels = channels.len(),
            per_channel_secs = per_channel.as_secs_f64(),
            "Starting capture cycle"
        );

        let mut outcome = CycleOutcome::default();
        for (i, channel) in channels.iter().enumerate() {
            if cancel.is_cancelled() {
                outcome.cancelled = true;
                break;
            }

            info!(
                arfcn = %channel.arfcn,
                frequency = channel.frequency,
                band = %channel.band,
                "Capturing channel {}/{}",
                i + 1,
                channels.len()
            );

            let output = match self
                .session
                .run(channel.frequency, sample_rate, per_channel, cancel)
                .await
            {
                Ok(output) => output,
                Err(source) => {
                    outcome.sessions_failed += 1;
                    let err = PipelineError::SessionStartFailure {
                        arfcn: channel.arfcn.clone(),
                        source,
                    };
                    warn!(error = %err, "Channel contributes no observations");
                    continue;
                }
            };
            outcome.sessions_started += 1;

            let observations = parse_session_output(&output.text(), channel);
            info!(arfcn = %channel.arfcn, observations = observations.len(), "Channel captured");
            outcome.observations.extend(observations);

            if output.end == SessionEnd::Cancelled {
                outcome.cancelled = true;
                break;
            }
        }

        info!(
            started = outcome.sessions_started,
            failed = outcome.sessions_failed,
            observations = outcome.observations.len(),
            cancelled = outcome.cancelled,
            "Capture cycle finished"
        );
        outcome
    }
}

fn parse_session_output(text: &str, channel: &Channel) -> Vec<RawObservation> {
    let mut parser = match FrameParser::new(channel.frequency) {
        Ok(parser) => parser.with_tuned_arfcn(channel.arfcn.as_str()),
        Err(e) => {
            error!(error = %e, "Frame parser unavailable");
            return Vec::new();
        }
    };
    let observations = parser.parse(text);
    if parser.skipped() > 0 {
        let skip = PipelineError::ParseSkip {
            arfcn: channel.arfcn.clone(),
            count: parser.skipped(),
        };
        warn!(error = %skip, "Malformed decoder records dropped");
    }
    observations
}

// ============================================================================
// Wi-Fi
// ============================================================================

/// Keeps the inventory server up for one listening window, then queries it.
pub struct InventoryWindow {
    server: KismetServer,
    inventory: Arc<dyn DeviceInventory>,
    window: Duration,
}

impl InventoryWindow {
    pub fn new(server: KismetServer, inventory: Arc<dyn DeviceInventory>, window: Duration) -> Self {
        Self {
            server,
            inventory,
            window,
        }
    }

    pub const fn window(&self) -> Duration {
        self.window
    }

    /// Start the server; a server left by a previous run is killed first.
    pub async fn open(&mut self) -> Result<u32, PipelineError> {
        let started = match self.server.start().await {
            Ok(started) => started,
            Err(e) => {
                self.server.stop().await;
                return Err(PipelineError::InventoryUnavailable(e.to_string()));
            }
        };
        if let Some(pid) = started.replaced {
            let conflict = PipelineError::ExternalServerConflict { pid };
            warn!(error = %conflict, "Recovered from stale inventory server");
        }
        Ok(started.pid)
    }

    /// Wait out the window, query once, and stop the server whatever the
    /// outcome.
    pub async fn collect(&mut self, cancel: &CancellationToken) -> Result<Vec<WifiDevice>, PipelineError> {
        info!(
            window_secs = self.window.as_secs_f64(),
            inventory = self.inventory.inventory_name(),
            "Listening for Wi-Fi devices"
        );

        let result = tokio::select! {
            () = tokio::time::sleep(self.window) => {
                self.inventory.recent_devices().await.map_err(PipelineError::from)
            }
            () = cancel.cancelled() => Err(PipelineError::Cancelled),
        };

        self.server.stop().await;
        result
    }
}
