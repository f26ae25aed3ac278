//! Cellular occupancy pipeline
//!
//! channel inventory → budget → per-channel capture → frame parsing →
//! threshold filter.

use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing::info;

use super::filter::CellularFilter;
use super::scheduler::CaptureScheduler;
use super::state::{DomainReport, PipelineError, PipelineRun, PipelineState};
use crate::acquisition::{CaptureSession, ChannelInventory, ChannelScanner, SessionManager};
use crate::config::CellularConfig;
use crate::types::CaptureBudget;

pub const DOMAIN: &str = "cellular";

pub struct CellularPipeline {
    config: CellularConfig,
    cycle: Duration,
    inventory: ChannelInventory,
    scheduler: CaptureScheduler,
    filter: CellularFilter,
}

impl CellularPipeline {
    /// `cycle` is the whole time budget for one run (the sync interval).
    pub fn new(config: CellularConfig, cycle: Duration, manager: &Arc<SessionManager>) -> Self {
        let scanner = ChannelScanner::new(
            config.scanner.clone(),
            Duration::from_secs(config.scan_timeout_secs),
            config.teardown_grace(),
            Arc::clone(manager),
        );
        let inventory = ChannelInventory::new(config.channel_cache_path.clone(), scanner);
        let session = CaptureSession::new(
            config.capture.clone(),
            config.decoder.clone(),
            config.teardown_grace(),
            Arc::clone(manager),
        );
        Self {
            filter: CellularFilter::new(config.signal_threshold_dbm),
            scheduler: CaptureScheduler::new(session),
            inventory,
            cycle,
            config,
        }
    }

    /// Run one cycle and return `(TMSI list, status)`.
    pub async fn run(&self, cancel: &CancellationToken) -> DomainReport {
        let mut run = PipelineRun::new(DOMAIN);
        info!(bands = ?self.config.bands, cycle_secs = self.cycle.as_secs(), "Starting cellular pipeline");

        let set = match self
            .inventory
            .get_channels(
                &self.config.bands,
                self.config.sample_rate,
                self.config.scan_expiry(),
                cancel,
            )
            .await
        {
            Ok(set) => set,
            Err(e) => return run.fail(&PipelineError::from(e)),
        };
        run.advance(PipelineState::InventoryReady);

        if cancel.is_cancelled() {
            return run.fail(&PipelineError::Cancelled);
        }

        let budget = CaptureBudget::compute(
            self.cycle,
            set.scan_duration,
            set.channels.len(),
            self.config.safety_margin(),
        );
        info!(
            channels = set.channels.len(),
            rescanned = set.rescanned,
            scan_secs = set.scan_duration.as_secs_f64(),
            per_channel_secs = budget.per_channel().as_secs_f64(),
            "Capture budget computed"
        );

        run.advance(PipelineState::Capturing);
        let outcome = self
            .scheduler
            .run_cycle(&set.channels, self.config.sample_rate, budget, cancel)
            .await;

        if outcome.cancelled {
            return run.fail(&PipelineError::Cancelled);
        }
        if outcome.sessions_started == 0 {
            return run.fail(&PipelineError::NoSessionsStarted {
                channels: set.channels.len(),
            });
        }

        run.advance(PipelineState::Filtering);
        let list = self.filter.apply(&outcome.observations);
        info!(stations = list.len(), "Cellular pipeline complete");
        run.finish(list)
    }
}
