//! Wi-Fi occupancy pipeline
//!
//! inventory server up → listening window → single query → server down →
//! median/deviation filter.

use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing::info;

use super::filter::{WifiFilter, WifiFilterParams};
use super::scheduler::InventoryWindow;
use super::state::{DomainReport, PipelineRun, PipelineState};
use crate::acquisition::{DeviceInventory, KismetServer, SessionManager};
use crate::config::WifiConfig;

pub const DOMAIN: &str = "wifi";

pub struct WifiPipeline {
    window: tokio::sync::Mutex<InventoryWindow>,
    filter: WifiFilter,
}

impl WifiPipeline {
    /// `cycle` is the whole time budget for one run; the listening window is
    /// derived from it unless `capture_window_secs` is set.
    pub fn new(
        config: &WifiConfig,
        cycle: Duration,
        grace: Duration,
        inventory: Arc<dyn DeviceInventory>,
        manager: &Arc<SessionManager>,
    ) -> Self {
        let server = KismetServer::new(config, grace, Arc::clone(manager));
        let window = InventoryWindow::new(server, inventory, config.capture_window(cycle));
        Self {
            window: tokio::sync::Mutex::new(window),
            filter: WifiFilter::new(WifiFilterParams::from(config)),
        }
    }

    /// Run one cycle and return `(MAC list, status)`.
    pub async fn run(&self, cancel: &CancellationToken) -> DomainReport {
        let mut run = PipelineRun::new(DOMAIN);
        let mut window = self.window.lock().await;
        info!(window_secs = window.window().as_secs(), "Starting Wi-Fi pipeline");

        match window.open().await {
            Ok(pid) => info!(pid, "Inventory server ready"),
            Err(e) => return run.fail(&e),
        }
        run.advance(PipelineState::InventoryReady);

        run.advance(PipelineState::Capturing);
        let devices = match window.collect(cancel).await {
            Ok(devices) => devices,
            Err(e) => return run.fail(&e),
        };

        run.advance(PipelineState::Filtering);
        let list = self.filter.apply(&devices);
        info!(devices = devices.len(), stations = list.len(), "Wi-Fi pipeline complete");
        run.finish(list)
    }
}
