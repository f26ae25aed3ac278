//! Pipeline orchestrator: both domains, in parallel, once per cycle.
//!
//! The cellular and Wi-Fi pipelines use disjoint hardware and tools, so they
//! run concurrently; within each domain capture stays sequential.

use std::sync::Arc;

use serde::Serialize;
use tokio_util::sync::CancellationToken;
use tracing::info;

use super::cellular::{self, CellularPipeline};
use super::state::DomainReport;
use super::wifi::{self, WifiPipeline};
use crate::acquisition::{DeviceInventory, SessionManager};
use crate::config::SensorConfig;

/// Both domain reports for one cycle.
#[derive(Debug, Clone, Serialize)]
pub struct CycleReport {
    pub cellular: DomainReport,
    pub wifi: DomainReport,
}

impl CycleReport {
    /// Uploadable only when neither domain failed.
    pub const fn is_success(&self) -> bool {
        self.cellular.is_success() && self.wifi.is_success()
    }
}

/// Composes the per-domain pipelines. A domain is `None` when disabled.
pub struct PipelineOrchestrator {
    cellular: Option<CellularPipeline>,
    wifi: Option<WifiPipeline>,
    manager: Arc<SessionManager>,
}

impl PipelineOrchestrator {
    pub fn new(config: &SensorConfig, inventory: Arc<dyn DeviceInventory>) -> Self {
        Self::with_manager(config, inventory, SessionManager::shared())
    }

    pub fn with_manager(
        config: &SensorConfig,
        inventory: Arc<dyn DeviceInventory>,
        manager: Arc<SessionManager>,
    ) -> Self {
        let cycle = config.cycle_duration();
        let cellular = config
            .cellular
            .enabled
            .then(|| CellularPipeline::new(config.cellular.clone(), cycle, &manager));
        let wifi = config.wifi.enabled.then(|| {
            WifiPipeline::new(
                &config.wifi,
                cycle,
                config.cellular.teardown_grace(),
                inventory,
                &manager,
            )
        });
        Self {
            cellular,
            wifi,
            manager,
        }
    }

    /// Registry of in-flight process groups, for the cancellation sweep.
    pub fn session_manager(&self) -> Arc<SessionManager> {
        Arc::clone(&self.manager)
    }

    /// Run both domains concurrently and wait for both.
    pub async fn run(&self, cancel: &CancellationToken) -> CycleReport {
        info!(
            cellular = self.cellular.is_some(),
            wifi = self.wifi.is_some(),
            "Starting occupancy cycle"
        );

        let cellular_task = async {
            match &self.cellular {
                Some(p) => p.run(cancel).await,
                None => DomainReport::disabled(cellular::DOMAIN),
            }
        };
        let wifi_task = async {
            match &self.wifi {
                Some(p) => p.run(cancel).await,
                None => DomainReport::disabled(wifi::DOMAIN),
            }
        };
        let (cellular, wifi) = tokio::join!(cellular_task, wifi_task);

        info!(
            cellular_status = %cellular.status,
            cellular_count = cellular.list.len(),
            wifi_status = %wifi.status,
            wifi_count = wifi.list.len(),
            "Occupancy cycle complete"
        );
        CycleReport { cellular, wifi }
    }
}
