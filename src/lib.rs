//! Occupancy Sensor: counts nearby cellular handsets and Wi-Fi stations
//!
//! Each cycle runs two capture pipelines in parallel and reports the unique
//! station identifiers that passed the signal filters.
//!
//! ## Architecture
//!
//! - **Acquisition**: channel scanning, capture/decode sessions, frame
//!   parsing, and the Wi-Fi inventory server and client
//! - **Pipeline**: capture scheduling, signal filters, per-domain state
//!   machines, and the orchestrator
//! - **Upload**: identifier obfuscation and the HTTP payload
//! - **Preflight / Storage**: device gate and single-instance lock

pub mod acquisition;
pub mod config;
pub mod pipeline;
pub mod preflight;
pub mod storage;
pub mod types;
pub mod upload;

// Re-export configuration
pub use config::SensorConfig;

// Re-export commonly used types
pub use types::{
    CaptureBudget, Channel, GsmBand, OccupancyList, PipelineStatus, RawObservation, WifiBand,
    WifiDevice,
};

// Re-export pipeline entry points
pub use pipeline::{CycleReport, DomainReport, PipelineError, PipelineOrchestrator};

// Re-export acquisition seams
pub use acquisition::{DeviceInventory, SessionManager};
