//! Occupancy Pipeline Module
//!
//! ## Per-domain flow
//!
//! ```text
//! CELLULAR: channel inventory ─► budget ─► capture session per channel
//!           ─► frame parser ─► threshold filter ─► TMSI list
//! WI-FI:    inventory server up ─► listening window ─► device query
//!           ─► server down ─► median/deviation filter ─► MAC list
//! ```
//!
//! Both domains run in parallel; the orchestrator waits for both. Each
//! domain reports `(list, status)` and a failed domain always reports an
//! empty list.

mod state;
pub mod cellular;
pub mod filter;
pub mod orchestrator;
pub mod scheduler;
pub mod wifi;

pub use cellular::CellularPipeline;
pub use filter::{CellularFilter, WifiFilter, WifiFilterParams, WifiVerdict};
pub use orchestrator::{CycleReport, PipelineOrchestrator};
pub use scheduler::{CaptureScheduler, CycleOutcome, InventoryWindow};
pub use state::*;
pub use wifi::WifiPipeline;
