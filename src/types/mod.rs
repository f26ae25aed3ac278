//! Shared data structures for the occupancy capture pipeline
//!
//! - Channel inventory: `Channel`, `GsmBand` (scan results, cache artifact rows)
//! - Cellular capture: `RawObservation` (one decoded station sighting)
//! - Wi-Fi inventory: `WifiDevice`, `WifiBand`
//! - Pipeline output: `OccupancyList`, `PipelineStatus`, `CaptureBudget`

mod channel;
mod observation;
mod wifi;
mod occupancy;

pub use channel::*;
pub use observation::*;
pub use wifi::*;
pub use occupancy::*;
