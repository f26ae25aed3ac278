//! Local persistence owned by the sensor process itself.
//!
//! The channel cache artifact lives with the channel inventory; this module
//! only holds the single-instance lock.

pub mod lockfile;

pub use lockfile::ProcessLock;
