//! Upload stage
//!
//! Raw identifiers never leave the device: every TMSI and MAC is replaced by
//! a salted SHA-256 digest before the payload is built, and only a cycle in
//! which both domains succeeded is sent.

pub mod client;
pub mod obfuscate;

pub use client::{UploadClient, UploadError};
pub use obfuscate::{obfuscate, read_serial, OccupancyPayload};
