//! Radio acquisition module
//!
//! Drives the external radio tools: the cellular channel scanner, capture
//! and decode process pairs, and the Wi-Fi inventory server.

pub mod frame_parser;
pub mod inventory;
pub mod kismet;
pub mod process;
pub mod scanner;
pub mod session;

pub use frame_parser::{FrameParser, ParserState};
pub use inventory::{ChannelInventory, ChannelSet, InventoryError};
pub use kismet::{DeviceInventory, KismetClient, KismetError, KismetServer, ServerStart};
pub use scanner::{ChannelScanner, ScanError};
pub use session::{CaptureSession, SessionEnd, SessionError, SessionManager, SessionOutput};
