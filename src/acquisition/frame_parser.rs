//! Streaming parser for the cellular decoder's verbose text output.
//!
//! The decoder (`tshark -V` over GSMTAP) prints one dissection per frame:
//!
//! ```text
//! Frame 41: 81 bytes on wire (648 bits), 81 bytes captured (648 bits) on interface lo, id 0
//!     ...
//! GSM TAP Header, ARFCN: 59 (Downlink), TS: 0, Channel: CCCH (0)
//!     Version: 2
//!     ..00 0000 0011 1011 = ARFCN: 59
//!     Signal Level: -46 dBm
//!     ...
//!     Mobile Identity - Mobile Identity 1 - TMSI/P-TMSI (0x3a7b5f2c)
//!         TMSI/P-TMSI: 0x3a7b5f2c
//! ```
//!
//! The ARFCN shows up inside the GSMTAP header summary and again as a masked
//! bitfield, so it is matched anywhere on a line. The frame header line is the
//! only reliable record separator, so the parser tracks a partial record
//! across lines. A record is emitted for every station-identifier line seen
//! inside a frame whose signal level is known and whose ARFCN is known or
//! supplied as the tuned channel. A frame cut off by session teardown before
//! its identifier line emits nothing.

use std::sync::OnceLock;

use regex::Regex;
use tracing::{debug, warn};

use crate::types::RawObservation;

struct FramePatterns {
    boundary: Regex,
    arfcn: Regex,
    signal: Regex,
    station: Regex,
}

impl FramePatterns {
    fn compile() -> Result<Self, regex::Error> {
        Ok(Self {
            boundary: Regex::new(r"^Frame \d+:")?,
            arfcn: Regex::new(r"\bARFCN:\s*(\d+)")?,
            signal: Regex::new(r"\bSignal Level:\s*(-?\d+)")?,
            station: Regex::new(r"^\s*TMSI/P-TMSI:\s*(0x[0-9a-fA-F]+)")?,
        })
    }
}

fn patterns() -> Result<&'static FramePatterns, regex::Error> {
    static PATTERNS: OnceLock<Result<FramePatterns, regex::Error>> = OnceLock::new();
    PATTERNS
        .get_or_init(FramePatterns::compile)
        .as_ref()
        .map_err(Clone::clone)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParserState {
    /// Before the first frame header.
    Idle,
    /// Inside a frame; fields accumulate until the next header.
    InFrame,
}

#[derive(Debug, Default)]
struct PartialRecord {
    channel_ref: Option<String>,
    signal_level: Option<i32>,
}

/// Line-oriented state machine turning decoder output into observations.
pub struct FrameParser {
    patterns: &'static FramePatterns,
    source_frequency: f64,
    tuned_arfcn: Option<String>,
    state: ParserState,
    current: PartialRecord,
    skipped: usize,
}

impl FrameParser {
    /// `source_frequency` is the frequency (MHz) the capture was tuned to.
    pub fn new(source_frequency: f64) -> Result<Self, regex::Error> {
        Ok(Self {
            patterns: patterns()?,
            source_frequency,
            tuned_arfcn: None,
            state: ParserState::Idle,
            current: PartialRecord::default(),
            skipped: 0,
        })
    }

    /// ARFCN to record for frames whose dissection carries none.
    #[must_use]
    pub fn with_tuned_arfcn(mut self, arfcn: impl Into<String>) -> Self {
        self.tuned_arfcn = Some(arfcn.into());
        self
    }

    pub const fn state(&self) -> ParserState {
        self.state
    }

    /// Identifier lines dropped because their frame lacked ARFCN or signal.
    pub const fn skipped(&self) -> usize {
        self.skipped
    }

    /// Feed one line; returns an observation when the line completes one.
    pub fn feed_line(&mut self, line: &str) -> Option<RawObservation> {
        let p = self.patterns;

        if p.boundary.is_match(line) {
            self.current = PartialRecord::default();
            self.state = ParserState::InFrame;
            return None;
        }

        if self.state == ParserState::Idle {
            return None;
        }

        // The GSMTAP header comes first; later ARFCNs belong to cell lists.
        if let Some(caps) = p.arfcn.captures(line) {
            self.current.channel_ref.get_or_insert_with(|| caps[1].to_string());
            return None;
        }

        if let Some(caps) = p.signal.captures(line) {
            self.current.signal_level = caps[1].parse().ok();
            return None;
        }

        let caps = p.station.captures(line)?;
        let station_id = caps[1].to_ascii_lowercase();
        let channel_ref = self.current.channel_ref.as_ref().or(self.tuned_arfcn.as_ref());
        match (channel_ref, self.current.signal_level) {
            (Some(channel_ref), Some(signal_level)) => {
                debug!(tmsi = %station_id, arfcn = %channel_ref, signal_level, "Decoded station");
                Some(RawObservation {
                    station_id,
                    channel_ref: channel_ref.clone(),
                    signal_level,
                    source_frequency: self.source_frequency,
                })
            }
            _ => {
                self.skipped += 1;
                warn!(tmsi = %station_id, "Station line in frame without ARFCN/signal level, skipped");
                None
            }
        }
    }

    /// Parse a complete buffer. Any trailing partial frame is discarded.
    pub fn parse(&mut self, text: &str) -> Vec<RawObservation> {
        text.lines().filter_map(|line| self.feed_line(line)).collect()
    }
}
