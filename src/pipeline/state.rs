//! Pipeline state machine, error taxonomy and per-domain report.

use serde::Serialize;
use thiserror::Error;
use tracing::{debug, error};

use crate::acquisition::{InventoryError, KismetError, SessionError};
use crate::types::{OccupancyList, PipelineStatus};

// ============================================================================
// Error Taxonomy
// ============================================================================

/// Everything that can go wrong in one domain run.
///
/// Only the fatal variants (see [`PipelineError::is_fatal`]) fail the run;
/// the rest are logged where they happen and degrade the result set.
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("Inventory unavailable: {0}")]
    InventoryUnavailable(String),

    #[error("Session for ARFCN {arfcn} failed to start: {source}")]
    SessionStartFailure {
        arfcn: String,
        #[source]
        source: SessionError,
    },

    #[error("Skipped {count} malformed record(s) on ARFCN {arfcn}")]
    ParseSkip { arfcn: String, count: usize },

    #[error("Upstream inventory query failed: {0}")]
    UpstreamQueryFailure(#[from] KismetError),

    #[error("Inventory server from a previous run (pid {pid}) was still running; killed it")]
    ExternalServerConflict { pid: i32 },

    #[error("No capture session could be started on {channels} channel(s)")]
    NoSessionsStarted { channels: usize },

    #[error("Cancelled by operator")]
    Cancelled,
}

impl PipelineError {
    pub const fn is_fatal(&self) -> bool {
        matches!(
            self,
            PipelineError::InventoryUnavailable(_)
                | PipelineError::UpstreamQueryFailure(_)
                | PipelineError::NoSessionsStarted { .. }
                | PipelineError::Cancelled
        )
    }
}

impl From<InventoryError> for PipelineError {
    fn from(err: InventoryError) -> Self {
        PipelineError::InventoryUnavailable(err.to_string())
    }
}

// ============================================================================
// State Machine
// ============================================================================

/// Per-domain run state.
///
/// ```text
/// Init ──► InventoryReady ──► Capturing ──► Filtering ──► Done
///   │            │                │
///   └────────────┴────────────────┴──────► Failed
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum PipelineState {
    Init,
    InventoryReady,
    Capturing,
    Filtering,
    Done,
    Failed,
}

impl PipelineState {
    pub const fn is_terminal(self) -> bool {
        matches!(self, PipelineState::Done | PipelineState::Failed)
    }

    /// Whether `self → next` is a legal edge.
    pub const fn can_transition_to(self, next: PipelineState) -> bool {
        use PipelineState::{Capturing, Done, Failed, Filtering, Init, InventoryReady};
        matches!(
            (self, next),
            (Init, InventoryReady)
                | (InventoryReady, Capturing)
                | (Capturing, Filtering)
                | (Filtering, Done)
                | (Init | InventoryReady | Capturing, Failed)
        )
    }
}

impl std::fmt::Display for PipelineState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            PipelineState::Init => "INIT",
            PipelineState::InventoryReady => "INVENTORY_READY",
            PipelineState::Capturing => "CAPTURING",
            PipelineState::Filtering => "FILTERING",
            PipelineState::Done => "DONE",
            PipelineState::Failed => "FAILED",
        };
        f.write_str(s)
    }
}

/// Tracks one domain's progress through [`PipelineState`].
#[derive(Debug)]
pub struct PipelineRun {
    domain: &'static str,
    state: PipelineState,
}

impl PipelineRun {
    pub const fn new(domain: &'static str) -> Self {
        Self {
            domain,
            state: PipelineState::Init,
        }
    }

    pub const fn state(&self) -> PipelineState {
        self.state
    }

    pub const fn domain(&self) -> &'static str {
        self.domain
    }

    /// Move to `next`. Illegal edges are logged and ignored.
    pub fn advance(&mut self, next: PipelineState) {
        if self.state.can_transition_to(next) {
            debug!(domain = self.domain, from = %self.state, to = %next, "Pipeline state transition");
            self.state = next;
        } else {
            error!(domain = self.domain, from = %self.state, to = %next, "Illegal pipeline state transition ignored");
        }
    }

    /// Finish successfully with `list`.
    pub fn finish(mut self, list: OccupancyList) -> DomainReport {
        self.advance(PipelineState::Done);
        DomainReport {
            domain: self.domain,
            list,
            status: PipelineStatus::Success,
            state: self.state,
            error: None,
        }
    }

    /// Finish in `Failed` with an empty list.
    pub fn fail(mut self, err: &PipelineError) -> DomainReport {
        error!(domain = self.domain, state = %self.state, error = %err, "Pipeline failed");
        self.advance(PipelineState::Failed);
        DomainReport {
            domain: self.domain,
            list: OccupancyList::new(),
            status: PipelineStatus::Failed,
            state: self.state,
            error: Some(err.to_string()),
        }
    }
}

// ============================================================================
// Domain Report
// ============================================================================

/// Outcome of one domain run: `(occupancy list, status)`.
///
/// A failed report always carries an empty list.
#[derive(Debug, Clone, Serialize)]
pub struct DomainReport {
    pub domain: &'static str,
    pub list: OccupancyList,
    pub status: PipelineStatus,
    pub state: PipelineState,
    pub error: Option<String>,
}

impl DomainReport {
    /// Report for a domain switched off in config: success, nothing seen.
    pub fn disabled(domain: &'static str) -> Self {
        Self {
            domain,
            list: OccupancyList::new(),
            status: PipelineStatus::Success,
            state: PipelineState::Init,
            error: None,
        }
    }

    pub const fn is_success(&self) -> bool {
        self.status.is_success()
    }

    /// `(identifiers, status code)` as handed to obfuscation and upload.
    pub fn into_parts(self) -> (Vec<String>, i32) {
        (self.list.into_vec(), self.status.code())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn legal_edges() {
        use PipelineState::*;
        assert!(Init.can_transition_to(InventoryReady));
        assert!(Init.can_transition_to(Failed));
        assert!(Capturing.can_transition_to(Failed));
        assert!(Filtering.can_transition_to(Done));
        assert!(!Init.can_transition_to(Capturing));
        assert!(!Done.can_transition_to(Failed));
        assert!(!Failed.can_transition_to(Done));
    }

    #[test]
    fn failed_report_is_empty_with_status_one() {
        let mut run = PipelineRun::new("cellular");
        run.advance(PipelineState::InventoryReady);
        run.advance(PipelineState::Capturing);
        let report = run.fail(&PipelineError::NoSessionsStarted { channels: 3 });
        assert_eq!(report.state, PipelineState::Failed);
        assert_eq!(report.into_parts(), (Vec::<String>::new(), 1));
    }

    #[test]
    fn finished_report_carries_list() {
        let mut run = PipelineRun::new("wifi");
        run.advance(PipelineState::InventoryReady);
        run.advance(PipelineState::Capturing);
        run.advance(PipelineState::Filtering);
        let list: OccupancyList = ["aa".to_string()].into_iter().collect();
        let report = run.finish(list);
        assert_eq!(report.state, PipelineState::Done);
        assert_eq!(report.into_parts(), (vec!["aa".to_string()], 0));
    }

    #[test]
    fn illegal_transition_is_ignored() {
        let mut run = PipelineRun::new("cellular");
        run.advance(PipelineState::Done);
        assert_eq!(run.state(), PipelineState::Init);
    }

    #[test]
    fn fatal_classification() {
        assert!(PipelineError::InventoryUnavailable("x".into()).is_fatal());
        assert!(PipelineError::Cancelled.is_fatal());
        assert!(!PipelineError::ParseSkip { arfcn: "1".into(), count: 2 }.is_fatal());
        assert!(!PipelineError::ExternalServerConflict { pid: 10 }.is_fatal());
    }
}
