//! Pipeline output types: OccupancyList, PipelineStatus, CaptureBudget

use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::time::Duration;

// ============================================================================
// Occupancy List
// ============================================================================

/// Unique station identifiers (TMSI or MAC) that passed the filter in one run.
///
/// Order is irrelevant; insertion order is kept only so logs read in capture
/// order. Duplicates are dropped on insert.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(transparent)]
pub struct OccupancyList {
    ids: Vec<String>,
}

impl OccupancyList {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert an identifier. Returns `false` if it was already present.
    pub fn insert(&mut self, id: impl Into<String>) -> bool {
        let id = id.into();
        if self.ids.contains(&id) {
            return false;
        }
        self.ids.push(id);
        true
    }

    pub fn contains(&self, id: &str) -> bool {
        self.ids.iter().any(|i| i == id)
    }

    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.ids.iter().map(String::as_str)
    }

    pub fn into_vec(self) -> Vec<String> {
        self.ids
    }
}

impl FromIterator<String> for OccupancyList {
    fn from_iter<I: IntoIterator<Item = String>>(iter: I) -> Self {
        let mut seen = HashSet::new();
        let ids = iter.into_iter().filter(|id| seen.insert(id.clone())).collect();
        Self { ids }
    }
}

// ============================================================================
// Pipeline Status
// ============================================================================

/// Outcome of one domain pipeline run.
///
/// `Failed` always travels with an empty list; callers must check the status
/// rather than infer failure from an empty list.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum PipelineStatus {
    Success,
    Failed,
}

impl PipelineStatus {
    /// Process-style status code: 0 success, 1 failure.
    pub const fn code(self) -> i32 {
        match self {
            PipelineStatus::Success => 0,
            PipelineStatus::Failed => 1,
        }
    }

    pub const fn is_success(self) -> bool {
        matches!(self, PipelineStatus::Success)
    }
}

impl std::fmt::Display for PipelineStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PipelineStatus::Success => write!(f, "SUCCESS"),
            PipelineStatus::Failed => write!(f, "FAILED"),
        }
    }
}

// ============================================================================
// Capture Budget
// ============================================================================

/// Per-channel capture time for one cellular cycle.
///
/// `per_channel = max(0, (cycle - scan_overhead) / channels - safety_margin)`.
/// Computed once per run and never negative.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CaptureBudget {
    per_channel: Duration,
}

impl CaptureBudget {
    pub fn compute(
        cycle: Duration,
        scan_overhead: Duration,
        channel_count: usize,
        safety_margin: Duration,
    ) -> Self {
        if channel_count == 0 {
            return Self::from_secs_f64(0.0);
        }
        let usable = cycle.as_secs_f64() - scan_overhead.as_secs_f64();
        #[allow(clippy::cast_precision_loss)]
        let secs = usable / channel_count as f64 - safety_margin.as_secs_f64();
        Self::from_secs_f64(secs)
    }

    /// Build a budget from raw seconds, clamping negative/NaN input to zero.
    pub fn from_secs_f64(secs: f64) -> Self {
        let secs = if secs.is_finite() && secs > 0.0 { secs } else { 0.0 };
        Self {
            per_channel: Duration::from_secs_f64(secs),
        }
    }

    pub const fn per_channel(&self) -> Duration {
        self.per_channel
    }

    pub fn is_zero(&self) -> bool {
        self.per_channel.is_zero()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn occupancy_list_rejects_duplicates() {
        let mut list = OccupancyList::new();
        assert!(list.insert("0x01"));
        assert!(!list.insert("0x01"));
        assert!(list.insert("0x02"));
        assert_eq!(list.len(), 2);
    }

    #[test]
    fn occupancy_list_from_iter_keeps_first_seen_order() {
        let list: OccupancyList = ["b", "a", "b", "c", "a"]
            .into_iter()
            .map(String::from)
            .collect();
        assert_eq!(list.into_vec(), vec!["b", "a", "c"]);
    }

    #[test]
    fn budget_three_channels_thirty_seconds() {
        let budget = CaptureBudget::compute(
            Duration::from_secs(30),
            Duration::ZERO,
            3,
            Duration::from_secs(1),
        );
        assert_eq!(budget.per_channel(), Duration::from_secs(9));
    }

    #[test]
    fn budget_subtracts_scan_overhead() {
        let budget = CaptureBudget::compute(
            Duration::from_secs(300),
            Duration::from_secs(60),
            4,
            Duration::from_secs(1),
        );
        assert_eq!(budget.per_channel(), Duration::from_secs(59));
    }

    #[test]
    fn budget_never_negative() {
        let budget = CaptureBudget::compute(
            Duration::from_secs(10),
            Duration::from_secs(30),
            2,
            Duration::from_secs(1),
        );
        assert!(budget.is_zero());
        assert!(CaptureBudget::from_secs_f64(-4.5).is_zero());
        assert!(CaptureBudget::from_secs_f64(f64::NAN).is_zero());
    }

    #[test]
    fn budget_zero_channels_is_zero() {
        let budget =
            CaptureBudget::compute(Duration::from_secs(30), Duration::ZERO, 0, Duration::ZERO);
        assert!(budget.is_zero());
    }

    #[test]
    fn status_codes() {
        assert_eq!(PipelineStatus::Success.code(), 0);
        assert_eq!(PipelineStatus::Failed.code(), 1);
    }
}
