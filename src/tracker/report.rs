//! Running counters and crash snapshots

use serde::Serialize;

use crate::cause::Contributor;
use crate::core::types::Tick;

/// Counters accumulated over the tracker's lifetime
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct TrackerStats {
    pub phases_entered: u64,
    /// Phases whose buffer was dropped by a discard unwind
    pub phases_discarded: u64,
    pub transactions_captured: u64,
    pub events_fired: u64,
    pub events_cancelled: u64,
    pub restore_failures: u64,
    pub invariant_violations: u64,
}

/// State dumped alongside an invariant violation
#[derive(Debug, Clone, Serialize)]
pub struct CrashReport {
    pub error: String,
    pub tick: Tick,
    /// Active phases, base first
    pub phase_stack: Vec<&'static str>,
    /// Contributors, most recent first
    pub cause_stack: Vec<Contributor>,
    pub open_frames: usize,
    pub stats: TrackerStats,
}
