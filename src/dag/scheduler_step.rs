// src/dag/scheduler_step.rs

//! Step-by-step result types for the scheduler.

use crate::types::JobId;

/// Why a run entered abort mode.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AbortReason {
    /// A critical job failed, or was skipped or cancelled.
    CriticalJob(JobId),
    /// Abort requested from outside the run (e.g. Ctrl-C).
    External,
}

/// Structured result of a single scheduler "step".
///
/// The runtime acts on it (dispatch, cancel); tests use it to make
/// assertions about what changed.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SchedulerStep {
    /// Jobs that became `Ready` in this step and should be dispatched.
    pub newly_ready: Vec<JobId>,
    /// Jobs newly marked `Skipped`, in detection order.
    pub newly_skipped: Vec<JobId>,
    /// Jobs moved from `Pending`/`Ready` to `Cancelled` without starting.
    pub newly_cancelled: Vec<JobId>,
    /// Running jobs that must receive a cancellation request.
    pub to_cancel: Vec<JobId>,
    /// Set when this step put the run into abort mode.
    pub abort: Option<AbortReason>,
    /// Whether every job is now terminal.
    pub run_finished: bool,
}
