// src/dag/state.rs

//! Job state machine and per-run records.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::Serialize;

/// Lifecycle of a job within one run.
///
/// ```text
/// Pending -> Ready -> Running -> Done | Failed | Cancelled
/// Pending | Ready -> Skipped | Cancelled
/// ```
///
/// `Done`, `Failed`, `Skipped` and `Cancelled` are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum JobState {
    Pending,
    Ready,
    Running,
    Done,
    Failed,
    /// A requirement ended `Failed`, `Skipped` or `Cancelled`.
    Skipped,
    /// The run was aborted before or while this job ran.
    Cancelled,
}

impl JobState {
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            JobState::Done | JobState::Failed | JobState::Skipped | JobState::Cancelled
        )
    }

    /// Terminal and not `Done`: dependents can never run.
    pub fn is_unsuccessful(self) -> bool {
        matches!(
            self,
            JobState::Failed | JobState::Skipped | JobState::Cancelled
        )
    }

    /// Whether moving from `self` to `next` is a legal transition.
    pub fn can_become(self, next: JobState) -> bool {
        use JobState::*;
        matches!(
            (self, next),
            (Pending, Ready)
                | (Pending | Ready, Skipped)
                | (Pending | Ready, Cancelled)
                | (Ready, Running)
                | (Running, Done | Failed | Cancelled)
        )
    }
}

impl fmt::Display for JobState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            JobState::Pending => "pending",
            JobState::Ready => "ready",
            JobState::Running => "running",
            JobState::Done => "done",
            JobState::Failed => "failed",
            JobState::Skipped => "skipped",
            JobState::Cancelled => "cancelled",
        };
        f.pad(s)
    }
}

/// Everything recorded about one job during a run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JobRecord {
    pub state: JobState,
    /// Position in dispatch order (0-based), if the job was dispatched.
    pub dispatch_seq: Option<u64>,
    pub started_at: Option<DateTime<Utc>>,
    pub finished_at: Option<DateTime<Utc>>,
    pub output: String,
    pub commands_issued: usize,
    /// Failure detail, or the cause of a skip/cancellation.
    pub detail: Option<String>,
}

impl Default for JobRecord {
    fn default() -> Self {
        Self {
            state: JobState::Pending,
            dispatch_seq: None,
            started_at: None,
            finished_at: None,
            output: String::new(),
            commands_issued: 0,
            detail: None,
        }
    }
}
