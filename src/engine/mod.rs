// src/engine/mod.rs

//! Execution engine.
//!
//! The pure propagation rules live in [`crate::dag::Scheduler`]; this module
//! is the async shell around it:
//! - dispatching ready jobs as Tokio tasks
//! - collecting completion events from those tasks
//! - delivering cancellation requests and enforcing the grace period
//! - turning an external abort request into abort mode

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use tokio::sync::watch;

use crate::dag::job::JobLog;
use crate::dag::scheduler::Culprit;
use crate::dag::scheduler_step::AbortReason;
use crate::dag::state::{JobRecord, JobState};
use crate::dag::ExecutionPlan;
use crate::types::JobId;

pub mod runtime;

pub use runtime::Runtime;

/// Events flowing into the runtime from job tasks and the abort watcher.
#[derive(Debug, Clone)]
pub enum RuntimeEvent {
    /// A job task ended; `state` is `Done`, `Failed` or `Cancelled`.
    JobFinished {
        job: JobId,
        state: JobState,
        log: JobLog,
    },
    /// Abort requested through an [`AbortHandle`].
    AbortRequested,
}

/// Lets code outside a run (e.g. a Ctrl-C handler) abort it.
///
/// Requesting an abort before the run starts makes the run abort as soon as
/// it begins.
#[derive(Debug, Clone)]
pub struct AbortHandle {
    tx: Arc<watch::Sender<bool>>,
}

impl AbortHandle {
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(false);
        Self { tx: Arc::new(tx) }
    }

    pub fn abort(&self) {
        self.tx.send_replace(true);
    }

    pub fn is_aborted(&self) -> bool {
        *self.tx.borrow()
    }

    pub(crate) fn subscribe(&self) -> watch::Receiver<bool> {
        self.tx.subscribe()
    }
}

impl Default for AbortHandle {
    fn default() -> Self {
        Self::new()
    }
}

/// What a finished run leaves behind.
#[derive(Debug, Clone)]
pub struct RunSummary {
    pub success: bool,
    pub culprit: Option<Culprit>,
    pub abort: Option<AbortReason>,
    pub records: HashMap<JobId, JobRecord>,
}

/// Result of [`Graph::run`](crate::dag::Graph::run).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunResult {
    /// Dry run: the graph is valid; nothing was executed.
    DryRun(ExecutionPlan),
    /// Real run finished; `success` is the single source of truth.
    Finished { success: bool },
}

impl RunResult {
    /// `true` for a valid dry run or a successful real run.
    pub fn is_success(&self) -> bool {
        match self {
            RunResult::DryRun(_) => true,
            RunResult::Finished { success } => *success,
        }
    }
}

impl fmt::Display for RunResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RunResult::DryRun(plan) => write!(f, "dry run: valid ({} waves)", plan.waves.len()),
            RunResult::Finished { success: true } => f.write_str("RUN OK"),
            RunResult::Finished { success: false } => f.write_str("RUN KO"),
        }
    }
}
