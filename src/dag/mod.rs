// src/dag/mod.rs

//! Job graph representation and scheduling.
//!
//! - [`job`] holds the job definition and its sequential command execution.
//! - [`state`] defines the job state machine and per-run records.
//! - [`graph`] owns the jobs of one run: add, validate, sanitize, plan, run.
//! - [`plan`] computes dry-run execution waves.
//! - [`scheduler`] contains the per-run state machine that decides which
//!   jobs are ready, skipped or cancelled.
//! - [`job_info`] provides per-job scheduling metadata.
//! - [`scheduler_step`] defines the result type for scheduler steps.
//! - [`state_manager`] manages per-run state transitions.

pub mod graph;
pub mod job;
pub mod job_info;
pub mod plan;
pub mod scheduler;
pub mod scheduler_step;
pub mod state;
pub mod state_manager;

pub use graph::Graph;
pub use job::{Job, JobLog};
pub use plan::ExecutionPlan;
pub use scheduler::{Culprit, Scheduler};
pub use scheduler_step::{AbortReason, SchedulerStep};
pub use state::{JobRecord, JobState};
