// src/dag/job_info.rs

//! Per-job scheduling metadata and state.

use crate::dag::job::Job;
use crate::dag::state::JobState;
use crate::types::JobId;

/// Static scheduling information derived from a [`Job`], plus its state in
/// the current run.
#[derive(Debug, Clone)]
pub struct JobInfo {
    pub id: JobId,
    pub critical: bool,
    /// Direct requirements (the job's `required` list).
    pub deps: Vec<JobId>,
    /// Direct dependents: jobs listing this one in `required`.
    pub dependents: Vec<JobId>,
    pub state: JobState,
    /// Why the job was skipped or cancelled.
    pub cause: Option<String>,
}

impl JobInfo {
    pub fn from_job(job: &Job) -> Self {
        Self {
            id: job.id().to_string(),
            critical: job.is_critical(),
            deps: job.required().to_vec(),
            dependents: Vec::new(),
            state: JobState::Pending,
            cause: None,
        }
    }
}
