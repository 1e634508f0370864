// src/dag/scheduler.rs

//! Pure scheduling state machine.
//!
//! No Tokio, no channels, no I/O: the scheduler consumes completions and
//! abort requests and returns [`SchedulerStep`]s describing what the runtime
//! must do next. All propagation rules live here.

use std::collections::HashMap;

use tracing::{debug, info, warn};

use crate::dag::job::Job;
use crate::dag::job_info::JobInfo;
use crate::dag::scheduler_step::{AbortReason, SchedulerStep};
use crate::dag::state::JobState;
use crate::dag::state_manager::{ReadOnlyStateManager, StateManager};
use crate::types::JobId;

/// The first critical job found in an unsuccessful terminal state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Culprit {
    pub job: JobId,
    pub state: JobState,
}

/// Scheduler holds the dependency relation plus mutable per-run state.
///
/// It is responsible for:
/// - promoting jobs to `Ready` once all requirements are `Done`
/// - recording job completions
/// - skipping the transitive dependents of unsuccessful jobs
/// - entering abort mode when a critical job fails, is skipped or cancelled
/// - remembering which critical job caused an overall failure
#[derive(Debug)]
pub struct Scheduler {
    order: Vec<JobId>,
    jobs: HashMap<JobId, JobInfo>,
    abort: Option<AbortReason>,
    culprit: Option<Culprit>,
}

impl Scheduler {
    /// Build from jobs in declaration order.
    ///
    /// Assumes a validated graph: every requirement names a known job and
    /// there are no cycles.
    pub fn new<'a>(jobs: impl IntoIterator<Item = &'a Job>) -> Self {
        let mut order = Vec::new();
        let mut table: HashMap<JobId, JobInfo> = HashMap::new();

        for job in jobs {
            order.push(job.id().to_string());
            table.insert(job.id().to_string(), JobInfo::from_job(job));
        }

        // Second pass: populate dependents, in declaration order.
        for id in &order {
            let deps = table.get(id).map(|i| i.deps.clone()).unwrap_or_default();
            for dep in deps {
                match table.get_mut(&dep) {
                    Some(info) => info.dependents.push(id.clone()),
                    None => warn!(job = %id, dep = %dep, "requirement on unknown job"),
                }
            }
        }

        Self {
            order,
            jobs: table,
            abort: None,
            culprit: None,
        }
    }

    pub fn state_of(&self, id: &str) -> Option<JobState> {
        self.jobs.get(id).map(|info| info.state)
    }

    /// Why `id` was skipped or cancelled, if it was.
    pub fn cause_of(&self, id: &str) -> Option<&str> {
        self.jobs.get(id)?.cause.as_deref()
    }

    /// Whether all requirements of `id` are `Done`. `None` for unknown jobs.
    pub fn deps_satisfied(&self, id: &str) -> Option<bool> {
        let info = self.jobs.get(id)?;
        Some(ReadOnlyStateManager::new(&self.jobs).deps_satisfied_for_info(info))
    }

    pub fn abort_reason(&self) -> Option<&AbortReason> {
        self.abort.as_ref()
    }

    pub fn is_aborting(&self) -> bool {
        self.abort.is_some()
    }

    pub fn culprit(&self) -> Option<&Culprit> {
        self.culprit.as_ref()
    }

    /// Jobs currently `Running`, in declaration order.
    pub fn running(&self) -> Vec<JobId> {
        self.ids_in_state(JobState::Running)
    }

    pub fn ids_in_state(&self, state: JobState) -> Vec<JobId> {
        self.order
            .iter()
            .filter(|id| self.state_of(id) == Some(state))
            .cloned()
            .collect()
    }

    pub fn is_finished(&self) -> bool {
        self.jobs.values().all(|info| info.state.is_terminal())
    }

    /// Success iff no critical job ended `Failed`, `Skipped` or `Cancelled`.
    pub fn success(&self) -> bool {
        self.jobs
            .values()
            .all(|info| !(info.critical && info.state.is_unsuccessful()))
    }

    /// Promote the initial set of ready jobs (those without requirements).
    pub fn start(&mut self) -> SchedulerStep {
        let mut manager = StateManager::new(&self.order, &mut self.jobs);
        let newly_ready = manager.collect_new_ready_jobs();
        info!(ready = ?newly_ready, "scheduler: starting run");
        SchedulerStep {
            newly_ready,
            run_finished: manager.all_jobs_terminal(),
            ..SchedulerStep::default()
        }
    }

    /// `Ready -> Running`. Returns `false` if the job was not `Ready`.
    pub fn mark_running(&mut self, id: &str) -> bool {
        StateManager::new(&self.order, &mut self.jobs).transition(id, JobState::Running)
    }

    /// Record the terminal state reported for a running job.
    ///
    /// `outcome` must be `Done`, `Failed` or `Cancelled`.
    pub fn step_completion(&mut self, id: &str, outcome: JobState) -> SchedulerStep {
        let mut step = SchedulerStep::default();

        let changed = StateManager::new(&self.order, &mut self.jobs).transition(id, outcome);
        if !changed {
            warn!(job = %id, outcome = %outcome, "completion for job that was not running; ignoring");
            step.run_finished = self.is_finished();
            return step;
        }

        match outcome {
            JobState::Done => {
                debug!(job = %id, "job done");
                if !self.is_aborting() {
                    let mut manager = StateManager::new(&self.order, &mut self.jobs);
                    step.newly_ready = manager.collect_new_ready_jobs();
                }
            }
            JobState::Failed | JobState::Cancelled => {
                if outcome == JobState::Cancelled {
                    self.set_cause(id, "run aborted while the job was running");
                }
                self.propagate_unsuccessful(id, &mut step);
            }
            other => {
                warn!(job = %id, state = %other, "unexpected completion state");
            }
        }

        step.run_finished = self.is_finished();
        step
    }

    /// Force a running job to `Cancelled`, e.g. after the grace period.
    pub fn force_cancel(&mut self, id: &str, cause: &str) -> SchedulerStep {
        let mut step = self.step_completion(id, JobState::Cancelled);
        self.set_cause(id, cause);
        step.run_finished = self.is_finished();
        step
    }

    /// Enter abort mode: cancel everything not yet started and report which
    /// running jobs need a cancellation request. Idempotent.
    pub fn abort(&mut self, reason: AbortReason) -> SchedulerStep {
        let mut step = SchedulerStep::default();
        if self.is_aborting() {
            step.run_finished = self.is_finished();
            return step;
        }

        let cause = match &reason {
            AbortReason::CriticalJob(job) => format!("run aborted: critical job '{job}' did not succeed"),
            AbortReason::External => "run aborted on request".to_string(),
        };
        warn!(reason = ?reason, "scheduler: entering abort mode");
        self.abort = Some(reason.clone());

        let (cancelled, running) =
            StateManager::new(&self.order, &mut self.jobs).cancel_not_started(&cause);

        for id in &cancelled {
            self.note_culprit(id);
        }

        step.newly_cancelled = cancelled;
        step.to_cancel = running;
        step.abort = Some(reason);
        step.run_finished = self.is_finished();
        step
    }

    /// Shared handling of `Failed`/`Cancelled`: skip dependents, and abort if
    /// a critical job is among the casualties.
    fn propagate_unsuccessful(&mut self, id: &str, step: &mut SchedulerStep) {
        let critical = self.jobs.get(id).is_some_and(|i| i.critical);
        if critical {
            self.note_culprit(id);
        }

        let skipped = StateManager::new(&self.order, &mut self.jobs).mark_dependents_skipped(id);
        if !skipped.is_empty() {
            info!(job = %id, skipped = ?skipped, "skipping dependents");
        }

        let first_critical_skip = skipped
            .iter()
            .find(|s| self.jobs.get(*s).is_some_and(|i| i.critical))
            .cloned();
        if let Some(s) = &first_critical_skip {
            self.note_culprit(s);
        }
        step.newly_skipped.extend(skipped);

        let trigger = if critical {
            Some(id.to_string())
        } else {
            first_critical_skip
        };

        if let Some(job) = trigger {
            let abort = self.abort(AbortReason::CriticalJob(job));
            step.newly_cancelled.extend(abort.newly_cancelled);
            step.to_cancel.extend(abort.to_cancel);
            if abort.abort.is_some() {
                step.abort = abort.abort;
            }
        }
    }

    fn note_culprit(&mut self, id: &str) {
        if self.culprit.is_some() {
            return;
        }
        if let Some(info) = self.jobs.get(id) {
            if info.critical && info.state.is_unsuccessful() {
                info!(job = %id, state = %info.state, "critical job did not succeed");
                self.culprit = Some(Culprit {
                    job: id.to_string(),
                    state: info.state,
                });
            }
        }
    }

    fn set_cause(&mut self, id: &str, cause: &str) {
        if let Some(info) = self.jobs.get_mut(id) {
            info.cause = Some(cause.to_string());
        }
    }
}
