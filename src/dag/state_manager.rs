// src/dag/state_manager.rs

//! State transitions over the per-run job table.

use std::collections::{HashMap, HashSet, VecDeque};

use tracing::{debug, warn};

use crate::dag::job_info::JobInfo;
use crate::dag::state::JobState;
use crate::types::JobId;

/// Applies transitions to the job table while preserving declaration order,
/// so that "first" always means the same thing from one run to the next.
pub struct StateManager<'a> {
    order: &'a [JobId],
    jobs: &'a mut HashMap<JobId, JobInfo>,
}

impl<'a> StateManager<'a> {
    pub fn new(order: &'a [JobId], jobs: &'a mut HashMap<JobId, JobInfo>) -> Self {
        Self { order, jobs }
    }

    /// Move `id` to `next` if the transition is legal. Returns whether the
    /// state changed.
    pub fn transition(&mut self, id: &str, next: JobState) -> bool {
        let Some(info) = self.jobs.get_mut(id) else {
            warn!(job = %id, "transition for unknown job; ignoring");
            return false;
        };

        if !info.state.can_become(next) {
            debug!(job = %id, from = %info.state, to = %next, "ignoring illegal transition");
            return false;
        }

        debug!(job = %id, from = %info.state, to = %next, "job state change");
        info.state = next;
        true
    }

    /// Whether every requirement of `info` is `Done`.
    pub fn deps_satisfied_for_info(&self, info: &JobInfo) -> bool {
        ReadOnlyStateManager::new(self.jobs).deps_satisfied_for_info(info)
    }

    /// Promote every `Pending` job whose requirements are all `Done` to
    /// `Ready`, returning them in declaration order.
    pub fn collect_new_ready_jobs(&mut self) -> Vec<JobId> {
        // Decide first, then mutate to avoid borrowing issues.
        let candidates: Vec<JobId> = self
            .order
            .iter()
            .filter(|id| {
                self.jobs.get(*id).is_some_and(|info| {
                    info.state == JobState::Pending && self.deps_satisfied_for_info(info)
                })
            })
            .cloned()
            .collect();

        candidates
            .into_iter()
            .filter(|id| self.transition(id, JobState::Ready))
            .collect()
    }

    /// Skip every `Pending`/`Ready` job that transitively requires `failed`.
    ///
    /// Traversal is breadth-first in declaration order. Returns the newly
    /// skipped jobs in the order they were reached.
    pub fn mark_dependents_skipped(&mut self, failed: &str) -> Vec<JobId> {
        let mut queue: VecDeque<(JobId, JobId)> = self
            .dependents_in_order(failed)
            .into_iter()
            .map(|d| (d, failed.to_string()))
            .collect();
        let mut seen: HashSet<JobId> = HashSet::new();
        let mut skipped = Vec::new();

        while let Some((id, because)) = queue.pop_front() {
            if !seen.insert(id.clone()) {
                continue;
            }

            let upstream_state = self
                .jobs
                .get(&because)
                .map(|info| info.state)
                .unwrap_or(JobState::Failed);

            if self.transition(&id, JobState::Skipped) {
                if let Some(info) = self.jobs.get_mut(&id) {
                    info.cause = Some(format!("requirement '{because}' {upstream_state}"));
                }
                skipped.push(id.clone());
                queue.extend(
                    self.dependents_in_order(&id)
                        .into_iter()
                        .map(|d| (d, id.clone())),
                );
            }
        }

        skipped
    }

    /// Cancel every job that has not started; return the running ones.
    pub fn cancel_not_started(&mut self, cause: &str) -> (Vec<JobId>, Vec<JobId>) {
        let mut cancelled = Vec::new();
        let mut running = Vec::new();

        for id in self.order {
            let state = match self.jobs.get(id) {
                Some(info) => info.state,
                None => continue,
            };
            match state {
                JobState::Pending | JobState::Ready => {
                    if self.transition(id, JobState::Cancelled) {
                        if let Some(info) = self.jobs.get_mut(id) {
                            info.cause = Some(cause.to_string());
                        }
                        cancelled.push(id.clone());
                    }
                }
                JobState::Running => running.push(id.clone()),
                _ => {}
            }
        }

        (cancelled, running)
    }

    /// Check if all jobs are in a terminal state.
    pub fn all_jobs_terminal(&self) -> bool {
        self.jobs.values().all(|info| info.state.is_terminal())
    }

    fn dependents_in_order(&self, id: &str) -> Vec<JobId> {
        self.jobs
            .get(id)
            .map(|info| info.dependents.clone())
            .unwrap_or_default()
    }
}

/// A read-only view for checking dependency satisfaction.
pub struct ReadOnlyStateManager<'a> {
    jobs: &'a HashMap<JobId, JobInfo>,
}

impl<'a> ReadOnlyStateManager<'a> {
    pub fn new(jobs: &'a HashMap<JobId, JobInfo>) -> Self {
        Self { jobs }
    }

    pub fn deps_satisfied_for_info(&self, info: &JobInfo) -> bool {
        info.deps.iter().all(|dep| match self.jobs.get(dep) {
            Some(d) => d.state == JobState::Done,
            None => {
                warn!(job = %info.id, dep = %dep, "requirement missing from job table");
                false
            }
        })
    }
}
