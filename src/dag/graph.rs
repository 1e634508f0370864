// src/dag/graph.rs

use std::collections::HashMap;
use std::fmt::Write as _;
use std::path::Path;
use std::sync::Arc;

use tracing::{debug, info, warn};

use crate::dag::job::Job;
use crate::dag::plan::ExecutionPlan;
use crate::dag::state::{JobRecord, JobState};
use crate::engine::{AbortHandle, RunResult, RunSummary, Runtime};
use crate::errors::{HopdagError, Result};
use crate::report::{self, ExecutionReport};
use crate::transport::Transport;
use crate::types::{GraphOptions, JobId};

/// DFS marking used by cycle detection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Mark {
    Unvisited,
    InProgress,
    Done,
}

/// The set of jobs of one run plus the requirement edges between them.
///
/// Jobs keep their declaration order, which is also the order used whenever
/// the scheduler has to pick a "first" job. A graph runs at most once; the
/// per-job records it keeps afterwards feed [`Graph::why`] and
/// [`Graph::debrief`].
#[derive(Debug)]
pub struct Graph {
    options: GraphOptions,
    jobs: Vec<Arc<Job>>,
    index: HashMap<JobId, usize>,
    abort: AbortHandle,
    summary: Option<RunSummary>,
}

impl Default for Graph {
    fn default() -> Self {
        Self::new()
    }
}

impl Graph {
    pub fn new() -> Self {
        Self::with_options(GraphOptions::default())
    }

    pub fn with_options(options: GraphOptions) -> Self {
        Self {
            options,
            jobs: Vec::new(),
            index: HashMap::new(),
            abort: AbortHandle::new(),
            summary: None,
        }
    }

    pub fn options(&self) -> &GraphOptions {
        &self.options
    }

    pub fn label(&self) -> &str {
        &self.options.label
    }

    /// Register a job. Fails with `DuplicateId` if the id is taken.
    pub fn add(&mut self, job: Job) -> Result<()> {
        if self.index.contains_key(job.id()) {
            return Err(HopdagError::DuplicateId(job.id().to_string()));
        }
        debug!(job = %job.id(), required = ?job.required(), critical = job.is_critical(), "job added");
        self.index.insert(job.id().to_string(), self.jobs.len());
        self.jobs.push(Arc::new(job));
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.jobs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.jobs.is_empty()
    }

    pub fn contains(&self, id: &str) -> bool {
        self.index.contains_key(id)
    }

    pub fn job(&self, id: &str) -> Option<&Job> {
        self.index.get(id).map(|&i| self.jobs[i].as_ref())
    }

    /// Jobs in declaration order.
    pub fn jobs(&self) -> impl Iterator<Item = &Job> {
        self.jobs.iter().map(Arc::as_ref)
    }

    pub(crate) fn job_mut(&mut self, id: &str) -> Option<&mut Job> {
        let idx = *self.index.get(id)?;
        Some(Arc::make_mut(&mut self.jobs[idx]))
    }

    pub(crate) fn set_abort_handle(&mut self, abort: AbortHandle) {
        self.abort = abort;
    }

    pub(crate) fn into_jobs(self) -> Vec<Job> {
        self.jobs
            .into_iter()
            .map(|j| Arc::try_unwrap(j).unwrap_or_else(|shared| (*shared).clone()))
            .collect()
    }

    /// Check that every requirement names a known job and that the
    /// requirement relation is acyclic.
    ///
    /// Cycle detection is a depth-first search with three-colour marking;
    /// the first cycle found is reported with the ids along it.
    pub fn validate(&self) -> Result<()> {
        for job in self.jobs() {
            if let Some(missing) = job.required().iter().find(|r| !self.contains(r)) {
                return Err(HopdagError::ConfigError(format!(
                    "job '{}' requires unknown job '{}'",
                    job.id(),
                    missing
                )));
            }
        }

        let mut marks = vec![Mark::Unvisited; self.jobs.len()];
        let mut path = Vec::new();
        for start in 0..self.jobs.len() {
            if marks[start] == Mark::Unvisited {
                self.visit(start, &mut marks, &mut path)?;
            }
        }

        debug!(label = %self.options.label, jobs = self.jobs.len(), "graph validated");
        Ok(())
    }

    fn visit(&self, idx: usize, marks: &mut [Mark], path: &mut Vec<usize>) -> Result<()> {
        marks[idx] = Mark::InProgress;
        path.push(idx);

        for dep in self.jobs[idx].required() {
            let Some(&next) = self.index.get(dep) else {
                continue;
            };
            match marks[next] {
                Mark::InProgress => {
                    let start = path.iter().position(|&p| p == next).unwrap_or(0);
                    let cycle = path[start..]
                        .iter()
                        .map(|&p| self.jobs[p].id().to_string())
                        .collect();
                    return Err(HopdagError::Cycle(cycle));
                }
                Mark::Unvisited => self.visit(next, marks, path)?,
                Mark::Done => {}
            }
        }

        path.pop();
        marks[idx] = Mark::Done;
        Ok(())
    }

    /// Drop requirements naming jobs that are not in the graph.
    ///
    /// Never fails; returns the number of edges removed, so a second call
    /// returns 0.
    pub fn sanitize(&mut self) -> usize {
        let known: Vec<JobId> = self.index.keys().cloned().collect();
        let mut removed = 0;

        for job in self.jobs.iter_mut() {
            if job.required().iter().all(|r| known.contains(r)) {
                continue;
            }
            let job = Arc::make_mut(job);
            let id = job.id().to_string();
            job.retain_requirements(|r| {
                let keep = known.contains(r);
                if !keep {
                    warn!(job = %id, requirement = %r, "removing dangling requirement");
                    removed += 1;
                }
                keep
            });
        }

        removed
    }

    /// Validate and compute the would-be execution order.
    pub fn plan(&self) -> Result<ExecutionPlan> {
        self.validate()?;
        let jobs: Vec<&Job> = self.jobs().collect();
        ExecutionPlan::compute(&self.options.label, &jobs)
    }

    /// Human-readable listing of jobs, nodes, requirements and commands.
    pub fn list(&self) -> String {
        let mut out = String::new();
        let _ = writeln!(out, "{} ({} jobs)", self.options.label, self.jobs.len());
        for (n, job) in self.jobs().enumerate() {
            let marker = if job.is_critical() { "critical" } else { "best-effort" };
            let _ = writeln!(
                out,
                "{:>3}. {} [{}] on {} ({marker})",
                n + 1,
                job.id(),
                job.label(),
                job.node()
            );
            if !job.required().is_empty() {
                let _ = writeln!(out, "       requires: {}", job.required().join(", "));
            }
            for cmd in job.commands() {
                let _ = writeln!(out, "       - {}", cmd.label());
            }
        }
        out
    }

    /// Handle to abort the run from elsewhere (e.g. a signal handler).
    pub fn abort_handle(&self) -> AbortHandle {
        self.abort.clone()
    }

    /// Validate, then either compute the plan (`dry_run`) or execute.
    ///
    /// The returned result is the single source of truth for success.
    /// Command failures never surface as `Err`: they only influence the
    /// outcome through the critical/skip/cancel rules.
    pub async fn run(&mut self, transport: Arc<dyn Transport>, dry_run: bool) -> Result<RunResult> {
        self.validate()?;

        if dry_run {
            let plan = self.plan()?;
            info!(label = %self.options.label, waves = plan.waves.len(), "dry run: graph is valid");
            return Ok(RunResult::DryRun(plan));
        }

        if self.summary.is_some() {
            return Err(HopdagError::ConfigError(format!(
                "graph '{}' has already run; build a new graph to run again",
                self.options.label
            )));
        }

        let runtime = Runtime::new(
            &self.jobs,
            transport,
            self.options.clone(),
            self.abort.subscribe(),
        );
        let summary = runtime.run().await;
        let success = summary.success;
        self.summary = Some(summary);

        Ok(RunResult::Finished { success })
    }

    /// State of `id`: `Pending` before any run, final state afterwards.
    pub fn state_of(&self, id: &str) -> Option<JobState> {
        if !self.contains(id) {
            return None;
        }
        Some(self.record_of(id).map_or(JobState::Pending, |r| r.state))
    }

    pub fn record_of(&self, id: &str) -> Option<&JobRecord> {
        self.summary.as_ref()?.records.get(id)
    }

    pub fn summary(&self) -> Option<&RunSummary> {
        self.summary.as_ref()
    }

    /// One line naming the critical job responsible for a failed run.
    pub fn why(&self) -> String {
        let Some(summary) = &self.summary else {
            return format!("graph '{}' has not run", self.options.label);
        };
        if summary.success {
            return "all critical jobs succeeded".to_string();
        }
        let Some(culprit) = &summary.culprit else {
            return "run failed".to_string();
        };

        let label = self.job(&culprit.job).map(Job::label).unwrap_or("?");
        let verb = match culprit.state {
            JobState::Failed => "failed",
            JobState::Skipped => "was skipped",
            JobState::Cancelled => "was cancelled",
            _ => "did not succeed",
        };
        let detail = self
            .record_of(&culprit.job)
            .and_then(|r| r.detail.as_deref())
            .map(|d| format!(": {d}"))
            .unwrap_or_default();

        if label == culprit.job {
            format!("critical job '{}' {verb}{detail}", culprit.job)
        } else {
            format!("critical job '{}' ({label}) {verb}{detail}", culprit.job)
        }
    }

    /// Structured report of the run. Safe to call before a run; every job
    /// then shows as `Pending`.
    pub fn debrief(&self) -> ExecutionReport {
        ExecutionReport::from_graph(self)
    }

    pub fn to_dot(&self) -> String {
        report::to_dot(self)
    }

    /// Write the graph to `path` (DOT text, or PNG through Graphviz when the
    /// extension is `.png`). Returns `false` if rendering failed.
    pub async fn export(&self, path: &Path) -> Result<bool> {
        report::export_graph(self, path).await
    }
}
