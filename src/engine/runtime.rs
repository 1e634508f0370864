// src/engine/runtime.rs

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use chrono::Utc;
use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::dag::job::{Job, JobLog};
use crate::dag::scheduler::Scheduler;
use crate::dag::scheduler_step::{AbortReason, SchedulerStep};
use crate::dag::state::JobRecord;
use crate::exec::job_runner::run_job;
use crate::transport::Transport;
use crate::types::{GraphOptions, JobId};

use super::{RunSummary, RuntimeEvent};

/// Internal handle for a dispatched job.
///
/// - `cancel` delivers the cancellation request (taken once sent).
/// - `handle` is the Tokio task running the job; aborted when the grace
///   period expires.
struct ActiveJob {
    cancel: Option<oneshot::Sender<()>>,
    handle: JoinHandle<()>,
}

/// Drives the [`Scheduler`] in response to [`RuntimeEvent`]s and runs ready
/// jobs concurrently on the given transport.
///
/// All scheduler state is owned by this loop; job tasks only send events.
pub struct Runtime {
    jobs: HashMap<JobId, Arc<Job>>,
    scheduler: Scheduler,
    transport: Arc<dyn Transport>,
    options: GraphOptions,
    abort_rx: watch::Receiver<bool>,
    event_tx: mpsc::Sender<RuntimeEvent>,
    event_rx: mpsc::Receiver<RuntimeEvent>,
    active: HashMap<JobId, ActiveJob>,
    records: HashMap<JobId, JobRecord>,
    dispatched: u64,
    /// Set when the first cancellation request goes out.
    grace_deadline: Option<Instant>,
}

impl fmt::Debug for Runtime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Runtime")
            .field("scheduler", &self.scheduler)
            .field("active", &self.active.keys().collect::<Vec<_>>())
            .finish_non_exhaustive()
    }
}

impl Runtime {
    pub fn new(
        jobs: &[Arc<Job>],
        transport: Arc<dyn Transport>,
        options: GraphOptions,
        abort_rx: watch::Receiver<bool>,
    ) -> Self {
        let scheduler = Scheduler::new(jobs.iter().map(Arc::as_ref));
        let (event_tx, event_rx) = mpsc::channel(64);
        let records = jobs
            .iter()
            .map(|j| (j.id().to_string(), JobRecord::default()))
            .collect();

        Self {
            jobs: jobs
                .iter()
                .map(|j| (j.id().to_string(), Arc::clone(j)))
                .collect(),
            scheduler,
            transport,
            options,
            abort_rx,
            event_tx,
            event_rx,
            active: HashMap::new(),
            records,
            dispatched: 0,
            grace_deadline: None,
        }
    }

    /// Main event loop. Returns once every job is terminal.
    pub async fn run(mut self) -> RunSummary {
        info!(label = %self.options.label, jobs = self.jobs.len(), "run started");

        let watcher = self.spawn_abort_watcher();

        let first = if *self.abort_rx.borrow() {
            self.scheduler.abort(AbortReason::External)
        } else {
            self.scheduler.start()
        };
        self.apply(first);

        while !self.scheduler.is_finished() {
            if self.active.is_empty() {
                // Unreachable for a validated graph; never spin forever.
                warn!("no job running but the run is not finished; aborting leftovers");
                let step = self.scheduler.abort(AbortReason::External);
                self.apply(step);
                continue;
            }

            let event = match self.grace_deadline {
                Some(deadline) => {
                    match tokio::time::timeout_at(deadline, self.event_rx.recv()).await {
                        Ok(event) => event,
                        Err(_) => {
                            self.force_finalize();
                            continue;
                        }
                    }
                }
                None => self.event_rx.recv().await,
            };

            let Some(event) = event else {
                warn!("runtime event channel closed; stopping");
                break;
            };

            debug!(?event, "runtime received event");
            self.handle_event(event);
        }

        watcher.abort();
        self.into_summary()
    }

    fn spawn_abort_watcher(&self) -> JoinHandle<()> {
        let mut rx = self.abort_rx.clone();
        let tx = self.event_tx.clone();
        tokio::spawn(async move {
            if rx.wait_for(|aborted| *aborted).await.is_ok() {
                let _ = tx.send(RuntimeEvent::AbortRequested).await;
            }
        })
    }

    fn handle_event(&mut self, event: RuntimeEvent) {
        match event {
            RuntimeEvent::JobFinished { job, state, log } => {
                if self.active.remove(&job).is_none() {
                    debug!(job = %job, "completion for job no longer tracked; ignoring");
                    return;
                }
                self.record_finish(&job, log);
                let step = self.scheduler.step_completion(&job, state);
                self.apply(step);
            }
            RuntimeEvent::AbortRequested => {
                info!("abort requested");
                let step = self.scheduler.abort(AbortReason::External);
                self.apply(step);
            }
        }
    }

    /// Act on a scheduler step: dispatch, cancel, and timestamp.
    fn apply(&mut self, step: SchedulerStep) {
        let now = Utc::now();
        for id in step.newly_skipped.iter().chain(&step.newly_cancelled) {
            if let Some(record) = self.records.get_mut(id) {
                record.finished_at = Some(now);
            }
        }

        for id in step.newly_ready {
            self.dispatch(&id);
        }

        if !step.to_cancel.is_empty() {
            self.request_cancellation(&step.to_cancel);
        }

        if step.run_finished {
            debug!("scheduler reports all jobs terminal");
        }
    }

    fn dispatch(&mut self, id: &str) {
        let Some(job) = self.jobs.get(id).cloned() else {
            warn!(job = %id, "ready job missing from job map");
            return;
        };
        if !self.scheduler.mark_running(id) {
            return;
        }

        if let Some(record) = self.records.get_mut(id) {
            record.dispatch_seq = Some(self.dispatched);
            record.started_at = Some(Utc::now());
        }
        self.dispatched += 1;

        let (cancel_tx, cancel_rx) = oneshot::channel();
        let handle = tokio::spawn(run_job(
            job,
            Arc::clone(&self.transport),
            cancel_rx,
            self.event_tx.clone(),
        ));

        self.active.insert(
            id.to_string(),
            ActiveJob {
                cancel: Some(cancel_tx),
                handle,
            },
        );
    }

    fn request_cancellation(&mut self, ids: &[JobId]) {
        for id in ids {
            let Some(active) = self.active.get_mut(id) else {
                continue;
            };
            if let Some(cancel) = active.cancel.take() {
                info!(job = %id, "sending cancellation request");
                if cancel.send(()).is_err() {
                    debug!(job = %id, "job already finished while cancelling");
                }
            }
        }

        if self.grace_deadline.is_none() {
            self.grace_deadline = Some(Instant::now() + self.options.grace_period);
        }
    }

    /// Grace period over: stop waiting for acknowledgements.
    fn force_finalize(&mut self) {
        let cause = format!(
            "force-cancelled after a {:?} grace period",
            self.options.grace_period
        );
        // Declaration order keeps the culprit deterministic.
        let mut ids = self.scheduler.running();
        let stray: Vec<JobId> = self
            .active
            .keys()
            .filter(|k| !ids.contains(*k))
            .cloned()
            .collect();
        ids.extend(stray);
        for id in ids {
            if let Some(active) = self.active.remove(&id) {
                warn!(job = %id, "job did not acknowledge cancellation; force-finalizing");
                active.handle.abort();
            }
            if let Some(record) = self.records.get_mut(&id) {
                record.finished_at = Some(Utc::now());
            }
            let step = self.scheduler.force_cancel(&id, &cause);
            self.apply(step);
        }
    }

    fn record_finish(&mut self, id: &str, log: JobLog) {
        if let Some(record) = self.records.get_mut(id) {
            record.finished_at = Some(Utc::now());
            record.output = log.output;
            record.commands_issued = log.commands_issued;
            record.detail = log.error;
        }
    }

    fn into_summary(mut self) -> RunSummary {
        for (id, record) in self.records.iter_mut() {
            if let Some(state) = self.scheduler.state_of(id) {
                record.state = state;
            }
            if record.detail.is_none() {
                record.detail = self.scheduler.cause_of(id).map(str::to_string);
            }
        }

        let success = self.scheduler.success();
        info!(success, culprit = ?self.scheduler.culprit(), "run finished");

        RunSummary {
            success,
            culprit: self.scheduler.culprit().cloned(),
            abort: self.scheduler.abort_reason().cloned(),
            records: self.records,
        }
    }
}
