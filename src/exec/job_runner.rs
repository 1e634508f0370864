// src/exec/job_runner.rs

//! Individual job runner.

use std::sync::Arc;

use tokio::sync::{mpsc, oneshot};
use tracing::{debug, info};

use crate::dag::job::{Job, JobLog};
use crate::dag::state::JobState;
use crate::engine::RuntimeEvent;
use crate::transport::Transport;

/// Run one job to completion and report a `JobFinished` event.
///
/// If the cancel channel fires first, the in-flight command future is
/// dropped (which kills any child process the transport spawned) and the
/// job is reported `Cancelled` along with whatever output it produced so far.
pub async fn run_job(
    job: Arc<Job>,
    transport: Arc<dyn Transport>,
    cancel_rx: oneshot::Receiver<()>,
    runtime_tx: mpsc::Sender<RuntimeEvent>,
) {
    info!(job = %job.id(), node = %job.node(), commands = job.commands().len(), "starting job");

    let mut log = JobLog::default();

    let state = tokio::select! {
        state = job.execute(transport.as_ref(), &mut log) => state,
        cancel = cancel_rx => {
            match cancel {
                Ok(()) => info!(job = %job.id(), "cancellation requested; abandoning current command"),
                Err(_) => debug!(job = %job.id(), "cancel channel closed; abandoning current command"),
            }
            JobState::Cancelled
        }
    };

    info!(job = %job.id(), state = %state, commands_issued = log.commands_issued, "job finished");

    let event = RuntimeEvent::JobFinished {
        job: job.id().to_string(),
        state,
        log,
    };
    if runtime_tx.send(event).await.is_err() {
        debug!(job = %job.id(), "runtime gone; dropping completion");
    }
}
