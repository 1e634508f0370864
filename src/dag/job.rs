// src/dag/job.rs

//! Jobs: ordered command sequences bound to one node.

use std::sync::Arc;

use tracing::{debug, info, warn};

use crate::dag::state::JobState;
use crate::exec::Command;
use crate::node::Node;
use crate::transport::{SessionRef, Transport};
use crate::types::JobId;

/// An ordered sequence of commands executed on one node, plus the metadata
/// the scheduler needs: which jobs must be `Done` first and whether a failure
/// here is fatal to the whole run.
///
/// Jobs default to `critical`. State is not stored here; the owning
/// [`Graph`](crate::dag::Graph) tracks it and exposes it read-only.
#[derive(Debug, Clone)]
pub struct Job {
    id: JobId,
    label: Option<String>,
    node: Arc<Node>,
    commands: Vec<Command>,
    required: Vec<JobId>,
    critical: bool,
}

impl Job {
    pub fn new(id: impl Into<JobId>, node: Arc<Node>) -> Self {
        Self {
            id: id.into(),
            label: None,
            node,
            commands: Vec::new(),
            required: Vec::new(),
            critical: true,
        }
    }

    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.label = Some(label.into());
        self
    }

    pub fn with_command(mut self, command: Command) -> Self {
        self.commands.push(command);
        self
    }

    pub fn with_commands(mut self, commands: impl IntoIterator<Item = Command>) -> Self {
        self.commands.extend(commands);
        self
    }

    /// Add a requirement; duplicates are ignored.
    pub fn requires(mut self, id: impl Into<JobId>) -> Self {
        self.add_requirement(id.into());
        self
    }

    pub fn requires_all<I, S>(mut self, ids: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<JobId>,
    {
        for id in ids {
            self.add_requirement(id.into());
        }
        self
    }

    pub fn with_critical(mut self, critical: bool) -> Self {
        self.critical = critical;
        self
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    /// The label if one was given, otherwise the id.
    pub fn label(&self) -> &str {
        self.label.as_deref().unwrap_or(&self.id)
    }

    pub fn node(&self) -> &Arc<Node> {
        &self.node
    }

    pub fn commands(&self) -> &[Command] {
        &self.commands
    }

    pub fn required(&self) -> &[JobId] {
        &self.required
    }

    pub fn is_critical(&self) -> bool {
        self.critical
    }

    pub(crate) fn add_requirement(&mut self, id: JobId) {
        if !self.required.contains(&id) {
            self.required.push(id);
        }
    }

    pub(crate) fn retain_requirements(&mut self, mut keep: impl FnMut(&JobId) -> bool) {
        self.required.retain(|id| keep(id));
    }

    /// Run every command in order, stopping at the first failure.
    ///
    /// The node session is resolved lazily, on the first command that needs
    /// one, so wait-only jobs never connect. A connection error counts as a
    /// failure of the command that needed the session. Returns `Done` or
    /// `Failed`; everything observed along the way lands in `log`.
    pub async fn execute(&self, transport: &dyn Transport, log: &mut JobLog) -> JobState {
        let mut session: Option<SessionRef> = None;

        for (idx, command) in self.commands.iter().enumerate() {
            let position = idx + 1;

            if command.needs_session() && session.is_none() {
                match self.node.resolve(transport).await {
                    Ok(s) => {
                        debug!(job = %self.id, session = %s.describe(), "session resolved");
                        session = Some(s);
                    }
                    Err(err) => {
                        warn!(job = %self.id, node = %self.node, error = %err, "cannot reach node");
                        log.commands_issued += 1;
                        log.error = Some(format!(
                            "command {position} ({}) failed: {err}",
                            command.label()
                        ));
                        return JobState::Failed;
                    }
                }
            }

            info!(job = %self.id, command = %command.label(), "issuing command {position}/{}", self.commands.len());
            log.commands_issued += 1;

            let outcome = command.execute(session.as_deref()).await;
            log.output.push_str(outcome.output());

            if let Some(error) = outcome.error() {
                warn!(job = %self.id, command = %command.label(), error, "command failed; aborting job");
                log.error = Some(format!(
                    "command {position} ({}) failed: {error}",
                    command.label()
                ));
                return JobState::Failed;
            }
        }

        JobState::Done
    }
}

/// What a job produced while running: output of issued commands and the
/// error detail of the failing one.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct JobLog {
    pub output: String,
    pub error: Option<String>,
    pub commands_issued: usize,
}
