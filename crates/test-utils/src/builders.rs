#![allow(dead_code)]

use std::sync::Arc;
use std::time::Duration;

use hopdag::dag::{Graph, Job};
use hopdag::exec::Command;
use hopdag::node::Node;
use hopdag::types::GraphOptions;

/// Builder for `Job` to simplify test setup.
///
/// Jobs run on a shared node `node1` and each command is a `run` whose text
/// is also its key in `FakeTransport`.
pub struct JobBuilder {
    job: Job,
}

impl JobBuilder {
    pub fn new(id: &str) -> Self {
        Self {
            job: Job::new(id, test_node()),
        }
    }

    pub fn on(mut self, node: Arc<Node>) -> Self {
        let mut job = Job::new(self.job.id(), node)
            .with_critical(self.job.is_critical())
            .with_commands(self.job.commands().iter().cloned())
            .requires_all(self.job.required().iter().cloned());
        if self.job.label() != self.job.id() {
            job = job.with_label(self.job.label());
        }
        self.job = job;
        self
    }

    pub fn run(mut self, cmd: &str) -> Self {
        self.job = self.job.with_command(Command::run(cmd));
        self
    }

    pub fn command(mut self, cmd: Command) -> Self {
        self.job = self.job.with_command(cmd);
        self
    }

    pub fn requires(mut self, dep: &str) -> Self {
        self.job = self.job.requires(dep);
        self
    }

    pub fn label(mut self, label: &str) -> Self {
        self.job = self.job.with_label(label);
        self
    }

    pub fn best_effort(mut self) -> Self {
        self.job = self.job.with_critical(false);
        self
    }

    pub fn build(self) -> Job {
        self.job
    }
}

/// The node every `JobBuilder` job runs on unless told otherwise.
pub fn test_node() -> Arc<Node> {
    Arc::new(Node::new("node1", Some("root")))
}

/// A critical job with one command named after it (`"<id>"`).
pub fn job(id: &str) -> JobBuilder {
    JobBuilder::new(id).run(id)
}

/// Graph options with a short grace period so cancellation tests stay fast.
pub fn fast_options() -> GraphOptions {
    GraphOptions::default()
        .with_label("test")
        .with_grace_period(Duration::from_millis(200))
}

/// Build a graph from jobs, panicking on duplicate ids.
pub fn graph_of(jobs: impl IntoIterator<Item = Job>) -> Graph {
    let mut graph = Graph::with_options(fast_options());
    for job in jobs {
        graph.add(job).expect("duplicate job id in test graph");
    }
    graph
}
