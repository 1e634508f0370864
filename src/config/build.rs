// src/config/build.rs

//! Turning a validated [`ConfigFile`] into runnable graphs.

use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;

use tracing::{debug, info};

use crate::config::model::{CommandSpec, ConfigFile, NodeConfig};
use crate::dag::{Graph, Job};
use crate::errors::{HopdagError, Result};
use crate::exec::{Command, Service};
use crate::node::Node;
use crate::types::parse_duration;

/// The graphs described by one experiment file.
#[derive(Debug)]
pub struct Experiment {
    pub graph: Graph,
    /// Jobs marked `prepare = true`, if any.
    pub prepare: Option<Graph>,
}

impl ConfigFile {
    /// Build fresh graphs from this file. Jobs are added in id order.
    ///
    /// Requirements of experiment jobs on preparation jobs are dropped from
    /// the experiment graph: composing the two graphs already orders every
    /// preparation job before every experiment job.
    pub fn build(&self) -> Result<Experiment> {
        let nodes = self.build_nodes()?;
        let local = Arc::new(Node::local());

        let mut graph = Graph::with_options(self.options.clone());
        let mut prepare = Graph::with_options(
            self.options
                .clone()
                .with_label(format!("{} (prepare)", self.options.label)),
        );

        for (id, cfg) in self.job.iter() {
            let node = match &cfg.node {
                Some(name) => nodes.get(name).cloned().ok_or_else(|| {
                    HopdagError::ConfigError(format!("job '{id}' runs on unknown node '{name}'"))
                })?,
                None => Arc::clone(&local),
            };

            let commands = cfg
                .commands
                .iter()
                .map(|spec| self.to_command(spec))
                .collect::<Result<Vec<_>>>()?;

            let required = cfg.required.iter().filter(|dep| {
                cfg.prepare || !self.job.get(*dep).is_some_and(|other| other.prepare)
            });

            let mut job = Job::new(id.clone(), node)
                .with_critical(cfg.critical)
                .with_commands(commands)
                .requires_all(required.cloned());
            if let Some(label) = &cfg.label {
                job = job.with_label(label.clone());
            }

            if cfg.prepare {
                prepare.add(job)?;
            } else {
                graph.add(job)?;
            }
        }

        if self.config.sanitize {
            let removed = graph.sanitize() + prepare.sanitize();
            if removed > 0 {
                info!(removed, "sanitize removed dangling requirements");
            }
        }

        debug!(jobs = graph.len(), prepare_jobs = prepare.len(), "graphs built from config");

        Ok(Experiment {
            graph,
            prepare: (!prepare.is_empty()).then_some(prepare),
        })
    }

    fn build_nodes(&self) -> Result<HashMap<String, Arc<Node>>> {
        let mut built = HashMap::new();
        for name in self.node.keys() {
            self.build_node(name, &mut built, 0)?;
        }
        Ok(built)
    }

    fn build_node(
        &self,
        name: &str,
        built: &mut HashMap<String, Arc<Node>>,
        depth: usize,
    ) -> Result<Arc<Node>> {
        if let Some(node) = built.get(name) {
            return Ok(Arc::clone(node));
        }
        if depth > self.node.len() {
            return Err(HopdagError::ConfigError(format!(
                "gateway chain of node '{name}' does not terminate"
            )));
        }
        let cfg: &NodeConfig = self
            .node
            .get(name)
            .ok_or_else(|| HopdagError::ConfigError(format!("unknown node '{name}'")))?;

        let node = match &cfg.gateway {
            Some(gw) => {
                let gateway = self.build_node(gw, built, depth + 1)?;
                Node::via(cfg.host.clone(), cfg.user.as_deref(), gateway)?
            }
            None => Node::new(cfg.host.clone(), cfg.user.as_deref()),
        };
        let node = match cfg.port {
            Some(port) => node.with_port(port)?,
            None => node,
        };

        let node = Arc::new(node);
        built.insert(name.to_string(), Arc::clone(&node));
        Ok(node)
    }

    fn to_command(&self, spec: &CommandSpec) -> Result<Command> {
        let command = match spec {
            CommandSpec::Run { run } => Command::run(run.clone()),
            CommandSpec::Script {
                script,
                args,
                includes,
            } => Command::script(self.resolve_path(script), args.iter().cloned())
                .with_includes(includes.iter().map(|p| self.resolve_path(p))),
            CommandSpec::Pull { pull } => Command::pull(pull.remote.clone(), pull.local.clone()),
            CommandSpec::Push { push } => Command::push(push.local.clone(), push.remote.clone()),
            CommandSpec::Wait { wait, message } => {
                let duration = parse_duration(wait).map_err(HopdagError::ConfigError)?;
                let command = Command::wait(duration);
                match message {
                    Some(msg) => command.with_message(msg.clone()),
                    None => command,
                }
            }
            CommandSpec::Print { print } => Command::print(print.clone()),
            CommandSpec::Inline {
                inline,
                args,
                label,
            } => {
                let command = Command::inline(inline.clone(), args.iter().cloned());
                match label {
                    Some(label) => command.with_label(label.clone()),
                    None => command,
                }
            }
            CommandSpec::Start { start } => self.service(start)?.start_command(),
            CommandSpec::Stop { stop } => self.service(stop)?.stop_command(),
        };
        Ok(command)
    }

    fn service(&self, id: &str) -> Result<Service> {
        let cfg = self
            .service
            .get(id)
            .ok_or_else(|| HopdagError::ConfigError(format!("unknown service '{id}'")))?;
        Ok(cfg
            .env
            .iter()
            .fold(Service::new(cfg.command.clone(), id), |service, (k, v)| {
                service.with_env(k.clone(), v.clone())
            }))
    }

    fn resolve_path(&self, path: &Path) -> std::path::PathBuf {
        match &self.base_dir {
            Some(dir) if path.is_relative() => dir.join(path),
            _ => path.to_path_buf(),
        }
    }
}
