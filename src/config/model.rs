// src/config/model.rs

use std::collections::BTreeMap;
use std::path::PathBuf;

use serde::Deserialize;

use crate::types::{DEFAULT_LABEL, GraphOptions};

/// Top-level experiment file as read from TOML, before validation.
///
/// ```toml
/// [config]
/// label = "cefore scenario"
/// grace_period = "5s"
///
/// [node.faraday]
/// host = "faraday.inria.fr"
/// user = "inria_cefore"
///
/// [node.sim]
/// host = "fit01"
/// user = "root"
/// gateway = "faraday"
///
/// [job.ping]
/// node = "sim"
/// commands = [{ run = "ping -c 1 fit02" }]
/// ```
///
/// All sections are optional at this stage; [`ConfigFile`] enforces the
/// semantic rules.
#[derive(Debug, Clone, Deserialize)]
pub struct RawConfigFile {
    #[serde(default)]
    pub config: ConfigSection,

    /// Nodes from `[node.<name>]`, referenced by jobs and gateways.
    #[serde(default)]
    pub node: BTreeMap<String, NodeConfig>,

    /// Daemons from `[service.<id>]`, started and stopped by job commands.
    #[serde(default)]
    pub service: BTreeMap<String, ServiceConfig>,

    /// Jobs from `[job.<id>]`.
    #[serde(default)]
    pub job: BTreeMap<String, JobConfig>,
}

/// `[config]` section.
#[derive(Debug, Clone, Deserialize)]
pub struct ConfigSection {
    #[serde(default = "default_label")]
    pub label: String,

    /// Duration string (e.g. `"5s"`, `"500ms"`): how long running jobs get
    /// to acknowledge cancellation before being force-finalized.
    #[serde(default = "default_grace_period")]
    pub grace_period: String,

    /// Lines of captured output kept per job in the debrief.
    #[serde(default = "default_output_tail")]
    pub output_tail: usize,

    /// Strip `required` entries naming unknown jobs instead of rejecting
    /// the file.
    #[serde(default)]
    pub sanitize: bool,
}

fn default_label() -> String {
    DEFAULT_LABEL.to_string()
}

fn default_grace_period() -> String {
    "5s".to_string()
}

fn default_output_tail() -> usize {
    crate::types::DEFAULT_OUTPUT_TAIL_LINES
}

impl Default for ConfigSection {
    fn default() -> Self {
        Self {
            label: default_label(),
            grace_period: default_grace_period(),
            output_tail: default_output_tail(),
            sanitize: false,
        }
    }
}

/// `[node.<name>]` section.
#[derive(Debug, Clone, Deserialize)]
pub struct NodeConfig {
    pub host: String,

    #[serde(default)]
    pub user: Option<String>,

    #[serde(default)]
    pub port: Option<u16>,

    /// Name of another `[node.<name>]` this one is reached through.
    #[serde(default)]
    pub gateway: Option<String>,
}

/// `[service.<id>]` section. The id doubles as the systemd unit name.
#[derive(Debug, Clone, Deserialize)]
pub struct ServiceConfig {
    pub command: String,

    #[serde(default)]
    pub env: BTreeMap<String, String>,
}

/// `[job.<id>]` section.
#[derive(Debug, Clone, Deserialize)]
pub struct JobConfig {
    /// Name of a `[node.<name>]`; the local machine if absent.
    #[serde(default)]
    pub node: Option<String>,

    #[serde(default)]
    pub label: Option<String>,

    #[serde(default = "default_critical")]
    pub critical: bool,

    /// Part of the preparation sub-graph that runs before the experiment.
    #[serde(default)]
    pub prepare: bool,

    #[serde(default)]
    pub required: Vec<String>,

    #[serde(default)]
    pub commands: Vec<CommandSpec>,
}

fn default_critical() -> bool {
    true
}

/// One entry of a job's `commands` list.
///
/// The variant is picked by key: `run`, `script`, `pull`, `push`, `wait`,
/// `print`, `inline`, `start` or `stop`.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum CommandSpec {
    Run {
        run: String,
    },
    Script {
        script: PathBuf,
        #[serde(default)]
        args: Vec<String>,
        /// Files shipped next to the script.
        #[serde(default)]
        includes: Vec<PathBuf>,
    },
    Pull {
        pull: PullSpec,
    },
    Push {
        push: PushSpec,
    },
    Wait {
        wait: String,
        #[serde(default)]
        message: Option<String>,
    },
    Print {
        print: String,
    },
    Inline {
        inline: String,
        #[serde(default)]
        args: Vec<String>,
        #[serde(default)]
        label: Option<String>,
    },
    /// Start the named `[service.<id>]`.
    Start {
        start: String,
    },
    /// Stop the named `[service.<id>]`.
    Stop {
        stop: String,
    },
}

#[derive(Debug, Clone, Deserialize)]
pub struct PullSpec {
    pub remote: String,
    pub local: PathBuf,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PushSpec {
    pub local: PathBuf,
    pub remote: String,
}

/// Validated experiment file.
///
/// Only produced through `TryFrom<RawConfigFile>`, so every node reference
/// resolves, gateway chains are finite and durations parse.
#[derive(Debug, Clone)]
pub struct ConfigFile {
    pub config: ConfigSection,
    pub node: BTreeMap<String, NodeConfig>,
    pub service: BTreeMap<String, ServiceConfig>,
    pub job: BTreeMap<String, JobConfig>,
    pub(crate) options: GraphOptions,
    /// Relative script paths resolve against this directory.
    pub(crate) base_dir: Option<PathBuf>,
}

impl ConfigFile {
    pub(crate) fn new_unchecked(raw: RawConfigFile, options: GraphOptions) -> Self {
        Self {
            config: raw.config,
            node: raw.node,
            service: raw.service,
            job: raw.job,
            options,
            base_dir: None,
        }
    }

    pub fn with_base_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.base_dir = Some(dir.into());
        self
    }

    pub fn options(&self) -> &GraphOptions {
        &self.options
    }

    /// Ids of jobs in the preparation sub-graph.
    pub fn prepare_jobs(&self) -> impl Iterator<Item = &str> {
        self.job
            .iter()
            .filter(|(_, j)| j.prepare)
            .map(|(id, _)| id.as_str())
    }
}
