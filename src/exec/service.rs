// src/exec/service.rs

//! Long-running daemons managed through systemd on the node.

use std::collections::BTreeMap;

use crate::exec::Command;
use crate::transport::ssh::shell_quote;

/// A daemon started as a transient systemd unit named after `id`, so that a
/// later job can stop it without knowing its pid.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Service {
    command: String,
    id: String,
    environment: BTreeMap<String, String>,
}

impl Service {
    pub fn new(command: impl Into<String>, id: impl Into<String>) -> Self {
        Self {
            command: command.into(),
            id: id.into(),
            environment: BTreeMap::new(),
        }
    }

    /// Set an environment variable for the daemon. systemd units start with
    /// an almost empty environment (no `USER`, for instance).
    pub fn with_env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.environment.insert(key.into(), value.into());
        self
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    /// Start the daemon. A unit left over in the failed state from an
    /// earlier run is reset first.
    pub fn start_command(&self) -> Command {
        let unit = shell_quote(&self.id);
        let mut line = format!(
            "systemctl reset-failed {unit} >/dev/null 2>&1; systemd-run --unit={unit} --service-type=simple"
        );
        for (key, value) in &self.environment {
            line.push_str(&format!(" --setenv={}", shell_quote(&format!("{key}={value}"))));
        }
        line.push(' ');
        line.push_str(&self.command);
        Command::run(line)
    }

    pub fn stop_command(&self) -> Command {
        Command::run(format!("systemctl stop {}", shell_quote(&self.id)))
    }
}
