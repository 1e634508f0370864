// src/transport/ssh.rs

//! Transport backed by the OpenSSH client binaries.
//!
//! No protocol is implemented here: commands are handed to `ssh`, files to
//! `scp`, and gateway chains become `-J hop1,hop2` arguments. Jobs sharing a
//! node share one pooled [`SshSession`]; OpenSSH multiplexing (if configured
//! in `~/.ssh/config`) takes care of reusing the underlying connection.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::process::Command;
use tracing::{debug, info};

use crate::errors::{HopdagError, Result};
use crate::node::Node;
use crate::transport::local::{LocalSession, prepend_output, run_process};
use crate::transport::{BoxFuture, CommandOutcome, Session, SessionRef, Transport};
use crate::types::Direction;

/// Remote directory, relative to the login directory, where script
/// includes are shipped.
pub const REMOTE_WORKDIR: &str = ".hopdag";

/// Settings for the OpenSSH-backed transport.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SshOptions {
    pub ssh_program: String,
    pub scp_program: String,
    /// Passed as `-o ConnectTimeout=<secs>`.
    pub connect_timeout: Option<Duration>,
    /// Run `ssh <node> true` when a session is first established, so that
    /// unreachable nodes fail at connection time rather than on first use.
    pub check_on_connect: bool,
    /// Extra arguments inserted before the destination (e.g. `-v`).
    pub extra_args: Vec<String>,
}

impl Default for SshOptions {
    fn default() -> Self {
        Self {
            ssh_program: "ssh".to_string(),
            scp_program: "scp".to_string(),
            connect_timeout: Some(Duration::from_secs(10)),
            check_on_connect: false,
            extra_args: Vec::new(),
        }
    }
}

#[derive(Debug)]
pub struct SshTransport {
    options: Arc<SshOptions>,
    pool: Mutex<HashMap<String, SessionRef>>,
}

impl SshTransport {
    pub fn new(options: SshOptions) -> Self {
        Self {
            options: Arc::new(options),
            pool: Mutex::new(HashMap::new()),
        }
    }

    fn pooled(&self, key: &str) -> Option<SessionRef> {
        let pool = self.pool.lock().unwrap_or_else(|e| e.into_inner());
        pool.get(key).cloned()
    }

    fn remember(&self, key: String, session: SessionRef) {
        let mut pool = self.pool.lock().unwrap_or_else(|e| e.into_inner());
        pool.entry(key).or_insert(session);
    }
}

impl Default for SshTransport {
    fn default() -> Self {
        Self::new(SshOptions::default())
    }
}

impl Transport for SshTransport {
    fn connect<'a>(
        &'a self,
        node: &'a Node,
        via: Option<SessionRef>,
    ) -> BoxFuture<'a, Result<SessionRef>> {
        Box::pin(async move {
            if node.is_local() {
                let session: SessionRef = Arc::new(LocalSession::new(node.to_string()));
                return Ok(session);
            }

            let key = node.to_string();
            if let Some(session) = self.pooled(&key) {
                return Ok(session);
            }

            let jumps = match &via {
                Some(gateway) => {
                    let hops = gateway.hops();
                    if hops.is_empty() {
                        return Err(HopdagError::Connection(format!(
                            "{} cannot be used as a jump host for {}",
                            gateway.describe(),
                            node.destination()
                        )));
                    }
                    hops
                }
                None => Vec::new(),
            };

            let session = SshSession {
                target: match node.user() {
                    Some(user) => format!("{user}@{}", node.host()),
                    None => node.host().to_string(),
                },
                hop: node.destination(),
                port: node.port(),
                jumps,
                options: Arc::clone(&self.options),
            };

            if self.options.check_on_connect {
                let outcome = session.run_text("true").await;
                if let Some(error) = outcome.error() {
                    return Err(HopdagError::Connection(format!(
                        "{}: {error}",
                        session.describe()
                    )));
                }
            }

            info!(node = %node, "ssh session ready");
            let session: SessionRef = Arc::new(session);
            self.remember(key, Arc::clone(&session));
            Ok(session)
        })
    }
}

/// One remote endpoint plus the jump hosts needed to reach it.
#[derive(Debug, Clone)]
pub struct SshSession {
    target: String,
    hop: String,
    port: Option<u16>,
    jumps: Vec<String>,
    options: Arc<SshOptions>,
}

impl SshSession {
    fn common_options(&self, cmd: &mut Command) {
        cmd.arg("-o").arg("BatchMode=yes");
        if let Some(timeout) = self.options.connect_timeout {
            cmd.arg("-o")
                .arg(format!("ConnectTimeout={}", timeout.as_secs().max(1)));
        }
        if !self.jumps.is_empty() {
            cmd.arg("-J").arg(self.jumps.join(","));
        }
        cmd.args(&self.options.extra_args);
    }

    fn ssh_command(&self) -> Command {
        let mut cmd = Command::new(&self.options.ssh_program);
        self.common_options(&mut cmd);
        if let Some(port) = self.port {
            cmd.arg("-p").arg(port.to_string());
        }
        cmd.arg(&self.target);
        cmd
    }

    fn scp_command(&self) -> Command {
        let mut cmd = Command::new(&self.options.scp_program);
        self.common_options(&mut cmd);
        if let Some(port) = self.port {
            cmd.arg("-P").arg(port.to_string());
        }
        cmd
    }
}

impl SshSession {
    /// Pipe `script` into `bash -s` on the node, optionally from `cwd`.
    async fn stream(&self, script: Vec<u8>, cwd: Option<&str>, args: &[String]) -> CommandOutcome {
        let mut remote = match cwd {
            Some(dir) => format!("cd {} && bash -s --", shell_quote(dir)),
            None => String::from("bash -s --"),
        };
        for arg in args {
            remote.push(' ');
            remote.push_str(&shell_quote(arg));
        }

        let mut cmd = self.ssh_command();
        cmd.arg("--").arg(&remote);
        run_process(cmd, Some(script)).await
    }

    /// Create the remote work directory and copy `includes` into it.
    async fn ship(&self, includes: &[PathBuf]) -> CommandOutcome {
        let mut cmd = self.ssh_command();
        cmd.arg("--").arg(format!("mkdir -p {}", shell_quote(REMOTE_WORKDIR)));
        let created = run_process(cmd, None).await;
        if !created.is_success() {
            return created;
        }

        let mut cmd = self.scp_command();
        cmd.args(includes)
            .arg(format!("{}:{}/", self.target, REMOTE_WORKDIR));
        debug!(session = %self.describe(), count = includes.len(), "shipping includes");
        prepend_output(created.output().to_string(), run_process(cmd, None).await)
    }
}

impl Session for SshSession {
    fn describe(&self) -> String {
        if self.jumps.is_empty() {
            self.target.clone()
        } else {
            format!("{} (via {})", self.target, self.jumps.join(","))
        }
    }

    fn hops(&self) -> Vec<String> {
        let mut hops = self.jumps.clone();
        hops.push(self.hop.clone());
        hops
    }

    fn run_text<'a>(&'a self, command: &'a str) -> BoxFuture<'a, CommandOutcome> {
        Box::pin(async move {
            let mut cmd = self.ssh_command();
            cmd.arg("--").arg(command);
            debug!(session = %self.describe(), command, "ssh run");
            run_process(cmd, None).await
        })
    }

    fn run_script<'a>(
        &'a self,
        path: &'a Path,
        args: &'a [String],
        includes: &'a [PathBuf],
    ) -> BoxFuture<'a, CommandOutcome> {
        Box::pin(async move {
            let script = match tokio::fs::read(path).await {
                Ok(bytes) => bytes,
                Err(err) => {
                    return CommandOutcome::failed(
                        String::new(),
                        format!("reading script {}: {err}", path.display()),
                    );
                }
            };

            if includes.is_empty() {
                debug!(session = %self.describe(), script = %path.display(), "ssh run script");
                return self.stream(script, None, args).await;
            }

            let shipped = self.ship(includes).await;
            if !shipped.is_success() {
                return shipped;
            }
            debug!(session = %self.describe(), script = %path.display(), includes = includes.len(), "ssh run script");
            let outcome = self.stream(script, Some(REMOTE_WORKDIR), args).await;
            prepend_output(shipped.output().to_string(), outcome)
        })
    }

    fn run_string<'a>(&'a self, body: &'a str, args: &'a [String]) -> BoxFuture<'a, CommandOutcome> {
        Box::pin(async move {
            debug!(session = %self.describe(), lines = body.lines().count(), "ssh run inline script");
            self.stream(body.as_bytes().to_vec(), None, args).await
        })
    }

    fn transfer<'a>(
        &'a self,
        direction: Direction,
        remote: &'a str,
        local: &'a Path,
    ) -> BoxFuture<'a, CommandOutcome> {
        Box::pin(async move {
            let remote_spec = format!("{}:{}", self.target, remote);
            let mut cmd = self.scp_command();
            match direction {
                Direction::Pull => {
                    cmd.arg(&remote_spec).arg(local);
                }
                Direction::Push => {
                    cmd.arg(local).arg(&remote_spec);
                }
            }
            debug!(session = %self.describe(), %direction, remote, local = %local.display(), "scp");
            run_process(cmd, None).await
        })
    }
}

/// Quote `arg` for a POSIX shell unless it is made of safe characters only.
pub fn shell_quote(arg: &str) -> String {
    let safe = !arg.is_empty()
        && arg
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || "-_./=:,@+%".contains(c));
    if safe {
        arg.to_string()
    } else {
        format!("'{}'", arg.replace('\'', r"'\''"))
    }
}
