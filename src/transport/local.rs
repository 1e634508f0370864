// src/transport/local.rs

//! Transport that executes every command on the local machine.

use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::Arc;

use anyhow::{Context, Result as AnyResult};
use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use tracing::debug;

use crate::errors::Result;
use crate::node::Node;
use crate::transport::{BoxFuture, CommandOutcome, Session, SessionRef, Transport};
use crate::types::Direction;

/// Runs commands with `sh -c` and transfers files with plain copies.
///
/// Node identity is ignored: every node maps onto the local machine. This is
/// what `Node::local()` jobs use in production and what tests use to exercise
/// real processes without a network.
#[derive(Debug, Clone, Default)]
pub struct LocalTransport {
    workdir: Option<PathBuf>,
}

impl LocalTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Directory where script includes are staged. Defaults to
    /// `<tmp>/hopdag`.
    pub fn with_workdir(workdir: impl Into<PathBuf>) -> Self {
        Self {
            workdir: Some(workdir.into()),
        }
    }
}

impl Transport for LocalTransport {
    fn connect<'a>(
        &'a self,
        node: &'a Node,
        _via: Option<SessionRef>,
    ) -> BoxFuture<'a, Result<SessionRef>> {
        Box::pin(async move {
            let mut session = LocalSession::new(node.to_string());
            if let Some(dir) = &self.workdir {
                session.workdir = dir.clone();
            }
            let session: SessionRef = Arc::new(session);
            Ok(session)
        })
    }
}

#[derive(Debug, Clone)]
pub struct LocalSession {
    name: String,
    workdir: PathBuf,
}

impl LocalSession {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            workdir: std::env::temp_dir().join("hopdag"),
        }
    }

    /// Copy `includes` into the work directory.
    async fn stage(&self, includes: &[PathBuf]) -> AnyResult<String> {
        tokio::fs::create_dir_all(&self.workdir)
            .await
            .with_context(|| format!("creating {:?}", self.workdir))?;
        let mut log = String::new();
        for include in includes {
            log.push_str(&copy_file(include, &self.workdir).await?);
        }
        Ok(log)
    }
}

impl Session for LocalSession {
    fn describe(&self) -> String {
        format!("local ({})", self.name)
    }

    fn run_text<'a>(&'a self, command: &'a str) -> BoxFuture<'a, CommandOutcome> {
        Box::pin(async move {
            let mut cmd = Command::new("sh");
            cmd.arg("-c").arg(command);
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
            let mut cmd = Command::new("sh");
            if includes.is_empty() {
                cmd.arg(path).args(args);
                return run_process(cmd, None).await;
            }

            let staged = match std::path::absolute(path) {
                Ok(script) => self.stage(includes).await.map(|log| (script, log)),
                Err(e) => Err(e.into()),
            };
            let (script, log) = match staged {
                Ok(staged) => staged,
                Err(err) => return CommandOutcome::failed(String::new(), format!("{err:#}")),
            };

            debug!(script = %script.display(), workdir = %self.workdir.display(), "includes staged");
            cmd.arg(&script).args(args).current_dir(&self.workdir);
            prepend_output(log, run_process(cmd, None).await)
        })
    }

    fn run_string<'a>(&'a self, body: &'a str, args: &'a [String]) -> BoxFuture<'a, CommandOutcome> {
        Box::pin(async move {
            let mut cmd = Command::new("sh");
            cmd.arg("-s").arg("--").args(args);
            run_process(cmd, Some(body.as_bytes().to_vec())).await
        })
    }

    fn transfer<'a>(
        &'a self,
        direction: Direction,
        remote: &'a str,
        local: &'a Path,
    ) -> BoxFuture<'a, CommandOutcome> {
        Box::pin(async move {
            let (from, to) = match direction {
                Direction::Pull => (PathBuf::from(remote), local.to_path_buf()),
                Direction::Push => (local.to_path_buf(), PathBuf::from(remote)),
            };
            match copy_file(&from, &to).await {
                Ok(msg) => CommandOutcome::succeeded(msg),
                Err(err) => CommandOutcome::failed(String::new(), format!("{err:#}")),
            }
        })
    }
}

/// Put `before` in front of the output of `outcome`.
pub(crate) fn prepend_output(before: String, outcome: CommandOutcome) -> CommandOutcome {
    match outcome {
        CommandOutcome::Succeeded { output } => CommandOutcome::Succeeded {
            output: before + &output,
        },
        CommandOutcome::Failed { output, error } => CommandOutcome::Failed {
            output: before + &output,
            error,
        },
    }
}

/// Copy `from` to `to`; a directory destination receives the source's file name.
async fn copy_file(from: &Path, to: &Path) -> AnyResult<String> {
    let target = if tokio::fs::metadata(to).await.map(|m| m.is_dir()).unwrap_or(false) {
        let name = from
            .file_name()
            .with_context(|| format!("source {:?} has no file name", from))?;
        to.join(name)
    } else {
        to.to_path_buf()
    };

    let bytes = tokio::fs::copy(from, &target)
        .await
        .with_context(|| format!("copying {:?} to {:?}", from, target))?;

    Ok(format!("copied {} -> {} ({bytes} bytes)\n", from.display(), target.display()))
}

/// Spawn `cmd`, optionally feed `stdin`, and fold its exit status and
/// combined stdout/stderr into a [`CommandOutcome`].
///
/// The child is spawned with `kill_on_drop(true)`: dropping the returned
/// future (cancellation) kills the process.
pub(crate) async fn run_process(mut cmd: Command, stdin: Option<Vec<u8>>) -> CommandOutcome {
    cmd.stdin(if stdin.is_some() {
        Stdio::piped()
    } else {
        Stdio::null()
    })
    .stdout(Stdio::piped())
    .stderr(Stdio::piped())
    .kill_on_drop(true);

    match run_process_inner(cmd, stdin).await {
        Ok(outcome) => outcome,
        Err(err) => CommandOutcome::failed(String::new(), format!("{err:#}")),
    }
}

async fn run_process_inner(mut cmd: Command, stdin: Option<Vec<u8>>) -> AnyResult<CommandOutcome> {
    let program = format!("{:?}", cmd.as_std().get_program());
    let mut child = cmd
        .spawn()
        .with_context(|| format!("spawning {program}"))?;

    // Feed stdin while stdout and stderr are drained.
    let pipe = child.stdin.take();
    let name = program.as_str();
    let feed = async move {
        let (Some(bytes), Some(mut pipe)) = (stdin, pipe) else {
            return;
        };
        if let Err(e) = pipe.write_all(&bytes).await {
            // The child may exit before reading everything.
            debug!(program = %name, error = %e, "stdin closed early");
        }
        // Dropping the pipe closes stdin so the child sees EOF.
    };

    let (_, output) = tokio::join!(feed, child.wait_with_output());
    let output = output.with_context(|| format!("waiting for {program}"))?;

    let mut text = String::from_utf8_lossy(&output.stdout).into_owned();
    text.push_str(&String::from_utf8_lossy(&output.stderr));

    for line in text.lines() {
        debug!(program = %program, "output: {}", line);
    }

    if output.status.success() {
        Ok(CommandOutcome::Succeeded { output: text })
    } else {
        let error = match output.status.code() {
            Some(code) => format!("{program} exited with status {code}"),
            None => format!("{program} was terminated by a signal"),
        };
        Ok(CommandOutcome::Failed {
            output: text,
            error,
        })
    }
}
