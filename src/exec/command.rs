// src/exec/command.rs

//! The closed set of remote actions a job can perform.

use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

use tracing::info;

use crate::transport::{CommandOutcome, Session};
use crate::types::Direction;

/// One atomic unit of remote work.
///
/// Commands carry no dependency information: their order inside a job is the
/// only ordering they are subject to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// A shell command line run on the node.
    RunText { command: String },
    /// A local script shipped to the node and run there with `args`.
    /// `includes` are extra local files the script expects next to it.
    RunScript {
        path: PathBuf,
        args: Vec<String>,
        includes: Vec<PathBuf>,
    },
    /// A script body held in memory, run on the node with `args`.
    RunString {
        body: String,
        args: Vec<String>,
        label: Option<String>,
    },
    /// A file copy between the node and the local machine.
    Transfer {
        direction: Direction,
        remote: String,
        local: PathBuf,
    },
    /// A fixed local suspension; always succeeds.
    Wait {
        duration: Duration,
        message: Option<String>,
    },
}

impl Command {
    pub fn run(command: impl Into<String>) -> Self {
        Command::RunText {
            command: command.into(),
        }
    }

    pub fn script<I, S>(path: impl Into<PathBuf>, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Command::RunScript {
            path: path.into(),
            args: args.into_iter().map(Into::into).collect(),
            includes: Vec::new(),
        }
    }

    pub fn inline<I, S>(body: impl Into<String>, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Command::RunString {
            body: body.into(),
            args: args.into_iter().map(Into::into).collect(),
            label: None,
        }
    }

    pub fn pull(remote: impl Into<String>, local: impl Into<PathBuf>) -> Self {
        Command::Transfer {
            direction: Direction::Pull,
            remote: remote.into(),
            local: local.into(),
        }
    }

    pub fn push(local: impl Into<PathBuf>, remote: impl Into<String>) -> Self {
        Command::Transfer {
            direction: Direction::Push,
            remote: remote.into(),
            local: local.into(),
        }
    }

    pub fn wait(duration: Duration) -> Self {
        Command::Wait {
            duration,
            message: None,
        }
    }

    /// Emit `message` and continue immediately.
    pub fn print(message: impl Into<String>) -> Self {
        Command::Wait {
            duration: Duration::ZERO,
            message: Some(message.into()),
        }
    }

    /// Attach a message to a `Wait`; other variants are returned unchanged.
    pub fn with_message(self, msg: impl Into<String>) -> Self {
        match self {
            Command::Wait { duration, .. } => Command::Wait {
                duration,
                message: Some(msg.into()),
            },
            other => other,
        }
    }

    /// Ship `files` along with a `RunScript`; other variants are returned
    /// unchanged.
    pub fn with_includes<I, P>(self, files: I) -> Self
    where
        I: IntoIterator<Item = P>,
        P: Into<PathBuf>,
    {
        match self {
            Command::RunScript {
                path,
                args,
                mut includes,
            } => {
                includes.extend(files.into_iter().map(Into::into));
                Command::RunScript {
                    path,
                    args,
                    includes,
                }
            }
            other => other,
        }
    }

    /// Name a `RunString` in logs and reports; other variants are returned
    /// unchanged.
    pub fn with_label(self, name: impl Into<String>) -> Self {
        match self {
            Command::RunString { body, args, .. } => Command::RunString {
                body,
                args,
                label: Some(name.into()),
            },
            other => other,
        }
    }

    /// Whether executing this command needs a session on the job's node.
    pub fn needs_session(&self) -> bool {
        !matches!(self, Command::Wait { .. })
    }

    /// Short description for logs, listings and reports.
    pub fn label(&self) -> String {
        match self {
            Command::RunText { command } => format!("run `{command}`"),
            Command::RunScript { path, args, .. } if args.is_empty() => {
                format!("script {}", path.display())
            }
            Command::RunScript { path, args, .. } => {
                format!("script {} {}", path.display(), args.join(" "))
            }
            Command::RunString {
                label: Some(label), ..
            } => format!("inline {label}"),
            Command::RunString { body, .. } => {
                format!("inline script ({} lines)", body.lines().count())
            }
            Command::Transfer {
                direction: Direction::Pull,
                remote,
                local,
            } => format!("pull {remote} -> {}", local.display()),
            Command::Transfer {
                direction: Direction::Push,
                remote,
                local,
            } => format!("push {} -> {remote}", local.display()),
            Command::Wait {
                duration,
                message: Some(msg),
            } if duration.is_zero() => format!("print \"{msg}\""),
            Command::Wait { duration, message } => match message {
                Some(msg) => format!("wait {duration:?} ({msg})"),
                None => format!("wait {duration:?}"),
            },
        }
    }

    /// Execute on `session`. `Wait` never touches the session, so it may be
    /// `None` for jobs that only wait.
    pub async fn execute(&self, session: Option<&dyn Session>) -> CommandOutcome {
        match (self, session) {
            (Command::Wait { duration, message }, _) => {
                if let Some(msg) = message {
                    info!("{}", msg);
                }
                if !duration.is_zero() {
                    tokio::time::sleep(*duration).await;
                }
                let mut output = message.clone().unwrap_or_default();
                if !output.is_empty() {
                    output.push('\n');
                }
                CommandOutcome::succeeded(output)
            }
            (Command::RunText { command }, Some(session)) => session.run_text(command).await,
            (
                Command::RunScript {
                    path,
                    args,
                    includes,
                },
                Some(session),
            ) => session.run_script(path, args, includes).await,
            (Command::RunString { body, args, .. }, Some(session)) => {
                session.run_string(body, args).await
            }
            (
                Command::Transfer {
                    direction,
                    remote,
                    local,
                },
                Some(session),
            ) => session.transfer(*direction, remote, local).await,
            (cmd, None) => CommandOutcome::failed(
                String::new(),
                format!("no session available for {}", cmd.label()),
            ),
        }
    }
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.label())
    }
}
