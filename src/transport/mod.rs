// src/transport/mod.rs

//! Remote transport boundary.
//!
//! The orchestrator never speaks a wire protocol itself. It consumes a
//! [`Transport`] that turns a [`Node`] into a [`Session`], and a session
//! that can run text, run a script (from a file or from memory), or move a
//! file.
//!
//! - [`local`] runs everything on this machine (`sh -c`, file copies).
//! - [`ssh`] delegates to the OpenSSH client binaries, using `-J` jump
//!   chains built from resolved gateway sessions.
//!
//! All operations return boxed futures. Dropping one of these futures is the
//! cancellation request: adapters spawn child processes with
//! `kill_on_drop(true)` so an abandoned command takes its process with it.

use std::fmt::Debug;
use std::future::Future;
use std::path::{Path, PathBuf};
use std::pin::Pin;
use std::sync::Arc;

use serde::Serialize;

use crate::errors::Result;
use crate::node::Node;
use crate::types::Direction;

pub mod local;
pub mod ssh;

pub use local::{LocalSession, LocalTransport};
pub use ssh::{SshOptions, SshSession, SshTransport};

/// Boxed, sendable future as returned by transport operations.
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Shared handle to an established session.
pub type SessionRef = Arc<dyn Session>;

/// Result of executing one command.
///
/// Transport errors (connection drops, authentication failures, missing
/// binaries) are reported as `Failed` too: the orchestrator does not tell them
/// apart from a remote command exiting non-zero.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "lowercase")]
pub enum CommandOutcome {
    Succeeded { output: String },
    Failed { output: String, error: String },
}

impl CommandOutcome {
    pub fn succeeded(output: impl Into<String>) -> Self {
        CommandOutcome::Succeeded {
            output: output.into(),
        }
    }

    pub fn failed(output: impl Into<String>, error: impl Into<String>) -> Self {
        CommandOutcome::Failed {
            output: output.into(),
            error: error.into(),
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, CommandOutcome::Succeeded { .. })
    }

    pub fn output(&self) -> &str {
        match self {
            CommandOutcome::Succeeded { output } | CommandOutcome::Failed { output, .. } => output,
        }
    }

    pub fn error(&self) -> Option<&str> {
        match self {
            CommandOutcome::Succeeded { .. } => None,
            CommandOutcome::Failed { error, .. } => Some(error),
        }
    }
}

/// A usable connection to one node.
///
/// Implementations must tolerate concurrent calls: several jobs may share the
/// same node and therefore the same pooled session.
pub trait Session: Send + Sync + Debug {
    /// Human-readable destination, e.g. `root@fit01 (via faraday)`.
    fn describe(&self) -> String;

    /// Jump hosts needed to reach this endpoint, ending with the endpoint
    /// itself. Empty for sessions that cannot serve as a gateway.
    fn hops(&self) -> Vec<String> {
        Vec::new()
    }

    /// Run a shell command line on the node.
    fn run_text<'a>(&'a self, command: &'a str) -> BoxFuture<'a, CommandOutcome>;

    /// Run a local script file on the node with the given arguments.
    ///
    /// `includes` are local files shipped next to the script first; the
    /// script then runs from the directory holding them.
    fn run_script<'a>(
        &'a self,
        path: &'a Path,
        args: &'a [String],
        includes: &'a [PathBuf],
    ) -> BoxFuture<'a, CommandOutcome>;

    /// Run an in-memory script body on the node.
    fn run_string<'a>(&'a self, body: &'a str, args: &'a [String]) -> BoxFuture<'a, CommandOutcome>;

    /// Copy a file between the node and the local machine.
    fn transfer<'a>(
        &'a self,
        direction: Direction,
        remote: &'a str,
        local: &'a Path,
    ) -> BoxFuture<'a, CommandOutcome>;
}

/// Session factory.
///
/// `via` carries the already-resolved session of the node's gateway, if the
/// node has one; see [`Node::resolve`] for the recursion.
pub trait Transport: Send + Sync {
    fn connect<'a>(
        &'a self,
        node: &'a Node,
        via: Option<SessionRef>,
    ) -> BoxFuture<'a, Result<SessionRef>>;
}
