// src/cli.rs

//! CLI argument parsing using `clap`.

use std::path::PathBuf;

use clap::{Parser, ValueEnum};

use crate::config::default_config_path;

/// Command-line arguments for `hopdag`.
#[derive(Debug, Clone, Parser)]
#[command(
    name = "hopdag",
    version,
    about = "Run a dependency graph of jobs on remote nodes reached through jump hosts.",
    long_about = None
)]
pub struct CliArgs {
    /// Path to the experiment file (TOML).
    #[arg(long, value_name = "PATH", default_value_os_t = default_config_path())]
    pub config: PathBuf,

    /// Validate, print the execution plan, but don't issue any command.
    #[arg(long)]
    pub dry_run: bool,

    /// Export the job graph (`.png` renders through Graphviz, anything else
    /// is written as DOT).
    #[arg(long, value_name = "PATH")]
    pub export: Option<PathBuf>,

    /// Write the debrief as JSON after the run.
    #[arg(long, value_name = "PATH")]
    pub report: Option<PathBuf>,

    /// Skip the jobs marked `prepare = true`.
    #[arg(long)]
    pub no_prepare: bool,

    /// Run every job on this machine instead of over ssh.
    #[arg(long)]
    pub local: bool,

    /// Logging level (error, warn, info, debug, trace).
    ///
    /// If omitted, `HOPDAG_LOG` or a default level will be used.
    #[arg(long, value_enum, value_name = "LEVEL")]
    pub log_level: Option<LogLevel>,
}

/// Log level as exposed on the CLI.
#[derive(Debug, Copy, Clone, ValueEnum)]
pub enum LogLevel {
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

/// Convenience wrapper around `CliArgs::parse()`.
pub fn parse() -> CliArgs {
    CliArgs::parse()
}
