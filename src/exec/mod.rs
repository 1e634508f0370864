// src/exec/mod.rs

//! Command execution layer.
//!
//! - [`command`] defines the closed set of [`Command`] variants and how each
//!   one runs against a transport session.
//! - [`service`] turns a daemon description into start/stop commands.
//! - [`job_runner`] runs one job as a Tokio task, races it against its
//!   cancellation channel, and reports back to the runtime via
//!   `RuntimeEvent`s.

pub mod command;
pub mod job_runner;
pub mod service;

pub use command::Command;
pub use job_runner::run_job;
pub use service::Service;
