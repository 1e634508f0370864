// src/config/mod.rs

//! Experiment files.
//!
//! Responsibilities:
//! - Define the TOML-backed data model (`model.rs`).
//! - Load a file from disk (`loader.rs`).
//! - Validate node, gateway and job references (`validate.rs`).
//! - Build runnable graphs from a validated file (`build.rs`).

pub mod build;
pub mod loader;
pub mod model;
pub mod validate;

pub use build::Experiment;
pub use loader::{default_config_path, load_and_validate, load_from_path};
pub use model::{
    CommandSpec, ConfigFile, ConfigSection, JobConfig, NodeConfig, RawConfigFile, ServiceConfig,
};
