// src/errors.rs

//! Crate-wide error type and result alias.

use thiserror::Error;

use crate::types::JobId;

#[derive(Error, Debug)]
pub enum HopdagError {
    /// Bad node/gateway setup, unknown references, invalid experiment file.
    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Duplicate job id: {0}")]
    DuplicateId(JobId),

    /// Job ids along the first cycle found, in traversal order.
    #[error("Cycle detected in job graph: {}", format_cycle(.0))]
    Cycle(Vec<JobId>),

    /// Session establishment failed (direct or through a gateway).
    #[error("Connection error: {0}")]
    Connection(String),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("TOML parsing error: {0}")]
    TomlError(#[from] toml::de::Error),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

fn format_cycle(ids: &[JobId]) -> String {
    match ids.first() {
        Some(first) => format!("{} -> {}", ids.join(" -> "), first),
        None => "<empty>".to_string(),
    }
}

pub type Result<T> = std::result::Result<T, HopdagError>;
