// src/config/validate.rs

use std::collections::HashSet;
use std::sync::LazyLock;

use regex::Regex;

use crate::config::model::{CommandSpec, ConfigFile, RawConfigFile};
use crate::errors::{HopdagError, Result};
use crate::types::{GraphOptions, parse_duration};

static ID_PATTERN: LazyLock<Option<Regex>> =
    LazyLock::new(|| Regex::new(r"^[A-Za-z0-9_.-]+$").ok());

impl TryFrom<RawConfigFile> for ConfigFile {
    type Error = HopdagError;

    fn try_from(raw: RawConfigFile) -> std::result::Result<Self, Self::Error> {
        let options = validate_raw_config(&raw)?;
        let config = ConfigFile::new_unchecked(raw, options);
        validate_job_graphs(&config)?;
        Ok(config)
    }
}

fn validate_raw_config(cfg: &RawConfigFile) -> Result<GraphOptions> {
    ensure_has_jobs(cfg)?;
    let options = validate_global_config(cfg)?;
    validate_ids(cfg)?;
    validate_nodes(cfg)?;
    validate_services(cfg)?;
    validate_jobs(cfg)?;
    Ok(options)
}

fn ensure_has_jobs(cfg: &RawConfigFile) -> Result<()> {
    if cfg.job.is_empty() {
        return Err(HopdagError::ConfigError(
            "config must contain at least one [job.<id>] section".to_string(),
        ));
    }
    Ok(())
}

fn validate_global_config(cfg: &RawConfigFile) -> Result<GraphOptions> {
    let grace_period = parse_duration(&cfg.config.grace_period).map_err(|e| {
        HopdagError::ConfigError(format!("[config].grace_period: {e}"))
    })?;

    if cfg.config.output_tail == 0 {
        return Err(HopdagError::ConfigError(
            "[config].output_tail must be >= 1 (got 0)".to_string(),
        ));
    }

    Ok(GraphOptions::default()
        .with_label(cfg.config.label.clone())
        .with_grace_period(grace_period)
        .with_output_tail_lines(cfg.config.output_tail))
}

fn validate_ids(cfg: &RawConfigFile) -> Result<()> {
    let Some(pattern) = ID_PATTERN.as_ref() else {
        return Err(HopdagError::ConfigError(
            "internal error: id pattern failed to compile".to_string(),
        ));
    };

    let ids = cfg
        .node
        .keys()
        .map(|n| ("node", n))
        .chain(cfg.service.keys().map(|s| ("service", s)))
        .chain(cfg.job.keys().map(|j| ("job", j)));
    for (kind, id) in ids {
        if !pattern.is_match(id) {
            return Err(HopdagError::ConfigError(format!(
                "{kind} id '{id}' may only contain letters, digits, '_', '.' and '-'"
            )));
        }
    }
    Ok(())
}

fn validate_nodes(cfg: &RawConfigFile) -> Result<()> {
    for (name, node) in cfg.node.iter() {
        if node.host.trim().is_empty() {
            return Err(HopdagError::ConfigError(format!(
                "node '{name}' has an empty host"
            )));
        }
        if let Some(gw) = &node.gateway {
            if !cfg.node.contains_key(gw) {
                return Err(HopdagError::ConfigError(format!(
                    "node '{name}' has unknown gateway '{gw}'"
                )));
            }
        }
    }

    // Each node has at most one gateway, so following the chain is enough.
    for name in cfg.node.keys() {
        let mut chain = vec![name.as_str()];
        let mut seen: HashSet<&str> = HashSet::from([name.as_str()]);
        let mut current = name.as_str();
        while let Some(gw) = cfg.node.get(current).and_then(|n| n.gateway.as_deref()) {
            chain.push(gw);
            if !seen.insert(gw) {
                return Err(HopdagError::ConfigError(format!(
                    "gateway cycle: {}",
                    chain.join(" -> ")
                )));
            }
            current = gw;
        }
    }

    Ok(())
}

fn validate_services(cfg: &RawConfigFile) -> Result<()> {
    for (id, service) in cfg.service.iter() {
        if service.command.trim().is_empty() {
            return Err(HopdagError::ConfigError(format!(
                "service '{id}' has an empty command"
            )));
        }
    }
    Ok(())
}

fn validate_jobs(cfg: &RawConfigFile) -> Result<()> {
    for (id, job) in cfg.job.iter() {
        if let Some(node) = &job.node {
            if !cfg.node.contains_key(node) {
                return Err(HopdagError::ConfigError(format!(
                    "job '{id}' runs on unknown node '{node}'"
                )));
            }
        }

        if job.commands.is_empty() {
            return Err(HopdagError::ConfigError(format!(
                "job '{id}' must have at least one command"
            )));
        }

        for (n, cmd) in job.commands.iter().enumerate() {
            let problem = match cmd {
                CommandSpec::Wait { wait, .. } => parse_duration(wait).err(),
                CommandSpec::Start { start: service } | CommandSpec::Stop { stop: service }
                    if !cfg.service.contains_key(service) =>
                {
                    Some(format!("unknown service '{service}'"))
                }
                _ => None,
            };
            if let Some(e) = problem {
                return Err(HopdagError::ConfigError(format!(
                    "job '{id}' command {}: {e}",
                    n + 1
                )));
            }
        }

        for dep in job.required.iter() {
            match cfg.job.get(dep) {
                None if cfg.config.sanitize => {}
                None => {
                    return Err(HopdagError::ConfigError(format!(
                        "job '{id}' requires unknown job '{dep}'"
                    )));
                }
                Some(other) if job.prepare && !other.prepare => {
                    return Err(HopdagError::ConfigError(format!(
                        "preparation job '{id}' cannot require experiment job '{dep}'"
                    )));
                }
                Some(_) => {}
            }
        }
    }
    Ok(())
}

/// Build the graphs once so requirement cycles are reported at load time.
fn validate_job_graphs(cfg: &ConfigFile) -> Result<()> {
    let experiment = cfg.build()?;
    experiment.graph.validate()?;
    if let Some(prepare) = &experiment.prepare {
        prepare.validate()?;
    }
    Ok(())
}
