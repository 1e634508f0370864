// src/lib.rs

pub mod cli;
pub mod config;
pub mod dag;
pub mod engine;
pub mod errors;
pub mod exec;
pub mod logging;
pub mod node;
pub mod orchestrate;
pub mod report;
pub mod transport;
pub mod types;

use std::fs;
use std::sync::Arc;

use anyhow::{Context, Result};
use tracing::{info, warn};

use crate::cli::CliArgs;
use crate::config::ConfigFile;
use crate::config::loader::load_and_validate;
use crate::dag::Graph;
use crate::orchestrate::{compose, orchestrate};
use crate::transport::{LocalTransport, SshTransport, Transport};

pub use crate::dag::{Job, JobState};
pub use crate::errors::{HopdagError, Result as HopdagResult};
pub use crate::exec::Command;
pub use crate::node::Node;

/// High-level entry point used by `main.rs`. Returns the overall result of
/// the run (`true` for a valid dry run).
///
/// This wires together:
/// - config loading and graph building
/// - optional export and dry-run plan
/// - orchestration with the preparation sub-graph
/// - Ctrl-C handling
/// - the verdict, debrief and JSON report
pub async fn run(args: CliArgs) -> Result<bool> {
    let cfg = load_and_validate(&args.config)
        .with_context(|| format!("loading {}", args.config.display()))?;

    if args.dry_run {
        let graph = preview_graph(&cfg, !args.no_prepare)?;
        if let Some(path) = &args.export {
            graph.export(path).await?;
        }
        print!("{}", graph.list());
        print!("{}", graph.plan()?);
        return Ok(true);
    }

    let transport: Arc<dyn Transport> = if args.local {
        Arc::new(LocalTransport::new())
    } else {
        Arc::new(SshTransport::default())
    };

    let experiment = cfg.build()?;
    let mut graph = experiment.graph;
    let prepare = if args.no_prepare {
        None
    } else {
        experiment.prepare
    };

    // Ctrl-C → abort mode.
    {
        let handle = graph.abort_handle();
        tokio::spawn(async move {
            if let Err(e) = tokio::signal::ctrl_c().await {
                warn!(error = %e, "failed to listen for Ctrl+C");
                return;
            }
            info!("Ctrl+C received; aborting run");
            handle.abort();
        });
    }

    let success = orchestrate(&mut graph, prepare, transport).await?;

    if success {
        println!("RUN OK");
    } else {
        println!("RUN KO : {}", graph.why());
    }

    let report = graph.debrief();
    print!("{report}");

    if let Some(path) = &args.report {
        fs::write(path, report.to_json())
            .with_context(|| format!("writing report to {}", path.display()))?;
        info!(path = %path.display(), "report written");
    }

    if let Some(path) = &args.export {
        graph.export(path).await?;
    }

    Ok(success)
}

/// The graph a run would execute, for dry runs.
fn preview_graph(cfg: &ConfigFile, with_prepare: bool) -> Result<Graph> {
    let experiment = cfg.build()?;
    let graph = match experiment.prepare {
        Some(prepare) if with_prepare => compose(experiment.graph, prepare)?,
        _ => experiment.graph,
    };
    Ok(graph)
}
