// src/orchestrate.rs

//! Composition of a preparation sub-graph in front of an experiment graph.

use std::collections::HashSet;
use std::sync::Arc;

use tracing::{debug, info};

use crate::dag::Graph;
use crate::errors::{HopdagError, Result};
use crate::transport::Transport;
use crate::types::JobId;

/// Prepend `prepare` to `main`.
///
/// Every terminal job of `prepare` (one no other preparation job requires)
/// becomes a requirement of every entry job of `main` (one with no
/// requirements). The result keeps `main`'s options and abort handle; job
/// ids must be unique across both graphs.
pub fn compose(main: Graph, prepare: Graph) -> Result<Graph> {
    check_composable(&main, &prepare)?;

    let required_in_prepare: HashSet<&str> = prepare
        .jobs()
        .flat_map(|j| j.required().iter().map(String::as_str))
        .collect();
    let terminals: Vec<JobId> = prepare
        .jobs()
        .map(|j| j.id())
        .filter(|id| !required_in_prepare.contains(id))
        .map(str::to_string)
        .collect();
    let entries: Vec<JobId> = main
        .jobs()
        .filter(|j| j.required().is_empty())
        .map(|j| j.id().to_string())
        .collect();

    debug!(?terminals, ?entries, "wiring preparation into experiment");

    let mut combined = Graph::with_options(main.options().clone());
    combined.set_abort_handle(main.abort_handle());

    for job in prepare.into_jobs() {
        combined.add(job)?;
    }
    for job in main.into_jobs() {
        combined.add(job)?;
    }
    for entry in &entries {
        if let Some(job) = combined.job_mut(entry) {
            for terminal in &terminals {
                job.add_requirement(terminal.clone());
            }
        }
    }

    Ok(combined)
}

/// Everything that can make [`compose`] fail, checked without consuming
/// either graph.
fn check_composable(main: &Graph, prepare: &Graph) -> Result<()> {
    if main.summary().is_some() || prepare.summary().is_some() {
        return Err(HopdagError::ConfigError(
            "cannot compose a graph that has already run".to_string(),
        ));
    }
    if let Some(clash) = prepare.jobs().find(|j| main.contains(j.id())) {
        return Err(HopdagError::DuplicateId(clash.id().to_string()));
    }
    Ok(())
}

/// Run `graph`, preceded by the optional preparation sub-graph.
///
/// On return `graph` holds the graph that actually ran (composed with the
/// preparation jobs when given), so `why()` and `debrief()` cover both. If
/// the graphs cannot be composed, `graph` is left untouched.
pub async fn orchestrate(
    graph: &mut Graph,
    prepare: Option<Graph>,
    transport: Arc<dyn Transport>,
) -> Result<bool> {
    if let Some(prepare) = prepare.filter(|p| !p.is_empty()) {
        info!(prepare_jobs = prepare.len(), "prepending preparation jobs");
        check_composable(graph, &prepare)?;
        let main = std::mem::take(graph);
        *graph = compose(main, prepare)?;
    }

    let result = graph.run(transport, false).await?;
    Ok(result.is_success())
}
