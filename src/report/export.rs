// src/report/export.rs

//! Graphviz export of the job graph.

use std::fs;
use std::path::Path;

use tokio::process::Command;
use tracing::{info, warn};

use crate::dag::{Graph, JobState};
use crate::errors::Result;

const FONT_NAME: &str = "Helvetica, Arial, sans-serif";
const COLOR_CRITICAL: &str = "#b91c1c";
const COLOR_BEST_EFFORT: &str = "#475569";

fn fill_color(state: JobState) -> &'static str {
    match state {
        JobState::Pending | JobState::Ready => "#F8FAFC",
        JobState::Running => "#EFF6FF",
        JobState::Done => "#ECFDF5",
        JobState::Failed => "#FFF1F2",
        JobState::Skipped => "#FFFBEB",
        JobState::Cancelled => "#E2E8F0",
    }
}

fn escape(s: &str) -> String {
    s.replace('\\', "\\\\").replace('"', "\\\"")
}

/// Render the graph as Graphviz DOT.
///
/// Deterministic for a given graph: jobs and edges follow declaration
/// order. Before a run every job is drawn unfilled; afterwards the fill
/// colour reflects each job's final state.
pub fn to_dot(graph: &Graph) -> String {
    let ran = graph.summary().is_some();

    let mut dot = String::new();
    dot.push_str(&format!("digraph \"{}\" {{\n", escape(graph.label())));
    dot.push_str("    rankdir=\"TB\";\n");
    dot.push_str(&format!("    node [fontname=\"{FONT_NAME}\", shape=\"box\", style=\"rounded\"];\n"));
    dot.push_str("    edge [color=\"#000000\", arrowsize=\"0.7\"];\n\n");

    for job in graph.jobs() {
        let tooltip = job
            .commands()
            .iter()
            .map(|c| c.label())
            .collect::<Vec<_>>()
            .join("\\n");

        let mut styles = vec!["rounded"];
        let mut attrs = Vec::new();
        if job.is_critical() {
            styles.push("bold");
            attrs.push(format!("color=\"{COLOR_CRITICAL}\""));
            attrs.push("penwidth=\"2\"".to_string());
        } else {
            styles.push("dashed");
            attrs.push(format!("color=\"{COLOR_BEST_EFFORT}\""));
        }
        if ran {
            let state = graph.state_of(job.id()).unwrap_or(JobState::Pending);
            styles.push("filled");
            attrs.push(format!("fillcolor=\"{}\"", fill_color(state)));
        }

        let label = if ran {
            format!(
                "{}\\n[{}]",
                escape(job.label()),
                graph.state_of(job.id()).unwrap_or(JobState::Pending)
            )
        } else {
            escape(job.label())
        };

        dot.push_str(&format!(
            "    \"{}\" [label=\"{}\", tooltip=\"{}\", style=\"{}\", {}];\n",
            escape(job.id()),
            label,
            escape(&tooltip),
            styles.join(","),
            attrs.join(", ")
        ));
    }

    dot.push('\n');
    for job in graph.jobs() {
        for dep in job.required() {
            dot.push_str(&format!(
                "    \"{}\" -> \"{}\";\n",
                escape(dep),
                escape(job.id())
            ));
        }
    }

    dot.push_str("}\n");
    dot
}

/// Write the DOT rendering of `graph` to `path`.
pub fn export_dot(graph: &Graph, path: &Path) -> Result<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() && !parent.exists() {
            fs::create_dir_all(parent)?;
        }
    }
    fs::write(path, to_dot(graph))?;
    info!(path = %path.display(), "graph exported as dot");
    Ok(())
}

/// Write `path` with extension `.dot` next to `path`, then render it to
/// `path` with the Graphviz `dot` binary.
///
/// Returns `false` (after logging) if anything goes wrong; rendering never
/// fails the caller.
pub async fn export_png(graph: &Graph, path: &Path) -> bool {
    let dot_path = path.with_extension("dot");
    if let Err(e) = export_dot(graph, &dot_path) {
        warn!(path = %dot_path.display(), error = %e, "could not write dot file");
        return false;
    }

    let status = Command::new("dot")
        .arg("-Tpng")
        .arg(&dot_path)
        .arg("-o")
        .arg(path)
        .kill_on_drop(true)
        .status()
        .await;

    match status {
        Ok(status) if status.success() => {
            info!(path = %path.display(), "graph rendered");
            true
        }
        Ok(status) => {
            warn!(path = %path.display(), %status, "graphviz exited with error");
            false
        }
        Err(e) => {
            warn!(error = %e, "failed to execute 'dot'; is Graphviz installed?");
            false
        }
    }
}

/// Export by file extension: `.png` renders through Graphviz, anything else
/// is written as DOT text.
pub async fn export_graph(graph: &Graph, path: &Path) -> Result<bool> {
    match path.extension().and_then(|e| e.to_str()) {
        Some("png") => Ok(export_png(graph, path).await),
        _ => export_dot(graph, path).map(|()| true),
    }
}
