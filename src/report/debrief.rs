// src/report/debrief.rs

//! Post-run debrief.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::warn;

use crate::dag::{Graph, JobRecord, JobState};

/// Outcome of one job, as shown in the debrief.
#[derive(Debug, Clone, Serialize)]
pub struct JobReport {
    pub id: String,
    pub label: String,
    pub node: String,
    pub critical: bool,
    pub state: JobState,
    pub dispatch_seq: Option<u64>,
    pub started_at: Option<DateTime<Utc>>,
    pub finished_at: Option<DateTime<Utc>>,
    pub commands_issued: usize,
    /// Last lines of the captured output.
    pub output_tail: Vec<String>,
    /// Failure detail, or why the job was skipped or cancelled.
    pub detail: Option<String>,
}

/// Structured report of a run: every job's final state and output, plus a
/// one-line explanation when the run failed.
#[derive(Debug, Clone, Serialize)]
pub struct ExecutionReport {
    pub label: String,
    /// `None` if the graph has not run.
    pub success: Option<bool>,
    pub why: Option<String>,
    /// Ordered by dispatch; jobs never dispatched come last in
    /// declaration order.
    pub jobs: Vec<JobReport>,
}

impl ExecutionReport {
    pub fn from_graph(graph: &Graph) -> Self {
        let tail = graph.options().output_tail_lines;
        let summary = graph.summary();

        let mut jobs: Vec<JobReport> = graph
            .jobs()
            .map(|job| {
                let record = match graph.record_of(job.id()) {
                    Some(r) => r.clone(),
                    None => {
                        if summary.is_some() {
                            warn!(job = %job.id(), "no record for job; reporting it as pending");
                        }
                        JobRecord::default()
                    }
                };
                JobReport {
                    id: job.id().to_string(),
                    label: job.label().to_string(),
                    node: job.node().to_string(),
                    critical: job.is_critical(),
                    state: record.state,
                    dispatch_seq: record.dispatch_seq,
                    started_at: record.started_at,
                    finished_at: record.finished_at,
                    commands_issued: record.commands_issued,
                    output_tail: tail_lines(&record.output, tail),
                    detail: record.detail,
                }
            })
            .collect();

        // Stable sort keeps declaration order among undispatched jobs.
        jobs.sort_by_key(|j| j.dispatch_seq.unwrap_or(u64::MAX));

        let success = summary.map(|s| s.success);
        let why = match success {
            Some(false) => Some(graph.why()),
            _ => None,
        };

        Self {
            label: graph.label().to_string(),
            success,
            why,
            jobs,
        }
    }

    pub fn job(&self, id: &str) -> Option<&JobReport> {
        self.jobs.iter().find(|j| j.id == id)
    }

    /// Pretty-printed JSON. Falls back to an error object rather than
    /// failing.
    pub fn to_json(&self) -> String {
        match serde_json::to_string_pretty(self) {
            Ok(json) => json,
            Err(e) => {
                warn!(error = %e, "could not serialize report");
                serde_json::json!({ "label": self.label, "error": e.to_string() }).to_string()
            }
        }
    }
}

fn tail_lines(output: &str, max: usize) -> Vec<String> {
    let lines: Vec<&str> = output.lines().collect();
    let skip = lines.len().saturating_sub(max);
    lines[skip..].iter().map(|l| l.to_string()).collect()
}

impl fmt::Display for ExecutionReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let verdict = match self.success {
            None => "not run",
            Some(true) => "OK",
            Some(false) => "KO",
        };
        writeln!(f, "debrief for {} : {verdict}", self.label)?;
        if let Some(why) = &self.why {
            writeln!(f, "  why: {why}")?;
        }
        for job in &self.jobs {
            let marker = if job.critical { "*" } else { " " };
            let elapsed = match (job.started_at, job.finished_at) {
                (Some(s), Some(e)) => format!(" in {}ms", (e - s).num_milliseconds()),
                _ => String::new(),
            };
            writeln!(
                f,
                "{marker} {:<10} {} ({}) on {}{elapsed}",
                job.state, job.id, job.label, job.node
            )?;
            if let Some(detail) = &job.detail {
                writeln!(f, "      -> {detail}")?;
            }
            for line in &job.output_tail {
                writeln!(f, "      | {line}")?;
            }
        }
        Ok(())
    }
}
