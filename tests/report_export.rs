mod common;
use crate::common::builders::{fast_options, graph_of, job, JobBuilder};
use crate::common::{init_tracing, with_timeout};

use std::error::Error;
use std::fs;
use std::sync::Arc;
use std::time::Duration;

use hopdag::dag::{Graph, JobState};
use hopdag_test_utils::FakeTransport;

type TestResult = Result<(), Box<dyn Error>>;

fn sample() -> Graph {
    graph_of([
        job("A").label("first step").build(),
        job("B").best_effort().requires("A").build(),
        job("C").requires("A").build(),
    ])
}

#[test]
fn dot_marks_critical_jobs_and_edges() {
    let dot = sample().to_dot();

    assert!(dot.starts_with("digraph \"test\" {"));
    assert!(dot.contains("\"A\" [label=\"first step\""));
    assert!(dot.contains("\"A\" -> \"B\";"));
    assert!(dot.contains("\"A\" -> \"C\";"));

    let line_of = |id: &str| {
        dot.lines()
            .find(|l| l.trim_start().starts_with(&format!("\"{id}\" [")))
            .unwrap_or_default()
            .to_string()
    };
    assert!(line_of("A").contains("bold"));
    assert!(line_of("B").contains("dashed"));
    assert!(!line_of("A").contains("fillcolor"));

    // Deterministic for the same graph.
    assert_eq!(dot, sample().to_dot());
}

#[tokio::test]
async fn dot_after_a_run_shows_final_states() -> TestResult {
    init_tracing();
    let mut graph = sample();
    let fake = FakeTransport::new().fail_on("B", "nope");

    with_timeout(graph.run(Arc::new(fake), false)).await?;
    let dot = graph.to_dot();

    assert!(dot.contains("fillcolor"));
    assert!(dot.contains("[failed]"));
    assert!(dot.contains("[done]"));
    Ok(())
}

#[tokio::test]
async fn export_writes_dot_files() -> TestResult {
    let dir = tempfile::tempdir()?;
    let path = dir.path().join("nested").join("graph.dot");

    let rendered = sample().export(&path).await?;

    assert!(rendered);
    assert_eq!(fs::read_to_string(&path)?, sample().to_dot());
    Ok(())
}

#[tokio::test]
async fn png_export_failure_is_not_an_error() -> TestResult {
    init_tracing();
    let dir = tempfile::tempdir()?;
    let path = dir.path().join("graph.png");

    // Whether or not Graphviz is installed, this never errors, and the
    // DOT source is always left next to the image.
    let _rendered = sample().export(&path).await?;
    assert!(dir.path().join("graph.dot").exists());
    Ok(())
}

#[tokio::test]
async fn debrief_orders_by_dispatch_and_keeps_causes() -> TestResult {
    init_tracing();
    let mut graph = graph_of([
        job("late").requires("early").best_effort().build(),
        job("early").build(),
        job("broken").best_effort().build(),
        job("after_broken").best_effort().requires("broken").build(),
    ]);
    let fake = FakeTransport::new()
        .fail_on("broken", "exit 1")
        .delay_on("early", Duration::from_millis(20));

    with_timeout(graph.run(Arc::new(fake), false)).await?;
    let report = graph.debrief();

    assert_eq!(report.success, Some(true));
    assert!(report.why.is_none());

    let ids: Vec<&str> = report.jobs.iter().map(|j| j.id.as_str()).collect();
    assert_eq!(ids, vec!["early", "broken", "late", "after_broken"]);

    let broken = report.job("broken").expect("broken");
    assert_eq!(broken.state, JobState::Failed);
    assert!(broken.detail.as_deref().unwrap_or_default().contains("exit 1"));

    let skipped = report.job("after_broken").expect("after_broken");
    assert_eq!(skipped.state, JobState::Skipped);
    assert_eq!(skipped.dispatch_seq, None);
    assert!(skipped.detail.as_deref().unwrap_or_default().contains("'broken'"));

    let late = report.job("late").expect("late");
    assert!(late.started_at.is_some() && late.finished_at.is_some());
    Ok(())
}

#[tokio::test]
async fn debrief_truncates_output_to_the_tail() -> TestResult {
    init_tracing();
    let mut builder = JobBuilder::new("chatty");
    for n in 0..10 {
        builder = builder.run(&format!("line{n}"));
    }
    let mut graph = Graph::with_options(fast_options().with_output_tail_lines(3));
    graph.add(builder.build())?;

    with_timeout(graph.run(Arc::new(FakeTransport::new()), false)).await?;
    let report = graph.debrief();

    assert_eq!(report.jobs[0].output_tail, vec!["line7", "line8", "line9"]);
    Ok(())
}

#[tokio::test]
async fn failed_debrief_serializes_with_why() -> TestResult {
    init_tracing();
    let mut graph = graph_of([job("A").build()]);
    let fake = FakeTransport::new().fail_on("A", "boom");

    with_timeout(graph.run(Arc::new(fake), false)).await?;
    let report = graph.debrief();

    let json: serde_json::Value = serde_json::from_str(&report.to_json())?;
    assert_eq!(json["success"], false);
    assert_eq!(json["jobs"][0]["state"], "failed");
    assert!(json["why"].as_str().unwrap_or_default().contains("'A'"));

    let text = report.to_string();
    assert!(text.contains("KO"));
    assert!(text.contains("boom"));
    Ok(())
}

#[test]
fn debrief_before_a_run_shows_pending_jobs() {
    let report = sample().debrief();

    assert_eq!(report.success, None);
    assert!(report.jobs.iter().all(|j| j.state == JobState::Pending));
    assert_eq!(report.jobs.len(), 3);
}
