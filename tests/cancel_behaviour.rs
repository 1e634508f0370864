mod common;
use crate::common::builders::{graph_of, job};
use crate::common::{init_tracing, with_timeout};

use std::error::Error;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};

use hopdag::dag::{AbortReason, JobState};
use hopdag::errors::Result as HopdagResult;
use hopdag::node::Node;
use hopdag::transport::{BoxFuture, CommandOutcome, Session, SessionRef, Transport};
use hopdag::types::Direction;
use hopdag_test_utils::FakeTransport;

type TestResult = Result<(), Box<dyn Error>>;

#[tokio::test]
async fn critical_failure_cancels_running_and_pending_jobs() -> TestResult {
    init_tracing();

    let mut graph = graph_of([
        job("A").build(),
        job("H").best_effort().build(),
        job("P").best_effort().requires("H").build(),
    ]);
    let fake = FakeTransport::new()
        .delay_on("A", Duration::from_millis(30))
        .fail_on("A", "boom")
        .hang_on("H");

    let result = with_timeout(graph.run(Arc::new(fake.clone()), false)).await?;

    assert!(!result.is_success());
    assert_eq!(graph.state_of("A"), Some(JobState::Failed));
    assert_eq!(graph.state_of("H"), Some(JobState::Cancelled));
    assert_eq!(graph.state_of("P"), Some(JobState::Cancelled));

    // The in-flight command future was dropped, i.e. cancellation reached
    // the transport.
    assert_eq!(fake.dropped(), vec!["H"]);
    assert!(!fake.started().contains(&"P".to_string()));

    let summary = graph.summary().expect("summary");
    assert_eq!(summary.abort, Some(AbortReason::CriticalJob("A".into())));
    assert_eq!(summary.culprit.as_ref().map(|c| c.job.as_str()), Some("A"));

    let p_detail = graph.record_of("P").and_then(|r| r.detail.clone()).unwrap_or_default();
    assert!(p_detail.contains("critical job 'A'"), "detail = {p_detail}");
    Ok(())
}

#[tokio::test]
async fn cancelled_job_keeps_output_of_finished_commands() -> TestResult {
    init_tracing();

    let mut graph = graph_of([
        job("A")
            .build()
            .with_command(hopdag::Command::run("A-after")),
        hopdag_test_utils::builders::JobBuilder::new("H")
            .best_effort()
            .run("H-first")
            .run("H-hang")
            .build(),
    ]);
    let fake = FakeTransport::new()
        .delay_on("A-after", Duration::from_millis(30))
        .fail_on("A-after", "late failure")
        .hang_on("H-hang");

    with_timeout(graph.run(Arc::new(fake), false)).await?;

    let record = graph.record_of("H").expect("record");
    assert_eq!(record.state, JobState::Cancelled);
    assert_eq!(record.output, "H-first\n");
    assert_eq!(record.commands_issued, 2);
    Ok(())
}

#[tokio::test]
async fn external_abort_fails_run_when_a_critical_job_is_cancelled() -> TestResult {
    init_tracing();

    let mut graph = graph_of([job("H").build()]);
    let fake = FakeTransport::new().hang_on("H");

    let handle = graph.abort_handle();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(50)).await;
        handle.abort();
    });

    let result = with_timeout(graph.run(Arc::new(fake.clone()), false)).await?;

    assert!(!result.is_success());
    assert_eq!(graph.state_of("H"), Some(JobState::Cancelled));
    assert_eq!(graph.summary().and_then(|s| s.abort.clone()), Some(AbortReason::External));

    let why = graph.why();
    assert!(why.contains("'H'") && why.contains("cancelled"), "why() = {why}");
    Ok(())
}

#[tokio::test]
async fn external_abort_of_best_effort_jobs_keeps_success() -> TestResult {
    init_tracing();

    let mut graph = graph_of([job("E").build(), job("H").best_effort().build()]);
    let fake = FakeTransport::new().hang_on("H");

    let handle = graph.abort_handle();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(50)).await;
        handle.abort();
    });

    let result = with_timeout(graph.run(Arc::new(fake), false)).await?;

    assert!(result.is_success());
    assert_eq!(graph.state_of("E"), Some(JobState::Done));
    assert_eq!(graph.state_of("H"), Some(JobState::Cancelled));
    Ok(())
}

#[tokio::test]
async fn abort_requested_before_run_starts_nothing() -> TestResult {
    init_tracing();

    let mut graph = graph_of([job("A").build(), job("B").requires("A").build()]);
    let fake = FakeTransport::new();

    graph.abort_handle().abort();
    let result = with_timeout(graph.run(Arc::new(fake.clone()), false)).await?;

    assert!(!result.is_success());
    assert!(fake.events().is_empty());
    assert_eq!(graph.state_of("A"), Some(JobState::Cancelled));
    assert_eq!(graph.state_of("B"), Some(JobState::Cancelled));
    Ok(())
}

/// A transport whose commands block the worker thread and therefore never
/// notice cancellation.
#[derive(Debug)]
struct StubbornSession;

impl Session for StubbornSession {
    fn describe(&self) -> String {
        "stubborn".to_string()
    }

    fn run_text<'a>(&'a self, command: &'a str) -> BoxFuture<'a, CommandOutcome> {
        Box::pin(async move {
            if command == "fail" {
                tokio::time::sleep(Duration::from_millis(20)).await;
                return CommandOutcome::failed("", "failed on purpose");
            }
            std::thread::sleep(Duration::from_millis(1500));
            CommandOutcome::succeeded("finally\n")
        })
    }

    fn run_script<'a>(
        &'a self,
        _: &'a Path,
        _: &'a [String],
        _: &'a [PathBuf],
    ) -> BoxFuture<'a, CommandOutcome> {
        Box::pin(async { CommandOutcome::failed("", "unsupported") })
    }

    fn run_string<'a>(&'a self, _: &'a str, _: &'a [String]) -> BoxFuture<'a, CommandOutcome> {
        Box::pin(async { CommandOutcome::failed("", "unsupported") })
    }

    fn transfer<'a>(
        &'a self,
        _: Direction,
        _: &'a str,
        _: &'a Path,
    ) -> BoxFuture<'a, CommandOutcome> {
        Box::pin(async { CommandOutcome::failed("", "unsupported") })
    }
}

struct StubbornTransport;

impl Transport for StubbornTransport {
    fn connect<'a>(
        &'a self,
        _node: &'a Node,
        _via: Option<SessionRef>,
    ) -> BoxFuture<'a, HopdagResult<SessionRef>> {
        Box::pin(async {
            let session: SessionRef = Arc::new(StubbornSession);
            Ok(session)
        })
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn unacknowledged_cancellation_is_forced_after_grace_period() -> TestResult {
    init_tracing();

    let mut graph = graph_of([
        hopdag_test_utils::builders::JobBuilder::new("blocked")
            .best_effort()
            .run("block")
            .build(),
        hopdag_test_utils::builders::JobBuilder::new("trigger")
            .run("fail")
            .build(),
    ]);

    let started = Instant::now();
    let result = with_timeout(graph.run(Arc::new(StubbornTransport), false)).await?;
    let elapsed = started.elapsed();

    assert!(!result.is_success());
    assert!(elapsed < Duration::from_millis(1200), "run took {elapsed:?}");
    assert_eq!(graph.state_of("blocked"), Some(JobState::Cancelled));

    let detail = graph.record_of("blocked").and_then(|r| r.detail.clone()).unwrap_or_default();
    assert!(detail.contains("force-cancelled"), "detail = {detail}");
    Ok(())
}
