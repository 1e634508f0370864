mod common;
use crate::common::builders::{graph_of, job, JobBuilder};
use crate::common::{init_tracing, with_timeout};

use std::error::Error;
use std::sync::Arc;
use std::time::Duration;

use hopdag::dag::JobState;
use hopdag::engine::RunResult;
use hopdag::errors::HopdagError;
use hopdag_test_utils::{FakeEvent, FakeTransport};

type TestResult = Result<(), Box<dyn Error>>;

#[tokio::test]
async fn job_starts_only_after_all_requirements_are_done() -> TestResult {
    init_tracing();

    // Diamond: A -> {B, C} -> D, with B slower than C.
    let mut graph = graph_of([
        job("A").build(),
        job("B").requires("A").build(),
        job("C").requires("A").build(),
        job("D").requires("B").requires("C").build(),
    ]);
    let fake = FakeTransport::new().delay_on("B", Duration::from_millis(50));

    let result = with_timeout(graph.run(Arc::new(fake.clone()), false)).await?;
    assert_eq!(result, RunResult::Finished { success: true });

    let pos = |e: FakeEvent| fake.position(&e).expect("event missing");
    let a_done = pos(FakeEvent::Finished("A".into()));
    assert!(a_done < pos(FakeEvent::Started("B".into())));
    assert!(a_done < pos(FakeEvent::Started("C".into())));

    let d_start = pos(FakeEvent::Started("D".into()));
    assert!(pos(FakeEvent::Finished("B".into())) < d_start);
    assert!(pos(FakeEvent::Finished("C".into())) < d_start);

    for id in ["A", "B", "C", "D"] {
        assert_eq!(graph.state_of(id), Some(JobState::Done));
    }
    Ok(())
}

#[tokio::test]
async fn independent_jobs_run_concurrently() -> TestResult {
    init_tracing();

    let mut graph = graph_of([job("slow").build(), job("fast").build()]);
    let fake = FakeTransport::new().delay_on("slow", Duration::from_millis(100));

    with_timeout(graph.run(Arc::new(fake.clone()), false)).await?;

    // `fast` must not wait for `slow`.
    let fast_done = fake.position(&FakeEvent::Finished("fast".into())).unwrap();
    let slow_done = fake.position(&FakeEvent::Finished("slow".into())).unwrap();
    assert!(fast_done < slow_done);
    Ok(())
}

#[tokio::test]
async fn cycle_is_rejected_before_any_command() -> TestResult {
    init_tracing();

    let mut graph = graph_of([
        job("A").requires("B").build(),
        job("B").requires("A").build(),
    ]);
    let fake = FakeTransport::new();

    match graph.validate() {
        Err(HopdagError::Cycle(ids)) => {
            assert!(ids.contains(&"A".to_string()));
            assert!(ids.contains(&"B".to_string()));
        }
        other => panic!("expected a cycle error, got {other:?}"),
    }

    let result = graph.run(Arc::new(fake.clone()), false).await;
    assert!(matches!(result, Err(HopdagError::Cycle(_))));
    assert!(fake.events().is_empty());
    Ok(())
}

#[tokio::test]
async fn critical_failure_skips_the_whole_chain() -> TestResult {
    init_tracing();

    let mut graph = graph_of([
        job("A").build(),
        job("B").requires("A").build(),
        job("C").requires("B").build(),
    ]);
    let fake = FakeTransport::new().fail_on("A", "boom");

    let result = with_timeout(graph.run(Arc::new(fake.clone()), false)).await?;
    assert!(!result.is_success());

    assert_eq!(graph.state_of("A"), Some(JobState::Failed));
    assert_eq!(graph.state_of("B"), Some(JobState::Skipped));
    assert_eq!(graph.state_of("C"), Some(JobState::Skipped));
    assert_eq!(fake.started(), vec!["A"]);

    let why = graph.why();
    assert!(why.contains("'A'"), "why() = {why}");
    assert!(why.contains("failed"), "why() = {why}");
    assert!(why.contains("boom"), "why() = {why}");
    Ok(())
}

#[tokio::test]
async fn best_effort_failure_does_not_fail_the_run() -> TestResult {
    init_tracing();

    let mut graph = graph_of([job("A").best_effort().build(), job("E").build()]);
    let fake = FakeTransport::new().fail_on("A", "nope");

    let result = with_timeout(graph.run(Arc::new(fake), false)).await?;

    assert_eq!(result, RunResult::Finished { success: true });
    assert_eq!(graph.state_of("A"), Some(JobState::Failed));
    assert_eq!(graph.state_of("E"), Some(JobState::Done));
    assert_eq!(graph.why(), "all critical jobs succeeded");
    Ok(())
}

#[tokio::test]
async fn skipping_a_critical_job_fails_the_run() -> TestResult {
    init_tracing();

    let mut graph = graph_of([
        job("A").best_effort().build(),
        job("D").requires("A").build(),
    ]);
    let fake = FakeTransport::new().fail_on("A", "nope");

    let result = with_timeout(graph.run(Arc::new(fake.clone()), false)).await?;

    assert!(!result.is_success());
    assert_eq!(graph.state_of("A"), Some(JobState::Failed));
    assert_eq!(graph.state_of("D"), Some(JobState::Skipped));
    assert_eq!(fake.started(), vec!["A"]);

    let why = graph.why();
    assert!(why.contains("'D'"), "why() = {why}");
    assert!(why.contains("skipped"), "why() = {why}");

    // The skip cause names the upstream job.
    let detail = graph.record_of("D").and_then(|r| r.detail.clone()).unwrap_or_default();
    assert!(detail.contains("'A'"), "detail = {detail}");
    Ok(())
}

#[tokio::test]
async fn best_effort_skip_cascade_keeps_the_run_alive() -> TestResult {
    init_tracing();

    let mut graph = graph_of([
        job("A").best_effort().build(),
        job("B").best_effort().requires("A").build(),
        job("C").best_effort().requires("B").build(),
        job("E").build(),
    ]);
    let fake = FakeTransport::new().fail_on("A", "nope");

    let result = with_timeout(graph.run(Arc::new(fake), false)).await?;

    assert!(result.is_success());
    assert_eq!(graph.state_of("B"), Some(JobState::Skipped));
    assert_eq!(graph.state_of("C"), Some(JobState::Skipped));
    assert_eq!(graph.state_of("E"), Some(JobState::Done));
    Ok(())
}

#[tokio::test]
async fn commands_in_a_job_stop_at_the_first_failure() -> TestResult {
    init_tracing();

    let mut graph = graph_of([JobBuilder::new("seq")
        .run("one")
        .run("two")
        .run("three")
        .build()]);
    let fake = FakeTransport::new().fail_on("two", "exit 3");

    with_timeout(graph.run(Arc::new(fake.clone()), false)).await?;

    assert_eq!(graph.state_of("seq"), Some(JobState::Failed));
    assert_eq!(fake.started(), vec!["one", "two"]);

    let record = graph.record_of("seq").expect("record");
    assert_eq!(record.commands_issued, 2);
    assert_eq!(record.output, "one\ntwo\n");
    let detail = record.detail.clone().unwrap_or_default();
    assert!(detail.contains("command 2"), "detail = {detail}");
    assert!(detail.contains("exit 3"), "detail = {detail}");
    Ok(())
}

#[tokio::test]
async fn dry_run_issues_no_command() -> TestResult {
    init_tracing();

    let mut graph = graph_of([
        job("A").build(),
        job("B").requires("A").build(),
        job("C").build(),
    ]);
    let fake = FakeTransport::new();

    let result = graph.run(Arc::new(fake.clone()), true).await?;

    let RunResult::DryRun(plan) = result else {
        panic!("expected a dry-run result");
    };
    assert_eq!(plan.waves, vec![vec!["A".to_string(), "C".to_string()], vec!["B".to_string()]]);
    assert!(fake.events().is_empty());
    for id in ["A", "B", "C"] {
        assert_eq!(graph.state_of(id), Some(JobState::Pending));
    }

    // A dry run does not use up the graph.
    let real = with_timeout(graph.run(Arc::new(fake.clone()), false)).await?;
    assert!(real.is_success());
    Ok(())
}

#[tokio::test]
async fn a_graph_runs_at_most_once() -> TestResult {
    init_tracing();

    let mut graph = graph_of([job("A").build()]);
    let fake = Arc::new(FakeTransport::new());

    with_timeout(graph.run(fake.clone(), false)).await?;
    let second = graph.run(fake, false).await;

    assert!(matches!(second, Err(HopdagError::ConfigError(_))));
    Ok(())
}

#[tokio::test]
async fn unreachable_node_fails_the_job() -> TestResult {
    init_tracing();

    let mut graph = graph_of([job("A").best_effort().build(), job("B").build()]);
    let fake = FakeTransport::new().unreachable("node1");

    let result = with_timeout(graph.run(Arc::new(fake.clone()), false)).await?;

    assert!(!result.is_success());
    assert_eq!(graph.state_of("A"), Some(JobState::Failed));
    assert!(fake.started().is_empty());

    let record = graph.record_of("B").expect("record");
    assert_eq!(record.commands_issued, 1);
    assert!(record.detail.as_deref().unwrap_or_default().contains("unreachable"));
    Ok(())
}

#[tokio::test]
async fn wait_only_jobs_never_connect() -> TestResult {
    init_tracing();

    let mut graph = graph_of([JobBuilder::new("pause")
        .command(hopdag::Command::wait(Duration::from_millis(10)))
        .command(hopdag::Command::print("settled"))
        .build()]);
    let fake = FakeTransport::new();

    let result = with_timeout(graph.run(Arc::new(fake.clone()), false)).await?;

    assert!(result.is_success());
    assert!(fake.connections().is_empty());
    assert_eq!(graph.record_of("pause").map(|r| r.output.as_str()), Some("settled\n"));
    Ok(())
}

#[tokio::test]
async fn duplicate_ids_are_rejected() {
    let mut graph = graph_of([job("A").build()]);
    let err = graph.add(job("A").build()).unwrap_err();
    assert!(matches!(err, HopdagError::DuplicateId(id) if id == "A"));
}

#[tokio::test]
async fn unknown_requirement_fails_validation_until_sanitized() -> TestResult {
    init_tracing();

    let mut graph = graph_of([job("A").requires("ghost").build(), job("B").build()]);

    assert!(matches!(graph.validate(), Err(HopdagError::ConfigError(_))));

    assert_eq!(graph.sanitize(), 1);
    assert!(graph.job("A").unwrap().required().is_empty());
    assert_eq!(graph.sanitize(), 0);
    graph.validate()?;

    let result = with_timeout(graph.run(Arc::new(FakeTransport::new()), false)).await?;
    assert!(result.is_success());
    Ok(())
}
