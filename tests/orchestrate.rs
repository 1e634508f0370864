mod common;
use crate::common::builders::{graph_of, job};
use crate::common::{init_tracing, with_timeout};

use std::error::Error;
use std::sync::Arc;

use hopdag::dag::JobState;
use hopdag::errors::HopdagError;
use hopdag::orchestrate::{compose, orchestrate};
use hopdag_test_utils::{FakeEvent, FakeTransport};

type TestResult = Result<(), Box<dyn Error>>;

#[test]
fn compose_wires_prepare_terminals_to_entry_jobs() -> TestResult {
    let prepare = graph_of([
        job("lease").build(),
        job("load").requires("lease").build(),
        job("wifi").requires("lease").build(),
    ]);
    let main = graph_of([job("run").build(), job("collect").requires("run").build()]);

    let combined = compose(main, prepare)?;

    assert_eq!(
        combined.jobs().map(|j| j.id()).collect::<Vec<_>>(),
        vec!["lease", "load", "wifi", "run", "collect"]
    );
    assert_eq!(combined.job("run").unwrap().required(), ["load", "wifi"]);
    assert_eq!(combined.job("collect").unwrap().required(), ["run"]);
    assert_eq!(combined.label(), "test");
    combined.validate()?;
    Ok(())
}

#[test]
fn compose_rejects_clashing_ids() {
    let prepare = graph_of([job("a").build()]);
    let main = graph_of([job("a").build()]);

    assert!(matches!(compose(main, prepare), Err(HopdagError::DuplicateId(_))));
}

#[tokio::test]
async fn clashing_preparation_leaves_the_graph_intact() -> TestResult {
    init_tracing();
    let mut graph = graph_of([job("a").build(), job("b").requires("a").build(), job("c").build()]);
    let handle = graph.abort_handle();
    let prepare = graph_of([job("a").build()]);
    let fake = FakeTransport::new();

    let err = orchestrate(&mut graph, Some(prepare), Arc::new(fake.clone()))
        .await
        .unwrap_err();

    assert!(matches!(err, HopdagError::DuplicateId(id) if id == "a"));
    assert_eq!(graph.len(), 3);
    assert_eq!(graph.label(), "test");
    assert!(fake.started().is_empty());

    // Still the same graph: its abort handle and a later run work.
    handle.abort();
    assert!(graph.abort_handle().is_aborted());
    let result = with_timeout(graph.run(Arc::new(fake.clone()), false)).await?;
    assert!(!result.is_success());
    assert_eq!(graph.state_of("a"), Some(JobState::Cancelled));
    Ok(())
}

#[tokio::test]
async fn orchestrate_runs_preparation_first() -> TestResult {
    init_tracing();

    let prepare = graph_of([job("setup").build()]);
    let mut graph = graph_of([job("exp1").build(), job("exp2").build()]);
    let fake = FakeTransport::new();

    let ok = with_timeout(orchestrate(&mut graph, Some(prepare), Arc::new(fake.clone()))).await?;

    assert!(ok);
    assert_eq!(graph.len(), 3);
    let setup_done = fake.position(&FakeEvent::Finished("setup".into())).unwrap();
    for id in ["exp1", "exp2"] {
        assert!(setup_done < fake.position(&FakeEvent::Started(id.into())).unwrap());
    }
    Ok(())
}

#[tokio::test]
async fn failed_preparation_fails_the_experiment() -> TestResult {
    init_tracing();

    let prepare = graph_of([job("setup").build()]);
    let mut graph = graph_of([job("exp").build()]);
    let fake = FakeTransport::new().fail_on("setup", "no lease");

    let ok = with_timeout(orchestrate(&mut graph, Some(prepare), Arc::new(fake.clone()))).await?;

    assert!(!ok);
    assert_eq!(graph.state_of("exp"), Some(JobState::Skipped));
    assert!(graph.why().contains("'setup'"));
    assert_eq!(fake.started(), vec!["setup"]);
    Ok(())
}

#[tokio::test]
async fn abort_handle_survives_composition() -> TestResult {
    init_tracing();

    let prepare = graph_of([job("setup").build()]);
    let mut graph = graph_of([job("exp").build()]);
    graph.abort_handle().abort();

    let ok = with_timeout(orchestrate(&mut graph, Some(prepare), Arc::new(FakeTransport::new()))).await?;

    assert!(!ok);
    assert_eq!(graph.state_of("setup"), Some(JobState::Cancelled));
    Ok(())
}

#[tokio::test]
async fn orchestrate_without_preparation_just_runs() -> TestResult {
    init_tracing();

    let mut graph = graph_of([job("only").build()]);
    let ok = with_timeout(orchestrate(&mut graph, None, Arc::new(FakeTransport::new()))).await?;

    assert!(ok);
    assert_eq!(graph.state_of("only"), Some(JobState::Done));
    Ok(())
}
