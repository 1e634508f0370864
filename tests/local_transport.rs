#![cfg(unix)]

mod common;
use crate::common::builders::graph_of;
use crate::common::{init_tracing, with_timeout};

use std::error::Error;
use std::fs;
use std::sync::Arc;
use std::time::{Duration, Instant};

use hopdag::dag::{Job, JobState};
use hopdag::exec::Command;
use hopdag::node::Node;
use hopdag::transport::{LocalTransport, Transport};

type TestResult = Result<(), Box<dyn Error>>;

fn local_job(id: &str) -> Job {
    Job::new(id, Arc::new(Node::local()))
}

fn local() -> Arc<dyn Transport> {
    Arc::new(LocalTransport::new())
}

#[tokio::test]
async fn shell_commands_capture_output_and_status() -> TestResult {
    init_tracing();

    let mut graph = graph_of([
        local_job("ok").with_command(Command::run("echo hello; echo oops >&2")),
        local_job("ko")
            .with_critical(false)
            .with_command(Command::run("echo before; exit 3"))
            .with_command(Command::run("echo never")),
    ]);

    let result = with_timeout(graph.run(local(), false)).await?;
    assert!(result.is_success());

    let ok = graph.record_of("ok").expect("record");
    assert_eq!(ok.state, JobState::Done);
    assert!(ok.output.contains("hello") && ok.output.contains("oops"));

    let ko = graph.record_of("ko").expect("record");
    assert_eq!(ko.state, JobState::Failed);
    assert_eq!(ko.commands_issued, 1);
    assert!(ko.output.contains("before") && !ko.output.contains("never"));
    assert!(ko.detail.as_deref().unwrap_or_default().contains("status 3"));
    Ok(())
}

#[tokio::test]
async fn scripts_receive_their_arguments() -> TestResult {
    init_tracing();
    let dir = tempfile::tempdir()?;
    let script = dir.path().join("greet.sh");
    fs::write(&script, "echo \"hi $1 and $2\"\n")?;

    let mut graph = graph_of([local_job("greet").with_command(Command::script(&script, ["a", "b"]))]);

    with_timeout(graph.run(local(), false)).await?;

    let record = graph.record_of("greet").expect("record");
    assert_eq!(record.state, JobState::Done);
    assert_eq!(record.output, "hi a and b\n");
    Ok(())
}

#[tokio::test]
async fn inline_scripts_run_from_memory() -> TestResult {
    init_tracing();

    let mut graph = graph_of([local_job("inline").with_command(
        Command::inline("for w in \"$@\"; do echo \"arg=$w\"; done\n", ["a b", "c"])
            .with_label("loop"),
    )]);
    with_timeout(graph.run(local(), false)).await?;

    let record = graph.record_of("inline").expect("record");
    assert_eq!(record.state, JobState::Done);
    assert_eq!(record.output, "arg=a b\narg=c\n");
    Ok(())
}

#[tokio::test]
async fn includes_are_staged_next_to_the_script() -> TestResult {
    init_tracing();
    let dir = tempfile::tempdir()?;
    let src = dir.path().join("src");
    fs::create_dir(&src)?;
    fs::write(src.join("common.sh"), "greeting=bonjour\n")?;
    fs::write(src.join("main.sh"), ". ./common.sh\necho \"$greeting $1\"\n")?;
    let workdir = dir.path().join("work");

    let mut graph = graph_of([local_job("main").with_command(
        Command::script(src.join("main.sh"), ["faraday"]).with_includes([src.join("common.sh")]),
    )]);
    let transport: Arc<dyn Transport> = Arc::new(LocalTransport::with_workdir(&workdir));
    with_timeout(graph.run(transport, false)).await?;

    let record = graph.record_of("main").expect("record");
    assert_eq!(record.state, JobState::Done, "detail: {:?}", record.detail);
    assert!(record.output.contains("bonjour faraday"), "output = {}", record.output);
    assert!(workdir.join("common.sh").exists());
    Ok(())
}

#[tokio::test]
async fn missing_include_fails_before_the_script_runs() -> TestResult {
    init_tracing();
    let dir = tempfile::tempdir()?;
    let script = dir.path().join("main.sh");
    fs::write(&script, "echo ran\n")?;

    let mut graph = graph_of([local_job("main").with_command(
        Command::script(&script, Vec::<String>::new()).with_includes([dir.path().join("absent.sh")]),
    )]);
    let transport: Arc<dyn Transport> = Arc::new(LocalTransport::with_workdir(dir.path().join("work")));
    with_timeout(graph.run(transport, false)).await?;

    let record = graph.record_of("main").expect("record");
    assert_eq!(record.state, JobState::Failed);
    assert!(!record.output.contains("ran"));
    Ok(())
}

#[tokio::test]
async fn transfers_copy_files_in_both_directions() -> TestResult {
    init_tracing();
    let dir = tempfile::tempdir()?;
    let remote = dir.path().join("remote");
    let local_dir = dir.path().join("local");
    fs::create_dir_all(&remote)?;
    fs::create_dir_all(&local_dir)?;
    fs::write(remote.join("OutFile"), "results")?;
    fs::write(local_dir.join("conf.txt"), "settings")?;

    let remote_out = remote.join("OutFile").display().to_string();
    let remote_conf = remote.join("conf.txt").display().to_string();

    let mut graph = graph_of([local_job("xfer")
        .with_command(Command::pull(remote_out, &local_dir))
        .with_command(Command::push(local_dir.join("conf.txt"), remote_conf))]);

    let result = with_timeout(graph.run(local(), false)).await?;
    assert!(result.is_success(), "{}", graph.why());

    assert_eq!(fs::read_to_string(local_dir.join("OutFile"))?, "results");
    assert_eq!(fs::read_to_string(remote.join("conf.txt"))?, "settings");
    Ok(())
}

#[tokio::test]
async fn missing_source_fails_the_transfer() -> TestResult {
    init_tracing();
    let dir = tempfile::tempdir()?;

    let mut graph = graph_of([local_job("xfer")
        .with_command(Command::pull("/definitely/not/here", dir.path()))]);

    let result = with_timeout(graph.run(local(), false)).await?;

    assert!(!result.is_success());
    assert_eq!(graph.state_of("xfer"), Some(JobState::Failed));
    Ok(())
}

#[tokio::test]
async fn cancellation_kills_the_local_process() -> TestResult {
    init_tracing();

    let mut graph = graph_of([
        local_job("sleeper")
            .with_critical(false)
            .with_command(Command::run("sleep 30")),
        local_job("breaker").with_command(Command::run("sleep 0.1; exit 1")),
    ]);

    let started = Instant::now();
    let result = with_timeout(graph.run(local(), false)).await?;

    assert!(!result.is_success());
    assert!(started.elapsed() < Duration::from_secs(3));
    assert_eq!(graph.state_of("sleeper"), Some(JobState::Cancelled));
    assert_eq!(graph.state_of("breaker"), Some(JobState::Failed));
    Ok(())
}
