use std::sync::{
    atomic::{AtomicUsize, Ordering},
    Arc,
};
use std::time::Duration;

use crate::support::{
    helpers::{count_lines_containing, init_tracing, position_of, WarningCounter},
    mock_machine::MockMachine,
};
use anyhow::{anyhow, Context, Result};
use chaincheck::{
    ensure_service_started, start_bypass, AssertionFailure, Chain, ControlSignal, Engine, Machine,
    MemorySink, ReadinessPoller, SignalKind,
};

fn engine() -> (Engine, MemorySink) {
    init_tracing();
    let sink = MemorySink::new();
    (Engine::new(Arc::new(sink.clone())), sink)
}

async fn unit_exists(machine: &MockMachine, service: &str) -> Result<(), ControlSignal> {
    let command = format!("systemctl cat {service}");
    match machine.run_remote_command(Some(&command)).await {
        Ok(_) => Ok(()),
        Err(err) => Err(AssertionFailure::new(format!("unit {service} is missing"))
            .with_source(err)
            .into()),
    }
}

async fn service_active(machine: &MockMachine, service: &str) -> Result<(), ControlSignal> {
    ensure_service_started(machine, service, Duration::from_secs(2))
        .await
        .map(drop)
}

#[tokio::test]
async fn bypassed_checks_leave_no_trace_in_the_report() -> Result<()> {
    let (engine, sink) = engine();
    let c_runs = AtomicUsize::new(0);

    engine
        .run_section("dependent checks", |engine| {
            let c_runs = &c_runs;
            Box::pin(async move {
                Chain::new()
                    .check("A", || async { Ok(()) })
                    .check("B", || async { Err(ControlSignal::assertion("B broke")) })
                    .start_bypass("skip-b")
                    .check("C", || async move {
                        c_runs.fetch_add(1, Ordering::SeqCst);
                        Err(ControlSignal::assertion("C should never run"))
                    })
                    .resume_bypass("skip-b")
                    .check("E", || async { Ok(()) })
                    .run(engine)
                    .await
            })
        })
        .await;

    assert_eq!(c_runs.load(Ordering::SeqCst), 0);
    assert_eq!(
        sink.lines(),
        vec![
            "dependent checks",
            "  ✔ A",
            "  ✘ B",
            "    assertion failed: B broke",
            "  ✔ E",
        ]
    );
    assert_eq!(engine.depth(), 0);
    Ok(())
}

#[tokio::test]
async fn broken_section_does_not_cancel_the_next_section() -> Result<()> {
    let (engine, sink) = engine();

    engine
        .run_section("firewall", |engine| {
            Box::pin(async move {
                engine
                    .run_check("port 22 open", || async {
                        Err(ControlSignal::assertion("port 22 filtered"))
                    })
                    .await
            })
        })
        .await;
    engine
        .run_section("users", |engine| {
            Box::pin(async move {
                engine
                    .run_check("deploy user exists", || async { Ok(()) })
                    .await
            })
        })
        .await;

    let warned = position_of(&sink, "  ⚠ firewall did not complete")
        .context("firewall section should end with a warning")?;
    let next = position_of(&sink, "users").context("users section should start")?;
    assert!(warned < next);
    assert_eq!(count_lines_containing(&sink, "✔ deploy user exists"), 1);
    assert_eq!(engine.telemetry().snapshot().sections_warned, 1);
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn missing_unit_skips_its_activation_checks() -> Result<()> {
    let (engine, sink) = engine();
    let machine = MockMachine::new("web-1")
        .with_output("systemctl cat nginx", Err("No files found for nginx.service."))
        .with_service("docker", 3);
    machine.create().await?;

    let machine_ref = &machine;
    engine
        .run_section("services", |engine| {
            Box::pin(async move {
                Chain::new()
                    .check("nginx unit exists", || unit_exists(machine_ref, "nginx"))
                    .start_bypass("nginx")
                    .then(|| service_active(machine_ref, "nginx"))
                    .check("nginx answers on :80", || async { Ok(()) })
                    .resume_bypass("nginx")
                    .check("docker unit exists", || unit_exists(machine_ref, "docker"))
                    .start_bypass("docker")
                    .then(|| service_active(machine_ref, "docker"))
                    .check("docker is active", || async { Ok(()) })
                    .resume_bypass("docker")
                    .run(engine)
                    .await
            })
        })
        .await;

    let lines = sink.lines();
    assert_eq!(
        lines,
        vec![
            "services",
            "  ✘ nginx unit exists",
            "    assertion failed: unit nginx is missing",
            "    caused by: systemctl cat nginx: No files found for nginx.service.",
            "  ✔ docker unit exists",
            "  ✔ docker is active",
        ]
    );
    let probes = machine
        .commands()
        .iter()
        .filter(|command| command.contains("is-active"))
        .count();
    assert_eq!(probes, 4, "nginx must never be probed, docker four times");
    Ok(())
}

#[tokio::test]
async fn unmatched_bypass_is_reported_by_the_section() -> Result<()> {
    let (engine, sink) = engine();

    engine
        .run_section("disks", |engine| {
            Box::pin(async move {
                Chain::new()
                    .check("data disk attached", || async {
                        Err(ControlSignal::assertion("/dev/sdb missing"))
                    })
                    .start_bypass("data-disk")
                    .check("data disk mounted", || async { Ok(()) })
                    .resume_bypass("scratch-disk")
                    .run(engine)
                    .await
            })
        })
        .await;

    assert_eq!(
        sink.lines()[3..],
        [
            "  ⚠ disks did not complete".to_owned(),
            "    unresolved bypass `data-disk`".to_owned(),
        ]
    );
    assert_eq!(count_lines_containing(&sink, "data disk mounted"), 0);
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn fatal_poll_failure_is_never_turned_into_a_bypass() -> Result<()> {
    let (engine, sink) = engine();
    let observed = Arc::new(AtomicUsize::new(0));
    let counter = observed.clone();
    let engine = engine.with_failure_observer(move |signal| {
        assert_eq!(signal.kind(), SignalKind::Fatal);
        counter.fetch_add(1, Ordering::SeqCst);
    });

    let machine = MockMachine::new("db-1").with_service("postgresql", usize::MAX);
    machine.create().await?;
    let poller = ReadinessPoller::new();

    let machine_ref = &machine;
    let poller_ref = &poller;
    engine
        .run_section("database", |engine| {
            Box::pin(async move {
                Chain::new()
                    .check("postgresql is active", || async move {
                        poller_ref
                            .wait_for_service(machine_ref, "postgresql", Duration::from_millis(500))
                            .await
                            .map(drop)
                    })
                    .start_bypass("postgres")
                    .check("accepts connections", || async { Ok(()) })
                    .resume_bypass("postgres")
                    .run(engine)
                    .await
            })
        })
        .await;

    assert_eq!(observed.load(Ordering::SeqCst), 1);
    assert_eq!(count_lines_containing(&sink, "accepts connections"), 0);
    assert_eq!(
        count_lines_containing(
            &sink,
            "fatal: service postgresql on db-1 has not become ready in 500ms"
        ),
        2,
        "the check and the section both report the fatal failure"
    );
    assert_eq!(engine.telemetry().snapshot().bypasses_opened, 0);
    Ok(())
}

#[test]
fn start_bypass_warns_once_when_handed_a_fatal_failure() {
    let warnings = WarningCounter::default();
    let signal = {
        let _guard = warnings.install();
        start_bypass("disk")(ControlSignal::fatal(anyhow!("quota exceeded"))).unwrap_err()
    };

    assert_eq!(signal.kind(), SignalKind::Fatal);
    assert_eq!(warnings.count(), 1);
}

#[test]
fn start_bypass_opens_silently_for_assertions() {
    let warnings = WarningCounter::default();
    let signal = {
        let _guard = warnings.install();
        start_bypass("disk")(ControlSignal::assertion("/dev/sdb missing")).unwrap_err()
    };

    assert!(signal.is_bypass_for(&"disk".into()));
    assert_eq!(warnings.count(), 0);
}

#[tokio::test]
async fn chain_warns_once_when_a_fatal_failure_meets_a_bypass() -> Result<()> {
    let sink = MemorySink::new();
    let engine = Engine::new(Arc::new(sink.clone()));
    let warnings = WarningCounter::default();

    let result = {
        let _guard = warnings.install();
        Chain::new()
            .check("disk attached", || async {
                Err(ControlSignal::fatal(anyhow!("cloud API returned 503")))
            })
            .start_bypass("disk")
            .check("disk mounted", || async { Ok(()) })
            .resume_bypass("disk")
            .run(&engine)
            .await
    };

    let signal = result.err().context("fatal failure should escape the chain")?;
    assert_eq!(signal.kind(), SignalKind::Fatal);
    assert_eq!(warnings.count(), 1);
    assert_eq!(count_lines_containing(&sink, "disk mounted"), 0);
    Ok(())
}
