use crate::engine::chain::Chain;
use crate::engine::executor::Engine;
use crate::engine::report::ReportSink;
use crate::engine::signal::ControlSignal;
use crate::readiness::poller::{PollOutcome, ReadinessPoller};
use crate::runtime::config::RunConfig;
use crate::runtime::machine::Machine;
use crate::runtime::prompt::Prompter;
use crate::runtime::telemetry::{Telemetry, TelemetrySnapshot};
use anyhow::{bail, Context, Result};
use futures::future::BoxFuture;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::signal;
use tokio_util::sync::CancellationToken;

pub type SuiteFuture<'a> = BoxFuture<'a, ()>;

/// Everything a suite needs to drive its sections against the machine.
pub struct SuiteContext<'a, M: ?Sized> {
    pub engine: &'a Engine,
    pub machine: &'a M,
    pub config: &'a RunConfig,
    pub poller: &'a ReadinessPoller,
}

impl<M: ?Sized> Clone for SuiteContext<'_, M> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<M: ?Sized> Copy for SuiteContext<'_, M> {}

impl<M: Machine + ?Sized> SuiteContext<'_, M> {
    /// Waits for `service` using the configured service timeout.
    pub async fn wait_for_service(&self, service: &str) -> Result<PollOutcome, ControlSignal> {
        self.poller
            .wait_for_service(self.machine, service, self.config.service_timeout())
            .await
    }
}

/// The checks run against a freshly provisioned machine.
pub trait TestSuite<M: Machine>: Send {
    /// Runs sections in order. Sections absorb their own failures, so the
    /// suite itself has nothing to return.
    fn run<'a>(&'a mut self, cx: SuiteContext<'a, M>) -> SuiteFuture<'a>;
}

/// Outcome of one run, suitable for deriving a process exit code.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RunSummary {
    pub checks: TelemetrySnapshot,
    pub setup_failed: bool,
    pub cancelled: bool,
    pub cleanup_failed: bool,
}

impl RunSummary {
    pub fn succeeded(&self) -> bool {
        self.checks.checks_failed == 0
            && self.checks.sections_warned == 0
            && !self.setup_failed
            && !self.cancelled
            && !self.cleanup_failed
    }

    pub fn exit_code(&self) -> i32 {
        if self.succeeded() {
            0
        } else {
            1
        }
    }
}

/// What setup achieved; cleanup only offers to destroy a machine that exists.
#[derive(Debug, Clone, Copy)]
struct SetupState {
    created: bool,
    ready: bool,
}

/// Provisions a machine, runs a suite against it and tears it down again.
pub struct Runner<M: Machine, P: Prompter> {
    config: RunConfig,
    machine: M,
    prompter: P,
    sink: Arc<dyn ReportSink>,
    shutdown: CancellationToken,
}

impl<M: Machine, P: Prompter> Runner<M, P> {
    pub fn new(config: RunConfig, machine: M, prompter: P, sink: Arc<dyn ReportSink>) -> Self {
        Self {
            config,
            machine,
            prompter,
            sink,
            shutdown: CancellationToken::new(),
        }
    }

    /// Returns a clone of the shutdown token so external callers can integrate
    /// with their own signal handlers or cancellation strategies. Cancelling it
    /// skips the rest of the suite; cleanup still runs.
    pub fn cancellation_token(&self) -> CancellationToken {
        self.shutdown.clone()
    }

    pub fn machine(&self) -> &M {
        &self.machine
    }

    pub fn config(&self) -> &RunConfig {
        &self.config
    }

    /// Runs prepare, setup, the suite, manual steps and cleanup in that order.
    ///
    /// Only a failure before the machine is created is returned as an error;
    /// everything after that is recorded in the summary. Cleanup runs whenever
    /// the machine was created, even if the suite was cancelled.
    pub async fn run<S: TestSuite<M>>(&mut self, suite: &mut S) -> Result<RunSummary> {
        let telemetry = Arc::new(Telemetry::default());
        let engine = Engine::new(self.sink.clone())
            .with_indent_width(self.config.indent_width())
            .with_telemetry(telemetry.clone());
        let poller = ReadinessPoller::new()
            .with_interval(self.config.poll_interval())
            .with_telemetry(telemetry.clone());
        let mut summary = RunSummary::default();

        self.prepare().await?;

        tracing::info!(machine = self.machine.name(), "setting up machine");
        let setup = self.setup(&engine, &poller).await;
        summary.setup_failed = !setup.ready;

        if summary.setup_failed {
            tracing::warn!(machine = self.machine.name(), "setup failed; skipping suite");
        } else if self.shutdown.is_cancelled() {
            summary.cancelled = true;
        } else {
            let cx = SuiteContext {
                engine: &engine,
                machine: &self.machine,
                config: &self.config,
                poller: &poller,
            };
            tokio::select! {
                _ = suite.run(cx) => {}
                _ = self.shutdown.cancelled() => {
                    summary.cancelled = true;
                }
            }
        }

        if summary.cancelled {
            tracing::warn!("run cancelled; skipping to cleanup");
            engine.log("⚠ run cancelled");
        } else if !summary.setup_failed {
            self.manual_steps().await;
        }

        summary.cleanup_failed = if setup.created {
            !self.cleanup().await
        } else {
            tracing::info!(
                machine = self.machine.name(),
                "machine was never created; nothing to destroy"
            );
            false
        };
        summary.checks = telemetry.snapshot();

        engine.log(&format!(
            "{} passed, {} failed",
            summary.checks.checks_passed, summary.checks.checks_failed
        ));
        tracing::info!(
            passed = summary.checks.checks_passed,
            failed = summary.checks.checks_failed,
            sections_warned = summary.checks.sections_warned,
            setup_failed = summary.setup_failed,
            cancelled = summary.cancelled,
            cleanup_failed = summary.cleanup_failed,
            "run finished"
        );

        if self.shutdown.is_cancelled() {
            self.shutdown = CancellationToken::new();
        }
        Ok(summary)
    }

    /// Same as [`Runner::run`], but a Ctrl-C (SIGINT) cancels the suite.
    pub async fn run_until_ctrl_c<S: TestSuite<M>>(&mut self, suite: &mut S) -> Result<RunSummary> {
        let token = self.shutdown.clone();
        let watcher = tokio::spawn(async move {
            tokio::select! {
                result = signal::ctrl_c() => {
                    if result.is_ok() {
                        tracing::info!("Ctrl-C received; cancelling run");
                        token.cancel();
                    }
                }
                _ = token.cancelled() => {}
            }
        });

        let outcome = self.run(suite).await;
        watcher.abort();
        outcome
    }

    async fn prepare(&self) -> Result<()> {
        let name = self.machine.name();
        let existing = self
            .machine
            .list()
            .await
            .context("failed to list machines")?;

        for info in &existing {
            tracing::info!(
                id = %info.id,
                name = %info.name,
                zone = %info.zone,
                created = %info.creation_timestamp,
                "existing machine"
            );
        }

        if existing.iter().any(|info| info.name == name) {
            let question = format!("Machine {name} already exists. Destroy it before continuing?");
            if !self.prompter.confirm(&question, true, true).await? {
                bail!("machine {name} already exists");
            }
            self.machine
                .destroy()
                .await
                .with_context(|| format!("failed to destroy existing machine {name}"))?;
            tracing::info!(machine = name, "destroyed leftover machine");
        }

        Ok(())
    }

    async fn setup(&self, engine: &Engine, poller: &ReadinessPoller) -> SetupState {
        let mut ready = false;
        let created = AtomicBool::new(false);
        let machine = &self.machine;
        let shell_poller = poller
            .clone()
            .with_attempt_timeout(self.config.attempt_timeout());
        let boot_timeout = self.config.boot_timeout();

        engine
            .run_section("Setup", |engine| {
                let ready = &mut ready;
                let created = &created;
                let shell_poller = &shell_poller;
                Box::pin(async move {
                    Chain::new()
                        .check("machine is created", || async move {
                            create_machine(machine).await?;
                            created.store(true, Ordering::SeqCst);
                            Ok::<(), ControlSignal>(())
                        })
                        .check("machine is reachable", || {
                            reach_machine(shell_poller, machine, boot_timeout)
                        })
                        .run(engine)
                        .await?;
                    *ready = true;
                    Ok(())
                })
            })
            .await;

        SetupState {
            created: created.load(Ordering::SeqCst),
            ready,
        }
    }

    async fn manual_steps(&self) {
        if !self.config.offer_shell() {
            return;
        }

        match self
            .prompter
            .confirm("Open an interactive shell on the machine?", true, false)
            .await
        {
            Ok(true) => {
                if let Err(err) = self.machine.run_remote_command(None).await {
                    tracing::warn!(error = %err, "interactive shell exited with an error");
                }
            }
            Ok(false) => {}
            Err(err) => tracing::warn!(error = %err, "could not ask about an interactive shell"),
        }
    }

    /// Returns false if the machine should have been destroyed but was not.
    async fn cleanup(&self) -> bool {
        let name = self.machine.name();
        let question = format!("Destroy machine {name}?");
        let destroy = match self
            .prompter
            .confirm(
                &question,
                self.config.destroy_interactive_default(),
                self.config.destroy_unattended_default(),
            )
            .await
        {
            Ok(answer) => answer,
            Err(err) => {
                tracing::warn!(error = %err, "prompt failed; using unattended default");
                self.config.destroy_unattended_default()
            }
        };

        if !destroy {
            tracing::info!(machine = name, "keeping machine");
            return true;
        }

        match self.machine.destroy().await {
            Ok(()) => {
                tracing::info!(machine = name, "machine destroyed");
                true
            }
            Err(err) => {
                tracing::error!(machine = name, error = %format!("{err:#}"), "failed to destroy machine");
                false
            }
        }
    }
}

async fn create_machine<M: Machine + ?Sized>(machine: &M) -> Result<(), ControlSignal> {
    machine
        .create()
        .await
        .with_context(|| format!("failed to create machine {}", machine.name()))?;
    Ok(())
}

async fn reach_machine<M: Machine + ?Sized>(
    poller: &ReadinessPoller,
    machine: &M,
    timeout: Duration,
) -> Result<(), ControlSignal> {
    poller.wait_for_shell(machine, timeout).await.map(drop)
}
