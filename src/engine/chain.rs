//! Sequential pipeline of dependent checks.
//!
//! A [`Chain`] is a list of steps evaluated in order against a single pending
//! signal. Body steps (`check`, `then`) run only while nothing is pending;
//! recovery steps (`allow_assertion`, `start_bypass`, `resume_bypass`) only
//! see the pending signal and either resolve it or pass it on. Whatever is
//! still pending after the last step is the chain's result.

use crate::engine::bypass::{allow_assertion, allow_assertion_with, resume_bypass, start_bypass};
use crate::engine::executor::Engine;
use crate::engine::signal::{AssertionFailure, BypassCode, ControlSignal};
use futures::future::BoxFuture;
use std::fmt;
use std::future::Future;

type StepBody<'a> = Box<dyn FnOnce() -> BoxFuture<'a, Result<(), ControlSignal>> + Send + 'a>;
type StepReport<'a> = Box<dyn FnOnce(&Engine, &AssertionFailure) + Send + 'a>;

enum Step<'a> {
    Check { name: String, body: StepBody<'a> },
    Then { body: StepBody<'a> },
    AllowAssertion { report: Option<StepReport<'a>> },
    StartBypass(BypassCode),
    ResumeBypass(BypassCode),
}

impl Step<'_> {
    fn label(&self) -> String {
        match self {
            Step::Check { name, .. } => format!("check `{name}`"),
            Step::Then { .. } => "step".to_owned(),
            Step::AllowAssertion { .. } => "allow assertion".to_owned(),
            Step::StartBypass(code) => format!("start bypass `{code}`"),
            Step::ResumeBypass(code) => format!("resume bypass `{code}`"),
        }
    }
}

#[derive(Default)]
pub struct Chain<'a> {
    steps: Vec<Step<'a>>,
}

impl<'a> Chain<'a> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a reported check.
    pub fn check<F, Fut>(mut self, name: impl Into<String>, body: F) -> Self
    where
        F: FnOnce() -> Fut + Send + 'a,
        Fut: Future<Output = Result<(), ControlSignal>> + Send + 'a,
    {
        self.steps.push(Step::Check {
            name: name.into(),
            body: boxed(body),
        });
        self
    }

    /// Appends an unreported step, e.g. waiting for a service before the
    /// checks that depend on it.
    pub fn then<F, Fut>(mut self, body: F) -> Self
    where
        F: FnOnce() -> Fut + Send + 'a,
        Fut: Future<Output = Result<(), ControlSignal>> + Send + 'a,
    {
        self.steps.push(Step::Then { body: boxed(body) });
        self
    }

    pub fn allow_assertion(mut self) -> Self {
        self.steps.push(Step::AllowAssertion { report: None });
        self
    }

    pub fn allow_assertion_with<F>(mut self, report: F) -> Self
    where
        F: FnOnce(&Engine, &AssertionFailure) + Send + 'a,
    {
        self.steps.push(Step::AllowAssertion {
            report: Some(Box::new(report)),
        });
        self
    }

    pub fn start_bypass(mut self, code: impl Into<BypassCode>) -> Self {
        self.steps.push(Step::StartBypass(code.into()));
        self
    }

    pub fn resume_bypass(mut self, code: impl Into<BypassCode>) -> Self {
        self.steps.push(Step::ResumeBypass(code.into()));
        self
    }

    pub fn len(&self) -> usize {
        self.steps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    /// Evaluates every step in order. Returns the signal left pending after
    /// the last step, if any.
    pub async fn run(self, engine: &Engine) -> Result<(), ControlSignal> {
        let mut pending: Option<ControlSignal> = None;

        for step in self.steps {
            pending = match (step, pending) {
                (Step::Check { name, body }, None) => engine.run_check(&name, body).await.err(),
                (Step::Then { body }, None) => body().await.err(),
                (step @ (Step::Check { .. } | Step::Then { .. }), Some(signal)) => {
                    tracing::trace!(step = %step.label(), kind = ?signal.kind(), "skipped");
                    Some(signal)
                }
                (Step::AllowAssertion { report }, Some(signal)) => {
                    if signal.is_assertion() {
                        engine.telemetry().record_assertion_allowed();
                    }
                    match report {
                        Some(report) => allow_assertion_with(engine, signal, report).err(),
                        None => allow_assertion(signal).err(),
                    }
                }
                (Step::StartBypass(code), Some(signal)) => {
                    if signal.is_assertion() {
                        engine.telemetry().record_bypass_opened();
                    }
                    start_bypass(code)(signal).err()
                }
                (Step::ResumeBypass(code), Some(signal)) => {
                    let resumed = resume_bypass(code)(signal);
                    if resumed.is_ok() {
                        engine.telemetry().record_bypass_resumed();
                    }
                    resumed.err()
                }
                (_, None) => None,
            };
        }

        match pending {
            Some(signal) => Err(signal),
            None => Ok(()),
        }
    }
}

impl fmt::Debug for Chain<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list()
            .entries(self.steps.iter().map(Step::label))
            .finish()
    }
}

fn boxed<'a, F, Fut>(body: F) -> StepBody<'a>
where
    F: FnOnce() -> Fut + Send + 'a,
    Fut: Future<Output = Result<(), ControlSignal>> + Send + 'a,
{
    Box::new(move || Box::pin(body()) as BoxFuture<'a, Result<(), ControlSignal>>)
}
