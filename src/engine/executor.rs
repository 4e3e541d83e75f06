use crate::engine::report::ReportSink;
use crate::engine::signal::ControlSignal;
use crate::runtime::telemetry::Telemetry;
use futures::future::BoxFuture;
use std::fmt;
use std::future::Future;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

pub const DEFAULT_INDENT_WIDTH: usize = 2;

const PASS_MARKER: &str = "✔";
const FAIL_MARKER: &str = "✘";
const WARN_MARKER: &str = "⚠";

/// Future returned by a section body.
pub type SectionFuture<'a> = BoxFuture<'a, Result<(), ControlSignal>>;

/// Callback notified with every signal a check raises, before it propagates.
pub type FailureObserver = Arc<dyn Fn(&ControlSignal) + Send + Sync>;

/// Runs named checks and sections strictly in call order and writes the
/// indented report.
///
/// One engine per test run. The nesting depth is the only mutable state and is
/// restored by a guard, so it survives failing and cancelled section bodies.
pub struct Engine {
    depth: AtomicUsize,
    indent_width: usize,
    sink: Arc<dyn ReportSink>,
    telemetry: Arc<Telemetry>,
    failure_observer: Option<FailureObserver>,
}

impl Engine {
    pub fn new(sink: Arc<dyn ReportSink>) -> Self {
        Self {
            depth: AtomicUsize::new(0),
            indent_width: DEFAULT_INDENT_WIDTH,
            sink,
            telemetry: Arc::new(Telemetry::default()),
            failure_observer: None,
        }
    }

    pub fn with_indent_width(mut self, width: usize) -> Self {
        self.indent_width = width;
        self
    }

    /// Shares counters with the caller (e.g. the lifecycle runner).
    pub fn with_telemetry(mut self, telemetry: Arc<Telemetry>) -> Self {
        self.telemetry = telemetry;
        self
    }

    pub fn with_failure_observer<F>(mut self, observer: F) -> Self
    where
        F: Fn(&ControlSignal) + Send + Sync + 'static,
    {
        self.failure_observer = Some(Arc::new(observer));
        self
    }

    pub fn telemetry(&self) -> &Arc<Telemetry> {
        &self.telemetry
    }

    pub fn depth(&self) -> usize {
        self.depth.load(Ordering::SeqCst)
    }

    /// Prefix matching the current nesting depth.
    pub fn indent(&self) -> String {
        " ".repeat(self.depth() * self.indent_width)
    }

    /// Writes `text` to the sink, indenting every line to the current depth.
    pub fn log(&self, text: &str) {
        let prefix = self.indent();
        for line in text.lines() {
            self.sink.write_line(&format!("{prefix}{line}"));
        }
    }

    /// Raises the depth by one until the returned guard drops.
    pub(crate) fn nested(&self) -> DepthGuard<'_> {
        self.depth.fetch_add(1, Ordering::SeqCst);
        DepthGuard { depth: &self.depth }
    }

    fn log_trace(&self, signal: &ControlSignal) {
        let _nested = self.nested();
        for line in signal.trace_lines() {
            self.log(&line);
        }
    }

    /// Runs a section body one level deeper.
    ///
    /// Whatever signal escapes the body is logged as a warning and absorbed, so
    /// a broken section never stops the sections its caller runs afterwards.
    pub async fn run_section<'a, F>(&'a self, name: &str, body: F)
    where
        F: FnOnce(&'a Engine) -> SectionFuture<'a>,
    {
        self.log(name);
        tracing::debug!(section = name, depth = self.depth(), "entering section");

        let _nested = self.nested();
        if let Err(signal) = body(self).await {
            tracing::warn!(
                section = name,
                kind = ?signal.kind(),
                signal = %signal,
                "section ended with an unresolved signal"
            );
            self.telemetry.record_section_warned();
            self.log(&format!("{WARN_MARKER} {name} did not complete"));
            self.log_trace(&signal);
        }
    }

    /// Runs a single check and reports it.
    ///
    /// A failing check is logged with its trace, handed to the failure
    /// observer, and then returned unchanged so the caller decides what
    /// happens next.
    pub async fn run_check<F, Fut>(&self, name: &str, body: F) -> Result<(), ControlSignal>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<(), ControlSignal>>,
    {
        match body().await {
            Ok(()) => {
                self.telemetry.record_check_passed();
                self.log(&format!("{PASS_MARKER} {name}"));
                Ok(())
            }
            Err(signal) => {
                self.telemetry.record_check_failed();
                tracing::debug!(check = name, kind = ?signal.kind(), "check failed");
                self.log(&format!("{FAIL_MARKER} {name}"));
                self.log_trace(&signal);
                if let Some(observer) = &self.failure_observer {
                    observer(&signal);
                }
                Err(signal)
            }
        }
    }
}

impl fmt::Debug for Engine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Engine")
            .field("depth", &self.depth())
            .field("indent_width", &self.indent_width)
            .field("failure_observer", &self.failure_observer.is_some())
            .finish()
    }
}

pub(crate) struct DepthGuard<'a> {
    depth: &'a AtomicUsize,
}

impl Drop for DepthGuard<'_> {
    fn drop(&mut self) {
        self.depth.fetch_sub(1, Ordering::SeqCst);
    }
}
