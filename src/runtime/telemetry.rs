use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::OnceLock;
use tracing_subscriber::EnvFilter;

static TRACING_INIT: OnceLock<()> = OnceLock::new();

/// Installs a basic tracing subscriber (if one is not already active).
///
/// The subscriber honours `RUST_LOG` if it is present, otherwise it falls back to `info`.
/// Calling this function multiple times is harmless.
pub fn init_tracing() {
    if TRACING_INIT.get().is_some() {
        return;
    }

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .try_init();

    let _ = TRACING_INIT.set(());
}

/// Counters for one run. Updated from the engine, the chain interpreter and
/// the readiness poller; read once by the runner to build the summary.
#[derive(Default, Debug)]
pub struct Telemetry {
    checks_passed: AtomicU64,
    checks_failed: AtomicU64,
    sections_warned: AtomicU64,
    assertions_allowed: AtomicU64,
    bypasses_opened: AtomicU64,
    bypasses_resumed: AtomicU64,
    poll_attempts: AtomicU64,
}

impl Telemetry {
    pub fn record_check_passed(&self) {
        self.checks_passed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_check_failed(&self) {
        self.checks_failed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_section_warned(&self) {
        self.sections_warned.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_assertion_allowed(&self) {
        self.assertions_allowed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_bypass_opened(&self) {
        self.bypasses_opened.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_bypass_resumed(&self) {
        self.bypasses_resumed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_poll_attempt(&self) {
        self.poll_attempts.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> TelemetrySnapshot {
        TelemetrySnapshot {
            checks_passed: self.checks_passed.load(Ordering::Relaxed),
            checks_failed: self.checks_failed.load(Ordering::Relaxed),
            sections_warned: self.sections_warned.load(Ordering::Relaxed),
            assertions_allowed: self.assertions_allowed.load(Ordering::Relaxed),
            bypasses_opened: self.bypasses_opened.load(Ordering::Relaxed),
            bypasses_resumed: self.bypasses_resumed.load(Ordering::Relaxed),
            poll_attempts: self.poll_attempts.load(Ordering::Relaxed),
        }
    }
}

#[derive(Debug, Copy, Clone, Default, PartialEq, Eq)]
pub struct TelemetrySnapshot {
    pub checks_passed: u64,
    pub checks_failed: u64,
    pub sections_warned: u64,
    pub assertions_allowed: u64,
    pub bypasses_opened: u64,
    pub bypasses_resumed: u64,
    pub poll_attempts: u64,
}
