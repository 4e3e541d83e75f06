use crate::engine::signal::ControlSignal;
use crate::runtime::telemetry::Telemetry;
use anyhow::{anyhow, Error as AnyError, Result};
use std::fmt;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::yield_now;
use tokio::time::{self, sleep, Instant};

/// Pause between two failed probes.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Fatal error raised once a probe keeps failing past the poll deadline.
#[derive(Debug)]
pub struct PollTimeout {
    subject: String,
    timeout: Duration,
    attempts: usize,
    last_error: AnyError,
}

impl PollTimeout {
    pub fn subject(&self) -> &str {
        &self.subject
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    pub fn attempts(&self) -> usize {
        self.attempts
    }
}

impl fmt::Display for PollTimeout {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} has not become ready in {}ms (attempted {} probes)",
            self.subject,
            self.timeout.as_millis(),
            self.attempts
        )
    }
}

impl std::error::Error for PollTimeout {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        Some(self.last_error.as_ref())
    }
}

/// Result of a successful poll.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollOutcome {
    pub attempts: usize,
    pub elapsed: Duration,
}

/// Retries a probe at a fixed interval until it succeeds or the deadline
/// passes.
///
/// The poller knows nothing about what it probes; callers supply the remote
/// command. A probe already in flight is never aborted by the overall
/// deadline, only by the optional per-attempt bound.
#[derive(Debug, Clone)]
pub struct ReadinessPoller {
    interval: Duration,
    attempt_timeout: Option<Duration>,
    telemetry: Option<Arc<Telemetry>>,
}

impl Default for ReadinessPoller {
    fn default() -> Self {
        Self::new()
    }
}

impl ReadinessPoller {
    pub fn new() -> Self {
        Self {
            interval: DEFAULT_POLL_INTERVAL,
            attempt_timeout: None,
            telemetry: None,
        }
    }

    pub fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }

    /// Bounds every single probe. A probe exceeding it counts as failed.
    pub fn with_attempt_timeout(mut self, bound: Duration) -> Self {
        self.attempt_timeout = Some(bound);
        self
    }

    pub fn with_telemetry(mut self, telemetry: Arc<Telemetry>) -> Self {
        self.telemetry = Some(telemetry);
        self
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    pub fn attempt_timeout(&self) -> Option<Duration> {
        self.attempt_timeout
    }

    /// Invokes `probe` until it succeeds.
    ///
    /// Elapsed time is measured from the first probe. After a failed probe the
    /// poller gives up with a fatal [`PollTimeout`] if more than `timeout` has
    /// elapsed, otherwise it sleeps for the interval and tries again.
    pub async fn poll_until_ready<F, Fut>(
        &self,
        subject: &str,
        timeout: Duration,
        mut probe: F,
    ) -> Result<PollOutcome, ControlSignal>
    where
        F: FnMut(usize) -> Fut,
        Fut: Future<Output = Result<()>>,
    {
        let started = Instant::now();
        let mut attempts = 0;

        loop {
            attempts += 1;
            if let Some(telemetry) = &self.telemetry {
                telemetry.record_poll_attempt();
            }

            let outcome = match self.attempt_timeout {
                Some(bound) => match time::timeout(bound, probe(attempts)).await {
                    Ok(outcome) => outcome,
                    Err(_) => Err(anyhow!("probe timed out after {}ms", bound.as_millis())),
                },
                None => probe(attempts).await,
            };

            let elapsed = started.elapsed();
            match outcome {
                Ok(()) => {
                    tracing::debug!(
                        subject,
                        attempts,
                        elapsed_ms = duration_to_millis(elapsed),
                        "ready"
                    );
                    return Ok(PollOutcome { attempts, elapsed });
                }
                Err(err) if elapsed > timeout => {
                    let err = PollTimeout {
                        subject: subject.to_owned(),
                        timeout,
                        attempts,
                        last_error: err,
                    };
                    tracing::error!(
                        subject,
                        attempts,
                        timeout_ms = duration_to_millis(timeout),
                        error = %err.last_error,
                        "gave up waiting for readiness"
                    );
                    return Err(ControlSignal::Fatal(err.into()));
                }
                Err(err) => {
                    tracing::trace!(subject, attempts, error = %err, "not ready yet");
                    pause(self.interval).await;
                }
            }
        }
    }
}

async fn pause(delay: Duration) {
    if delay.is_zero() {
        yield_now().await;
    } else {
        sleep(delay).await;
    }
}

fn duration_to_millis(duration: Duration) -> u64 {
    duration.as_millis().min(u128::from(u64::MAX)) as u64
}
