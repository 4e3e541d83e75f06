use crate::engine::executor::DEFAULT_INDENT_WIDTH;
use crate::readiness::poller::DEFAULT_POLL_INTERVAL;
use crate::readiness::probes::{DEFAULT_BOOT_TIMEOUT, REMOTE_SHELL_ATTEMPT_TIMEOUT};
use anyhow::{bail, Result};
use std::time::Duration;

const DEFAULT_SERVICE_TIMEOUT_SECS: u64 = 60;
const MAX_INDENT_WIDTH: usize = 8;

/// Runtime configuration for one provisioning run.
///
/// All instances must be constructed via [`RunConfig::builder`] or [`RunConfig::new`]
/// so invariants are validated before any consumer observes the values.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunConfig {
    boot_timeout: Duration,
    service_timeout: Duration,
    poll_interval: Duration,
    attempt_timeout: Duration,
    indent_width: usize,
    destroy_interactive_default: bool,
    destroy_unattended_default: bool,
    offer_shell: bool,
}

pub struct RunConfigParams {
    pub boot_timeout: Duration,
    pub service_timeout: Duration,
    pub poll_interval: Duration,
    pub attempt_timeout: Duration,
    pub indent_width: usize,
    pub destroy_interactive_default: bool,
    pub destroy_unattended_default: bool,
    pub offer_shell: bool,
}

impl Default for RunConfigParams {
    fn default() -> Self {
        Self {
            boot_timeout: DEFAULT_BOOT_TIMEOUT,
            service_timeout: Duration::from_secs(DEFAULT_SERVICE_TIMEOUT_SECS),
            poll_interval: DEFAULT_POLL_INTERVAL,
            attempt_timeout: REMOTE_SHELL_ATTEMPT_TIMEOUT,
            indent_width: DEFAULT_INDENT_WIDTH,
            destroy_interactive_default: true,
            destroy_unattended_default: true,
            offer_shell: false,
        }
    }
}

impl Default for RunConfig {
    fn default() -> Self {
        let RunConfigParams {
            boot_timeout,
            service_timeout,
            poll_interval,
            attempt_timeout,
            indent_width,
            destroy_interactive_default,
            destroy_unattended_default,
            offer_shell,
        } = RunConfigParams::default();

        Self {
            boot_timeout,
            service_timeout,
            poll_interval,
            attempt_timeout,
            indent_width,
            destroy_interactive_default,
            destroy_unattended_default,
            offer_shell,
        }
    }
}

impl RunConfig {
    /// Returns a builder to incrementally construct and validate a configuration.
    pub fn builder() -> RunConfigBuilder {
        RunConfigBuilder::default()
    }

    /// Constructs a configuration directly from the provided values.
    pub fn new(params: RunConfigParams) -> Result<Self> {
        let RunConfigParams {
            boot_timeout,
            service_timeout,
            poll_interval,
            attempt_timeout,
            indent_width,
            destroy_interactive_default,
            destroy_unattended_default,
            offer_shell,
        } = params;

        let config = Self {
            boot_timeout,
            service_timeout,
            poll_interval,
            attempt_timeout,
            indent_width,
            destroy_interactive_default,
            destroy_unattended_default,
            offer_shell,
        };

        config.validate()?;
        Ok(config)
    }

    /// How long setup waits for the remote shell after creating the machine.
    pub fn boot_timeout(&self) -> Duration {
        self.boot_timeout
    }

    /// Default wait handed to suites for service activation.
    pub fn service_timeout(&self) -> Duration {
        self.service_timeout
    }

    /// Pause between two failed readiness probes.
    pub fn poll_interval(&self) -> Duration {
        self.poll_interval
    }

    /// Bound on one remote-shell probe during setup.
    pub fn attempt_timeout(&self) -> Duration {
        self.attempt_timeout
    }

    /// Spaces per nesting level in the report.
    pub fn indent_width(&self) -> usize {
        self.indent_width
    }

    /// Answer to "destroy the machine?" when the operator just presses enter.
    pub fn destroy_interactive_default(&self) -> bool {
        self.destroy_interactive_default
    }

    /// Answer to "destroy the machine?" when nobody is there to ask.
    pub fn destroy_unattended_default(&self) -> bool {
        self.destroy_unattended_default
    }

    /// Whether the operator is offered an interactive shell before cleanup.
    pub fn offer_shell(&self) -> bool {
        self.offer_shell
    }

    /// Performs validation on an existing configuration instance.
    pub fn validate(&self) -> Result<()> {
        if self.boot_timeout.is_zero() {
            bail!("boot_timeout must be greater than 0");
        }

        if self.service_timeout.is_zero() {
            bail!("service_timeout must be greater than 0");
        }

        if self.attempt_timeout.is_zero() {
            bail!("attempt_timeout must be greater than 0");
        }

        if self.poll_interval.is_zero() {
            bail!("poll_interval must be greater than 0");
        }

        for (name, timeout) in [
            ("boot_timeout", self.boot_timeout),
            ("service_timeout", self.service_timeout),
        ] {
            if self.poll_interval >= timeout {
                bail!(
                    "poll_interval ({:?}) must be shorter than {name} ({:?})",
                    self.poll_interval,
                    timeout
                );
            }
        }

        if self.indent_width == 0 || self.indent_width > MAX_INDENT_WIDTH {
            bail!("indent_width must be between 1 and {MAX_INDENT_WIDTH}");
        }

        Ok(())
    }
}

#[derive(Debug, Default, Clone)]
pub struct RunConfigBuilder {
    boot_timeout: Option<Duration>,
    service_timeout: Option<Duration>,
    poll_interval: Option<Duration>,
    attempt_timeout: Option<Duration>,
    indent_width: Option<usize>,
    destroy_interactive_default: Option<bool>,
    destroy_unattended_default: Option<bool>,
    offer_shell: Option<bool>,
}

impl RunConfigBuilder {
    pub fn boot_timeout(mut self, timeout: Duration) -> Self {
        self.boot_timeout = Some(timeout);
        self
    }

    pub fn service_timeout(mut self, timeout: Duration) -> Self {
        self.service_timeout = Some(timeout);
        self
    }

    pub fn poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = Some(interval);
        self
    }

    pub fn attempt_timeout(mut self, timeout: Duration) -> Self {
        self.attempt_timeout = Some(timeout);
        self
    }

    pub fn indent_width(mut self, width: usize) -> Self {
        self.indent_width = Some(width);
        self
    }

    pub fn destroy_defaults(mut self, interactive: bool, unattended: bool) -> Self {
        self.destroy_interactive_default = Some(interactive);
        self.destroy_unattended_default = Some(unattended);
        self
    }

    pub fn offer_shell(mut self, offer: bool) -> Self {
        self.offer_shell = Some(offer);
        self
    }

    pub fn build(self) -> Result<RunConfig> {
        let defaults = RunConfigParams::default();
        let params = RunConfigParams {
            boot_timeout: self.boot_timeout.unwrap_or(defaults.boot_timeout),
            service_timeout: self.service_timeout.unwrap_or(defaults.service_timeout),
            poll_interval: self.poll_interval.unwrap_or(defaults.poll_interval),
            attempt_timeout: self.attempt_timeout.unwrap_or(defaults.attempt_timeout),
            indent_width: self.indent_width.unwrap_or(defaults.indent_width),
            destroy_interactive_default: self
                .destroy_interactive_default
                .unwrap_or(defaults.destroy_interactive_default),
            destroy_unattended_default: self
                .destroy_unattended_default
                .unwrap_or(defaults.destroy_unattended_default),
            offer_shell: self.offer_shell.unwrap_or(defaults.offer_shell),
        };

        RunConfig::new(params)
    }
}
