//! The two remote conditions checks wait on: the machine's shell answering and
//! a systemd service reporting active.

use crate::engine::signal::ControlSignal;
use crate::readiness::poller::{PollOutcome, ReadinessPoller};
use crate::runtime::machine::Machine;
use anyhow::bail;
use std::time::Duration;

/// Overall wait used for the remote shell when the caller has no opinion.
pub const DEFAULT_BOOT_TIMEOUT: Duration = Duration::from_secs(60);
/// Bound on one remote-shell probe; a freshly booted machine can hang the
/// first connection for a long time.
pub const REMOTE_SHELL_ATTEMPT_TIMEOUT: Duration = Duration::from_secs(120);

const SHELL_PROBE_COMMAND: &str = "true";

impl ReadinessPoller {
    /// Polls until a trivial remote command succeeds.
    pub async fn wait_for_shell<M>(
        &self,
        machine: &M,
        timeout: Duration,
    ) -> Result<PollOutcome, ControlSignal>
    where
        M: Machine + ?Sized,
    {
        let subject = format!("machine {}", machine.name());
        self.poll_until_ready(&subject, timeout, |_| async move {
            machine
                .run_remote_command(Some(SHELL_PROBE_COMMAND))
                .await
                .map(drop)
        })
        .await
    }

    /// Polls until `systemctl is-active` reports `service` as active.
    ///
    /// The name is interpolated into a remote shell command, so anything but a
    /// plain unit name is rejected as fatal before the first probe.
    pub async fn wait_for_service<M>(
        &self,
        machine: &M,
        service: &str,
        timeout: Duration,
    ) -> Result<PollOutcome, ControlSignal>
    where
        M: Machine + ?Sized,
    {
        validate_service_name(service)?;
        let subject = format!("service {service} on {}", machine.name());
        let command = service_probe_command(service);
        let command = command.as_str();
        self.poll_until_ready(&subject, timeout, |_| async move {
            machine.run_remote_command(Some(command)).await.map(drop)
        })
        .await
    }
}

/// Waits for the machine's remote shell with the default per-probe bound.
pub async fn ensure_started<M>(machine: &M, timeout: Duration) -> Result<PollOutcome, ControlSignal>
where
    M: Machine + ?Sized,
{
    ReadinessPoller::new()
        .with_attempt_timeout(REMOTE_SHELL_ATTEMPT_TIMEOUT)
        .wait_for_shell(machine, timeout)
        .await
}

/// Waits for `service` to become active. Each probe is bounded only by the
/// remote command itself.
pub async fn ensure_service_started<M>(
    machine: &M,
    service: &str,
    timeout: Duration,
) -> Result<PollOutcome, ControlSignal>
where
    M: Machine + ?Sized,
{
    ReadinessPoller::new()
        .wait_for_service(machine, service, timeout)
        .await
}

fn validate_service_name(service: &str) -> anyhow::Result<()> {
    let valid = !service.is_empty()
        && service
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '@' | '.' | '_' | ':' | '-'));
    if !valid {
        bail!("invalid service name {service:?}: expected a systemd unit name");
    }
    Ok(())
}

fn service_probe_command(service: &str) -> String {
    format!("systemctl is-active --quiet {service}")
}
