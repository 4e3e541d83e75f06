//! Provisioning capability consumed by the lifecycle runner and the readiness
//! probes. Concrete backends live outside this crate.

use anyhow::Result;
use futures::future::BoxFuture;
use std::fmt;

pub type MachineFuture<'a, T> = BoxFuture<'a, Result<T>>;

/// One machine as reported by the provisioning backend.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MachineInfo {
    pub id: String,
    pub name: String,
    pub zone: String,
    pub creation_timestamp: String,
}

impl fmt::Display for MachineInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} ({}) in {}, created {}",
            self.name, self.id, self.zone, self.creation_timestamp
        )
    }
}

/// A remote machine that can be provisioned, reached over a remote shell and
/// torn down.
pub trait Machine: Send + Sync {
    /// Name the machine is provisioned under.
    fn name(&self) -> &str;

    fn create(&self) -> MachineFuture<'_, ()>;

    fn destroy(&self) -> MachineFuture<'_, ()>;

    /// Machines currently known to the backend, including this one if it exists.
    fn list(&self) -> MachineFuture<'_, Vec<MachineInfo>>;

    /// Runs `command` over the remote shell and returns its stdout. `None`
    /// opens an interactive session attached to the operator's terminal.
    fn run_remote_command<'a>(&'a self, command: Option<&'a str>) -> MachineFuture<'a, String>;
}
