use std::{
    collections::HashMap,
    sync::{Arc, Mutex, MutexGuard},
};

use anyhow::{anyhow, bail};
use chaincheck::{Machine, MachineFuture, MachineInfo};

const SERVICE_PROBE_PREFIX: &str = "systemctl is-active --quiet ";

/// In-memory machine whose remote shell answers from a script.
///
/// Clones share state, so a test can keep one handle while the runner owns
/// another.
#[derive(Clone)]
pub struct MockMachine {
    name: String,
    state: Arc<Mutex<MockState>>,
}

#[derive(Default)]
struct MockState {
    boot_failures: usize,
    services: HashMap<String, usize>,
    outputs: HashMap<String, Result<String, String>>,
    existing: Vec<MachineInfo>,
    created: bool,
    creations: usize,
    destructions: usize,
    fail_create: bool,
    fail_destroy: bool,
    interactive_sessions: usize,
    commands: Vec<String>,
}

impl MockMachine {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            state: Arc::new(Mutex::new(MockState::default())),
        }
    }

    fn state(&self) -> MutexGuard<'_, MockState> {
        self.state.lock().expect("mock machine poisoned")
    }

    /// The first `failures` shell probes after creation are refused.
    pub fn boot_after(self, failures: usize) -> Self {
        self.state().boot_failures = failures;
        self
    }

    /// `service` reports inactive for `failures` probes, then active.
    pub fn with_service(self, service: &str, failures: usize) -> Self {
        self.state().services.insert(service.to_owned(), failures);
        self
    }

    pub fn with_output(self, command: &str, output: Result<&str, &str>) -> Self {
        self.state().outputs.insert(
            command.to_owned(),
            output.map(str::to_owned).map_err(str::to_owned),
        );
        self
    }

    pub fn with_existing(self, name: &str) -> Self {
        let info = info_for(name);
        self.state().existing.push(info);
        self
    }

    pub fn failing_create(self) -> Self {
        self.state().fail_create = true;
        self
    }

    pub fn failing_destroy(self) -> Self {
        self.state().fail_destroy = true;
        self
    }

    pub fn creations(&self) -> usize {
        self.state().creations
    }

    pub fn destructions(&self) -> usize {
        self.state().destructions
    }

    pub fn is_created(&self) -> bool {
        self.state().created
    }

    pub fn interactive_sessions(&self) -> usize {
        self.state().interactive_sessions
    }

    pub fn commands(&self) -> Vec<String> {
        self.state().commands.clone()
    }

    fn answer(&self, command: &str) -> anyhow::Result<String> {
        let mut state = self.state();
        state.commands.push(command.to_owned());

        if !state.created {
            bail!("ssh: machine {} not found", self.name);
        }

        if command == "true" {
            if state.boot_failures > 0 {
                state.boot_failures -= 1;
                bail!("ssh: connect to host {} port 22: Connection refused", self.name);
            }
            return Ok(String::new());
        }

        if let Some(service) = command.strip_prefix(SERVICE_PROBE_PREFIX) {
            return match state.services.get_mut(service) {
                None => Err(anyhow!("Unit {service}.service could not be found.")),
                Some(0) => Ok(String::new()),
                Some(left) => {
                    *left -= 1;
                    Err(anyhow!("{service} is inactive"))
                }
            };
        }

        match state.outputs.get(command) {
            Some(Ok(stdout)) => Ok(stdout.clone()),
            Some(Err(stderr)) => Err(anyhow!("{command}: {stderr}")),
            None => Ok(String::new()),
        }
    }
}

impl Machine for MockMachine {
    fn name(&self) -> &str {
        &self.name
    }

    fn create(&self) -> MachineFuture<'_, ()> {
        Box::pin(async move {
            let mut state = self.state();
            if state.fail_create {
                bail!("quota exceeded for instances in zone mock-zone-a");
            }
            state.created = true;
            state.creations += 1;
            state.existing.push(info_for(&self.name));
            Ok(())
        })
    }

    fn destroy(&self) -> MachineFuture<'_, ()> {
        Box::pin(async move {
            let mut state = self.state();
            if state.fail_destroy {
                bail!("operation timed out while deleting {}", self.name);
            }
            state.created = false;
            state.destructions += 1;
            let name = self.name.clone();
            state.existing.retain(|info| info.name != name);
            Ok(())
        })
    }

    fn list(&self) -> MachineFuture<'_, Vec<MachineInfo>> {
        Box::pin(async move { Ok(self.state().existing.clone()) })
    }

    fn run_remote_command<'a>(&'a self, command: Option<&'a str>) -> MachineFuture<'a, String> {
        Box::pin(async move {
            match command {
                Some(command) => self.answer(command),
                None => {
                    self.state().interactive_sessions += 1;
                    Ok(String::new())
                }
            }
        })
    }
}

fn info_for(name: &str) -> MachineInfo {
    MachineInfo {
        id: format!("id-{name}"),
        name: name.to_owned(),
        zone: "mock-zone-a".to_owned(),
        creation_timestamp: "2026-10-18T08:00:00Z".to_owned(),
    }
}
