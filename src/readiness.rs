//! Waiting for asynchronous remote state (machine boot, service activation)
//! before the checks that depend on it.

pub mod poller;
pub mod probes;
