//! Runtime glue around the engine: the machine and prompt capabilities,
//! configuration, telemetry, and the provisioning lifecycle runner.

pub mod config;
pub mod machine;
pub mod prompt;
pub mod runner;
pub mod telemetry;
