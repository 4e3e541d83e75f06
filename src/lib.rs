pub mod engine;
pub mod readiness;
pub mod runtime;

pub use engine::bypass::{allow_assertion, allow_assertion_with, resume_bypass, start_bypass};
pub use engine::chain::Chain;
pub use engine::executor::{Engine, FailureObserver, SectionFuture};
pub use engine::report::{MemorySink, ReportSink, StdoutSink, TracingSink};
pub use engine::signal::{AssertionFailure, BypassCode, ControlSignal, SignalKind};
pub use readiness::poller::{PollOutcome, PollTimeout, ReadinessPoller};
pub use readiness::probes::{ensure_service_started, ensure_started};
pub use runtime::config::{RunConfig, RunConfigBuilder, RunConfigParams};
pub use runtime::machine::{Machine, MachineFuture, MachineInfo};
pub use runtime::prompt::{ConsolePrompter, PromptFuture, Prompter, UnattendedPrompter};
pub use runtime::runner::{RunSummary, Runner, SuiteContext, SuiteFuture, TestSuite};
pub use runtime::telemetry::{init_tracing, Telemetry, TelemetrySnapshot};
