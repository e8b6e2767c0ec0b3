pub mod dependency;
pub mod orchestrator;
pub mod phase;
pub mod probe;
pub mod report;
pub mod state;

pub use dependency::{DependencyReport, DependencyResult, DependencySpec, SpecError};
pub use orchestrator::{Orchestrator, RunResult};
pub use phase::{PassResult, Phase, PhaseContext, PhaseResult, ProbeFailure};
pub use probe::{Check, FnCheck, Probe, ProbeOutcome, PROBE_TIMEOUT_REASON};
pub use report::{failure_lines, FailureClass, FailureLine};
pub use state::{DependencyState, TimeoutBound, TimeoutPolicy};
