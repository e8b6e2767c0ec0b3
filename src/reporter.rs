//! Adapters from orchestrator state to the two external reporting modes:
//! gating a downstream command and answering health queries.

pub mod gate;
pub mod serve;

pub use gate::{
    gate_and_exec, write_failure_report, ExecCommand, EXIT_CONFIG_ERROR,
    EXIT_DEPENDENCY_FAILURE, EXIT_EXEC_FAILURE, EXIT_READY,
};
pub use serve::{CheckProfile, CheckVerdict, ReadinessMonitor, StatusReport};
