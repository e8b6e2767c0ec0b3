use crate::metrics::metrics;
use crate::readiness::{failure_lines, Orchestrator, RunResult};
use std::ffi::OsString;
use std::io::{self, Write};
use tokio_util::sync::CancellationToken;

/// Handed off to the downstream command (or, without one, all ready).
pub const EXIT_READY: i32 = 0;
/// At least one dependency failed, timed out, or the wait was interrupted.
pub const EXIT_DEPENDENCY_FAILURE: i32 = 1;
/// The dependency definitions were malformed; no probe ran.
pub const EXIT_CONFIG_ERROR: i32 = 2;
/// Every dependency was ready but the downstream command could not start.
pub const EXIT_EXEC_FAILURE: i32 = 3;

/// Blocks on the orchestrator, then either transfers control to
/// `on_success` or writes the failure report to stderr.
///
/// `on_success` normally does not return (see [`ExecCommand::exec`]); when it
/// does, its value becomes the exit status.
pub async fn gate_and_exec<F>(
    orchestrator: &Orchestrator,
    shutdown: CancellationToken,
    on_success: F,
) -> i32
where
    F: FnOnce() -> i32,
{
    metrics().inc_gate_runs();
    let result = orchestrator.run_with_shutdown(shutdown).await;

    if result.is_ready() {
        tracing::info!(
            dependencies = result.reports().len(),
            "all dependencies ready; handing off"
        );
        return on_success();
    }

    let stderr = io::stderr();
    let mut handle = stderr.lock();
    if let Err(err) = write_failure_report(&result, &mut handle) {
        tracing::error!(error = %err, "failed to write failure report");
    }
    EXIT_DEPENDENCY_FAILURE
}

/// One line per failed or timed-out dependency. A run that stopped without
/// any (shutdown while still waiting) gets a single `interrupted` line.
pub fn write_failure_report(result: &RunResult, out: &mut impl Write) -> io::Result<()> {
    let lines = failure_lines(result);
    if lines.is_empty() {
        let pending = result
            .reports()
            .iter()
            .filter(|report| !report.state().is_satisfied())
            .map(|report| report.dependency.as_str())
            .collect::<Vec<_>>()
            .join(",");
        writeln!(out, "class=interrupted pending={pending}")?;
    } else {
        for line in lines {
            writeln!(out, "{line}")?;
        }
    }
    out.flush()
}

/// The downstream command given after `--`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ExecCommand {
    program: OsString,
    args: Vec<OsString>,
}

impl ExecCommand {
    pub fn new(program: impl Into<OsString>, args: Vec<OsString>) -> Self {
        Self {
            program: program.into(),
            args,
        }
    }

    pub fn program(&self) -> &OsString {
        &self.program
    }

    /// Replaces the current process image. Only returns if the command could
    /// not be started.
    #[cfg(unix)]
    pub fn exec(self) -> i32 {
        use std::os::unix::process::CommandExt;

        let err = std::process::Command::new(&self.program)
            .args(&self.args)
            .exec();
        tracing::error!(
            program = %self.program.to_string_lossy(),
            error = %err,
            "failed to exec downstream command"
        );
        eprintln!(
            "class=exec program={:?} reason={:?}",
            self.program.to_string_lossy(),
            err.to_string()
        );
        EXIT_EXEC_FAILURE
    }

    /// Spawns the command, waits for it and propagates its exit status.
    #[cfg(not(unix))]
    pub fn exec(self) -> i32 {
        match std::process::Command::new(&self.program)
            .args(&self.args)
            .status()
        {
            Ok(status) => status.code().unwrap_or(EXIT_DEPENDENCY_FAILURE),
            Err(err) => {
                tracing::error!(
                    program = %self.program.to_string_lossy(),
                    error = %err,
                    "failed to start downstream command"
                );
                eprintln!(
                    "class=exec program={:?} reason={:?}",
                    self.program.to_string_lossy(),
                    err.to_string()
                );
                EXIT_EXEC_FAILURE
            }
        }
    }
}
