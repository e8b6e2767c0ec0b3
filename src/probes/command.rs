use crate::readiness::{Check, ProbeOutcome};
use async_trait::async_trait;
use std::io::ErrorKind;
use std::process::Stdio;
use tokio::process::Command;

const STDERR_TAIL: usize = 200;

/// Runs a read-only command; exit status 0 is success.
///
/// The child is killed if the evaluation is abandoned (timeout or
/// cancellation).
#[derive(Clone, Debug)]
pub struct CommandCheck {
    program: String,
    args: Vec<String>,
    fatal_exit_codes: Vec<i32>,
}

impl CommandCheck {
    pub fn new(program: impl Into<String>, args: Vec<String>) -> Self {
        Self {
            program: program.into(),
            args,
            fatal_exit_codes: Vec::new(),
        }
    }

    /// Exit codes meaning "misconfigured" rather than "not ready yet".
    pub fn with_fatal_exit_codes(mut self, codes: Vec<i32>) -> Self {
        self.fatal_exit_codes = codes;
        self
    }
}

#[async_trait]
impl Check for CommandCheck {
    async fn check(&self) -> ProbeOutcome {
        let output = Command::new(&self.program)
            .args(&self.args)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .output()
            .await;

        let output = match output {
            Ok(output) => output,
            Err(err) if err.kind() == ErrorKind::NotFound => {
                return ProbeOutcome::fatal(format!("command `{}` not found", self.program));
            }
            Err(err) => {
                return ProbeOutcome::transient(format!(
                    "command `{}` could not start: {err}",
                    self.program
                ));
            }
        };

        if output.status.success() {
            return ProbeOutcome::Success;
        }

        let stderr = String::from_utf8_lossy(&output.stderr);
        let tail = stderr_tail(stderr.trim());
        let reason = if tail.is_empty() {
            format!("command `{}` exited with {}", self.program, output.status)
        } else {
            format!(
                "command `{}` exited with {}: {tail}",
                self.program, output.status
            )
        };

        match output.status.code() {
            Some(code) if self.fatal_exit_codes.contains(&code) => ProbeOutcome::fatal(reason),
            _ => ProbeOutcome::transient(reason),
        }
    }

    fn kind(&self) -> &'static str {
        "command"
    }
}

fn stderr_tail(stderr: &str) -> &str {
    if stderr.len() <= STDERR_TAIL {
        return stderr;
    }
    let mut start = stderr.len() - STDERR_TAIL;
    while !stderr.is_char_boundary(start) {
        start += 1;
    }
    &stderr[start..]
}
