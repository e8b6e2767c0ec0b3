use crate::readiness::dependency::{DependencyReport, DependencyResult};
use crate::readiness::orchestrator::RunResult;
use crate::telemetry::push_field;
use std::fmt;

/// How an unready dependency is classified for alerting.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FailureClass {
    Fatal,
    Timeout,
}

impl FailureClass {
    pub fn as_str(self) -> &'static str {
        match self {
            FailureClass::Fatal => "fatal",
            FailureClass::Timeout => "timeout",
        }
    }
}

/// One line of the failure report: `dependency=.. phase=.. probe=.. class=.. reason=..`.
pub struct FailureLine<'a> {
    report: &'a DependencyReport,
}

impl<'a> FailureLine<'a> {
    /// `None` unless the dependency failed or timed out.
    pub fn new(report: &'a DependencyReport) -> Option<Self> {
        report.state().is_blocking().then_some(Self { report })
    }

    pub fn class(&self) -> FailureClass {
        match self.report.result {
            DependencyResult::Failed { .. } => FailureClass::Fatal,
            _ => FailureClass::Timeout,
        }
    }
}

impl fmt::Display for FailureLine<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let result = &self.report.result;
        let failure = result.last_failure();

        let mut line = String::new();
        push_field(&mut line, "dependency", &self.report.dependency);
        push_field(&mut line, "phase", result.phase().unwrap_or_default());
        push_field(
            &mut line,
            "probe",
            failure.map(|failure| failure.probe.as_str()).unwrap_or(""),
        );
        push_field(&mut line, "class", self.class().as_str());
        if let DependencyResult::TimedOut { bound, .. } = result {
            push_field(&mut line, "bound", bound.as_str());
        }
        let reason = match (result, failure) {
            (_, Some(failure)) => failure.reason.clone(),
            (DependencyResult::TimedOut { bound, .. }, None) => {
                format!("{} bound elapsed before any probe ran", bound.as_str())
            }
            _ => String::new(),
        };
        push_field(&mut line, "reason", &reason);
        push_field(&mut line, "elapsed_ms", &self.report.elapsed_ms.to_string());
        f.write_str(&line)
    }
}

/// Renders one line per failed or timed-out dependency.
pub fn failure_lines(result: &RunResult) -> Vec<String> {
    result
        .reports()
        .iter()
        .filter_map(FailureLine::new)
        .map(|line| line.to_string())
        .collect()
}
