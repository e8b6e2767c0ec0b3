use crate::metrics::metrics;
use crate::readiness::probe::{Probe, ProbeOutcome, PROBE_TIMEOUT_REASON};
use crate::readiness::state::TimeoutBound;
use crate::readiness::SpecError;
use crate::readiness_event;
use crate::runtime::sleep_with_shutdown;
use crate::telemetry::ProbeOutcomeKind;
use serde::Serialize;
use std::time::Duration;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

/// The probe and reason behind the most recent non-success.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct ProbeFailure {
    pub probe: String,
    pub reason: String,
}

/// One coarse-grained milestone: an ordered list of probes that must all
/// succeed within the same pass.
#[derive(Clone, Debug)]
pub struct Phase {
    name: String,
    probes: Vec<Probe>,
    retry_interval: Duration,
    max_duration: Duration,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum PhaseResult {
    Completed {
        passes: u32,
    },
    Failed(ProbeFailure),
    TimedOut {
        bound: TimeoutBound,
        last_failure: Option<ProbeFailure>,
    },
    Cancelled {
        last_failure: Option<ProbeFailure>,
    },
}

/// Outcome of evaluating every probe of a phase once, in order.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum PassResult {
    Completed,
    Transient(ProbeFailure),
    Fatal(ProbeFailure),
}

/// Per-evaluation inputs a phase needs from its dependency.
pub struct PhaseContext<'a> {
    pub dependency: &'a str,
    /// The dependency's global deadline; the tighter of this and the phase's
    /// own bound applies.
    pub deadline: Option<Instant>,
    pub cancel: &'a CancellationToken,
}

impl Phase {
    pub fn new(
        name: impl Into<String>,
        probes: Vec<Probe>,
        retry_interval: Duration,
        max_duration: Duration,
    ) -> Result<Self, SpecError> {
        let name = name.into();
        if name.trim().is_empty() {
            return Err(SpecError::EmptyName { what: "phase" });
        }
        if probes.is_empty() {
            return Err(SpecError::NoProbes { phase: name });
        }
        if retry_interval.is_zero() {
            return Err(SpecError::ZeroDuration {
                field: format!("phase `{name}` retry_interval"),
            });
        }
        if max_duration.is_zero() {
            return Err(SpecError::ZeroDuration {
                field: format!("phase `{name}` max_duration"),
            });
        }
        let mut seen = std::collections::BTreeSet::new();
        for probe in &probes {
            if !seen.insert(probe.name()) {
                return Err(SpecError::DuplicateName {
                    what: "probe",
                    name: probe.name().to_string(),
                    scope: name.clone(),
                });
            }
        }

        Ok(Self {
            name,
            probes,
            retry_interval,
            max_duration,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn probes(&self) -> &[Probe] {
        &self.probes
    }

    pub fn retry_interval(&self) -> Duration {
        self.retry_interval
    }

    pub fn max_duration(&self) -> Duration {
        self.max_duration
    }

    /// Evaluates the probe sequence until every probe succeeds in one pass,
    /// a probe reports fatal, or the effective deadline passes.
    ///
    /// A transient failure restarts the sequence from the first probe after
    /// a fixed `retry_interval`.
    pub async fn run(&self, ctx: &PhaseContext<'_>) -> PhaseResult {
        let started = Instant::now();
        let phase_deadline = started + self.max_duration;
        let (deadline, bound) = match ctx.deadline {
            Some(outer) if outer < phase_deadline => (outer, TimeoutBound::Deadline),
            _ => (phase_deadline, TimeoutBound::Phase),
        };

        let mut passes = 0u32;
        let mut last_failure: Option<ProbeFailure> = None;

        loop {
            if ctx.cancel.is_cancelled() {
                return PhaseResult::Cancelled { last_failure };
            }
            if Instant::now() >= deadline {
                return self.timed_out(ctx, bound, started, passes, last_failure);
            }

            passes += 1;
            let pass = tokio::select! {
                _ = ctx.cancel.cancelled() => {
                    return PhaseResult::Cancelled { last_failure };
                }
                pass = self.run_pass(ctx.dependency, Some(deadline)) => pass,
            };

            match pass {
                PassResult::Completed => {
                    readiness_event!(
                        info,
                        "phase_completed",
                        dependency = ctx.dependency,
                        phase = self.name,
                        passes = passes,
                        elapsed_ms = started.elapsed().as_millis(),
                    );
                    return PhaseResult::Completed { passes };
                }
                PassResult::Fatal(failure) => {
                    readiness_event!(
                        error,
                        "phase_failed",
                        dependency = ctx.dependency,
                        phase = self.name,
                        probe = failure.probe,
                        reason = failure.reason,
                        passes = passes,
                    );
                    return PhaseResult::Failed(failure);
                }
                PassResult::Transient(failure) => {
                    readiness_event!(
                        info,
                        "phase_retry",
                        dependency = ctx.dependency,
                        phase = self.name,
                        probe = failure.probe,
                        reason = failure.reason,
                        attempt = passes,
                        retry_in_ms = self.retry_interval.as_millis(),
                    );
                    last_failure = Some(failure);
                }
            }

            let now = Instant::now();
            if now >= deadline {
                continue;
            }
            let pause = self.retry_interval.min(deadline - now);
            if sleep_with_shutdown(pause, ctx.cancel).await {
                return PhaseResult::Cancelled { last_failure };
            }
        }
    }

    /// Evaluates every probe once, in order, stopping at the first non-success.
    /// Probes are bounded by their own timeout and by `deadline`, if any.
    pub async fn run_pass(&self, dependency: &str, deadline: Option<Instant>) -> PassResult {
        let collector = metrics();
        for probe in &self.probes {
            let remaining = deadline.map(|at| at.saturating_duration_since(Instant::now()));
            let started = Instant::now();
            let outcome = probe.evaluate(remaining).await;
            let elapsed = started.elapsed();

            let kind = match &outcome {
                ProbeOutcome::Success => ProbeOutcomeKind::Success,
                ProbeOutcome::Transient(reason) if reason == PROBE_TIMEOUT_REASON => {
                    ProbeOutcomeKind::Timeout
                }
                ProbeOutcome::Transient(_) => ProbeOutcomeKind::Transient,
                ProbeOutcome::Fatal(_) => ProbeOutcomeKind::Fatal,
            };
            collector.record_probe(dependency, probe.name(), kind, elapsed);

            match outcome {
                ProbeOutcome::Success => {
                    tracing::debug!(
                        dependency = dependency,
                        phase = %self.name,
                        probe = probe.name(),
                        duration_ms = elapsed.as_millis() as u64,
                        "probe succeeded"
                    );
                }
                ProbeOutcome::Transient(reason) => {
                    return PassResult::Transient(ProbeFailure {
                        probe: probe.name().to_string(),
                        reason,
                    });
                }
                ProbeOutcome::Fatal(reason) => {
                    return PassResult::Fatal(ProbeFailure {
                        probe: probe.name().to_string(),
                        reason,
                    });
                }
            }
        }

        PassResult::Completed
    }

    fn timed_out(
        &self,
        ctx: &PhaseContext<'_>,
        bound: TimeoutBound,
        started: Instant,
        passes: u32,
        last_failure: Option<ProbeFailure>,
    ) -> PhaseResult {
        let last_reason = last_failure
            .as_ref()
            .map(|failure| failure.reason.as_str())
            .unwrap_or("no probe evaluated");
        readiness_event!(
            warn,
            "phase_timed_out",
            dependency = ctx.dependency,
            phase = self.name,
            bound = bound.as_str(),
            passes = passes,
            elapsed_ms = started.elapsed().as_millis(),
            reason = last_reason,
        );
        PhaseResult::TimedOut {
            bound,
            last_failure,
        }
    }
}
