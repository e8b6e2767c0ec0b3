use crate::metrics::metrics;
use crate::readiness::phase::{PassResult, Phase, PhaseContext, PhaseResult, ProbeFailure};
use crate::readiness::state::{DependencyState, TimeoutBound, TimeoutPolicy};
use crate::readiness_event;
use serde::Serialize;
use std::collections::BTreeSet;
use std::time::Duration;
use thiserror::Error;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

/// A malformed dependency definition, detected before any probe runs.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum SpecError {
    #[error("{what} name must not be empty")]
    EmptyName { what: &'static str },
    #[error("dependency `{dependency}` must declare at least one phase")]
    NoPhases { dependency: String },
    #[error("phase `{phase}` must declare at least one probe")]
    NoProbes { phase: String },
    #[error("{field} must be greater than zero")]
    ZeroDuration { field: String },
    #[error("duplicate {what} `{name}` in {scope}")]
    DuplicateName {
        what: &'static str,
        name: String,
        scope: String,
    },
    #[error("no dependencies to orchestrate")]
    NoDependencies,
}

/// Declarative description of one dependency's readiness path.
#[derive(Clone, Debug)]
pub struct DependencySpec {
    id: String,
    phases: Vec<Phase>,
    deadline: Duration,
    on_timeout: TimeoutPolicy,
}

/// How one dependency's evaluation resolved.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(tag = "state", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DependencyResult {
    /// Not resolved: still starting (serve mode) or cancelled (gate mode).
    Pending {
        phase: String,
        last_failure: Option<ProbeFailure>,
    },
    Ready,
    /// Timed out (or not yet ready) under `on_timeout: degrade`.
    Degraded {
        phase: String,
        bound: Option<TimeoutBound>,
        last_failure: Option<ProbeFailure>,
    },
    Failed {
        phase: String,
        failure: ProbeFailure,
    },
    TimedOut {
        phase: String,
        bound: TimeoutBound,
        last_failure: Option<ProbeFailure>,
    },
}

impl DependencyResult {
    pub fn state(&self) -> DependencyState {
        match self {
            DependencyResult::Pending { .. } => DependencyState::Pending,
            DependencyResult::Ready => DependencyState::Ready,
            DependencyResult::Degraded { .. } => DependencyState::Degraded,
            DependencyResult::Failed { .. } => DependencyState::Failed,
            DependencyResult::TimedOut { .. } => DependencyState::TimedOut,
        }
    }

    pub fn phase(&self) -> Option<&str> {
        match self {
            DependencyResult::Ready => None,
            DependencyResult::Pending { phase, .. }
            | DependencyResult::Degraded { phase, .. }
            | DependencyResult::Failed { phase, .. }
            | DependencyResult::TimedOut { phase, .. } => Some(phase),
        }
    }

    pub fn last_failure(&self) -> Option<&ProbeFailure> {
        match self {
            DependencyResult::Ready => None,
            DependencyResult::Failed { failure, .. } => Some(failure),
            DependencyResult::Pending { last_failure, .. }
            | DependencyResult::Degraded { last_failure, .. }
            | DependencyResult::TimedOut { last_failure, .. } => last_failure.as_ref(),
        }
    }
}

/// A resolved dependency together with what is needed to diagnose it.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct DependencyReport {
    pub dependency: String,
    #[serde(flatten)]
    pub result: DependencyResult,
    pub phases_completed: usize,
    pub phases_total: usize,
    pub elapsed_ms: u64,
}

impl DependencyReport {
    pub fn state(&self) -> DependencyState {
        self.result.state()
    }
}

impl DependencySpec {
    pub fn new(
        id: impl Into<String>,
        phases: Vec<Phase>,
        deadline: Duration,
    ) -> Result<Self, SpecError> {
        let id = id.into();
        if id.trim().is_empty() {
            return Err(SpecError::EmptyName { what: "dependency" });
        }
        if phases.is_empty() {
            return Err(SpecError::NoPhases { dependency: id });
        }
        if deadline.is_zero() {
            return Err(SpecError::ZeroDuration {
                field: format!("dependency `{id}` deadline"),
            });
        }
        let mut seen = BTreeSet::new();
        for phase in &phases {
            if !seen.insert(phase.name()) {
                return Err(SpecError::DuplicateName {
                    what: "phase",
                    name: phase.name().to_string(),
                    scope: format!("dependency `{id}`"),
                });
            }
        }

        Ok(Self {
            id,
            phases,
            deadline,
            on_timeout: TimeoutPolicy::Fatal,
        })
    }

    pub fn with_timeout_policy(mut self, policy: TimeoutPolicy) -> Self {
        self.on_timeout = policy;
        self
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn phases(&self) -> &[Phase] {
        &self.phases
    }

    pub fn deadline(&self) -> Duration {
        self.deadline
    }

    pub fn timeout_policy(&self) -> TimeoutPolicy {
        self.on_timeout
    }

    /// Runs the phases strictly in order against one deadline computed now.
    ///
    /// A phase that fails or times out ends the evaluation with that phase
    /// named; later phases are never started.
    pub async fn evaluate(&self, cancel: &CancellationToken) -> DependencyReport {
        let started = Instant::now();
        let deadline = started + self.deadline;
        let ctx = PhaseContext {
            dependency: &self.id,
            deadline: Some(deadline),
            cancel,
        };

        readiness_event!(
            info,
            "dependency_started",
            dependency = self.id,
            phases = self.phases.len(),
            deadline_ms = self.deadline.as_millis(),
        );

        let mut completed = 0usize;
        let mut result = DependencyResult::Ready;

        for phase in &self.phases {
            if cancel.is_cancelled() {
                result = DependencyResult::Pending {
                    phase: phase.name().to_string(),
                    last_failure: None,
                };
                break;
            }
            if Instant::now() >= deadline {
                result = self.timed_out(phase.name(), TimeoutBound::Deadline, None);
                break;
            }

            match phase.run(&ctx).await {
                PhaseResult::Completed { .. } => {
                    completed += 1;
                }
                PhaseResult::Failed(failure) => {
                    result = DependencyResult::Failed {
                        phase: phase.name().to_string(),
                        failure,
                    };
                    break;
                }
                PhaseResult::TimedOut {
                    bound,
                    last_failure,
                } => {
                    result = self.timed_out(phase.name(), bound, last_failure);
                    break;
                }
                PhaseResult::Cancelled { last_failure } => {
                    result = DependencyResult::Pending {
                        phase: phase.name().to_string(),
                        last_failure,
                    };
                    break;
                }
            }
        }

        self.finish(result, completed, started)
    }

    /// Evaluates each phase once, in order, without sleeping or retrying.
    ///
    /// Used for point-in-time health queries: a transient failure leaves the
    /// dependency pending (or degraded under `on_timeout: degrade`).
    pub async fn evaluate_once(&self) -> DependencyReport {
        let started = Instant::now();
        let mut completed = 0usize;
        let mut result = DependencyResult::Ready;

        for phase in &self.phases {
            match phase.run_pass(&self.id, None).await {
                PassResult::Completed => completed += 1,
                PassResult::Fatal(failure) => {
                    result = DependencyResult::Failed {
                        phase: phase.name().to_string(),
                        failure,
                    };
                    break;
                }
                PassResult::Transient(failure) => {
                    result = match self.on_timeout {
                        TimeoutPolicy::Fatal => DependencyResult::Pending {
                            phase: phase.name().to_string(),
                            last_failure: Some(failure),
                        },
                        TimeoutPolicy::Degrade => DependencyResult::Degraded {
                            phase: phase.name().to_string(),
                            bound: None,
                            last_failure: Some(failure),
                        },
                    };
                    break;
                }
            }
        }

        self.finish(result, completed, started)
    }

    fn timed_out(
        &self,
        phase: &str,
        bound: TimeoutBound,
        last_failure: Option<ProbeFailure>,
    ) -> DependencyResult {
        match self.on_timeout {
            TimeoutPolicy::Fatal => DependencyResult::TimedOut {
                phase: phase.to_string(),
                bound,
                last_failure,
            },
            TimeoutPolicy::Degrade => DependencyResult::Degraded {
                phase: phase.to_string(),
                bound: Some(bound),
                last_failure,
            },
        }
    }

    fn finish(
        &self,
        result: DependencyResult,
        completed: usize,
        started: Instant,
    ) -> DependencyReport {
        let elapsed = started.elapsed();
        let state = result.state();
        metrics().record_dependency_state(&self.id, state.as_str(), elapsed);

        match state {
            DependencyState::Ready => readiness_event!(
                info,
                "dependency_ready",
                dependency = self.id,
                elapsed_ms = elapsed.as_millis(),
            ),
            DependencyState::Pending => readiness_event!(
                debug,
                "dependency_pending",
                dependency = self.id,
                phase = result.phase().unwrap_or_default(),
                elapsed_ms = elapsed.as_millis(),
            ),
            _ => readiness_event!(
                warn,
                "dependency_unready",
                dependency = self.id,
                phase = result.phase().unwrap_or_default(),
                state = state.as_str(),
                elapsed_ms = elapsed.as_millis(),
            ),
        }

        DependencyReport {
            dependency: self.id.clone(),
            result,
            phases_completed: completed,
            phases_total: self.phases.len(),
            elapsed_ms: std::cmp::min(elapsed.as_millis(), u128::from(u64::MAX)) as u64,
        }
    }
}
