use crate::readiness::dependency::{DependencyReport, DependencyResult, DependencySpec, SpecError};
use crate::readiness::phase::ProbeFailure;
use serde::Serialize;
use std::collections::BTreeSet;
use std::sync::{Arc, OnceLock};
use tokio::task::JoinSet;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

/// Aggregate outcome of one orchestrated run.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", content = "dependencies", rename_all = "snake_case")]
pub enum RunResult {
    AllReady(Vec<DependencyReport>),
    PartialFailure(Vec<DependencyReport>),
}

impl RunResult {
    pub fn is_ready(&self) -> bool {
        matches!(self, RunResult::AllReady(_))
    }

    pub fn reports(&self) -> &[DependencyReport] {
        match self {
            RunResult::AllReady(reports) | RunResult::PartialFailure(reports) => reports,
        }
    }

    /// Dependencies that failed or timed out.
    pub fn failures(&self) -> impl Iterator<Item = &DependencyReport> {
        self.reports()
            .iter()
            .filter(|report| report.state().is_blocking())
    }
}

/// Runs independent dependency specs concurrently and aggregates them.
#[derive(Clone, Debug)]
pub struct Orchestrator {
    specs: Vec<Arc<DependencySpec>>,
}

/// Shared by every dependency task; written once by the first task that
/// makes the run unsatisfiable.
struct RunAggregate {
    first_failure: OnceLock<String>,
    cancel: CancellationToken,
}

impl RunAggregate {
    fn resolve_failure(&self, dependency: &str) -> bool {
        if self.first_failure.set(dependency.to_string()).is_ok() {
            self.cancel.cancel();
            true
        } else {
            false
        }
    }
}

impl Orchestrator {
    pub fn new(specs: Vec<DependencySpec>) -> Result<Self, SpecError> {
        if specs.is_empty() {
            return Err(SpecError::NoDependencies);
        }
        let mut seen = BTreeSet::new();
        for spec in &specs {
            if !seen.insert(spec.id().to_string()) {
                return Err(SpecError::DuplicateName {
                    what: "dependency",
                    name: spec.id().to_string(),
                    scope: "orchestrator".to_string(),
                });
            }
        }

        Ok(Self {
            specs: specs.into_iter().map(Arc::new).collect(),
        })
    }

    pub fn specs(&self) -> &[Arc<DependencySpec>] {
        &self.specs
    }

    pub async fn run(&self) -> RunResult {
        self.run_with_shutdown(CancellationToken::new()).await
    }

    /// Evaluates every spec in its own task. The first dependency to fail or
    /// time out cancels the rest; cancelled dependencies are reported pending.
    /// Cancelling `shutdown` stops the run the same way.
    pub async fn run_with_shutdown(&self, shutdown: CancellationToken) -> RunResult {
        let started = Instant::now();
        let aggregate = Arc::new(RunAggregate {
            first_failure: OnceLock::new(),
            cancel: shutdown.child_token(),
        });

        let mut tasks = JoinSet::new();
        for (index, spec) in self.specs.iter().enumerate() {
            let spec = Arc::clone(spec);
            let aggregate = Arc::clone(&aggregate);
            tasks.spawn(async move {
                let report = spec.evaluate(&aggregate.cancel).await;
                if report.state().is_blocking() && aggregate.resolve_failure(spec.id()) {
                    tracing::warn!(
                        dependency = spec.id(),
                        state = report.state().as_str(),
                        "dependency unsatisfiable; cancelling remaining dependencies"
                    );
                }
                (index, report)
            });
        }

        let mut slots: Vec<Option<DependencyReport>> = vec![None; self.specs.len()];
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok((index, report)) => slots[index] = Some(report),
                Err(err) => {
                    tracing::error!(error = %err, "dependency task terminated abnormally");
                }
            }
        }

        let reports: Vec<DependencyReport> = slots
            .into_iter()
            .zip(self.specs.iter())
            .map(|(slot, spec)| slot.unwrap_or_else(|| crashed_report(spec, &aggregate)))
            .collect();

        let all_ready = reports.iter().all(|report| report.state().is_satisfied());
        tracing::info!(
            dependencies = reports.len(),
            ready = all_ready,
            first_failure = aggregate.first_failure.get().map(String::as_str).unwrap_or(""),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "orchestrator run resolved"
        );

        if all_ready {
            RunResult::AllReady(reports)
        } else {
            RunResult::PartialFailure(reports)
        }
    }
}

fn crashed_report(spec: &DependencySpec, aggregate: &RunAggregate) -> DependencyReport {
    aggregate.resolve_failure(spec.id());
    let phase = spec
        .phases()
        .first()
        .map(|phase| phase.name().to_string())
        .unwrap_or_default();
    DependencyReport {
        dependency: spec.id().to_string(),
        result: DependencyResult::Failed {
            phase,
            failure: ProbeFailure {
                probe: String::new(),
                reason: "dependency task panicked".to_string(),
            },
        },
        phases_completed: 0,
        phases_total: spec.phases().len(),
        elapsed_ms: 0,
    }
}
