use crate::config::spec::CheckConfig;
use crate::metrics::metrics;
use crate::readiness::{DependencyReport, DependencySpec, Orchestrator};
use futures_util::future::join_all;
use serde::Serialize;
use std::sync::{Arc, Mutex as StdMutex};
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::Instant;

/// Point-in-time readiness of a dependency set.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct StatusReport {
    pub ready: bool,
    pub dependencies: Vec<DependencyReport>,
}

impl StatusReport {
    fn from_reports(dependencies: Vec<DependencyReport>) -> Self {
        let ready = dependencies
            .iter()
            .all(|report| report.state().is_satisfied());
        Self {
            ready,
            dependencies,
        }
    }

    /// The same status restricted to `names`, with `ready` recomputed.
    pub fn subset(&self, names: &[String]) -> Self {
        let dependencies = self
            .dependencies
            .iter()
            .filter(|report| names.iter().any(|name| name == &report.dependency))
            .cloned()
            .collect();
        Self::from_reports(dependencies)
    }
}

struct CachedStatus {
    report: Arc<StatusReport>,
    generation: u64,
    observed_at: Instant,
}

/// Answers repeated status queries from a cached single-pass evaluation.
///
/// A refresh evaluates every phase of every dependency once, concurrently
/// across dependencies, without sleeping. Within the cache window the same
/// report is returned and no probe runs. The cache lock is held during a
/// refresh so concurrent callers share one evaluation.
#[derive(Clone)]
pub struct ReadinessMonitor {
    specs: Arc<[Arc<DependencySpec>]>,
    cache_window: Duration,
    cache: Arc<Mutex<Option<CachedStatus>>>,
}

impl ReadinessMonitor {
    pub fn new(orchestrator: &Orchestrator, cache_window: Duration) -> Self {
        Self {
            specs: orchestrator.specs().iter().cloned().collect(),
            cache_window,
            cache: Arc::new(Mutex::new(None)),
        }
    }

    pub fn cache_window(&self) -> Duration {
        self.cache_window
    }

    pub async fn current_status(&self) -> Arc<StatusReport> {
        self.status_within(self.cache_window).await
    }

    /// Like [`current_status`](Self::current_status) but accepting a cached
    /// result up to `window` old.
    pub async fn status_within(&self, window: Duration) -> Arc<StatusReport> {
        self.observe(window).await.1
    }

    async fn observe(&self, window: Duration) -> (u64, Arc<StatusReport>) {
        let mut guard = self.cache.lock().await;
        let now = Instant::now();

        if let Some(cached) = guard.as_ref() {
            if !window.is_zero() && now.duration_since(cached.observed_at) < window {
                metrics().inc_status_cache_hits();
                return (cached.generation, Arc::clone(&cached.report));
            }
        }

        let reports = join_all(self.specs.iter().map(|spec| spec.evaluate_once())).await;
        // Stamped after the probes return so a slow refresh is still fresh.
        let observed_at = Instant::now();
        let report = Arc::new(StatusReport::from_reports(reports));
        let generation = guard.as_ref().map_or(1, |cached| cached.generation + 1);
        metrics().inc_status_refreshes();
        tracing::debug!(
            ready = report.ready,
            dependencies = report.dependencies.len(),
            generation,
            "readiness status refreshed"
        );

        *guard = Some(CachedStatus {
            report: Arc::clone(&report),
            generation,
            observed_at,
        });
        (generation, report)
    }
}

/// Verdict of one externally consumed check.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct CheckVerdict {
    pub check: &'static str,
    pub healthy: bool,
    pub consecutive_failures: u32,
    pub failure_threshold: u32,
    #[serde(flatten)]
    pub status: StatusReport,
}

#[derive(Default)]
struct ThresholdState {
    last_generation: u64,
    consecutive_failures: u32,
}

/// One independently configured check (readiness or liveness) over a shared
/// monitor: its own cache window, dependency subset and failure threshold.
///
/// Failures are counted per fresh observation, so polling faster than the
/// cache window does not trip the threshold sooner.
#[derive(Clone)]
pub struct CheckProfile {
    name: &'static str,
    monitor: ReadinessMonitor,
    config: CheckConfig,
    state: Arc<StdMutex<ThresholdState>>,
}

impl CheckProfile {
    pub fn new(name: &'static str, monitor: ReadinessMonitor, config: CheckConfig) -> Self {
        Self {
            name,
            monitor,
            config,
            state: Arc::new(StdMutex::new(ThresholdState::default())),
        }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn cache(&self) -> Duration {
        self.config.cache
    }

    pub async fn evaluate(&self) -> CheckVerdict {
        let (generation, report) = self.monitor.observe(self.config.cache).await;
        let status = match &self.config.dependencies {
            Some(names) => report.subset(names),
            None => StatusReport::clone(&report),
        };

        let consecutive_failures = {
            let mut state = self.state.lock().expect("check threshold lock poisoned");
            if generation != state.last_generation {
                state.last_generation = generation;
                if status.ready {
                    state.consecutive_failures = 0;
                } else {
                    state.consecutive_failures = state.consecutive_failures.saturating_add(1);
                }
            }
            state.consecutive_failures
        };

        let healthy = consecutive_failures < self.config.failure_threshold;
        if !healthy {
            tracing::debug!(
                check = self.name,
                consecutive_failures,
                failure_threshold = self.config.failure_threshold,
                "check reporting failure"
            );
        }

        CheckVerdict {
            check: self.name,
            healthy,
            consecutive_failures,
            failure_threshold: self.config.failure_threshold,
            status,
        }
    }
}
