use crate::config::spec::ReadinessConfig;
use crate::readiness::Orchestrator;
use crate::reporter::{CheckProfile, ReadinessMonitor};
use std::sync::Arc;

/// Shared state exposed to management endpoints.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<ReadinessConfig>,
    pub monitor: ReadinessMonitor,
    pub readiness: CheckProfile,
    pub liveness: CheckProfile,
}

impl AppState {
    pub fn new(config: Arc<ReadinessConfig>, orchestrator: &Orchestrator) -> Self {
        let monitor = ReadinessMonitor::new(orchestrator, config.app.poll_interval);
        let readiness = CheckProfile::new(
            "readiness",
            monitor.clone(),
            config.checks.readiness.clone(),
        );
        let liveness =
            CheckProfile::new("liveness", monitor.clone(), config.checks.liveness.clone());

        Self {
            config,
            monitor,
            readiness,
            liveness,
        }
    }
}
