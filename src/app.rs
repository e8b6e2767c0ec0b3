use crate::app_state::AppState;
use crate::config::spec::ReadinessConfig;
use crate::config::ReadygateConfig;
use crate::connectors::management::ManagementServer;
use crate::error::{Context, Result};
use crate::integration::ProbeFactory;
use crate::readiness::Orchestrator;
use crate::reporter::{gate_and_exec, ExecCommand, ReadinessMonitor, StatusReport, EXIT_READY};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// A validated dependency set, ready to gate a command or serve checks.
pub struct ReadygateApp {
    config: Arc<ReadinessConfig>,
    orchestrator: Orchestrator,
    shutdown: CancellationToken,
}

impl ReadygateApp {
    /// Loads the dependency definitions and builds every probe. All
    /// configuration errors surface here, before any probe runs.
    pub fn initialise(settings: &ReadygateConfig) -> Result<Self> {
        let config = settings.readiness_config().with_context(|| match &settings.spec_path {
            Some(path) => format!("failed to load dependency spec from {}", path.display()),
            None => "failed to build default dependency set from environment".to_string(),
        })?;
        Self::from_config(config, &ProbeFactory::new())
    }

    pub fn from_config(config: ReadinessConfig, factory: &ProbeFactory) -> Result<Self> {
        let orchestrator = factory
            .build_orchestrator(&config)
            .context("failed to construct dependency probes")?;

        for spec in orchestrator.specs() {
            tracing::info!(
                dependency = spec.id(),
                phases = spec.phases().len(),
                deadline_ms = spec.deadline().as_millis() as u64,
                on_timeout = spec.timeout_policy().as_str(),
                "dependency loaded"
            );
        }

        Ok(Self {
            config: Arc::new(config),
            orchestrator,
            shutdown: CancellationToken::new(),
        })
    }

    pub fn config(&self) -> &ReadinessConfig {
        &self.config
    }

    pub fn orchestrator(&self) -> &Orchestrator {
        &self.orchestrator
    }

    pub fn shutdown_token(&self) -> CancellationToken {
        self.shutdown.clone()
    }

    /// Waits for every dependency, then execs `command` (or returns
    /// [`EXIT_READY`] when there is none). Returns the process exit status.
    pub async fn gate(&self, command: Option<ExecCommand>) -> i32 {
        gate_and_exec(&self.orchestrator, self.shutdown.clone(), move || {
            match command {
                Some(command) => command.exec(),
                None => EXIT_READY,
            }
        })
        .await
    }

    /// One uncached single-pass evaluation.
    pub async fn check(&self) -> Arc<StatusReport> {
        ReadinessMonitor::new(&self.orchestrator, Duration::ZERO)
            .current_status()
            .await
    }

    pub fn state(&self) -> AppState {
        AppState::new(Arc::clone(&self.config), &self.orchestrator)
    }

    /// Serves the management endpoints until shutdown.
    pub async fn serve(self) -> Result<()> {
        let management = self.config.management.clone().unwrap_or_default();
        let server = ManagementServer::build(&management)?
            .ok_or_else(|| crate::err!("management section enables no endpoints"))?;

        let state = self.state();
        tracing::info!(
            dependencies = self.orchestrator.specs().len(),
            addr = %server.addr(),
            "readygate serving health checks; press Ctrl+C to stop"
        );

        server.serve(state, self.shutdown.clone()).await
    }
}
