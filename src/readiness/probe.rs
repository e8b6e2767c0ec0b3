use async_trait::async_trait;
use serde::Serialize;
use std::fmt;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::timeout;

/// Reason recorded when a probe exceeds its time bound.
pub const PROBE_TIMEOUT_REASON: &str = "probe timeout";

/// Result of observing one dependency sub-state.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", content = "reason", rename_all = "snake_case")]
pub enum ProbeOutcome {
    Success,
    /// Worth retrying: the dependency may still be starting.
    Transient(String),
    /// Retrying cannot help (wrong credentials, misconfiguration).
    Fatal(String),
}

impl ProbeOutcome {
    pub fn transient(reason: impl Into<String>) -> Self {
        Self::Transient(reason.into())
    }

    pub fn fatal(reason: impl Into<String>) -> Self {
        Self::Fatal(reason.into())
    }

    pub fn is_success(&self) -> bool {
        matches!(self, ProbeOutcome::Success)
    }

    pub fn reason(&self) -> Option<&str> {
        match self {
            ProbeOutcome::Success => None,
            ProbeOutcome::Transient(reason) | ProbeOutcome::Fatal(reason) => Some(reason),
        }
    }
}

/// An idempotent, side-effect-free check against a dependency.
///
/// Implementations only observe. Classifying an error as transient or fatal is
/// the implementation's responsibility: anything a retry could fix is transient.
#[async_trait]
pub trait Check: Send + Sync + 'static {
    async fn check(&self) -> ProbeOutcome;

    /// Short label used in logs and metrics (`tcp`, `postgres`, ...).
    fn kind(&self) -> &'static str {
        "custom"
    }
}

/// Adapter turning an async closure into a [`Check`].
pub struct FnCheck<F> {
    f: F,
}

impl<F> FnCheck<F> {
    pub fn new(f: F) -> Self {
        Self { f }
    }
}

#[async_trait]
impl<F, Fut> Check for FnCheck<F>
where
    F: Fn() -> Fut + Send + Sync + 'static,
    Fut: Future<Output = ProbeOutcome> + Send + 'static,
{
    async fn check(&self) -> ProbeOutcome {
        (self.f)().await
    }
}

/// A named check with an optional time bound.
#[derive(Clone)]
pub struct Probe {
    name: String,
    check: Arc<dyn Check>,
    timeout: Option<Duration>,
}

impl Probe {
    pub fn new(name: impl Into<String>, check: impl Check) -> Self {
        Self {
            name: name.into(),
            check: Arc::new(check),
            timeout: None,
        }
    }

    pub fn from_arc(name: impl Into<String>, check: Arc<dyn Check>) -> Self {
        Self {
            name: name.into(),
            check,
            timeout: None,
        }
    }

    pub fn from_fn<F, Fut>(name: impl Into<String>, f: F) -> Self
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ProbeOutcome> + Send + 'static,
    {
        Self::new(name, FnCheck::new(f))
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn kind(&self) -> &'static str {
        self.check.kind()
    }

    pub fn timeout(&self) -> Option<Duration> {
        self.timeout
    }

    /// Runs the check, bounded by the probe's own timeout and by `remaining`
    /// (whichever is tighter). Exceeding the bound is reported as transient.
    pub async fn evaluate(&self, remaining: Option<Duration>) -> ProbeOutcome {
        let bound = match (self.timeout, remaining) {
            (Some(own), Some(outer)) => Some(own.min(outer)),
            (Some(own), None) => Some(own),
            (None, outer) => outer,
        };

        match bound {
            Some(limit) => match timeout(limit, self.check.check()).await {
                Ok(outcome) => outcome,
                Err(_) => ProbeOutcome::transient(PROBE_TIMEOUT_REASON),
            },
            None => self.check.check().await,
        }
    }
}

impl fmt::Debug for Probe {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Probe")
            .field("name", &self.name)
            .field("kind", &self.check.kind())
            .field("timeout", &self.timeout)
            .finish()
    }
}
