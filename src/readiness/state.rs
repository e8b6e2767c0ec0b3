use serde::Serialize;

/// Terminal (or not-yet-terminal) state of one dependency in a run.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DependencyState {
    Pending,
    Ready,
    Degraded,
    Failed,
    TimedOut,
}

impl DependencyState {
    pub fn as_str(self) -> &'static str {
        match self {
            DependencyState::Pending => "PENDING",
            DependencyState::Ready => "READY",
            DependencyState::Degraded => "DEGRADED",
            DependencyState::Failed => "FAILED",
            DependencyState::TimedOut => "TIMED_OUT",
        }
    }

    /// Ready-like states satisfy overall readiness.
    pub fn is_satisfied(self) -> bool {
        matches!(self, DependencyState::Ready | DependencyState::Degraded)
    }

    /// States that make the combined dependency set unsatisfiable.
    pub fn is_blocking(self) -> bool {
        matches!(self, DependencyState::Failed | DependencyState::TimedOut)
    }
}

/// What a dependency's deadline expiring means for the run.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TimeoutPolicy {
    /// The run fails.
    #[default]
    Fatal,
    /// The dependency is reported degraded and the run continues.
    Degrade,
}

impl TimeoutPolicy {
    pub fn as_str(self) -> &'static str {
        match self {
            TimeoutPolicy::Fatal => "fatal",
            TimeoutPolicy::Degrade => "degrade",
        }
    }
}

/// Which bound fired when a dependency timed out.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TimeoutBound {
    /// The phase's own `max_duration`.
    Phase,
    /// The dependency's overall deadline.
    Deadline,
}

impl TimeoutBound {
    pub fn as_str(self) -> &'static str {
        match self {
            TimeoutBound::Phase => "phase",
            TimeoutBound::Deadline => "deadline",
        }
    }
}
