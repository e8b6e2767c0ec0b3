use crate::telemetry::{runtime_counters, ProbeOutcomeKind, RuntimeCounters};
use std::sync::OnceLock;
use std::time::Duration;

pub use crate::telemetry::{
    DependencyStateSnapshot, ProbeOutcomeSnapshot, RuntimeCountersSnapshot,
};

/// Collector that wraps the runtime counter APIs with a single entrypoint.
pub struct MetricsCollector {
    counters: &'static RuntimeCounters,
}

impl MetricsCollector {
    fn new() -> Self {
        Self {
            counters: runtime_counters(),
        }
    }

    pub fn global() -> &'static Self {
        static INSTANCE: OnceLock<MetricsCollector> = OnceLock::new();
        INSTANCE.get_or_init(Self::new)
    }

    pub fn snapshot(&self) -> RuntimeCountersSnapshot {
        self.counters.snapshot()
    }

    pub fn inc_gate_runs(&self) {
        self.counters.inc_gate_runs();
    }

    pub fn inc_status_refreshes(&self) {
        self.counters.inc_status_refreshes();
    }

    pub fn inc_status_cache_hits(&self) {
        self.counters.inc_status_cache_hits();
    }

    pub fn record_probe(
        &self,
        dependency: &str,
        probe: &str,
        kind: ProbeOutcomeKind,
        duration: Duration,
    ) {
        self.counters.record_probe(dependency, probe, kind, duration);
    }

    pub fn record_dependency_state(
        &self,
        dependency: &str,
        state: &'static str,
        elapsed: Duration,
    ) {
        self.counters.record_dependency_state(dependency, state, elapsed);
    }

    /// Renders the counters in the Prometheus text exposition format.
    pub fn render_prometheus(&self) -> String {
        let snapshot = self.snapshot();
        let mut output = String::new();

        output.push_str("# HELP readygate_gate_runs_total Gate-mode orchestrator runs\n");
        output.push_str("# TYPE readygate_gate_runs_total counter\n");
        output.push_str(&format!("readygate_gate_runs_total {}\n", snapshot.gate_runs));

        output.push_str(
            "# HELP readygate_status_refreshes_total Serve-mode status evaluations that ran probes\n",
        );
        output.push_str("# TYPE readygate_status_refreshes_total counter\n");
        output.push_str(&format!(
            "readygate_status_refreshes_total {}\n",
            snapshot.status_refreshes
        ));

        output.push_str(
            "# HELP readygate_status_cache_hits_total Serve-mode queries answered from cache\n",
        );
        output.push_str("# TYPE readygate_status_cache_hits_total counter\n");
        output.push_str(&format!(
            "readygate_status_cache_hits_total {}\n",
            snapshot.status_cache_hits
        ));

        if !snapshot.probes.is_empty() {
            output.push_str("# HELP readygate_probe_outcomes_total Probe evaluations by outcome\n");
            output.push_str("# TYPE readygate_probe_outcomes_total counter\n");
            for probe in &snapshot.probes {
                for (outcome, total) in [
                    ("success", probe.success),
                    ("transient", probe.transient),
                    ("fatal", probe.fatal),
                    ("timeout", probe.timeout),
                ] {
                    output.push_str(&format!(
                        "readygate_probe_outcomes_total{{dependency=\"{}\",probe=\"{}\",outcome=\"{}\"}} {}\n",
                        escape_label_value(&probe.dependency),
                        escape_label_value(&probe.probe),
                        outcome,
                        total
                    ));
                }
            }

            output.push_str(
                "# HELP readygate_probe_last_duration_ms Duration of the most recent probe evaluation\n",
            );
            output.push_str("# TYPE readygate_probe_last_duration_ms gauge\n");
            for probe in &snapshot.probes {
                output.push_str(&format!(
                    "readygate_probe_last_duration_ms{{dependency=\"{}\",probe=\"{}\"}} {}\n",
                    escape_label_value(&probe.dependency),
                    escape_label_value(&probe.probe),
                    probe.last_duration_ms
                ));
            }
        }

        if !snapshot.dependencies.is_empty() {
            output.push_str(
                "# HELP readygate_dependency_ready Dependency readiness (1=ready or degraded, 0 otherwise)\n",
            );
            output.push_str("# TYPE readygate_dependency_ready gauge\n");
            for dependency in &snapshot.dependencies {
                let ready = matches!(dependency.state, "READY" | "DEGRADED") as u8;
                output.push_str(&format!(
                    "readygate_dependency_ready{{dependency=\"{}\",state=\"{}\"}} {}\n",
                    escape_label_value(&dependency.dependency),
                    dependency.state,
                    ready
                ));
            }
        }

        output
    }
}

pub fn metrics() -> &'static MetricsCollector {
    MetricsCollector::global()
}

/// Escapes `\`, `"` and newlines as the text exposition format requires.
fn escape_label_value(value: &str) -> String {
    let mut escaped = String::with_capacity(value.len());
    for ch in value.chars() {
        match ch {
            '\\' => escaped.push_str("\\\\"),
            '"' => escaped.push_str("\\\""),
            '\n' => escaped.push_str("\\n"),
            other => escaped.push(other),
        }
    }
    escaped
}
