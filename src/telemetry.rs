use crate::error::Result;
use chrono::{SecondsFormat, Utc};
use std::collections::BTreeMap;
use std::fmt::{self as stdfmt};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;
use std::sync::OnceLock;
use std::time::Duration;
use tracing::field::{Field, Visit};
use tracing::Event;
use tracing::Subscriber;
use tracing_subscriber::fmt::writer::MakeWriterExt;
use tracing_subscriber::fmt::{
    self as fmt_subscriber, format::Writer, FmtContext, FormatEvent, FormatFields,
};
use tracing_subscriber::registry::LookupSpan;
use tracing_subscriber::EnvFilter;

const SERVICE_NAME: &str = "readygate";

const DEFAULT_FILTER: &str = "readygate=info,info";

pub fn init_tracing() -> Result<()> {
    init_tracing_with_default(DEFAULT_FILTER)
}

/// Like [`init_tracing`] with a different filter when `RUST_LOG` is unset.
pub fn init_tracing_with_default(default_filter: &str) -> Result<()> {
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter));

    let stdout = std::io::stdout;
    let stderr = std::io::stderr;

    let writer = stdout
        .with_max_level(tracing::Level::INFO)
        .or_else(stderr.with_min_level(tracing::Level::WARN));

    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(false)
        .with_level(false)
        .with_ansi(false)
        .event_format(KeyValueFormatter::new())
        .fmt_fields(fmt_subscriber::format::DefaultFields::new())
        .with_writer(writer)
        .try_init()
        .map_err(|err| crate::err!("failed to initialise tracing subscriber: {err}"))
}

struct KeyValueFormatter {
    service_name: &'static str,
}

impl KeyValueFormatter {
    const fn new() -> Self {
        Self {
            service_name: SERVICE_NAME,
        }
    }
}

impl<S, N> FormatEvent<S, N> for KeyValueFormatter
where
    S: Subscriber + for<'lookup> LookupSpan<'lookup>,
    N: for<'writer> FormatFields<'writer> + 'static,
{
    fn format_event(
        &self,
        ctx: &FmtContext<'_, S, N>,
        mut writer: Writer<'_>,
        event: &Event<'_>,
    ) -> stdfmt::Result {
        let timestamp = Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true);
        let pid = std::process::id().to_string();
        let metadata = event.metadata();
        let component = metadata.target();

        let mut visitor = FieldVisitor::default();
        event.record(&mut visitor);

        let message = visitor
            .message
            .take()
            .unwrap_or_else(|| metadata.name().to_string());

        let mut fields = visitor.fields;
        fields.sort_by(|(lhs, _), (rhs, _)| lhs.cmp(rhs));

        let span_path = current_span_path(ctx);

        let mut line = String::new();
        push_field(&mut line, "ts", &timestamp);
        push_field(&mut line, "level", metadata.level().as_str());
        push_field(&mut line, "service", self.service_name);
        push_field(&mut line, "component", component);
        push_field(&mut line, "pid", &pid);

        if let Some(span_path) = span_path {
            push_field(&mut line, "span", &span_path);
        }

        push_field(&mut line, "msg", &message);

        for (key, value) in fields {
            push_field(&mut line, &key, &value);
        }

        if let Some(file) = metadata.file() {
            push_field(&mut line, "file", file);
        }
        if let Some(line_no) = metadata.line() {
            push_field(&mut line, "line", &line_no.to_string());
        }

        writer.write_str(&line)?;
        writer.write_char('\n')
    }
}

fn current_span_path<S, N>(ctx: &FmtContext<'_, S, N>) -> Option<String>
where
    S: Subscriber + for<'lookup> LookupSpan<'lookup>,
    N: for<'writer> FormatFields<'writer> + 'static,
{
    let span = ctx.lookup_current()?;
    let names: Vec<&str> = span.scope().from_root().map(|s| s.name()).collect();
    if names.is_empty() {
        None
    } else {
        Some(names.join("."))
    }
}

/// Appends ` key=value`, quoting values that contain whitespace, quotes or `=`.
pub fn push_field(line: &mut String, key: &str, value: &str) {
    if !line.is_empty() {
        line.push(' ');
    }
    line.push_str(key);
    line.push('=');
    if value.is_empty() || value.chars().any(|c| c.is_whitespace() || c == '"' || c == '=') {
        line.push('"');
        for c in value.chars() {
            match c {
                '"' => line.push_str("\\\""),
                '\\' => line.push_str("\\\\"),
                '\n' => line.push_str("\\n"),
                other => line.push(other),
            }
        }
        line.push('"');
    } else {
        line.push_str(value);
    }
}

#[derive(Default)]
struct FieldVisitor {
    message: Option<String>,
    fields: Vec<(String, String)>,
}

impl FieldVisitor {
    fn record_field(&mut self, field: &Field, value: String) {
        if field.name().is_empty() {
            return;
        }
        if field.name() == "message" {
            self.message = Some(value);
        } else {
            self.fields.push((field.name().to_string(), value));
        }
    }
}

impl Visit for FieldVisitor {
    fn record_str(&mut self, field: &Field, value: &str) {
        self.record_field(field, value.to_string());
    }

    fn record_debug(&mut self, field: &Field, value: &dyn stdfmt::Debug) {
        self.record_field(field, format!("{value:?}"));
    }

    fn record_i64(&mut self, field: &Field, value: i64) {
        self.record_field(field, value.to_string());
    }

    fn record_u64(&mut self, field: &Field, value: u64) {
        self.record_field(field, value.to_string());
    }

    fn record_bool(&mut self, field: &Field, value: bool) {
        self.record_field(field, value.to_string());
    }
}

#[derive(Default)]
pub struct RuntimeCounters {
    gate_runs: AtomicU64,
    status_refreshes: AtomicU64,
    status_cache_hits: AtomicU64,
    probes: ProbeOutcomeRegistry,
    dependencies: DependencyStateRegistry,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RuntimeCountersSnapshot {
    pub gate_runs: u64,
    pub status_refreshes: u64,
    pub status_cache_hits: u64,
    pub probes: Vec<ProbeOutcomeSnapshot>,
    pub dependencies: Vec<DependencyStateSnapshot>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ProbeOutcomeKind {
    Success,
    Transient,
    Fatal,
    Timeout,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ProbeOutcomeSnapshot {
    pub dependency: String,
    pub probe: String,
    pub success: u64,
    pub transient: u64,
    pub fatal: u64,
    pub timeout: u64,
    pub last_duration_ms: u64,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DependencyStateSnapshot {
    pub dependency: String,
    pub state: &'static str,
    pub elapsed_ms: u64,
}

#[derive(Default, Clone, Copy)]
struct ProbeCounts {
    success: u64,
    transient: u64,
    fatal: u64,
    timeout: u64,
    last_duration_ms: u64,
}

#[derive(Default)]
struct ProbeOutcomeRegistry {
    entries: Mutex<BTreeMap<(String, String), ProbeCounts>>,
}

impl ProbeOutcomeRegistry {
    fn record(&self, dependency: &str, probe: &str, kind: ProbeOutcomeKind, duration: Duration) {
        let mut guard = self.entries.lock().expect("probe outcome lock poisoned");
        let entry = guard
            .entry((dependency.to_string(), probe.to_string()))
            .or_default();
        match kind {
            ProbeOutcomeKind::Success => entry.success += 1,
            ProbeOutcomeKind::Transient => entry.transient += 1,
            ProbeOutcomeKind::Fatal => entry.fatal += 1,
            ProbeOutcomeKind::Timeout => entry.timeout += 1,
        }
        entry.last_duration_ms = duration_millis(duration);
    }

    fn snapshot(&self) -> Vec<ProbeOutcomeSnapshot> {
        let guard = self.entries.lock().expect("probe outcome lock poisoned");
        guard
            .iter()
            .map(|((dependency, probe), counts)| ProbeOutcomeSnapshot {
                dependency: dependency.clone(),
                probe: probe.clone(),
                success: counts.success,
                transient: counts.transient,
                fatal: counts.fatal,
                timeout: counts.timeout,
                last_duration_ms: counts.last_duration_ms,
            })
            .collect()
    }
}

#[derive(Default)]
struct DependencyStateRegistry {
    entries: Mutex<BTreeMap<String, (&'static str, u64)>>,
}

impl DependencyStateRegistry {
    fn record(&self, dependency: &str, state: &'static str, elapsed: Duration) {
        let mut guard = self.entries.lock().expect("dependency state lock poisoned");
        guard.insert(dependency.to_string(), (state, duration_millis(elapsed)));
    }

    fn snapshot(&self) -> Vec<DependencyStateSnapshot> {
        let guard = self.entries.lock().expect("dependency state lock poisoned");
        guard
            .iter()
            .map(|(dependency, (state, elapsed_ms))| DependencyStateSnapshot {
                dependency: dependency.clone(),
                state,
                elapsed_ms: *elapsed_ms,
            })
            .collect()
    }
}

fn duration_millis(duration: Duration) -> u64 {
    std::cmp::min(duration.as_millis(), u128::from(u64::MAX)) as u64
}

static RUNTIME_COUNTERS: OnceLock<RuntimeCounters> = OnceLock::new();

pub fn runtime_counters() -> &'static RuntimeCounters {
    RUNTIME_COUNTERS.get_or_init(RuntimeCounters::default)
}

impl RuntimeCounters {
    pub fn inc_gate_runs(&self) {
        self.gate_runs.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_status_refreshes(&self) {
        self.status_refreshes.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_status_cache_hits(&self) {
        self.status_cache_hits.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_probe(
        &self,
        dependency: &str,
        probe: &str,
        kind: ProbeOutcomeKind,
        duration: Duration,
    ) {
        self.probes.record(dependency, probe, kind, duration);
    }

    pub fn record_dependency_state(
        &self,
        dependency: &str,
        state: &'static str,
        elapsed: Duration,
    ) {
        self.dependencies.record(dependency, state, elapsed);
    }

    pub fn snapshot(&self) -> RuntimeCountersSnapshot {
        RuntimeCountersSnapshot {
            gate_runs: self.gate_runs.load(Ordering::Relaxed),
            status_refreshes: self.status_refreshes.load(Ordering::Relaxed),
            status_cache_hits: self.status_cache_hits.load(Ordering::Relaxed),
            probes: self.probes.snapshot(),
            dependencies: self.dependencies.snapshot(),
        }
    }
}
