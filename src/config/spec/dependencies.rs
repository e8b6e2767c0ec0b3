use super::app::{parse_positive_duration, AppConfig};
use super::probes::{parse_probe, ProbeDefinition, RawProbe};
use crate::readiness::TimeoutPolicy;
use serde::Deserialize;
use std::collections::HashSet;
use std::time::Duration;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DependencyDefinition {
    pub name: String,
    pub deadline: Duration,
    pub on_timeout: TimeoutPolicy,
    pub phases: Vec<PhaseDefinition>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PhaseDefinition {
    pub name: String,
    pub retry_interval: Duration,
    pub max_duration: Duration,
    pub probes: Vec<ProbeDefinition>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub(crate) struct RawDependency {
    #[serde(default)]
    pub(crate) name: Option<String>,
    #[serde(default)]
    pub(crate) deadline: Option<String>,
    #[serde(default)]
    pub(crate) on_timeout: Option<String>,
    #[serde(default)]
    pub(crate) phases: Vec<RawPhase>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub(crate) struct RawPhase {
    #[serde(default)]
    pub(crate) name: Option<String>,
    #[serde(default)]
    pub(crate) retry_interval: Option<String>,
    #[serde(default)]
    pub(crate) max_duration: Option<String>,
    #[serde(default)]
    pub(crate) probes: Vec<RawProbe>,
}

pub(crate) fn parse_dependencies(
    raw: Vec<RawDependency>,
    app: &AppConfig,
    errors: &mut Vec<String>,
) -> Vec<DependencyDefinition> {
    let mut seen = HashSet::new();
    let mut dependencies = Vec::with_capacity(raw.len());

    for (index, raw_dependency) in raw.into_iter().enumerate() {
        let Some(dependency) = parse_dependency(raw_dependency, index, app, errors) else {
            continue;
        };
        if !seen.insert(dependency.name.clone()) {
            errors.push(format!(
                "dependencies[{index}] reuses name `{}`; dependency names must be unique",
                dependency.name
            ));
            continue;
        }
        dependencies.push(dependency);
    }

    dependencies
}

fn parse_dependency(
    raw: RawDependency,
    index: usize,
    app: &AppConfig,
    errors: &mut Vec<String>,
) -> Option<DependencyDefinition> {
    let name = match raw.name.map(|value| value.trim().to_string()) {
        Some(name) if !name.is_empty() => name,
        _ => {
            errors.push(format!("dependencies[{index}].name must be a non-empty string"));
            return None;
        }
    };
    let scope = format!("dependency `{name}`");

    let deadline = parse_positive_duration(&format!("{scope} deadline"), raw.deadline, errors)
        .unwrap_or(app.default_deadline);

    let on_timeout = match raw.on_timeout.as_deref().map(str::trim) {
        None => TimeoutPolicy::default(),
        Some(value) => match parse_timeout_policy(value) {
            Some(policy) => policy,
            None => {
                errors.push(format!(
                    "{scope} on_timeout must be one of `fatal` or `degrade` (got `{value}`)"
                ));
                TimeoutPolicy::default()
            }
        },
    };

    if raw.phases.is_empty() {
        errors.push(format!("{scope} must declare at least one phase"));
        return None;
    }

    let mut phase_names = HashSet::new();
    let mut phases = Vec::with_capacity(raw.phases.len());
    for (phase_index, raw_phase) in raw.phases.into_iter().enumerate() {
        let Some(phase) = parse_phase(raw_phase, &scope, phase_index, deadline, app, errors) else {
            continue;
        };
        if !phase_names.insert(phase.name.clone()) {
            errors.push(format!(
                "{scope} declares phase `{}` more than once",
                phase.name
            ));
            continue;
        }
        phases.push(phase);
    }

    Some(DependencyDefinition {
        name,
        deadline,
        on_timeout,
        phases,
    })
}

fn parse_phase(
    raw: RawPhase,
    dependency_scope: &str,
    index: usize,
    deadline: Duration,
    app: &AppConfig,
    errors: &mut Vec<String>,
) -> Option<PhaseDefinition> {
    let name = match raw.name.map(|value| value.trim().to_string()) {
        Some(name) if !name.is_empty() => name,
        _ => {
            errors.push(format!(
                "{dependency_scope} phases[{index}].name must be a non-empty string"
            ));
            return None;
        }
    };
    let scope = format!("{dependency_scope} phase `{name}`");

    let retry_interval =
        parse_positive_duration(&format!("{scope} retry_interval"), raw.retry_interval, errors)
            .unwrap_or(app.poll_interval);
    let max_duration =
        parse_positive_duration(&format!("{scope} max_duration"), raw.max_duration, errors)
            .unwrap_or(deadline);

    if raw.probes.is_empty() {
        errors.push(format!("{scope} must declare at least one probe"));
        return None;
    }

    let mut probe_names = HashSet::new();
    let mut probes = Vec::with_capacity(raw.probes.len());
    for (probe_index, raw_probe) in raw.probes.into_iter().enumerate() {
        let Some(probe) = parse_probe(raw_probe, &scope, probe_index, app.probe_timeout, errors)
        else {
            continue;
        };
        if !probe_names.insert(probe.name.clone()) {
            errors.push(format!("{scope} declares probe `{}` more than once", probe.name));
            continue;
        }
        probes.push(probe);
    }

    Some(PhaseDefinition {
        name,
        retry_interval,
        max_duration,
        probes,
    })
}

fn parse_timeout_policy(value: &str) -> Option<TimeoutPolicy> {
    match value.to_ascii_lowercase().as_str() {
        "fatal" => Some(TimeoutPolicy::Fatal),
        "degrade" => Some(TimeoutPolicy::Degrade),
        _ => None,
    }
}
