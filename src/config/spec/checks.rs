use super::app::{parse_positive_duration, AppConfig};
use super::dependencies::DependencyDefinition;
use serde::Deserialize;
use std::time::Duration;

const DEFAULT_READINESS_THRESHOLD: u32 = 1;
const DEFAULT_LIVENESS_THRESHOLD: u32 = 3;

/// The two externally consumed checks. Traffic routing and restart
/// decisions get their own cadence and tolerance.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChecksConfig {
    pub readiness: CheckConfig,
    pub liveness: CheckConfig,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CheckConfig {
    /// How long a computed status stays valid.
    pub cache: Duration,
    /// Consecutive failing observations before the check reports failure.
    pub failure_threshold: u32,
    /// Subset of dependencies the check looks at; `None` means all.
    pub dependencies: Option<Vec<String>>,
}

impl ChecksConfig {
    pub fn defaults(app: &AppConfig) -> Self {
        Self {
            readiness: CheckConfig {
                cache: app.poll_interval,
                failure_threshold: DEFAULT_READINESS_THRESHOLD,
                dependencies: None,
            },
            liveness: CheckConfig {
                cache: app.poll_interval,
                failure_threshold: DEFAULT_LIVENESS_THRESHOLD,
                dependencies: None,
            },
        }
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub(crate) struct RawChecksSection {
    #[serde(default)]
    pub(crate) readiness: Option<RawCheck>,
    #[serde(default)]
    pub(crate) liveness: Option<RawCheck>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub(crate) struct RawCheck {
    #[serde(default)]
    pub(crate) cache: Option<String>,
    #[serde(default)]
    pub(crate) failure_threshold: Option<u32>,
    #[serde(default)]
    pub(crate) dependencies: Option<Vec<String>>,
}

pub(crate) fn parse_checks(
    raw: Option<RawChecksSection>,
    app: &AppConfig,
    errors: &mut Vec<String>,
) -> ChecksConfig {
    let raw = raw.unwrap_or_default();
    let defaults = ChecksConfig::defaults(app);

    ChecksConfig {
        readiness: parse_check("checks.readiness", raw.readiness, defaults.readiness, errors),
        liveness: parse_check("checks.liveness", raw.liveness, defaults.liveness, errors),
    }
}

fn parse_check(
    label: &str,
    raw: Option<RawCheck>,
    defaults: CheckConfig,
    errors: &mut Vec<String>,
) -> CheckConfig {
    let Some(raw) = raw else {
        return defaults;
    };

    let cache = parse_positive_duration(&format!("{label}.cache"), raw.cache, errors)
        .unwrap_or(defaults.cache);

    let failure_threshold = match raw.failure_threshold {
        Some(0) => {
            errors.push(format!("{label}.failure_threshold must be greater than zero"));
            defaults.failure_threshold
        }
        Some(value) => value,
        None => defaults.failure_threshold,
    };

    let dependencies = raw.dependencies.map(|names| {
        names
            .into_iter()
            .map(|name| name.trim().to_string())
            .collect::<Vec<_>>()
    });
    if matches!(&dependencies, Some(names) if names.is_empty()) {
        errors.push(format!(
            "{label}.dependencies must list at least one dependency when present"
        ));
    }

    CheckConfig {
        cache,
        failure_threshold,
        dependencies,
    }
}

pub(crate) fn validate_check_references(
    checks: &ChecksConfig,
    dependencies: &[DependencyDefinition],
    errors: &mut Vec<String>,
) {
    for (label, check) in [
        ("checks.readiness", &checks.readiness),
        ("checks.liveness", &checks.liveness),
    ] {
        let Some(names) = &check.dependencies else {
            continue;
        };
        for name in names {
            if !dependencies.iter().any(|dependency| &dependency.name == name) {
                errors.push(format!(
                    "{label}.dependencies references unknown dependency `{name}`"
                ));
            }
        }
    }
}
