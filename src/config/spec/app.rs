use humantime::parse_duration;
use serde::Deserialize;
use std::time::Duration;

pub(crate) const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(2);
pub(crate) const DEFAULT_DEADLINE: Duration = Duration::from_secs(90);
pub(crate) const DEFAULT_PROBE_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AppConfig {
    /// Retry interval for phases that do not set one, and the default cache
    /// window for status queries.
    pub poll_interval: Duration,
    /// Overall deadline for dependencies that do not set one.
    pub default_deadline: Duration,
    /// Per-probe bound for probes that do not set `timeout`.
    pub probe_timeout: Duration,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            poll_interval: DEFAULT_POLL_INTERVAL,
            default_deadline: DEFAULT_DEADLINE,
            probe_timeout: DEFAULT_PROBE_TIMEOUT,
        }
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub(crate) struct RawAppSection {
    #[serde(default)]
    pub(crate) poll_interval: Option<String>,
    #[serde(default)]
    pub(crate) default_deadline: Option<String>,
    #[serde(default)]
    pub(crate) probe_timeout: Option<String>,
}

pub(crate) fn parse_app_config(raw: Option<RawAppSection>, errors: &mut Vec<String>) -> AppConfig {
    let raw = raw.unwrap_or_default();
    let mut config = AppConfig::default();

    if let Some(duration) = parse_positive_duration("app.poll_interval", raw.poll_interval, errors)
    {
        config.poll_interval = duration;
    }

    if let Some(duration) =
        parse_positive_duration("app.default_deadline", raw.default_deadline, errors)
    {
        config.default_deadline = duration;
    }

    if let Some(duration) = parse_positive_duration("app.probe_timeout", raw.probe_timeout, errors)
    {
        config.probe_timeout = duration;
    }

    config
}

pub(crate) fn parse_duration_value(
    field_label: &str,
    raw: Option<String>,
    errors: &mut Vec<String>,
) -> Option<Duration> {
    let raw_value = raw?;

    let trimmed = raw_value.trim();
    if trimmed.is_empty() {
        errors.push(format!("{field_label} must be a non-empty duration string"));
        return None;
    }

    match parse_duration(trimmed) {
        Ok(duration) => Some(duration),
        Err(_) => {
            errors.push(format!(
                "{field_label} must be a valid duration (got `{trimmed}`)"
            ));
            None
        }
    }
}

pub(crate) fn ensure_positive_duration(
    duration: Duration,
    label: &str,
    errors: &mut Vec<String>,
) -> Option<Duration> {
    if duration.is_zero() {
        errors.push(format!("{label} must be greater than zero"));
        None
    } else {
        Some(duration)
    }
}

pub(crate) fn parse_positive_duration(
    field_label: &str,
    raw: Option<String>,
    errors: &mut Vec<String>,
) -> Option<Duration> {
    parse_duration_value(field_label, raw, errors)
        .and_then(|duration| ensure_positive_duration(duration, field_label, errors))
}
