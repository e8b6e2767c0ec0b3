use super::app::parse_positive_duration;
use crate::probes::MissingDatabase;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_yaml::Value as YamlValue;
use std::time::Duration;

pub(crate) const KNOWN_PROBE_TYPES: &[&str] = &["tcp", "postgres", "redis", "http", "command"];

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProbeDefinition {
    pub name: String,
    /// Per-probe bound; falls back to `app.probe_timeout`.
    pub timeout: Duration,
    pub kind: ProbeKind,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProbeKind {
    Tcp(TcpTarget),
    Postgres(PostgresProbeOptions),
    Redis { url: UrlSource },
    Http(HttpProbeOptions),
    Command(CommandProbeOptions),
}

impl ProbeKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ProbeKind::Tcp(_) => "tcp",
            ProbeKind::Postgres(_) => "postgres",
            ProbeKind::Redis { .. } => "redis",
            ProbeKind::Http(_) => "http",
            ProbeKind::Command(_) => "command",
        }
    }
}

/// Where a connection URL comes from. Environment lookups are deferred until
/// probes are built so a spec file can be validated without secrets present.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UrlSource {
    Literal(String),
    Env(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TcpTarget {
    Address { host: String, port: u16 },
    /// Host and port taken from a connection URL.
    Url(UrlSource),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PostgresProbeOptions {
    pub url: UrlSource,
    pub query: Option<String>,
    pub missing_database: MissingDatabase,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpProbeOptions {
    pub url: String,
    pub expect_status: Option<u16>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandProbeOptions {
    pub program: String,
    pub args: Vec<String>,
    pub fatal_exit_codes: Vec<i32>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub(crate) struct RawProbe {
    #[serde(default)]
    pub(crate) name: Option<String>,
    #[serde(default, rename = "type")]
    pub(crate) kind: Option<String>,
    #[serde(default)]
    pub(crate) timeout: Option<String>,
    #[serde(default)]
    pub(crate) options: Option<YamlValue>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct RawTcpOptions {
    #[serde(default)]
    host: Option<String>,
    #[serde(default)]
    port: Option<u16>,
    #[serde(default)]
    url: Option<String>,
    #[serde(default)]
    url_env: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct RawPostgresOptions {
    #[serde(default)]
    url: Option<String>,
    #[serde(default)]
    url_env: Option<String>,
    #[serde(default)]
    query: Option<String>,
    #[serde(default)]
    missing_database: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct RawRedisOptions {
    #[serde(default)]
    url: Option<String>,
    #[serde(default)]
    url_env: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct RawHttpOptions {
    #[serde(default)]
    url: Option<String>,
    #[serde(default)]
    expect_status: Option<u16>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct RawCommandOptions {
    #[serde(default)]
    program: Option<String>,
    #[serde(default)]
    args: Vec<String>,
    #[serde(default)]
    fatal_exit_codes: Vec<i32>,
}

pub(crate) fn parse_probe(
    raw: RawProbe,
    scope: &str,
    index: usize,
    default_timeout: Duration,
    errors: &mut Vec<String>,
) -> Option<ProbeDefinition> {
    let name = match raw.name.map(|value| value.trim().to_string()) {
        Some(name) if !name.is_empty() => name,
        _ => {
            errors.push(format!("{scope}.probes[{index}].name must be a non-empty string"));
            return None;
        }
    };
    let label = format!("{scope} probe `{name}`");

    let timeout = parse_positive_duration(&format!("{label} timeout"), raw.timeout, errors)
        .unwrap_or(default_timeout);

    let kind_raw = match raw.kind.map(|value| value.trim().to_ascii_lowercase()) {
        Some(kind) if !kind.is_empty() => kind,
        _ => {
            errors.push(format!(
                "{label} requires `type` (one of {})",
                KNOWN_PROBE_TYPES.join(", ")
            ));
            return None;
        }
    };

    let options = raw.options.unwrap_or(YamlValue::Null);
    let kind = match kind_raw.as_str() {
        "tcp" => parse_tcp(&label, options, errors),
        "postgres" => parse_postgres(&label, options, errors),
        "redis" => parse_redis(&label, options, errors),
        "http" => parse_http(&label, options, errors),
        "command" => parse_command(&label, options, errors),
        other => {
            errors.push(format!(
                "{label} has unsupported type `{other}` (expected one of {})",
                KNOWN_PROBE_TYPES.join(", ")
            ));
            None
        }
    }?;

    Some(ProbeDefinition {
        name,
        timeout,
        kind,
    })
}

fn decode_options<T>(label: &str, value: YamlValue, errors: &mut Vec<String>) -> Option<T>
where
    T: DeserializeOwned + Default,
{
    if value.is_null() {
        return Some(T::default());
    }
    match serde_yaml::from_value(value) {
        Ok(parsed) => Some(parsed),
        Err(err) => {
            errors.push(format!("{label} has invalid options: {err}"));
            None
        }
    }
}

fn parse_url_source(
    label: &str,
    url: Option<String>,
    url_env: Option<String>,
    errors: &mut Vec<String>,
) -> Option<UrlSource> {
    let url = url.filter(|value| !value.trim().is_empty());
    let url_env = url_env.filter(|value| !value.trim().is_empty());
    match (url, url_env) {
        (Some(_), Some(_)) => {
            errors.push(format!(
                "{label} options must set only one of `url` or `url_env`"
            ));
            None
        }
        (Some(url), None) => Some(UrlSource::Literal(url.trim().to_string())),
        (None, Some(var)) => Some(UrlSource::Env(var.trim().to_string())),
        (None, None) => {
            errors.push(format!("{label} options require `url` or `url_env`"));
            None
        }
    }
}

fn parse_tcp(label: &str, options: YamlValue, errors: &mut Vec<String>) -> Option<ProbeKind> {
    let raw: RawTcpOptions = decode_options(label, options, errors)?;
    let host = raw.host.filter(|value| !value.trim().is_empty());

    if host.is_some() || raw.port.is_some() {
        if raw.url.is_some() || raw.url_env.is_some() {
            errors.push(format!(
                "{label} options must use either `host`/`port` or `url`/`url_env`, not both"
            ));
            return None;
        }
        return match (host, raw.port) {
            (Some(host), Some(port)) if port > 0 => Some(ProbeKind::Tcp(TcpTarget::Address {
                host: host.trim().to_string(),
                port,
            })),
            (Some(_), Some(_)) => {
                errors.push(format!("{label} options.port must be greater than zero"));
                None
            }
            _ => {
                errors.push(format!("{label} options require both `host` and `port`"));
                None
            }
        };
    }

    parse_url_source(label, raw.url, raw.url_env, errors)
        .map(|source| ProbeKind::Tcp(TcpTarget::Url(source)))
}

fn parse_postgres(label: &str, options: YamlValue, errors: &mut Vec<String>) -> Option<ProbeKind> {
    let raw: RawPostgresOptions = decode_options(label, options, errors)?;

    let missing_database = match raw.missing_database.as_deref().map(str::trim) {
        None => MissingDatabase::default(),
        Some(value) if value.eq_ignore_ascii_case("transient") => MissingDatabase::Transient,
        Some(value) if value.eq_ignore_ascii_case("fatal") => MissingDatabase::Fatal,
        Some(other) => {
            errors.push(format!(
                "{label} options.missing_database must be one of `transient` or `fatal` (got `{other}`)"
            ));
            MissingDatabase::default()
        }
    };

    let query = match raw.query {
        Some(query) if query.trim().is_empty() => {
            errors.push(format!("{label} options.query must not be empty"));
            None
        }
        other => other,
    };

    let url = parse_url_source(label, raw.url, raw.url_env, errors)?;
    Some(ProbeKind::Postgres(PostgresProbeOptions {
        url,
        query,
        missing_database,
    }))
}

fn parse_redis(label: &str, options: YamlValue, errors: &mut Vec<String>) -> Option<ProbeKind> {
    let raw: RawRedisOptions = decode_options(label, options, errors)?;
    parse_url_source(label, raw.url, raw.url_env, errors).map(|url| ProbeKind::Redis { url })
}

fn parse_http(label: &str, options: YamlValue, errors: &mut Vec<String>) -> Option<ProbeKind> {
    let raw: RawHttpOptions = decode_options(label, options, errors)?;

    let url = match raw.url.map(|value| value.trim().to_string()) {
        Some(url) if !url.is_empty() => url,
        _ => {
            errors.push(format!("{label} options require `url`"));
            return None;
        }
    };
    if let Err(err) = url::Url::parse(&url) {
        errors.push(format!("{label} options.url is not a valid URL: {err}"));
        return None;
    }
    if let Some(status) = raw.expect_status {
        if !(100..=599).contains(&status) {
            errors.push(format!(
                "{label} options.expect_status must be an HTTP status code (got `{status}`)"
            ));
            return None;
        }
    }

    Some(ProbeKind::Http(HttpProbeOptions {
        url,
        expect_status: raw.expect_status,
    }))
}

fn parse_command(label: &str, options: YamlValue, errors: &mut Vec<String>) -> Option<ProbeKind> {
    let raw: RawCommandOptions = decode_options(label, options, errors)?;

    let program = match raw.program.map(|value| value.trim().to_string()) {
        Some(program) if !program.is_empty() => program,
        _ => {
            errors.push(format!("{label} options require `program`"));
            return None;
        }
    };

    Some(ProbeKind::Command(CommandProbeOptions {
        program,
        args: raw.args,
        fatal_exit_codes: raw.fatal_exit_codes,
    }))
}
