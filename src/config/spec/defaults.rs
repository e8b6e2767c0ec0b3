use super::app::AppConfig;
use super::dependencies::{DependencyDefinition, PhaseDefinition};
use super::probes::{PostgresProbeOptions, ProbeDefinition, ProbeKind, TcpTarget, UrlSource};
use crate::probes::MissingDatabase;
use crate::readiness::TimeoutPolicy;
use std::time::Duration;

pub(crate) const DATABASE_DEPENDENCY: &str = "db";
pub(crate) const REDIS_DEPENDENCY: &str = "redis";

const SERVER_UP_RETRY: Duration = Duration::from_secs(1);
const SERVER_UP_MAX: Duration = Duration::from_secs(60);
const SCHEMA_READY_RETRY: Duration = Duration::from_secs(2);
const SCHEMA_READY_MAX: Duration = Duration::from_secs(20);
const REDIS_DEADLINE: Duration = Duration::from_secs(30);

/// `db`: TCP reachability, then a query against the named database.
pub(crate) fn database_dependency(url: &str, app: &AppConfig) -> DependencyDefinition {
    let source = UrlSource::Literal(url.to_string());
    DependencyDefinition {
        name: DATABASE_DEPENDENCY.to_string(),
        deadline: app.default_deadline,
        on_timeout: TimeoutPolicy::Fatal,
        phases: vec![
            PhaseDefinition {
                name: "server-up".to_string(),
                retry_interval: SERVER_UP_RETRY,
                max_duration: SERVER_UP_MAX,
                probes: vec![ProbeDefinition {
                    name: "tcp-connect".to_string(),
                    timeout: app.probe_timeout,
                    kind: ProbeKind::Tcp(TcpTarget::Url(source.clone())),
                }],
            },
            PhaseDefinition {
                name: "schema-ready".to_string(),
                retry_interval: SCHEMA_READY_RETRY,
                max_duration: SCHEMA_READY_MAX,
                probes: vec![ProbeDefinition {
                    name: "query".to_string(),
                    timeout: app.probe_timeout,
                    kind: ProbeKind::Postgres(PostgresProbeOptions {
                        url: source,
                        query: None,
                        missing_database: MissingDatabase::Transient,
                    }),
                }],
            },
        ],
    }
}

/// `redis`: a cache the application can run without, so a timeout degrades.
pub(crate) fn redis_dependency(url: &str, app: &AppConfig) -> DependencyDefinition {
    DependencyDefinition {
        name: REDIS_DEPENDENCY.to_string(),
        deadline: REDIS_DEADLINE,
        on_timeout: TimeoutPolicy::Degrade,
        phases: vec![PhaseDefinition {
            name: "server-up".to_string(),
            retry_interval: SERVER_UP_RETRY,
            max_duration: REDIS_DEADLINE,
            probes: vec![ProbeDefinition {
                name: "ping".to_string(),
                timeout: app.probe_timeout,
                kind: ProbeKind::Redis {
                    url: UrlSource::Literal(url.to_string()),
                },
            }],
        }],
    }
}
