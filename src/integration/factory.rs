use crate::config::spec::{
    DependencyDefinition, PhaseDefinition, ProbeDefinition, ProbeKind, ReadinessConfig,
    TcpTarget, UrlSource,
};
use crate::probes::{redact_url, CommandCheck, TcpCheck};
#[cfg(feature = "http-out")]
use crate::probes::HttpCheck;
#[cfg(feature = "db-postgres")]
use crate::probes::PostgresCheck;
#[cfg(feature = "db-redis")]
use crate::probes::RedisCheck;
use crate::readiness::{DependencySpec, Orchestrator, Phase, Probe, SpecError};
use std::fmt;
use std::sync::Arc;
use thiserror::Error;
use url::Url;

type EnvLookup = Arc<dyn Fn(&str) -> Option<String> + Send + Sync>;

/// Materialises validated definitions into runnable probes and specs.
///
/// URL environment variables are resolved here, once, so a spec file can be
/// validated without the secrets it refers to.
#[derive(Clone)]
pub struct ProbeFactory {
    env: EnvLookup,
}

impl Default for ProbeFactory {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for ProbeFactory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProbeFactory").finish()
    }
}

impl ProbeFactory {
    /// Resolves `url_env` against the process environment.
    pub fn new() -> Self {
        Self::with_env(|key| std::env::var(key).ok())
    }

    pub fn with_env<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String> + Send + Sync + 'static,
    {
        Self {
            env: Arc::new(lookup),
        }
    }

    pub fn build_orchestrator(
        &self,
        config: &ReadinessConfig,
    ) -> Result<Orchestrator, ProbeFactoryError> {
        let specs = config
            .dependencies
            .iter()
            .map(|definition| self.build_dependency(definition))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Orchestrator::new(specs)?)
    }

    pub fn build_dependency(
        &self,
        definition: &DependencyDefinition,
    ) -> Result<DependencySpec, ProbeFactoryError> {
        let phases = definition
            .phases
            .iter()
            .map(|phase| self.build_phase(&definition.name, phase))
            .collect::<Result<Vec<_>, _>>()?;

        let spec = DependencySpec::new(definition.name.clone(), phases, definition.deadline)?
            .with_timeout_policy(definition.on_timeout);
        Ok(spec)
    }

    fn build_phase(
        &self,
        dependency: &str,
        definition: &PhaseDefinition,
    ) -> Result<Phase, ProbeFactoryError> {
        let probes = definition
            .probes
            .iter()
            .map(|probe| {
                let label = ProbeLabel {
                    dependency,
                    phase: &definition.name,
                    probe: &probe.name,
                };
                self.build_probe(&label, probe)
            })
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Phase::new(
            definition.name.clone(),
            probes,
            definition.retry_interval,
            definition.max_duration,
        )?)
    }

    fn build_probe(
        &self,
        label: &ProbeLabel<'_>,
        definition: &ProbeDefinition,
    ) -> Result<Probe, ProbeFactoryError> {
        let probe = match &definition.kind {
            ProbeKind::Tcp(target) => {
                let (host, port) = self.tcp_target(label, target)?;
                Probe::new(definition.name.clone(), TcpCheck::new(host, port))
            }
            ProbeKind::Postgres(options) => self.postgres_probe(label, definition, options)?,
            ProbeKind::Redis { url } => self.redis_probe(label, definition, url)?,
            ProbeKind::Http(options) => self.http_probe(label, definition, options)?,
            ProbeKind::Command(options) => Probe::new(
                definition.name.clone(),
                CommandCheck::new(options.program.clone(), options.args.clone())
                    .with_fatal_exit_codes(options.fatal_exit_codes.clone()),
            ),
        };

        Ok(probe.with_timeout(definition.timeout))
    }

    fn resolve_url(
        &self,
        label: &ProbeLabel<'_>,
        source: &UrlSource,
    ) -> Result<String, ProbeFactoryError> {
        match source {
            UrlSource::Literal(url) => Ok(url.clone()),
            UrlSource::Env(var) => (self.env)(var)
                .filter(|value| !value.trim().is_empty())
                .ok_or_else(|| ProbeFactoryError::MissingEnv {
                    probe: label.to_string(),
                    var: var.clone(),
                }),
        }
    }

    fn tcp_target(
        &self,
        label: &ProbeLabel<'_>,
        target: &TcpTarget,
    ) -> Result<(String, u16), ProbeFactoryError> {
        match target {
            TcpTarget::Address { host, port } => Ok((host.clone(), *port)),
            TcpTarget::Url(source) => {
                let raw = self.resolve_url(label, source)?;
                host_and_port(&raw).map_err(|reason| ProbeFactoryError::InvalidUrl {
                    probe: label.to_string(),
                    url: redact_url(&raw),
                    reason,
                })
            }
        }
    }

    #[cfg(feature = "db-postgres")]
    fn postgres_probe(
        &self,
        label: &ProbeLabel<'_>,
        definition: &ProbeDefinition,
        options: &crate::config::spec::PostgresProbeOptions,
    ) -> Result<Probe, ProbeFactoryError> {
        let raw = self.resolve_url(label, &options.url)?;
        let mut check = PostgresCheck::from_url(&raw)
            .map_err(|err| ProbeFactoryError::InvalidUrl {
                probe: label.to_string(),
                url: redact_url(&raw),
                reason: err.to_string(),
            })?
            .with_missing_database(options.missing_database);
        if let Some(query) = &options.query {
            check = check.with_query(query.clone());
        }
        Ok(Probe::new(definition.name.clone(), check))
    }

    #[cfg(not(feature = "db-postgres"))]
    fn postgres_probe(
        &self,
        label: &ProbeLabel<'_>,
        _definition: &ProbeDefinition,
        _options: &crate::config::spec::PostgresProbeOptions,
    ) -> Result<Probe, ProbeFactoryError> {
        Err(ProbeFactoryError::FeatureDisabled {
            probe: label.to_string(),
            kind: "postgres",
            feature: "db-postgres",
        })
    }

    #[cfg(feature = "db-redis")]
    fn redis_probe(
        &self,
        label: &ProbeLabel<'_>,
        definition: &ProbeDefinition,
        source: &UrlSource,
    ) -> Result<Probe, ProbeFactoryError> {
        let raw = self.resolve_url(label, source)?;
        let check = RedisCheck::from_url(&raw).map_err(|err| ProbeFactoryError::InvalidUrl {
            probe: label.to_string(),
            url: redact_url(&raw),
            reason: err.to_string(),
        })?;
        Ok(Probe::new(definition.name.clone(), check))
    }

    #[cfg(not(feature = "db-redis"))]
    fn redis_probe(
        &self,
        label: &ProbeLabel<'_>,
        _definition: &ProbeDefinition,
        _source: &UrlSource,
    ) -> Result<Probe, ProbeFactoryError> {
        Err(ProbeFactoryError::FeatureDisabled {
            probe: label.to_string(),
            kind: "redis",
            feature: "db-redis",
        })
    }

    #[cfg(feature = "http-out")]
    fn http_probe(
        &self,
        label: &ProbeLabel<'_>,
        definition: &ProbeDefinition,
        options: &crate::config::spec::HttpProbeOptions,
    ) -> Result<Probe, ProbeFactoryError> {
        let mut check =
            HttpCheck::new(options.url.clone()).map_err(|err| ProbeFactoryError::InvalidUrl {
                probe: label.to_string(),
                url: redact_url(&options.url),
                reason: err.to_string(),
            })?;
        if let Some(status) = options.expect_status {
            check = check.with_expected_status(status);
        }
        Ok(Probe::new(definition.name.clone(), check))
    }

    #[cfg(not(feature = "http-out"))]
    fn http_probe(
        &self,
        label: &ProbeLabel<'_>,
        _definition: &ProbeDefinition,
        _options: &crate::config::spec::HttpProbeOptions,
    ) -> Result<Probe, ProbeFactoryError> {
        Err(ProbeFactoryError::FeatureDisabled {
            probe: label.to_string(),
            kind: "http",
            feature: "http-out",
        })
    }
}

struct ProbeLabel<'a> {
    dependency: &'a str,
    phase: &'a str,
    probe: &'a str,
}

impl fmt::Display for ProbeLabel<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "dependency `{}` phase `{}` probe `{}`",
            self.dependency, self.phase, self.probe
        )
    }
}

/// Host and port of a connection URL, with well-known ports for the schemes
/// this crate probes.
pub fn host_and_port(raw: &str) -> Result<(String, u16), String> {
    let url = Url::parse(raw).map_err(|err| err.to_string())?;
    let host = url
        .host_str()
        .filter(|host| !host.is_empty())
        .ok_or_else(|| "URL has no host".to_string())?
        .to_string();
    let port = url
        .port()
        .or_else(|| default_port(url.scheme()))
        .ok_or_else(|| format!("URL has no port and scheme `{}` has no default", url.scheme()))?;
    Ok((host, port))
}

fn default_port(scheme: &str) -> Option<u16> {
    match scheme {
        "postgres" | "postgresql" => Some(5432),
        "redis" | "rediss" => Some(6379),
        "mysql" | "mariadb" => Some(3306),
        "http" => Some(80),
        "https" => Some(443),
        _ => None,
    }
}

#[derive(Debug, Error)]
pub enum ProbeFactoryError {
    #[error("{probe} reads its URL from `{var}`, which is not set")]
    MissingEnv { probe: String, var: String },
    #[error("{probe} has an invalid URL `{url}`: {reason}")]
    InvalidUrl {
        probe: String,
        url: String,
        reason: String,
    },
    #[error("{probe} uses `{kind}` probes but binary built without `{feature}` feature")]
    FeatureDisabled {
        probe: String,
        kind: &'static str,
        feature: &'static str,
    },
    #[error(transparent)]
    Spec(#[from] SpecError),
}
