use serde::Deserialize;

pub(crate) const DEFAULT_MANAGEMENT_HOST: &str = "0.0.0.0";
pub(crate) const DEFAULT_MANAGEMENT_PORT: u16 = 8081;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ManagementConfig {
    pub host: String,
    pub port: u16,
    pub live: Option<ManagementEndpointConfig>,
    pub ready: Option<ManagementEndpointConfig>,
    pub status: Option<ManagementEndpointConfig>,
    pub metrics: Option<ManagementEndpointConfig>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ManagementEndpointConfig {
    pub path: String,
}

impl Default for ManagementConfig {
    fn default() -> Self {
        let endpoint = |path: &str| {
            Some(ManagementEndpointConfig {
                path: path.to_string(),
            })
        };
        Self {
            host: DEFAULT_MANAGEMENT_HOST.to_string(),
            port: DEFAULT_MANAGEMENT_PORT,
            live: endpoint("/live"),
            ready: endpoint("/ready"),
            status: endpoint("/status"),
            metrics: endpoint("/metrics"),
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub(crate) struct RawManagementSection {
    #[serde(default)]
    pub(crate) host: Option<String>,
    #[serde(default)]
    pub(crate) port: Option<u16>,
    #[serde(default)]
    pub(crate) live: Option<RawManagementEndpoint>,
    #[serde(default)]
    pub(crate) ready: Option<RawManagementEndpoint>,
    #[serde(default)]
    pub(crate) status: Option<RawManagementEndpoint>,
    #[serde(default)]
    pub(crate) metrics: Option<RawManagementEndpoint>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub(crate) struct RawManagementEndpoint {
    #[serde(default)]
    pub(crate) path: Option<String>,
}

pub(crate) fn resolve_management(
    section: RawManagementSection,
    errors: &mut Vec<String>,
) -> Option<ManagementConfig> {
    let port = match section.port {
        Some(port) => port,
        None => {
            errors.push("management section requires `port` when present".to_string());
            return None;
        }
    };

    let host = section
        .host
        .filter(|value| !value.trim().is_empty())
        .unwrap_or_else(|| DEFAULT_MANAGEMENT_HOST.to_string());

    let any_endpoint = section.live.is_some()
        || section.ready.is_some()
        || section.status.is_some()
        || section.metrics.is_some();

    // A bare `management: { port }` serves every endpoint at its default path.
    if !any_endpoint {
        return Some(ManagementConfig {
            host,
            port,
            ..ManagementConfig::default()
        });
    }

    let resolve = |endpoint: Option<RawManagementEndpoint>, default: &str| {
        endpoint.map(|endpoint| ManagementEndpointConfig {
            path: normalise_endpoint_path(endpoint.path, default),
        })
    };

    let config = ManagementConfig {
        host,
        port,
        live: resolve(section.live, "/live"),
        ready: resolve(section.ready, "/ready"),
        status: resolve(section.status, "/status"),
        metrics: resolve(section.metrics, "/metrics"),
    };

    let mut paths: Vec<&str> = [&config.live, &config.ready, &config.status, &config.metrics]
        .into_iter()
        .flatten()
        .map(|endpoint| endpoint.path.as_str())
        .collect();
    paths.sort_unstable();
    if let Some(window) = paths.windows(2).find(|pair| pair[0] == pair[1]) {
        errors.push(format!(
            "management endpoints must use distinct paths (`{}` is used more than once)",
            window[0]
        ));
    }

    Some(config)
}

fn normalise_endpoint_path(path: Option<String>, default: &str) -> String {
    let mut resolved = path
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
        .unwrap_or_else(|| default.to_string());

    if !resolved.starts_with('/') {
        resolved.insert(0, '/');
    }

    resolved
}
