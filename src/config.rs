pub mod spec;

use config::{Config, ConfigError, Environment, File};
use serde::Deserialize;
use std::path::PathBuf;

pub use spec::{ReadinessConfig, SpecConfigError};

/// Process-level settings: where the dependency spec lives and the
/// connection URLs used when there is none.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ReadygateConfig {
    #[serde(default)]
    pub spec_path: Option<PathBuf>,
    #[serde(default)]
    pub database_url: Option<String>,
    #[serde(default)]
    pub redis_url: Option<String>,
}

impl ReadygateConfig {
    pub fn load() -> Result<Self, ConfigError> {
        let mut loaded: Self = Config::builder()
            .add_source(File::with_name("config/local").required(false))
            .add_source(Environment::with_prefix("READYGATE").separator("__"))
            .build()?
            .try_deserialize()?;

        if loaded.database_url.is_none() {
            loaded.database_url = non_empty_env("DATABASE_URL");
        }
        if loaded.redis_url.is_none() {
            loaded.redis_url = non_empty_env("REDIS_URL");
        }

        Ok(loaded)
    }

    /// The spec file when one is configured, otherwise the default set built
    /// from the connection URLs.
    pub fn readiness_config(&self) -> Result<ReadinessConfig, SpecConfigError> {
        match &self.spec_path {
            Some(path) => ReadinessConfig::from_path(path),
            None => ReadinessConfig::from_environment(
                self.database_url.as_deref(),
                self.redis_url.as_deref(),
            ),
        }
    }
}

fn non_empty_env(key: &str) -> Option<String> {
    std::env::var(key)
        .ok()
        .filter(|value| !value.trim().is_empty())
}
