mod app;
mod checks;
mod defaults;
mod dependencies;
mod management;
mod probes;

use serde::de::Error as _;
use serde::Deserialize;
use serde_yaml::{self, Value as YamlValue};
use std::collections::BTreeMap;
use std::fs::File;
use std::io::Read;
use std::path::Path;
use thiserror::Error;

pub use app::AppConfig;
pub use checks::{CheckConfig, ChecksConfig};
pub use dependencies::{DependencyDefinition, PhaseDefinition};
pub use management::{ManagementConfig, ManagementEndpointConfig};
pub use probes::{
    CommandProbeOptions, HttpProbeOptions, PostgresProbeOptions, ProbeDefinition, ProbeKind,
    TcpTarget, UrlSource,
};

/// Validated dependency definitions plus the serve-mode surface.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReadinessConfig {
    pub app: AppConfig,
    pub dependencies: Vec<DependencyDefinition>,
    pub checks: ChecksConfig,
    pub management: Option<ManagementConfig>,
}

const TOP_LEVEL_FIELDS: &str = "app, dependencies, checks, management";

impl ReadinessConfig {
    pub fn from_reader(mut reader: impl Read) -> Result<Self, SpecConfigError> {
        let mut contents = String::new();
        reader.read_to_string(&mut contents)?;
        Self::from_yaml_str(&contents)
    }

    pub fn from_path(path: impl AsRef<Path>) -> Result<Self, SpecConfigError> {
        let file = File::open(path)?;
        Self::from_reader(file)
    }

    pub fn from_yaml_str(contents: &str) -> Result<Self, SpecConfigError> {
        let mut documents = serde_yaml::Deserializer::from_str(contents);
        let mut parsed = None;
        let mut extra_errors = Vec::new();

        for (index, document) in documents.by_ref().enumerate() {
            if index == 0 {
                parsed = Some(RawSpecFile::deserialize(document)?);
            } else {
                let _: YamlValue = YamlValue::deserialize(document)?;
                extra_errors
                    .push("error[root]: multiple YAML documents are not supported".to_string());
                break;
            }
        }

        let Some(raw) = parsed else {
            let err = serde_yaml::Error::custom(
                "dependency spec must contain exactly one YAML document",
            );
            return Err(SpecConfigError::Parse(err));
        };

        Self::from_raw(raw, extra_errors).map_err(SpecConfigError::Invalid)
    }

    /// Builds the default set from connection URLs: `db` whenever a database
    /// URL is known, plus an optional `redis` that degrades on timeout.
    pub fn from_environment(
        database_url: Option<&str>,
        redis_url: Option<&str>,
    ) -> Result<Self, SpecConfigError> {
        let database_url = database_url
            .map(str::trim)
            .filter(|value| !value.is_empty())
            .ok_or_else(|| {
                SpecConfigError::Invalid(SpecValidationError::new(vec![
                    "no dependency spec given and DATABASE_URL is not set".to_string(),
                ]))
            })?;

        let app = AppConfig::default();
        let mut dependencies = vec![defaults::database_dependency(database_url, &app)];
        if let Some(url) = redis_url.map(str::trim).filter(|value| !value.is_empty()) {
            dependencies.push(defaults::redis_dependency(url, &app));
        }

        Ok(Self {
            checks: ChecksConfig::defaults(&app),
            app,
            dependencies,
            management: None,
        })
    }

    pub fn dependency(&self, name: &str) -> Option<&DependencyDefinition> {
        self.dependencies
            .iter()
            .find(|dependency| dependency.name == name)
    }

    fn from_raw(raw: RawSpecFile, mut errors: Vec<String>) -> Result<Self, SpecValidationError> {
        let RawSpecFile {
            app: raw_app,
            dependencies: raw_dependencies,
            checks: raw_checks,
            management: raw_management,
            extra_fields,
        } = raw;

        for key in extra_fields.keys() {
            errors.push(format!(
                "error[root]: unknown top-level key \"{key}\" (expected one of {TOP_LEVEL_FIELDS})"
            ));
        }

        let app = app::parse_app_config(raw_app, &mut errors);
        if raw_dependencies.is_empty() {
            errors.push("error[root]: at least one dependency is required".to_string());
        }
        let dependencies = dependencies::parse_dependencies(raw_dependencies, &app, &mut errors);
        let checks = checks::parse_checks(raw_checks, &app, &mut errors);
        let management =
            raw_management.and_then(|section| management::resolve_management(section, &mut errors));

        checks::validate_check_references(&checks, &dependencies, &mut errors);

        if errors.is_empty() {
            Ok(Self {
                app,
                dependencies,
                checks,
                management,
            })
        } else {
            Err(SpecValidationError::new(errors))
        }
    }
}

#[derive(Debug, Deserialize)]
struct RawSpecFile {
    #[serde(default)]
    app: Option<app::RawAppSection>,
    #[serde(default)]
    dependencies: Vec<dependencies::RawDependency>,
    #[serde(default)]
    checks: Option<checks::RawChecksSection>,
    #[serde(default)]
    management: Option<management::RawManagementSection>,
    #[serde(default)]
    #[serde(flatten)]
    extra_fields: BTreeMap<String, YamlValue>,
}

#[derive(Debug, Error)]
pub enum SpecConfigError {
    #[error("failed to read dependency spec: {0}")]
    Io(#[from] std::io::Error),
    #[error("failed to parse dependency spec: {0}")]
    Parse(#[from] serde_yaml::Error),
    #[error(transparent)]
    Invalid(SpecValidationError),
}

/// Every validation problem found in one spec, rendered as a list.
#[derive(Debug, Error)]
#[error("dependency spec validation failed:\n{rendered}")]
pub struct SpecValidationError {
    messages: Vec<String>,
    rendered: String,
}

impl SpecValidationError {
    pub fn new(messages: Vec<String>) -> Self {
        let rendered = messages
            .iter()
            .map(|msg| format!("- {msg}"))
            .collect::<Vec<_>>()
            .join("\n");
        Self { messages, rendered }
    }

    pub fn messages(&self) -> &[String] {
        &self.messages
    }
}
