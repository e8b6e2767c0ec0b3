use crate::probes::{redact_url, MissingDatabase};
use crate::readiness::{Check, ProbeOutcome};
use async_trait::async_trait;
use sqlx::postgres::{PgConnectOptions, PgConnection};
use sqlx::{ConnectOptions, Connection};
use std::str::FromStr;

const DEFAULT_QUERY: &str = "SELECT 1";

/// Connects with a fresh connection and runs one read-only query.
///
/// No pool is kept between evaluations so every call observes the server as
/// it is now.
#[derive(Clone, Debug)]
pub struct PostgresCheck {
    options: PgConnectOptions,
    query: String,
    missing_database: MissingDatabase,
    target: String,
}

impl PostgresCheck {
    pub fn from_url(url: &str) -> Result<Self, sqlx::Error> {
        let options = PgConnectOptions::from_str(url)?.disable_statement_logging();
        Ok(Self {
            options,
            query: DEFAULT_QUERY.to_string(),
            missing_database: MissingDatabase::default(),
            target: redact_url(url),
        })
    }

    pub fn with_query(mut self, query: impl Into<String>) -> Self {
        self.query = query.into();
        self
    }

    pub fn with_missing_database(mut self, policy: MissingDatabase) -> Self {
        self.missing_database = policy;
        self
    }

    pub fn target(&self) -> &str {
        &self.target
    }
}

#[async_trait]
impl Check for PostgresCheck {
    async fn check(&self) -> ProbeOutcome {
        let mut connection = match PgConnection::connect_with(&self.options).await {
            Ok(connection) => connection,
            Err(err) => return classify_sqlx_error(&err, self.missing_database),
        };

        let outcome = match sqlx::query(&self.query).execute(&mut connection).await {
            Ok(_) => ProbeOutcome::Success,
            Err(err) => classify_sqlx_error(&err, self.missing_database),
        };

        if let Err(err) = connection.close().await {
            tracing::debug!(target_db = %self.target, error = %err, "postgres probe close failed");
        }

        outcome
    }

    fn kind(&self) -> &'static str {
        "postgres"
    }
}

pub(crate) fn classify_sqlx_error(err: &sqlx::Error, missing: MissingDatabase) -> ProbeOutcome {
    match err {
        sqlx::Error::Database(db) => {
            classify_sqlstate(db.code().as_deref(), db.message(), missing)
        }
        sqlx::Error::Configuration(inner) => {
            ProbeOutcome::fatal(format!("invalid postgres configuration: {inner}"))
        }
        other => ProbeOutcome::transient(format!("postgres unavailable: {other}")),
    }
}

/// Maps a server-reported SQLSTATE to a probe outcome.
pub fn classify_sqlstate(
    code: Option<&str>,
    message: &str,
    missing: MissingDatabase,
) -> ProbeOutcome {
    match code {
        Some("28P01") | Some("28000") => {
            ProbeOutcome::fatal(format!("postgres rejected credentials: {message}"))
        }
        Some("42501") => ProbeOutcome::fatal(format!("postgres denied privilege: {message}")),
        Some("3D000") => match missing {
            MissingDatabase::Transient => {
                ProbeOutcome::transient(format!("database does not exist yet: {message}"))
            }
            MissingDatabase::Fatal => {
                ProbeOutcome::fatal(format!("database does not exist: {message}"))
            }
        },
        Some("57P03") => ProbeOutcome::transient(format!("postgres is starting up: {message}")),
        Some("42P01") => {
            ProbeOutcome::transient(format!("schema not ready (undefined table): {message}"))
        }
        Some(code) => ProbeOutcome::transient(format!("postgres error {code}: {message}")),
        None => ProbeOutcome::transient(format!("postgres error: {message}")),
    }
}
