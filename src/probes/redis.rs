use crate::probes::redact_url;
use crate::readiness::{Check, ProbeOutcome};
use async_trait::async_trait;
use redis::{ErrorKind, RedisError};

/// Opens a connection and issues `PING`.
#[derive(Clone, Debug)]
pub struct RedisCheck {
    client: redis::Client,
    target: String,
}

impl RedisCheck {
    pub fn from_url(url: &str) -> Result<Self, RedisError> {
        let client = redis::Client::open(url)?;
        Ok(Self {
            client,
            target: redact_url(url),
        })
    }

    pub fn target(&self) -> &str {
        &self.target
    }
}

#[async_trait]
impl Check for RedisCheck {
    async fn check(&self) -> ProbeOutcome {
        let mut connection = match self.client.get_multiplexed_async_connection().await {
            Ok(connection) => connection,
            Err(err) => return classify_redis_error(&err),
        };

        match redis::cmd("PING")
            .query_async::<_, String>(&mut connection)
            .await
        {
            Ok(_) => ProbeOutcome::Success,
            Err(err) => classify_redis_error(&err),
        }
    }

    fn kind(&self) -> &'static str {
        "redis"
    }
}

fn classify_redis_error(err: &RedisError) -> ProbeOutcome {
    if matches!(err.code(), Some("NOAUTH") | Some("WRONGPASS")) {
        return ProbeOutcome::fatal(format!("redis rejected credentials: {err}"));
    }

    match err.kind() {
        ErrorKind::AuthenticationFailed => {
            ProbeOutcome::fatal(format!("redis rejected credentials: {err}"))
        }
        ErrorKind::InvalidClientConfig => {
            ProbeOutcome::fatal(format!("invalid redis configuration: {err}"))
        }
        ErrorKind::BusyLoadingError => {
            ProbeOutcome::transient(format!("redis is loading its dataset: {err}"))
        }
        _ => ProbeOutcome::transient(format!("redis unavailable: {err}")),
    }
}
