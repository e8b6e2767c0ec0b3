//! Built-in probe kinds.
//!
//! Each check classifies its own errors: conditions a dependency can grow out
//! of during start-up are transient, conditions no retry can fix are fatal.

pub mod command;
#[cfg(feature = "http-out")]
pub mod http;
#[cfg(feature = "db-postgres")]
pub mod postgres;
#[cfg(feature = "db-redis")]
pub mod redis;
pub mod tcp;

pub use command::CommandCheck;
#[cfg(feature = "http-out")]
pub use http::HttpCheck;
#[cfg(feature = "db-postgres")]
pub use postgres::PostgresCheck;
#[cfg(feature = "db-redis")]
pub use redis::RedisCheck;
pub use tcp::TcpCheck;

use url::Url;

/// How a postgres probe treats "database does not exist" (SQLSTATE `3D000`).
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum MissingDatabase {
    /// An init script may still be creating it.
    #[default]
    Transient,
    /// The name is wrong; waiting will not help.
    Fatal,
}

impl MissingDatabase {
    pub fn as_str(self) -> &'static str {
        match self {
            MissingDatabase::Transient => "transient",
            MissingDatabase::Fatal => "fatal",
        }
    }
}

/// Replaces any password in a connection URL so it can be logged.
pub fn redact_url(raw: &str) -> String {
    match Url::parse(raw) {
        Ok(mut url) => {
            if url.password().is_some() {
                let _ = url.set_password(Some("***"));
            }
            url.to_string()
        }
        Err(_) => "<unparseable url>".to_string(),
    }
}
