use crate::readiness::{Check, ProbeOutcome};
use async_trait::async_trait;
use tokio::net::TcpStream;

/// Succeeds once `host:port` accepts a TCP connection.
///
/// Every connect error is transient: refused and unreachable are the normal
/// shape of a server that has not bound its port yet, and name resolution may
/// lag the container that provides it.
#[derive(Clone, Debug)]
pub struct TcpCheck {
    host: String,
    port: u16,
}

impl TcpCheck {
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
        }
    }

    pub fn target(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

#[async_trait]
impl Check for TcpCheck {
    async fn check(&self) -> ProbeOutcome {
        match TcpStream::connect((self.host.as_str(), self.port)).await {
            Ok(stream) => {
                drop(stream);
                ProbeOutcome::Success
            }
            Err(err) => {
                ProbeOutcome::transient(format!("tcp connect to {} failed: {err}", self.target()))
            }
        }
    }

    fn kind(&self) -> &'static str {
        "tcp"
    }
}
