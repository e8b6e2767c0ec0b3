use crate::readiness::{Check, ProbeOutcome};
use async_trait::async_trait;
use reqwest::{Client, StatusCode};

/// Issues a GET and inspects the status code.
#[derive(Clone, Debug)]
pub struct HttpCheck {
    client: Client,
    url: String,
    expect_status: Option<u16>,
}

impl HttpCheck {
    pub fn new(url: impl Into<String>) -> Result<Self, reqwest::Error> {
        let client = Client::builder().build()?;
        Ok(Self {
            client,
            url: url.into(),
            expect_status: None,
        })
    }

    /// Require exactly this status instead of any 2xx.
    pub fn with_expected_status(mut self, status: u16) -> Self {
        self.expect_status = Some(status);
        self
    }
}

#[async_trait]
impl Check for HttpCheck {
    async fn check(&self) -> ProbeOutcome {
        let response = match self.client.get(&self.url).send().await {
            Ok(response) => response,
            Err(err) if err.is_builder() => {
                return ProbeOutcome::fatal(format!("invalid request to {}: {err}", self.url));
            }
            Err(err) => {
                return ProbeOutcome::transient(format!("GET {} failed: {err}", self.url));
            }
        };

        classify_status(response.status(), self.expect_status, &self.url)
    }

    fn kind(&self) -> &'static str {
        "http"
    }
}

fn classify_status(status: StatusCode, expected: Option<u16>, url: &str) -> ProbeOutcome {
    let matched = match expected {
        Some(code) => status.as_u16() == code,
        None => status.is_success(),
    };
    if matched {
        return ProbeOutcome::Success;
    }

    match status {
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => {
            ProbeOutcome::fatal(format!("GET {url} rejected credentials ({status})"))
        }
        _ => ProbeOutcome::transient(format!("GET {url} returned {status}")),
    }
}
