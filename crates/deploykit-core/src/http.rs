//! HTTP probes for verifying a deployment went live.

use std::time::Duration;

use tracing::debug;

use crate::style;

/// Outcome of one probe. A value, not an error: scripts typically probe a
/// handful of URLs at the end of a run and report all outcomes together.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProbeOutcome {
    /// The expected status code was returned.
    Expected(u16),
    /// The server answered with a different status code.
    Unexpected(u16),
    /// The request never got an HTTP answer (DNS, TLS, connection).
    TransportError(String),
}

impl ProbeOutcome {
    pub fn is_ok(&self) -> bool {
        matches!(self, ProbeOutcome::Expected(_))
    }
}

/// HTTP client for deployment checks.
pub struct HttpProbe {
    client: reqwest::Client,
}

impl HttpProbe {
    pub fn new() -> Self {
        let client = reqwest::Client::builder()
            .user_agent(concat!("deploykit/", env!("CARGO_PKG_VERSION")))
            .build()
            .expect("failed to build HTTP client");
        Self { client }
    }

    /// GET `url` and compare the status code against `expected_status`,
    /// after an optional delay (freshly restarted services need a moment
    /// before they answer).
    pub async fn ensure_response(
        &self,
        url: &str,
        expected_status: u16,
        delay_secs: f64,
    ) -> ProbeOutcome {
        if delay_secs > 0.0 {
            tokio::time::sleep(Duration::from_secs_f64(delay_secs)).await;
        }

        debug!(url, expected_status, "probing");
        let outcome = match self.client.get(url).send().await {
            Ok(response) => {
                let status = response.status().as_u16();
                if status == expected_status {
                    ProbeOutcome::Expected(status)
                } else {
                    ProbeOutcome::Unexpected(status)
                }
            }
            Err(err) => ProbeOutcome::TransportError(err.to_string()),
        };

        match &outcome {
            ProbeOutcome::Expected(status) => println!(
                "{}",
                style::bgreen(&format!("{url}: expected status code received: {status}"))
            ),
            ProbeOutcome::Unexpected(status) => println!(
                "{}",
                style::bred(&format!("{url}: unexpected status code: {status}"))
            ),
            ProbeOutcome::TransportError(reason) => println!(
                "{}",
                style::bred(&format!("{url}: request failed: {reason}"))
            ),
        }
        outcome
    }
}

impl Default for HttpProbe {
    fn default() -> Self {
        Self::new()
    }
}
