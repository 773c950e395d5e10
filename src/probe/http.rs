//! HTTP probe implementation.

use std::time::{Duration, Instant};

use super::{ProbeError, ProbeOutcome};

/// Issues timed GET requests through one shared client.
#[derive(Debug, Clone)]
pub struct HttpProber {
    client: reqwest::Client,
    timeout: Duration,
}

impl HttpProber {
    pub fn new(timeout: Duration) -> Result<Self, ProbeError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| ProbeError::Client(e.to_string()))?;

        Ok(Self { client, timeout })
    }

    /// Probe `url` once. Never fails: transport errors become
    /// [`ProbeOutcome::failed`].
    pub async fn probe(&self, url: &str) -> ProbeOutcome {
        match self.try_probe(url).await {
            Ok((latency, status)) => ProbeOutcome {
                latency,
                status: Some(status),
            },
            Err(e) => {
                tracing::debug!("Probe failed for {}: {}", url, e);
                ProbeOutcome::failed()
            }
        }
    }

    async fn try_probe(&self, url: &str) -> Result<(Duration, u16), ProbeError> {
        let start = Instant::now();

        let response = self.client.get(url).send().await.map_err(|e| self.classify(e))?;
        let status = response.status().as_u16();

        // Read the full body to measure complete transfer time
        let _body = response.bytes().await.map_err(|e| self.classify(e))?;

        Ok((start.elapsed(), status))
    }

    fn classify(&self, e: reqwest::Error) -> ProbeError {
        if e.is_timeout() {
            ProbeError::Timeout(self.timeout)
        } else {
            ProbeError::Network(e.to_string())
        }
    }
}
