use std::future::Future;
use std::time::Duration;

use reqwest::{Client, StatusCode};
use tracing::warn;

use crate::config::OutboundConfig;

/// Builds the HTTP client shared by the mail, OAuth and push integrations.
/// Every request inherits the configured timeout.
pub fn http_client(config: &OutboundConfig) -> reqwest::Result<Client> {
    Client::builder().timeout(config.timeout).build()
}

/// Whether a status from a provider is worth another attempt.
pub fn is_transient_status(status: StatusCode) -> bool {
    status == StatusCode::TOO_MANY_REQUESTS || status.is_server_error()
}

/// Bounded exponential backoff for outbound calls.
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    pub max_retries: u32,
    pub base_delay: Duration,
}

impl RetryPolicy {
    pub fn from_config(config: &OutboundConfig) -> Self {
        Self {
            max_retries: config.max_retries,
            base_delay: Duration::from_millis(500),
        }
    }

    /// Delay before retry number `attempt` (1-based): base, 2x base, 4x base...
    pub fn delay_for(&self, attempt: u32) -> Duration {
        self.base_delay * (1u32 << (attempt.saturating_sub(1)).min(16))
    }

    /// Runs `op` until it succeeds, fails with a non-retryable error, or the
    /// retry budget is spent. The last error is returned.
    pub async fn run<T, E, F, Fut>(
        &self,
        label: &str,
        is_retryable: impl Fn(&E) -> bool,
        mut op: F,
    ) -> Result<T, E>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: std::fmt::Display,
    {
        let mut attempt = 0;
        loop {
            match op().await {
                Ok(value) => return Ok(value),
                Err(e) if attempt < self.max_retries && is_retryable(&e) => {
                    attempt += 1;
                    let delay = self.delay_for(attempt);
                    warn!(
                        "{label} failed ({e}), retry {attempt}/{} after {}ms",
                        self.max_retries,
                        delay.as_millis()
                    );
                    tokio::time::sleep(delay).await;
                }
                Err(e) => return Err(e),
            }
        }
    }
}
