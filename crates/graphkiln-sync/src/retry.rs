//! Exponential backoff for transient transport failures

use crate::error::TransportError;
use graphkiln_config::SyncSettings;
use graphkiln_sparql::SparqlError;
use std::future::Future;
use std::time::Duration;
use tokio::time::sleep;
use tracing::{debug, warn};

/// How often and how patiently to retry
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryConfig {
    /// Retries after the first attempt
    pub max_retries: u32,
    /// Delay before the first retry
    pub initial_backoff: Duration,
    /// Cap on any single delay
    pub max_backoff: Duration,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self::from_settings(&SyncSettings::default())
    }
}

impl RetryConfig {
    /// Take the retry knobs from `[sync]`
    pub fn from_settings(settings: &SyncSettings) -> Self {
        Self {
            max_retries: settings.max_retries,
            initial_backoff: settings.base_backoff(),
            max_backoff: settings.max_backoff(),
        }
    }

    /// Delay before retry number `retry` (1-based): `initial * 2^(retry-1)`, capped
    pub fn delay(&self, retry: u32) -> Duration {
        let factor = 2u32.saturating_pow(retry.saturating_sub(1));
        self.initial_backoff
            .checked_mul(factor)
            .unwrap_or(self.max_backoff)
            .min(self.max_backoff)
    }

    /// Run `request` until it succeeds, fails permanently or runs out of retries
    pub async fn run<F, Fut, T>(&self, operation: &str, mut request: F) -> Result<T, TransportError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, SparqlError>>,
    {
        let mut attempts = 0u32;
        loop {
            attempts += 1;
            match request().await {
                Ok(value) => {
                    if attempts > 1 {
                        debug!(operation, attempts, "Request succeeded after retries");
                    }
                    return Ok(value);
                }
                Err(error) if error.is_transient() && attempts <= self.max_retries => {
                    let delay = self.delay(attempts);
                    warn!(
                        operation,
                        attempt = attempts,
                        max_retries = self.max_retries,
                        ?delay,
                        %error,
                        "Transient failure, retrying"
                    );
                    sleep(delay).await;
                }
                Err(error) => return Err(TransportError::from_sparql(&error, attempts)),
            }
        }
    }
}
