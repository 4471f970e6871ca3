//! Backoff for provider requests that fail transiently.
//!
//! A hosted chat API answers 429 when it is rate limiting, an embedding
//! service still loading its model answers 503 or refuses connections.
//! Both recover when asked again a little later.

use std::future::Future;
use std::time::Duration;

use reqwest::StatusCode;
use reqwest::header::{HeaderMap, RETRY_AFTER};

use crate::error::LlmError;

const BASE_DELAY: Duration = Duration::from_millis(500);
const MAX_DOUBLINGS: u32 = 5;

/// Retry policy for one provider's HTTP calls.
#[derive(Debug, Clone, Copy)]
pub(crate) struct Backoff {
    provider: &'static str,
    attempts: u32,
    base: Duration,
}

impl Backoff {
    /// `attempts` counts the first request; zero is treated as one.
    pub(crate) const fn new(provider: &'static str, attempts: u32) -> Self {
        Self {
            provider,
            attempts,
            base: BASE_DELAY,
        }
    }

    #[cfg(test)]
    const fn with_base(mut self, base: Duration) -> Self {
        self.base = base;
        self
    }

    /// `Retry-After` when the server sent one, otherwise doubling from the
    /// base delay.
    fn delay(&self, retry_after: Option<Duration>, attempt: u32) -> Duration {
        retry_after.unwrap_or_else(|| {
            let doublings = attempt.saturating_sub(1).min(MAX_DOUBLINGS);
            self.base * 2u32.pow(doublings)
        })
    }

    /// Send the request built by `f`, repeating it while the outcome is transient.
    ///
    /// Any response that is not transient is returned as is; status handling
    /// stays with the caller.
    ///
    /// # Errors
    ///
    /// [`LlmError::RateLimited`] if every attempt was answered with 429,
    /// [`LlmError::Http`] for a transport failure that outlasted the attempts.
    pub(crate) async fn send<F, Fut>(&self, mut f: F) -> Result<reqwest::Response, LlmError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<reqwest::Response, reqwest::Error>>,
    {
        let attempts = self.attempts.max(1);
        let mut attempt = 1;
        loop {
            let retry_after = match f().await {
                Ok(response) if is_transient(response.status()) => {
                    if attempt >= attempts {
                        if response.status() == StatusCode::TOO_MANY_REQUESTS {
                            return Err(LlmError::RateLimited);
                        }
                        return Ok(response);
                    }
                    tracing::warn!(
                        provider = self.provider,
                        status = %response.status(),
                        attempt,
                        attempts,
                        "transient response, retrying"
                    );
                    retry_after(response.headers())
                }
                Ok(response) => return Ok(response),
                Err(e) if (e.is_connect() || e.is_timeout()) && attempt < attempts => {
                    tracing::warn!(
                        provider = self.provider,
                        attempt,
                        attempts,
                        error = %e,
                        "request failed, retrying"
                    );
                    None
                }
                Err(e) => return Err(LlmError::Http(e)),
            };
            tokio::time::sleep(self.delay(retry_after, attempt)).await;
            attempt += 1;
        }
    }
}

fn is_transient(status: StatusCode) -> bool {
    matches!(
        status,
        StatusCode::TOO_MANY_REQUESTS
            | StatusCode::BAD_GATEWAY
            | StatusCode::SERVICE_UNAVAILABLE
            | StatusCode::GATEWAY_TIMEOUT
    )
}

fn retry_after(headers: &HeaderMap) -> Option<Duration> {
    headers
        .get(RETRY_AFTER)?
        .to_str()
        .ok()?
        .trim()
        .parse::<u64>()
        .ok()
        .map(Duration::from_secs)
}
