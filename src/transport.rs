//! Retrying HTTP execution layer shared by search and PDF fetch.
//!
//! The retry loop is an explicit state machine rather than nested
//! error-catching, so backoff timing and attempt counting are testable
//! on their own.

use std::future::Future;
use std::time::Duration;

use tokio::time::{sleep, timeout};
use tracing::{debug, info, warn};

use crate::error::HarvestError;
use crate::utils::HttpClient;

/// Retry behaviour for one logical operation
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    /// Retries after the first attempt; total attempts = max_retries + 1
    pub max_retries: u32,
    /// Initial backoff delay, doubled after each transient failure
    pub base_delay: Duration,
    /// Upper cap on the computed backoff
    pub max_delay: Duration,
    /// Timeout applied to each individual attempt, not the whole operation
    pub attempt_timeout: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            base_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(60),
            attempt_timeout: Duration::from_secs(30),
        }
    }
}

/// Exponential backoff before the next attempt.
///
/// `attempt` is the 1-based number of the attempt that just failed.
pub fn backoff_delay(policy: &RetryPolicy, attempt: u32) -> Duration {
    let factor = 2u32.saturating_pow(attempt.saturating_sub(1));
    let delay = policy.base_delay.saturating_mul(factor);
    delay.min(policy.max_delay)
}

/// Phases of the retry loop
#[derive(Debug)]
enum RetryState {
    Attempting { attempt: u32 },
    BackingOff { attempt: u32, delay: Duration },
}

/// Execute an async operation with bounded retries and exponential backoff.
///
/// Only transient failures (see [`HarvestError::is_transient`]) consume
/// retry budget; permanent failures return immediately. A 429 carrying a
/// `Retry-After` hint overrides the computed backoff for that wait.
pub async fn with_retry<T, F, Fut>(policy: &RetryPolicy, mut op: F) -> Result<T, HarvestError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, HarvestError>>,
{
    let mut state = RetryState::Attempting { attempt: 1 };

    loop {
        match state {
            RetryState::Attempting { attempt } => {
                let outcome = match timeout(policy.attempt_timeout, op()).await {
                    Ok(result) => result,
                    Err(_) => Err(HarvestError::Network(format!(
                        "attempt timed out after {:?}",
                        policy.attempt_timeout
                    ))),
                };

                match outcome {
                    Ok(value) => {
                        if attempt > 1 {
                            info!(attempt, "operation succeeded after retries");
                        }
                        return Ok(value);
                    }
                    Err(error) if error.is_transient() && attempt <= policy.max_retries => {
                        let delay = retry_after_hint(&error)
                            .unwrap_or_else(|| backoff_delay(policy, attempt));
                        warn!(
                            attempt,
                            error_kind = %error.kind(),
                            delay_ms = delay.as_millis() as u64,
                            "transient failure, backing off"
                        );
                        state = RetryState::BackingOff { attempt, delay };
                    }
                    Err(error) => {
                        if error.is_transient() {
                            warn!(attempt, error_kind = %error.kind(), "retry budget exhausted");
                        } else {
                            debug!(attempt, error_kind = %error.kind(), "permanent failure, not retrying");
                        }
                        return Err(error);
                    }
                }
            }
            RetryState::BackingOff { attempt, delay } => {
                sleep(delay).await;
                state = RetryState::Attempting {
                    attempt: attempt + 1,
                };
            }
        }
    }
}

fn retry_after_hint(error: &HarvestError) -> Option<Duration> {
    match error {
        HarvestError::Http {
            retry_after: Some(secs),
            ..
        } => Some(Duration::from_secs(*secs)),
        _ => None,
    }
}

/// Retrying transport over the shared HTTP client.
///
/// Used for both the search feed and the PDF artifacts.
#[derive(Debug, Clone)]
pub struct Transport {
    http: HttpClient,
    policy: RetryPolicy,
}

impl Transport {
    pub fn new(http: HttpClient, policy: RetryPolicy) -> Self {
        Self { http, policy }
    }

    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    /// GET a URL, retrying transient failures, and return the full body.
    pub async fn get_bytes(&self, url: &str) -> Result<Vec<u8>, HarvestError> {
        let http = self.http.clone();
        let url = url.to_string();

        with_retry(&self.policy, || {
            let http = http.clone();
            let url = url.clone();
            async move {
                let response = http
                    .client()
                    .get(&url)
                    .send()
                    .await
                    .map_err(|e| HarvestError::Network(format!("request failed: {}", e)))?;

                let status = response.status();
                if !status.is_success() {
                    return Err(HarvestError::Http {
                        status: status.as_u16(),
                        retry_after: parse_retry_after(&response),
                    });
                }

                let body = response
                    .bytes()
                    .await
                    .map_err(|e| HarvestError::Network(format!("failed to read body: {}", e)))?;

                // Some arXiv mirrors answer 200 with an empty body under load
                if body.is_empty() {
                    return Err(HarvestError::Network("empty response body".to_string()));
                }

                Ok(body.to_vec())
            }
        })
        .await
    }
}

/// Seconds form of the Retry-After header; HTTP-date form is ignored
fn parse_retry_after(response: &reqwest::Response) -> Option<u64> {
    response
        .headers()
        .get(reqwest::header::RETRY_AFTER)?
        .to_str()
        .ok()?
        .trim()
        .parse()
        .ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;

    fn fast_policy(max_retries: u32) -> RetryPolicy {
        RetryPolicy {
            max_retries,
            base_delay: Duration::from_millis(10),
            max_delay: Duration::from_millis(100),
            attempt_timeout: Duration::from_secs(5),
        }
    }

    #[test]
    fn test_backoff_doubles_and_caps() {
        let policy = RetryPolicy {
            base_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(5),
            ..Default::default()
        };
        assert_eq!(backoff_delay(&policy, 1), Duration::from_secs(1));
        assert_eq!(backoff_delay(&policy, 2), Duration::from_secs(2));
        assert_eq!(backoff_delay(&policy, 3), Duration::from_secs(4));
        assert_eq!(backoff_delay(&policy, 4), Duration::from_secs(5));
        assert_eq!(backoff_delay(&policy, 10), Duration::from_secs(5));
    }

    #[tokio::test(start_paused = true)]
    async fn test_success_first_attempt() {
        let calls = Arc::new(AtomicU32::new(0));
        let calls2 = Arc::clone(&calls);

        let result = with_retry(&fast_policy(3), move || {
            let calls = Arc::clone(&calls2);
            async move {
                calls.fetch_add(1, Ordering::SeqCst);
                Ok::<_, HarvestError>("ok")
            }
        })
        .await;

        assert_eq!(result.unwrap(), "ok");
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_success_on_third_attempt() {
        let calls = Arc::new(AtomicU32::new(0));
        let calls2 = Arc::clone(&calls);

        let result = with_retry(&fast_policy(3), move || {
            let calls = Arc::clone(&calls2);
            async move {
                let n = calls.fetch_add(1, Ordering::SeqCst) + 1;
                if n < 3 {
                    Err(HarvestError::Network("flaky".to_string()))
                } else {
                    Ok("ok")
                }
            }
        })
        .await;

        assert_eq!(result.unwrap(), "ok");
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_exhausts_budget_after_max_retries_plus_one() {
        let calls = Arc::new(AtomicU32::new(0));
        let calls2 = Arc::clone(&calls);

        let result: Result<(), _> = with_retry(&fast_policy(3), move || {
            let calls = Arc::clone(&calls2);
            async move {
                calls.fetch_add(1, Ordering::SeqCst);
                Err(HarvestError::Network("always down".to_string()))
            }
        })
        .await;

        assert!(matches!(result, Err(HarvestError::Network(_))));
        assert_eq!(calls.load(Ordering::SeqCst), 4);
    }

    #[tokio::test(start_paused = true)]
    async fn test_permanent_error_not_retried() {
        let calls = Arc::new(AtomicU32::new(0));
        let calls2 = Arc::clone(&calls);

        let result: Result<(), _> = with_retry(&fast_policy(5), move || {
            let calls = Arc::clone(&calls2);
            async move {
                calls.fetch_add(1, Ordering::SeqCst);
                Err(HarvestError::Http {
                    status: 404,
                    retry_after: None,
                })
            }
        })
        .await;

        assert!(matches!(
            result,
            Err(HarvestError::Http { status: 404, .. })
        ));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_retry_after_overrides_backoff() {
        let policy = RetryPolicy {
            max_retries: 1,
            base_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(60),
            attempt_timeout: Duration::from_secs(5),
        };

        let calls = Arc::new(AtomicU32::new(0));
        let calls2 = Arc::clone(&calls);

        let started = tokio::time::Instant::now();
        let result = with_retry(&policy, move || {
            let calls = Arc::clone(&calls2);
            async move {
                let n = calls.fetch_add(1, Ordering::SeqCst) + 1;
                if n == 1 {
                    Err(HarvestError::Http {
                        status: 429,
                        retry_after: Some(7),
                    })
                } else {
                    Ok("ok")
                }
            }
        })
        .await;

        assert_eq!(result.unwrap(), "ok");
        // The wait was the server hint, not the 1s computed backoff
        assert_eq!(started.elapsed(), Duration::from_secs(7));
    }

    #[tokio::test(start_paused = true)]
    async fn test_attempt_timeout_counts_as_transient() {
        let policy = RetryPolicy {
            max_retries: 1,
            base_delay: Duration::from_millis(10),
            max_delay: Duration::from_millis(10),
            attempt_timeout: Duration::from_millis(50),
        };

        let calls = Arc::new(AtomicU32::new(0));
        let calls2 = Arc::clone(&calls);

        let result: Result<(), _> = with_retry(&policy, move || {
            let calls = Arc::clone(&calls2);
            async move {
                calls.fetch_add(1, Ordering::SeqCst);
                sleep(Duration::from_secs(3600)).await;
                Ok(())
            }
        })
        .await;

        assert!(matches!(result, Err(HarvestError::Network(_))));
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_get_bytes_maps_status_errors() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("GET", "/missing.pdf")
            .with_status(404)
            .expect(1)
            .create_async()
            .await;

        let transport = Transport::new(HttpClient::new(), fast_policy(2));
        let result = transport
            .get_bytes(&format!("{}/missing.pdf", server.url()))
            .await;

        assert!(matches!(
            result,
            Err(HarvestError::Http { status: 404, .. })
        ));
        // A 404 is permanent, so exactly one request was made
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_get_bytes_retries_server_errors_until_budget() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("GET", "/down")
            .with_status(503)
            .expect(3)
            .create_async()
            .await;

        let policy = RetryPolicy {
            max_retries: 2,
            base_delay: Duration::from_millis(5),
            max_delay: Duration::from_millis(20),
            attempt_timeout: Duration::from_secs(5),
        };
        let transport = Transport::new(HttpClient::new(), policy);
        let result = transport.get_bytes(&format!("{}/down", server.url())).await;

        assert!(matches!(
            result,
            Err(HarvestError::Http { status: 503, .. })
        ));
        // max_retries + 1 requests were made before giving up
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_get_bytes_returns_body() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("GET", "/paper.pdf")
            .with_status(200)
            .with_body("pdf bytes")
            .create_async()
            .await;

        let transport = Transport::new(HttpClient::new(), fast_policy(1));
        let body = transport
            .get_bytes(&format!("{}/paper.pdf", server.url()))
            .await
            .unwrap();

        assert_eq!(body, b"pdf bytes");
        mock.assert_async().await;
    }
}
