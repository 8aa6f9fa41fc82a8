//! Retry logic for upstream requests

use crate::error::{RelayError, RelayResult};
use rand::Rng;
use std::future::Future;
use std::time::Duration;
use tokio::time::sleep;
use tracing::warn;

/// Maximum retries after the initial attempt
pub const MAX_RETRIES: u32 = 3;

/// Base backoff delay in seconds, doubled per retry (2s, 4s, 8s)
pub const BASE_DELAY_SECS: u64 = 2;

/// Execute an upstream request with exponential backoff on transport
/// failures.
///
/// Only errors classified as transient are retried; application-level
/// errors embedded in a provider response return immediately. Jitter of
/// 0-500ms per second of delay is added to avoid synchronized retries.
pub(crate) async fn with_transport_retry<T, F, Fut>(provider: &str, operation: F) -> RelayResult<T>
where
    F: Fn() -> Fut,
    Fut: Future<Output = RelayResult<T>>,
{
    let mut last_error = None;

    for attempt in 0..=MAX_RETRIES {
        match operation().await {
            Ok(value) => {
                if attempt > 0 {
                    tracing::info!(provider, attempt, "request succeeded after retry");
                }
                return Ok(value);
            }
            Err(error) => {
                if !error.is_transient() {
                    warn!(provider, error = %error, "non-retryable upstream error");
                    return Err(error);
                }
                last_error = Some(error);

                if attempt < MAX_RETRIES {
                    let base_secs = BASE_DELAY_SECS * 2_u64.pow(attempt);
                    let jitter_ms = {
                        let mut rng = rand::thread_rng();
                        rng.gen_range(0..=(base_secs * 500))
                    };
                    let delay = Duration::from_secs(base_secs) + Duration::from_millis(jitter_ms);

                    warn!(
                        provider,
                        attempt = attempt + 1,
                        max_attempts = MAX_RETRIES + 1,
                        delay_secs = delay.as_secs_f64(),
                        "transport failure, retrying"
                    );
                    sleep(delay).await;
                } else {
                    tracing::error!(
                        provider,
                        attempts = MAX_RETRIES + 1,
                        "all retry attempts exhausted"
                    );
                }
            }
        }
    }

    Err(last_error.unwrap_or_else(|| {
        RelayError::transport(format!("all {} attempts failed", MAX_RETRIES + 1))
    }))
}
