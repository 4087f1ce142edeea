//! Retry with exponential back-off and jitter for marketplace requests.
//!
//! Only transient failures (see [`MeliError::is_transient`]) are retried:
//! 429, 500/502/503/504 and network errors. Authorization failures, 404s and
//! malformed bodies are returned immediately.

use std::future::Future;
use std::time::Duration;

use crate::error::MeliError;

const MAX_DELAY_MS: u64 = 60_000;

/// Delay before retry number `attempt` (1-based): `base_ms * 2^(attempt-1)`
/// plus up to `base_ms` of random jitter, capped at 60 s.
pub fn backoff_delay_ms(backoff_base_ms: u64, attempt: u32) -> u64 {
    let exponential = backoff_base_ms.saturating_mul(1u64 << attempt.saturating_sub(1).min(16));
    #[allow(
        clippy::cast_possible_truncation,
        clippy::cast_sign_loss,
        clippy::cast_precision_loss
    )]
    let jitter = (rand::random::<f64>() * backoff_base_ms as f64) as u64;
    exponential.saturating_add(jitter).min(MAX_DELAY_MS)
}

/// Runs `operation`, retrying transient errors up to `max_retries` more times.
///
/// With `max_retries = 2` the operation is attempted at most 3 times.
pub(crate) async fn retry_with_backoff<T, F, Fut>(
    max_retries: u32,
    backoff_base_ms: u64,
    mut operation: F,
) -> Result<T, MeliError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, MeliError>>,
{
    let mut attempt = 0u32;
    loop {
        match operation().await {
            Ok(value) => return Ok(value),
            Err(err) => {
                if !err.is_transient() || attempt >= max_retries {
                    return Err(err);
                }
                attempt += 1;
                let delay_ms = backoff_delay_ms(backoff_base_ms, attempt);
                tracing::warn!(
                    attempt,
                    max_retries,
                    delay_ms,
                    error = %err,
                    "transient marketplace error, retrying after back-off"
                );
                tokio::time::sleep(Duration::from_millis(delay_ms)).await;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;

    fn server_error(status: u16) -> MeliError {
        MeliError::UnexpectedStatus {
            status,
            url: "https://api.example.com/orders/search".to_owned(),
            message: "boom".to_owned(),
        }
    }

    #[tokio::test]
    async fn retries_server_errors_then_succeeds() {
        let calls = Arc::new(AtomicU32::new(0));
        let cc = Arc::clone(&calls);
        let result = retry_with_backoff(2, 0, || {
            let cc = Arc::clone(&cc);
            async move {
                let n = cc.fetch_add(1, Ordering::SeqCst);
                if n < 2 {
                    Err(server_error(503))
                } else {
                    Ok::<u32, MeliError>(7)
                }
            }
        })
        .await;
        assert_eq!(result.unwrap(), 7);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn gives_up_after_max_retries() {
        let calls = Arc::new(AtomicU32::new(0));
        let cc = Arc::clone(&calls);
        let result = retry_with_backoff(2, 0, || {
            let cc = Arc::clone(&cc);
            async move {
                cc.fetch_add(1, Ordering::SeqCst);
                Err::<u32, MeliError>(MeliError::RateLimited {
                    retry_after_secs: 0,
                })
            }
        })
        .await;
        assert_eq!(calls.load(Ordering::SeqCst), 3);
        assert!(matches!(result, Err(MeliError::RateLimited { .. })));
    }

    #[tokio::test]
    async fn does_not_retry_unauthorized() {
        let calls = Arc::new(AtomicU32::new(0));
        let cc = Arc::clone(&calls);
        let result = retry_with_backoff(3, 0, || {
            let cc = Arc::clone(&cc);
            async move {
                cc.fetch_add(1, Ordering::SeqCst);
                Err::<u32, MeliError>(MeliError::Unauthorized {
                    status: 401,
                    url: "https://api.example.com/orders/search".to_owned(),
                })
            }
        })
        .await;
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert!(matches!(result, Err(MeliError::Unauthorized { .. })));
    }

    #[tokio::test]
    async fn does_not_retry_plain_client_errors() {
        let calls = Arc::new(AtomicU32::new(0));
        let cc = Arc::clone(&calls);
        let result = retry_with_backoff(3, 0, || {
            let cc = Arc::clone(&cc);
            async move {
                cc.fetch_add(1, Ordering::SeqCst);
                Err::<u32, MeliError>(server_error(400))
            }
        })
        .await;
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert!(result.is_err());
    }

    #[test]
    fn backoff_grows_and_is_capped() {
        let first = backoff_delay_ms(1_000, 1);
        assert!((1_000..=2_000).contains(&first), "got {first}");
        let third = backoff_delay_ms(1_000, 3);
        assert!((4_000..=5_000).contains(&third), "got {third}");
        assert_eq!(backoff_delay_ms(1_000, 12), MAX_DELAY_MS);
        assert_eq!(backoff_delay_ms(0, 4), 0);
    }
}
